use super::models::{Event, Notification, Todo, TodoStatus, WorkingHours};
use super::Store;
use crate::error::{not_found, store_error, AppResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client as RedisClient, Script};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

/// Redis keys
mod keys {
    pub const EVENT_PREFIX: &str = "kalenteri:event:";
    pub const USER_EVENTS_PREFIX: &str = "kalenteri:events:user:";
    pub const CALENDAR_EVENTS_PREFIX: &str = "kalenteri:events:calendar:";
    pub const PENDING_REMINDER_EVENTS: &str = "kalenteri:events:pending_reminders";
    pub const TODO_PREFIX: &str = "kalenteri:todo:";
    pub const REMINDER_TODOS: &str = "kalenteri:todos:reminders";
    pub const WORKING_HOURS_PREFIX: &str = "kalenteri:working_hours:";
    pub const NOTIFICATION_PREFIX: &str = "kalenteri:notification:";
    pub const USER_NOTIFICATIONS_PREFIX: &str = "kalenteri:notifications:user:";
    pub const SWEEP_LEASE: &str = "kalenteri:dispatcher:lease";

    pub fn event(id: &str) -> String {
        format!("{}{}", EVENT_PREFIX, id)
    }

    pub fn user_events(user_id: &str) -> String {
        format!("{}{}", USER_EVENTS_PREFIX, user_id)
    }

    pub fn calendar_events(calendar_id: &str) -> String {
        format!("{}{}", CALENDAR_EVENTS_PREFIX, calendar_id)
    }

    pub fn todo(id: &str) -> String {
        format!("{}{}", TODO_PREFIX, id)
    }

    pub fn working_hours(user_id: &str) -> String {
        format!("{}{}", WORKING_HOURS_PREFIX, user_id)
    }

    pub fn notification(id: &str) -> String {
        format!("{}{}", NOTIFICATION_PREFIX, id)
    }

    pub fn user_notifications(user_id: &str) -> String {
        format!("{}{}", USER_NOTIFICATIONS_PREFIX, user_id)
    }
}

/// Lua scripts for the read-modify-write updates that must not interleave.
/// Each returns -1 when the document is missing.
mod scripts {
    /// KEYS: event, pending index. ARGV: reminder index (0-based), event id.
    pub const MARK_EVENT_REMINDER_SENT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return -1 end
local event = cjson.decode(raw)
local reminder = event['reminders'][tonumber(ARGV[1]) + 1]
if reminder == nil then return -1 end
if reminder['sent'] then return 0 end
reminder['sent'] = true
local pending = false
for _, r in ipairs(event['reminders']) do
  if not r['sent'] then pending = true end
end
redis.call('SET', KEYS[1], cjson.encode(event))
if not pending then redis.call('ZREM', KEYS[2], ARGV[2]) end
return 1
"#;

    /// KEYS: todo, reminder index. ARGV: todo id.
    pub const MARK_TODO_REMINDER_SENT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return -1 end
local todo = cjson.decode(raw)
local reminder = todo['reminder']
if reminder == nil or reminder == cjson.null then return -1 end
if reminder['sent'] then return 0 end
reminder['sent'] = true
redis.call('SET', KEYS[1], cjson.encode(todo))
redis.call('ZREM', KEYS[2], ARGV[1])
return 1
"#;

    /// KEYS: todo, reminder index. ARGV: new status, todo id.
    pub const SET_TODO_STATUS: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return -1 end
local todo = cjson.decode(raw)
todo['status'] = ARGV[1]
redis.call('SET', KEYS[1], cjson.encode(todo))
if ARGV[1] == 'completed' then redis.call('ZREM', KEYS[2], ARGV[2]) end
return 1
"#;

    /// KEYS: notification.
    pub const MARK_NOTIFICATION_READ: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return -1 end
local notification = cjson.decode(raw)
notification['read'] = true
redis.call('SET', KEYS[1], cjson.encode(notification), 'KEEPTTL')
return 1
"#;

    /// KEYS: lease. ARGV: owner, ttl in milliseconds.
    /// The current holder extends its own lease.
    pub const ACQUIRE_LEASE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  redis.call('PEXPIRE', KEYS[1], ARGV[2])
  return 1
end
if redis.call('SET', KEYS[1], ARGV[1], 'NX', 'PX', ARGV[2]) then
  return 1
end
return 0
"#;

    /// KEYS: lease. ARGV: owner.
    pub const RELEASE_LEASE: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
"#;
}

/// Sorted-set score for an instant
fn score(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Whether a todo belongs in the reminder index
fn todo_reminder_armed(todo: &Todo) -> bool {
    todo.due_date.is_some()
        && todo.status != TodoStatus::Completed
        && todo
            .reminder
            .as_ref()
            .map(|reminder| reminder.enabled && !reminder.sent)
            .unwrap_or(false)
}

/// Redis-backed store
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    retention: Duration,
    mark_event_reminder_sent: Script,
    mark_todo_reminder_sent: Script,
    set_todo_status: Script,
    mark_notification_read: Script,
    acquire_lease: Script,
    release_lease: Script,
}

impl RedisStore {
    /// Connect to Redis at `redis_url`
    pub async fn connect(redis_url: &str, retention: Duration) -> AppResult<Self> {
        info!("Connecting to Redis at {}", redis_url);

        let client = RedisClient::open(redis_url)
            .map_err(|e| store_error(&format!("Failed to create Redis client: {}", e)))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| store_error(&format!("Failed to connect to Redis: {}", e)))?;

        Ok(Self {
            conn,
            retention,
            mark_event_reminder_sent: Script::new(scripts::MARK_EVENT_REMINDER_SENT),
            mark_todo_reminder_sent: Script::new(scripts::MARK_TODO_REMINDER_SENT),
            set_todo_status: Script::new(scripts::SET_TODO_STATUS),
            mark_notification_read: Script::new(scripts::MARK_NOTIFICATION_READ),
            acquire_lease: Script::new(scripts::ACQUIRE_LEASE),
            release_lease: Script::new(scripts::RELEASE_LEASE),
        })
    }

    /// Load and decode JSON documents, skipping keys that no longer exist
    async fn fetch_json<T: DeserializeOwned>(&self, keys: &[String]) -> AppResult<Vec<T>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let raw: Vec<Option<String>> = redis::cmd("MGET").arg(keys).query_async(&mut conn).await?;

        let mut documents = Vec::with_capacity(raw.len());
        for json in raw.into_iter().flatten() {
            documents.push(serde_json::from_str(&json)?);
        }
        Ok(documents)
    }

    /// Load one JSON document
    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Remove an event document and its index entries
    async fn remove_event(&self, event: &Event) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let () = redis::pipe()
            .atomic()
            .del(keys::event(&event.id))
            .ignore()
            .zrem(keys::user_events(&event.user_id), &event.id)
            .ignore()
            .srem(keys::calendar_events(&event.calendar_id), &event.id)
            .ignore()
            .zrem(keys::PENDING_REMINDER_EVENTS, &event.id)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn insert_event(&self, event: &Event) -> AppResult<()> {
        let json = serde_json::to_string(event)?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set(keys::event(&event.id), json)
            .ignore()
            .zadd(keys::user_events(&event.user_id), &event.id, score(event.start))
            .ignore()
            .sadd(keys::calendar_events(&event.calendar_id), &event.id)
            .ignore();

        if event.has_pending_reminders() {
            pipe.zadd(keys::PENDING_REMINDER_EVENTS, &event.id, score(event.start))
                .ignore();
        } else {
            pipe.zrem(keys::PENDING_REMINDER_EVENTS, &event.id).ignore();
        }

        let mut conn = self.conn.clone();
        let () = pipe.query_async(&mut conn).await?;
        debug!("Stored event {} for user {}", event.id, event.user_id);
        Ok(())
    }

    async fn get_event(&self, event_id: &str) -> AppResult<Option<Event>> {
        self.get_json(&keys::event(event_id)).await
    }

    async fn delete_event(&self, event_id: &str) -> AppResult<bool> {
        match self.get_event(event_id).await? {
            Some(event) => {
                self.remove_event(&event).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_calendar_events(&self, calendar_id: &str) -> AppResult<usize> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(keys::calendar_events(calendar_id)).await?;
        let event_keys: Vec<String> = ids.iter().map(|id| keys::event(id)).collect();
        let events: Vec<Event> = self.fetch_json(&event_keys).await?;

        for event in &events {
            self.remove_event(event).await?;
        }

        let () = conn.del(keys::calendar_events(calendar_id)).await?;
        info!("Deleted {} events of calendar {}", events.len(), calendar_id);
        Ok(events.len())
    }

    async fn events_overlapping(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> AppResult<Vec<Event>> {
        // Index is by start, so every event starting before `to` is a candidate
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .zrangebyscore(
                keys::user_events(user_id),
                "-inf",
                format!("({}", score(to)),
            )
            .await?;

        let event_keys: Vec<String> = ids.iter().map(|id| keys::event(id)).collect();
        let events: Vec<Event> = self.fetch_json(&event_keys).await?;
        Ok(events
            .into_iter()
            .filter(|event| event.overlaps(from, to))
            .collect())
    }

    async fn events_with_pending_reminders(&self, now: DateTime<Utc>) -> AppResult<Vec<Event>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .zrangebyscore(
                keys::PENDING_REMINDER_EVENTS,
                format!("({}", score(now)),
                "+inf",
            )
            .await?;

        let event_keys: Vec<String> = ids.iter().map(|id| keys::event(id)).collect();
        let events: Vec<Event> = self.fetch_json(&event_keys).await?;
        Ok(events
            .into_iter()
            .filter(|event| event.start > now && event.has_pending_reminders())
            .collect())
    }

    async fn mark_event_reminder_sent(&self, event_id: &str, index: usize) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let result: i64 = self
            .mark_event_reminder_sent
            .key(keys::event(event_id))
            .key(keys::PENDING_REMINDER_EVENTS)
            .arg(index)
            .arg(event_id)
            .invoke_async(&mut conn)
            .await?;

        match result {
            1 => Ok(true),
            0 => Ok(false),
            _ => Err(not_found(&format!("Reminder {} of event {}", index, event_id))),
        }
    }

    async fn insert_todo(&self, todo: &Todo) -> AppResult<()> {
        let json = serde_json::to_string(todo)?;
        let mut pipe = redis::pipe();
        pipe.atomic().set(keys::todo(&todo.id), json).ignore();

        match todo.due_date {
            Some(due) if todo_reminder_armed(todo) => {
                pipe.zadd(keys::REMINDER_TODOS, &todo.id, score(due)).ignore();
            }
            _ => {
                pipe.zrem(keys::REMINDER_TODOS, &todo.id).ignore();
            }
        }

        let mut conn = self.conn.clone();
        let () = pipe.query_async(&mut conn).await?;
        debug!("Stored todo {} for user {}", todo.id, todo.user_id);
        Ok(())
    }

    async fn get_todo(&self, todo_id: &str) -> AppResult<Option<Todo>> {
        self.get_json(&keys::todo(todo_id)).await
    }

    async fn set_todo_status(&self, todo_id: &str, status: TodoStatus) -> AppResult<()> {
        let status = serde_json::to_value(status)?;
        let status = status
            .as_str()
            .ok_or_else(|| store_error("Todo status did not serialize to a string"))?
            .to_string();

        let mut conn = self.conn.clone();
        let result: i64 = self
            .set_todo_status
            .key(keys::todo(todo_id))
            .key(keys::REMINDER_TODOS)
            .arg(status)
            .arg(todo_id)
            .invoke_async(&mut conn)
            .await?;

        if result < 0 {
            return Err(not_found(&format!("Todo {}", todo_id)));
        }
        Ok(())
    }

    async fn todos_due_for_reminder(
        &self,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> AppResult<Vec<Todo>> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn
            .zrangebyscore(keys::REMINDER_TODOS, score(now), score(until))
            .await?;

        let todo_keys: Vec<String> = ids.iter().map(|id| keys::todo(id)).collect();
        let todos: Vec<Todo> = self.fetch_json(&todo_keys).await?;
        Ok(todos
            .into_iter()
            .filter(|todo| todo.reminder_due(now, until))
            .collect())
    }

    async fn mark_todo_reminder_sent(&self, todo_id: &str) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let result: i64 = self
            .mark_todo_reminder_sent
            .key(keys::todo(todo_id))
            .key(keys::REMINDER_TODOS)
            .arg(todo_id)
            .invoke_async(&mut conn)
            .await?;

        match result {
            1 => Ok(true),
            0 => Ok(false),
            _ => Err(not_found(&format!("Reminder of todo {}", todo_id))),
        }
    }

    async fn get_working_hours(&self, user_id: &str) -> AppResult<Option<WorkingHours>> {
        self.get_json(&keys::working_hours(user_id)).await
    }

    async fn set_working_hours(&self, user_id: &str, hours: &WorkingHours) -> AppResult<()> {
        let json = serde_json::to_string(hours)?;
        let mut conn = self.conn.clone();
        let () = conn.set(keys::working_hours(user_id), json).await?;
        Ok(())
    }

    async fn create_notification(&self, notification: &Notification) -> AppResult<()> {
        let json = serde_json::to_string(notification)?;
        let ttl_seconds = self.retention.num_seconds().max(1);
        let user_key = keys::user_notifications(&notification.user_id);

        let mut conn = self.conn.clone();
        let () = redis::pipe()
            .atomic()
            .set_ex(keys::notification(&notification.id), json, ttl_seconds as u64)
            .ignore()
            .zadd(&user_key, &notification.id, score(notification.created_at))
            .ignore()
            .expire(&user_key, ttl_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn list_notifications(&self, user_id: &str) -> AppResult<Vec<Notification>> {
        let user_key = keys::user_notifications(user_id);
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.zrevrange(&user_key, 0, -1).await?;

        let notification_keys: Vec<String> = ids.iter().map(|id| keys::notification(id)).collect();
        let notifications: Vec<Notification> = self.fetch_json(&notification_keys).await?;

        // Index entries whose document has expired are dropped here
        if notifications.len() < ids.len() {
            let expired: Vec<&String> = ids
                .iter()
                .filter(|id| !notifications.iter().any(|n| &&n.id == id))
                .collect();
            let () = conn.zrem(&user_key, expired).await?;
        }

        Ok(notifications)
    }

    async fn mark_notification_read(&self, notification_id: &str) -> AppResult<bool> {
        let mut conn = self.conn.clone();
        let result: i64 = self
            .mark_notification_read
            .key(keys::notification(notification_id))
            .invoke_async(&mut conn)
            .await?;
        Ok(result > 0)
    }

    async fn try_acquire_sweep_lease(
        &self,
        owner: &str,
        ttl: std::time::Duration,
    ) -> AppResult<bool> {
        let ttl_millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let mut conn = self.conn.clone();
        let acquired: i64 = self
            .acquire_lease
            .key(keys::SWEEP_LEASE)
            .arg(owner)
            .arg(ttl_millis)
            .invoke_async(&mut conn)
            .await?;
        Ok(acquired == 1)
    }

    async fn release_sweep_lease(&self, owner: &str) -> AppResult<()> {
        let mut conn = self.conn.clone();
        let _: i64 = self
            .release_lease
            .key(keys::SWEEP_LEASE)
            .arg(owner)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }
}
