use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use kalenteri::components::free_slots::FreeSlotFinder;
use kalenteri::components::store::models::{Event, FreeSlot, WorkingHours};
use kalenteri::components::store::{InMemoryStore, Store};
use kalenteri::config::Config;
use kalenteri::error::Error;
use std::sync::Arc;

const USER: &str = "user-1";

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
}

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 15, hour, minute, 0).unwrap()
}

fn event(id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> Event {
    Event {
        id: id.to_string(),
        user_id: USER.to_string(),
        calendar_id: "work".to_string(),
        title: format!("Meeting {}", id),
        start,
        end,
        reminders: Vec::new(),
    }
}

async fn finder_with(events: Vec<Event>) -> (FreeSlotFinder, Arc<InMemoryStore>) {
    finder_with_config(events, &Config::default()).await
}

async fn finder_with_config(
    events: Vec<Event>,
    config: &Config,
) -> (FreeSlotFinder, Arc<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    for event in &events {
        store.insert_event(event).await.unwrap();
    }
    (FreeSlotFinder::new(store.clone(), config), store)
}

fn spans(slots: &[FreeSlot]) -> Vec<(DateTime<Utc>, DateTime<Utc>, i64)> {
    slots
        .iter()
        .map(|slot| (slot.start, slot.end, slot.duration_minutes))
        .collect()
}

#[tokio::test]
async fn test_single_event_splits_day() {
    let (finder, _) = finder_with(vec![event("a", at(10, 0), at(11, 0))]).await;

    let slots = finder
        .find_free_slots(USER, date(), Some(30), None)
        .await
        .unwrap();

    assert_eq!(
        spans(&slots),
        vec![(at(9, 0), at(10, 0), 60), (at(11, 0), at(17, 0), 360)]
    );
}

#[tokio::test]
async fn test_overlapping_events_merge_into_one_busy_span() {
    let (finder, _) = finder_with(vec![
        event("a", at(10, 0), at(11, 30)),
        event("b", at(11, 0), at(12, 0)),
    ])
    .await;

    let slots = finder
        .find_free_slots(USER, date(), Some(30), None)
        .await
        .unwrap();

    assert_eq!(
        spans(&slots),
        vec![(at(9, 0), at(10, 0), 60), (at(12, 0), at(17, 0), 300)]
    );
}

#[tokio::test]
async fn test_contained_event_does_not_move_cursor_back() {
    let (finder, _) = finder_with(vec![
        event("outer", at(10, 0), at(13, 0)),
        event("inner", at(11, 0), at(11, 30)),
    ])
    .await;

    let slots = finder
        .find_free_slots(USER, date(), Some(30), None)
        .await
        .unwrap();

    assert_eq!(
        spans(&slots),
        vec![(at(9, 0), at(10, 0), 60), (at(13, 0), at(17, 0), 240)]
    );
}

#[tokio::test]
async fn test_empty_day_exact_duration_passes() {
    let (finder, _) = finder_with(Vec::new()).await;

    let slots = finder
        .find_free_slots(USER, date(), Some(480), None)
        .await
        .unwrap();
    assert_eq!(spans(&slots), vec![(at(9, 0), at(17, 0), 480)]);

    let slots = finder
        .find_free_slots(USER, date(), Some(481), None)
        .await
        .unwrap();
    assert!(slots.is_empty());
}

#[tokio::test]
async fn test_default_duration_is_sixty_minutes() {
    let (finder, _) = finder_with(vec![
        event("a", at(9, 30), at(10, 0)),
        event("b", at(11, 0), at(16, 15)),
    ])
    .await;

    let slots = finder.find_free_slots(USER, date(), None, None).await.unwrap();

    // 09:00-09:30 and 16:15-17:00 are too short
    assert_eq!(spans(&slots), vec![(at(10, 0), at(11, 0), 60)]);
}

#[tokio::test]
async fn test_events_of_other_users_and_days_are_ignored() {
    let mut other_user = event("other", at(10, 0), at(12, 0));
    other_user.user_id = "user-2".to_string();
    let yesterday = event(
        "yesterday",
        Utc.with_ymd_and_hms(2024, 3, 14, 10, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 3, 14, 12, 0, 0).unwrap(),
    );
    let (finder, _) = finder_with(vec![other_user, yesterday]).await;

    let slots = finder
        .find_free_slots(USER, date(), Some(30), None)
        .await
        .unwrap();
    assert_eq!(spans(&slots), vec![(at(9, 0), at(17, 0), 480)]);
}

#[tokio::test]
async fn test_events_crossing_working_hours_are_clamped() {
    let (finder, _) = finder_with(vec![
        event("early", at(7, 0), at(9, 45)),
        event("late", at(16, 0), at(19, 0)),
    ])
    .await;

    let slots = finder
        .find_free_slots(USER, date(), Some(30), None)
        .await
        .unwrap();
    assert_eq!(spans(&slots), vec![(at(9, 45), at(16, 0), 375)]);
}

#[tokio::test]
async fn test_slots_and_events_cover_the_day() {
    let events = vec![
        event("a", at(9, 0), at(9, 50)),
        event("b", at(10, 15), at(11, 0)),
        event("c", at(13, 0), at(13, 30)),
        event("d", at(16, 0), at(17, 0)),
    ];
    let (finder, _) = finder_with(events.clone()).await;

    let slots = finder
        .find_free_slots(USER, date(), Some(1), None)
        .await
        .unwrap();

    let mut intervals: Vec<(DateTime<Utc>, DateTime<Utc>)> = slots
        .iter()
        .map(|slot| (slot.start, slot.end))
        .chain(events.iter().map(|event| (event.start, event.end)))
        .collect();
    intervals.sort();

    assert_eq!(intervals.first().unwrap().0, at(9, 0));
    assert_eq!(intervals.last().unwrap().1, at(17, 0));
    for pair in intervals.windows(2) {
        assert_eq!(pair[0].1, pair[1].0, "gap or overlap between {:?}", pair);
    }
}

#[tokio::test]
async fn test_no_slot_overlaps_any_event() {
    let events = vec![
        event("a", at(9, 30), at(11, 0)),
        event("b", at(10, 0), at(10, 30)),
        event("c", at(10, 45), at(12, 15)),
        event("d", at(12, 0), at(12, 30)),
        event("e", at(14, 0), at(15, 0)),
        event("f", at(14, 30), at(16, 0)),
    ];
    let (finder, _) = finder_with(events.clone()).await;

    let slots = finder
        .find_free_slots(USER, date(), Some(15), None)
        .await
        .unwrap();

    assert!(!slots.is_empty());
    for slot in &slots {
        for event in &events {
            assert!(
                !event.overlaps(slot.start, slot.end),
                "slot {:?} overlaps event {}",
                slot,
                event.id
            );
        }
    }
    assert_eq!(
        spans(&slots),
        vec![
            (at(9, 0), at(9, 30), 30),
            (at(12, 30), at(14, 0), 90),
            (at(16, 0), at(17, 0), 60),
        ]
    );
}

#[tokio::test]
async fn test_repeated_queries_are_identical() {
    let (finder, _) = finder_with(vec![
        event("a", at(10, 0), at(11, 0)),
        event("b", at(10, 30), at(12, 0)),
    ])
    .await;

    let first = finder.find_free_slots(USER, date(), Some(30), None).await.unwrap();
    let second = finder.find_free_slots(USER, date(), Some(30), None).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_longer_duration_never_adds_slots() {
    let (finder, _) = finder_with(vec![
        event("a", at(9, 20), at(10, 0)),
        event("b", at(10, 45), at(12, 0)),
        event("c", at(14, 0), at(14, 10)),
    ])
    .await;

    let mut previous = usize::MAX;
    for minutes in [1, 15, 20, 45, 60, 120, 170, 240, 480] {
        let count = finder
            .find_free_slots(USER, date(), Some(minutes), None)
            .await
            .unwrap()
            .len();
        assert!(count <= previous, "{} minutes gave {} slots", minutes, count);
        previous = count;
    }
    assert_eq!(previous, 0);
}

#[tokio::test]
async fn test_non_positive_duration_is_rejected() {
    let (finder, _) = finder_with(Vec::new()).await;

    for minutes in [0, -30] {
        let result = finder.find_free_slots(USER, date(), Some(minutes), None).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}

#[tokio::test]
async fn test_malformed_working_hours_are_rejected() {
    let (finder, _) = finder_with(Vec::new()).await;

    let inverted = WorkingHours {
        start: "17:00".to_string(),
        end: "09:00".to_string(),
    };
    let result = finder
        .find_free_slots(USER, date(), Some(30), Some(inverted))
        .await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));

    let garbled = WorkingHours {
        start: "9am".to_string(),
        end: "17:00".to_string(),
    };
    let result = finder
        .find_free_slots(USER, date(), Some(30), Some(garbled))
        .await;
    assert!(matches!(result, Err(Error::InvalidInput(_))));
}

#[tokio::test]
async fn test_stored_working_hours_are_used() {
    let (finder, store) = finder_with(vec![event("a", at(10, 0), at(11, 0))]).await;
    store
        .set_working_hours(
            USER,
            &WorkingHours {
                start: "08:00".to_string(),
                end: "12:00".to_string(),
            },
        )
        .await
        .unwrap();

    let slots = finder
        .find_free_slots(USER, date(), Some(30), None)
        .await
        .unwrap();
    assert_eq!(
        spans(&slots),
        vec![(at(8, 0), at(10, 0), 120), (at(11, 0), at(12, 0), 60)]
    );

    // An explicit window wins over the stored one
    let explicit = WorkingHours {
        start: "13:00".to_string(),
        end: "14:00".to_string(),
    };
    let slots = finder
        .find_free_slots(USER, date(), Some(30), Some(explicit))
        .await
        .unwrap();
    assert_eq!(spans(&slots), vec![(at(13, 0), at(14, 0), 60)]);
}

#[tokio::test]
async fn test_working_hours_follow_configured_timezone() {
    let config = Config {
        timezone: "Europe/Helsinki".to_string(),
        ..Config::default()
    };
    // Helsinki is UTC+2 in mid-March
    let (finder, _) = finder_with_config(vec![event("a", at(8, 0), at(9, 0))], &config).await;

    let slots = finder
        .find_free_slots(USER, date(), Some(30), None)
        .await
        .unwrap();
    assert_eq!(
        spans(&slots),
        vec![(at(7, 0), at(8, 0), 60), (at(9, 0), at(15, 0), 360)]
    );
}
