mod free_slots;
mod reminders;

// Integration tests, built as a single test binary:
// - smoke_tests: config defaults and component lifecycle
// - free_slots: slot computation against the in-memory store
// - redis_store: the Redis store against REDIS_URL, skipped when it is unset
// - reminders: dispatcher sweeps, failure isolation and the scheduler
// - store_mock: store, publisher and clock doubles with switchable failures
// - web_api: the HTTP routes, driven through the router without a socket
