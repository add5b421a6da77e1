use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("weatherchat.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter =
    Counter::new("weatherchat.client.request_errors");
pub(crate) static CLIENT_TTFB: Moments = Moments::new("weatherchat.client.ttfb_seconds");

pub(crate) static STREAM_EVENTS: Counter = Counter::new("weatherchat.stream.events");
pub(crate) static STREAM_ERRORS: Counter = Counter::new("weatherchat.stream.errors");
pub(crate) static STREAM_BYTES: Counter = Counter::new("weatherchat.stream.bytes");
pub(crate) static STREAM_DISCARDED_FRAMES: Counter =
    Counter::new("weatherchat.stream.discarded_frames");

pub(crate) static SESSION_EXCHANGES: Counter = Counter::new("weatherchat.session.exchanges");
pub(crate) static SESSION_CANCELLATIONS: Counter =
    Counter::new("weatherchat.session.cancellations");
pub(crate) static SESSION_EXCHANGE_DURATION: Moments =
    Moments::new("weatherchat.session.exchange_duration_seconds");

pub(crate) static STORE_WRITES: Counter = Counter::new("weatherchat.store.writes");
pub(crate) static STORE_ERRORS: Counter = Counter::new("weatherchat.store.errors");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_TTFB);

    collector.register_counter(&STREAM_EVENTS);
    collector.register_counter(&STREAM_ERRORS);
    collector.register_counter(&STREAM_BYTES);
    collector.register_counter(&STREAM_DISCARDED_FRAMES);

    collector.register_counter(&SESSION_EXCHANGES);
    collector.register_counter(&SESSION_CANCELLATIONS);
    collector.register_moments(&SESSION_EXCHANGE_DURATION);

    collector.register_counter(&STORE_WRITES);
    collector.register_counter(&STORE_ERRORS);
}
