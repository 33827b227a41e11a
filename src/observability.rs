use biometrics::{Collector, Counter, Moments};

pub(crate) static CLIENT_REQUESTS: Counter = Counter::new("classifieds.client.requests");
pub(crate) static CLIENT_REQUEST_ERRORS: Counter =
    Counter::new("classifieds.client.request_errors");
pub(crate) static CLIENT_REQUEST_DURATION: Moments =
    Moments::new("classifieds.client.request_duration_seconds");
pub(crate) static CLIENT_AUTH_FAILURES: Counter = Counter::new("classifieds.client.auth_failures");
pub(crate) static CLIENT_REPLAYS: Counter = Counter::new("classifieds.client.replays");
pub(crate) static CLIENT_REPLAY_REJECTIONS: Counter =
    Counter::new("classifieds.client.replay_rejections");

pub(crate) static REFRESH_CALLS: Counter = Counter::new("classifieds.refresh.calls");
pub(crate) static REFRESH_FAILURES: Counter = Counter::new("classifieds.refresh.failures");
pub(crate) static REFRESH_QUEUED: Counter = Counter::new("classifieds.refresh.queued");
pub(crate) static REFRESH_QUEUE_DEPTH: Moments = Moments::new("classifieds.refresh.queue_depth");
pub(crate) static REFRESH_DURATION: Moments =
    Moments::new("classifieds.refresh.duration_seconds");

pub(crate) static FAVORITE_ROLLBACKS: Counter = Counter::new("classifieds.favorites.rollbacks");

/// Register this crate's biometrics with the provided collector.
pub fn register_biometrics(collector: Collector) {
    collector.register_counter(&CLIENT_REQUESTS);
    collector.register_counter(&CLIENT_REQUEST_ERRORS);
    collector.register_moments(&CLIENT_REQUEST_DURATION);
    collector.register_counter(&CLIENT_AUTH_FAILURES);
    collector.register_counter(&CLIENT_REPLAYS);
    collector.register_counter(&CLIENT_REPLAY_REJECTIONS);

    collector.register_counter(&REFRESH_CALLS);
    collector.register_counter(&REFRESH_FAILURES);
    collector.register_counter(&REFRESH_QUEUED);
    collector.register_moments(&REFRESH_QUEUE_DEPTH);
    collector.register_moments(&REFRESH_DURATION);

    collector.register_counter(&FAVORITE_ROLLBACKS);
}
