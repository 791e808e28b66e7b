//! Lock metrics published through the `metrics` facade.
//!
//! The host process installs whatever recorder it uses; without one these
//! calls are no-ops.

use std::time::Duration;

use metrics::{counter, describe_counter, describe_histogram, histogram};

pub const ACQUIRE_TOTAL: &str = "stlock_acquire_total";
pub const RELEASE_TOTAL: &str = "stlock_release_total";
pub const ACQUIRE_WAIT_SECONDS: &str = "stlock_acquire_wait_seconds";

/// Register metric descriptions. Call once at startup.
pub fn describe_metrics() {
    describe_counter!(
        ACQUIRE_TOTAL,
        "Total number of acquire calls by outcome"
    );
    describe_counter!(
        RELEASE_TOTAL,
        "Total number of release calls by outcome"
    );
    describe_histogram!(
        ACQUIRE_WAIT_SECONDS,
        "Time spent polling before a lock was acquired"
    );
}

pub(crate) fn record_acquire(outcome: &'static str, waited: Duration) {
    counter!(ACQUIRE_TOTAL, "outcome" => outcome).increment(1);
    if outcome == "acquired" {
        histogram!(ACQUIRE_WAIT_SECONDS).record(waited.as_secs_f64());
    }
}

pub(crate) fn record_release(outcome: &'static str) {
    counter!(RELEASE_TOTAL, "outcome" => outcome).increment(1);
}
