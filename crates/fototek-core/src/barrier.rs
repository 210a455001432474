//! Consumer barrier trait for pausable job consumption.
//!
//! The reverse geocoder asserts this barrier before rebuilding its index and
//! releases it afterwards, so that no extraction job observes a half-built
//! index. The barrier is consumer-level: pausing stops new jobs from starting
//! and drains in-flight ones; it is not a per-lookup lock.

use async_trait::async_trait;

/// Barrier over a set of job consumers.
///
/// `pause` must not return until every in-flight job in the covered consumers
/// has finished. `resume` lifts the barrier; calls are expected to be paired.
#[async_trait]
pub trait ConsumerBarrier: Send + Sync {
    /// Stop the covered consumers from starting new jobs and wait for
    /// in-flight jobs to drain.
    async fn pause(&self);

    /// Allow the covered consumers to start jobs again.
    async fn resume(&self);
}
