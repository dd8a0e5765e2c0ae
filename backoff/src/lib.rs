//! Retry a fallible async [`Operation`] on a schedule of cool-off periods.
//!
//! The schedule is any `Iterator<Item = Duration>`; [`strategy::exponential::Exponential`]
//! is the one the delivery path uses. A [`Condition`] decides whether an error is worth
//! another attempt at all, and an optional [`Notify`] hook is told about every retry
//! before the cool-off starts (used for logging attempt numbers and delays).

use std::future::Future;
use std::time::Duration;

pub mod retry;
pub mod strategy;

/// A unit of work that can be started again from scratch.
pub trait Operation {
    type Item;
    type Error;
    type Future: Future<Output = Result<Self::Item, Self::Error>>;

    /// Starts a fresh run of the operation.
    fn run(&mut self) -> Self::Future;
}

impl<I, E, T, F> Operation for F
where
    T: Future<Output = Result<I, E>>,
    F: FnMut() -> T,
{
    type Item = I;
    type Error = E;
    type Future = T;

    fn run(&mut self) -> Self::Future {
        self()
    }
}

/// Decides whether an error may be retried.
pub trait Condition<E> {
    fn can_retry(&mut self, error: &E) -> bool;
}

impl<E, F> Condition<E> for F
where
    F: FnMut(&E) -> bool,
{
    fn can_retry(&mut self, error: &E) -> bool {
        self(error)
    }
}

/// Observes a retry right before the cool-off period begins.
///
/// `attempt` is the 1-based number of the run that just failed, `delay` is how long the
/// retry will wait before starting run `attempt + 1`.
pub trait Notify<E> {
    fn notify(&mut self, error: &E, attempt: u32, delay: Duration);
}

/// A [`Notify`] that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNotify;

impl<E> Notify<E> for NoNotify {
    fn notify(&mut self, _error: &E, _attempt: u32, _delay: Duration) {}
}

impl<E, F> Notify<E> for F
where
    F: FnMut(&E, u32, Duration),
{
    fn notify(&mut self, error: &E, attempt: u32, delay: Duration) {
        self(error, attempt, delay)
    }
}
