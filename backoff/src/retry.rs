use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use pin_project::pin_project;
use tokio::time::{Instant, Sleep, sleep_until};

use crate::{Condition, NoNotify, Notify, Operation};

/// The retry future alternates between running the [`Operation`] and sleeping for the
/// next cool-off handed out by the schedule:
/// ```no_rust
///            (Ok) ----------------------------> [Ok]
///           /
/// [run op] -- (Err, not retryable) ----------> [Err]
///           \
///            (Err, retryable) -- (schedule exhausted) --> [Err]
///                            \
///                             (next delay) -> notify -> [sleep] -> [run op]
/// ```
#[pin_project(project = StateProj)]
enum State<O>
where
    O: Operation,
{
    Running(#[pin] O::Future),
    Sleeping(#[pin] Sleep),
}

/// Runs an operation until it succeeds, fails with a non-retryable error, or the
/// schedule runs out of cool-off periods. The error of the last run is returned.
#[pin_project]
pub struct Retry<I, O, C, N = NoNotify>
where
    O: Operation,
{
    #[pin]
    state: State<O>,
    schedule: I,
    operation: O,
    condition: C,
    notify: N,
    /// Runs started so far, including the one in flight.
    attempt: u32,
}

impl<I, O, C> Retry<I, O, C, NoNotify>
where
    I: Iterator<Item = Duration>,
    O: Operation,
    C: Condition<O::Error>,
{
    pub fn new<II>(schedule: II, operation: O, condition: C) -> Self
    where
        II: IntoIterator<IntoIter = I, Item = Duration>,
    {
        Retry::with_notify(schedule, operation, condition, NoNotify)
    }
}

impl<I, O, C, N> Retry<I, O, C, N>
where
    I: Iterator<Item = Duration>,
    O: Operation,
    C: Condition<O::Error>,
    N: Notify<O::Error>,
{
    /// Like [`Retry::new`], calling `notify` before every cool-off.
    pub fn with_notify<II>(schedule: II, mut operation: O, condition: C, notify: N) -> Self
    where
        II: IntoIterator<IntoIter = I, Item = Duration>,
    {
        Self {
            state: State::Running(operation.run()),
            schedule: schedule.into_iter(),
            operation,
            condition,
            notify,
            attempt: 1,
        }
    }

    /// Decides what happens after a failed run. Returns the error back when the run
    /// must not (or can no longer) be retried.
    fn on_failure(self: Pin<&mut Self>, err: O::Error) -> Result<(), O::Error> {
        let mut this = self.project();
        if !this.condition.can_retry(&err) {
            return Err(err);
        }
        let Some(delay) = this.schedule.next() else {
            return Err(err);
        };
        this.notify.notify(&err, *this.attempt, delay);
        this.state
            .set(State::Sleeping(sleep_until(Instant::now() + delay)));
        Ok(())
    }

    fn rerun(self: Pin<&mut Self>) {
        let mut this = self.project();
        *this.attempt += 1;
        let future = this.operation.run();
        this.state.set(State::Running(future));
    }
}

impl<I, O, C, N> Future for Retry<I, O, C, N>
where
    I: Iterator<Item = Duration>,
    O: Operation,
    C: Condition<O::Error>,
    N: Notify<O::Error>,
{
    type Output = Result<O::Item, O::Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        loop {
            match self.as_mut().project().state.project() {
                StateProj::Running(run) => match run.poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Ok(item)) => return Poll::Ready(Ok(item)),
                    Poll::Ready(Err(err)) => {
                        if let Err(err) = self.as_mut().on_failure(err) {
                            return Poll::Ready(Err(err));
                        }
                    }
                },
                StateProj::Sleeping(sleep) => match sleep.poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(()) => self.as_mut().rerun(),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::future;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::strategy::exponential::Exponential;

    fn quick(retries: u16) -> Exponential {
        Exponential::from_millis(1, 10).max_retries(retries)
    }

    #[tokio::test]
    async fn first_run_succeeds() {
        let result = Retry::new(quick(3), || future::ready(Ok::<_, ()>(42)), |_: &()| true).await;
        assert_eq!(result, Ok(42));
    }

    #[tokio::test]
    async fn non_retryable_error_returns_at_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);

        let result = Retry::new(
            quick(5),
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                future::ready(Err::<(), &str>("rejected"))
            },
            |_: &&str| false,
        )
        .await;

        assert_eq!(result, Err("rejected"));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stops_when_condition_turns_false() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);

        let result = Retry::new(
            quick(10),
            move || {
                let previous = counter.fetch_add(1, Ordering::SeqCst);
                future::ready(Err::<(), usize>(previous + 1))
            },
            |e: &usize| *e < 3,
        )
        .await;

        assert_eq!(result, Err(3));
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausting_the_schedule_returns_last_error() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);

        let result = Retry::new(
            quick(4),
            move || {
                let previous = counter.fetch_add(1, Ordering::SeqCst);
                future::ready(Err::<(), usize>(previous + 1))
            },
            |_: &usize| true,
        )
        .await;

        // the first run is not a retry
        assert_eq!(result, Err(5));
        assert_eq!(runs.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn notify_sees_every_cool_off() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let mut seen = Vec::new();
        let started = Instant::now();

        let result = Retry::with_notify(
            Exponential::from_millis(1000, 10_000).max_retries(2),
            move || {
                let run = counter.fetch_add(1, Ordering::SeqCst) + 1;
                future::ready(if run < 3 { Err(run) } else { Ok(run) })
            },
            |_: &usize| true,
            |_: &usize, attempt: u32, delay: Duration| seen.push((attempt, delay)),
        )
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(started.elapsed(), Duration::from_millis(3000));
        assert_eq!(
            seen,
            vec![
                (1, Duration::from_millis(1000)),
                (2, Duration::from_millis(2000))
            ]
        );
    }
}
