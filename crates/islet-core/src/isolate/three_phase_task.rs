//! Three-phase cross-isolate tasks.
//!
//! Phase 1 runs in the caller and builds the task. Phase 2 runs on the target
//! isolate's thread. Phase 3 runs back in the caller and turns the transfer
//! value produced by phase 2 into the caller's result. The caller either
//! blocks for phase 2 ([`run_sync`]) or gets a future ([`run_async`]).

use std::future::Future;
use std::marker::PhantomData;
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use tracing::error;

use super::environment::{self, Environment};
use super::holder::IsolateHolder;
use super::panic_message;
use crate::error::{Error, Result};

/// A task split into a remote execute step and a local completion step.
///
/// The value implementing this trait is the output of phase 1.
pub trait ThreePhaseTask: Send + 'static {
    /// Isolate-independent result handed from phase 2 to phase 3.
    type Transfer: Send + 'static;
    type Output;

    /// Runs on the target isolate's thread, to completion.
    fn phase2(self, env: &Environment) -> Result<Self::Transfer>;

    /// Runs in the caller once phase 2 is done.
    fn phase3(transfer: Self::Transfer) -> Result<Self::Output>;
}

fn phase2_guarded<T: ThreePhaseTask>(task: T, env: &Environment) -> Result<T::Transfer> {
    match panic::catch_unwind(AssertUnwindSafe(|| task.phase2(env))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(isolate = %env.id(), panic = %message, "Task panicked on isolate thread");
            Err(Error::TaskPanicked(message))
        }
    }
}

type Completion<R> = oneshot::Receiver<Result<R>>;

fn dispatch<T: ThreePhaseTask>(
    holder: &IsolateHolder,
    task: T,
) -> Result<Completion<T::Transfer>> {
    let (sender, receiver) = oneshot::channel();
    holder.schedule(Box::new(move |env: &Environment| {
        let _ = sender.send(phase2_guarded(task, env));
    }))?;
    Ok(receiver)
}

fn settle<R>(outcome: std::result::Result<Result<R>, oneshot::Canceled>) -> Result<R> {
    // A dropped sender means the task was discarded by a disposed isolate.
    outcome.map_err(|_| Error::TargetDisposed)?
}

/// Run `task` on `holder`'s isolate, blocking until phase 2 is done.
///
/// Runs phase 2 inline when called from the target isolate's own thread.
pub fn run_sync<T: ThreePhaseTask>(holder: &IsolateHolder, task: T) -> Result<T::Output> {
    if holder.is_current() {
        let env = environment::current().ok_or(Error::TargetDisposed)?;
        let transfer = phase2_guarded(task, &env)?;
        return T::phase3(transfer);
    }

    let completion = dispatch(holder, task)?;
    let transfer = settle(futures::executor::block_on(completion))?;
    T::phase3(transfer)
}

/// Queue `task` on `holder`'s isolate and return immediately.
///
/// Scheduling failures are reported through the returned future.
pub fn run_async<T: ThreePhaseTask>(holder: &IsolateHolder, task: T) -> PendingTask<T> {
    match dispatch(holder, task) {
        Ok(completion) => PendingTask::waiting(completion),
        Err(e) => PendingTask::rejected(e),
    }
}

enum State<R> {
    Waiting(Completion<R>),
    Rejected(Error),
    Finished,
}

/// Future resolving to a three-phase task's output.
///
/// Phase 3 runs on whichever thread polls the future to completion.
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct PendingTask<T: ThreePhaseTask> {
    state: State<T::Transfer>,
}

impl<T: ThreePhaseTask> PendingTask<T> {
    fn waiting(completion: Completion<T::Transfer>) -> Self {
        Self {
            state: State::Waiting(completion),
        }
    }

    /// A future that fails with `error` without touching any isolate.
    pub fn rejected(error: Error) -> Self {
        Self {
            state: State::Rejected(error),
        }
    }
}

impl<T: ThreePhaseTask> Unpin for PendingTask<T> {}

impl<T: ThreePhaseTask> Future for PendingTask<T> {
    type Output = Result<T::Output>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match mem::replace(&mut this.state, State::Finished) {
            State::Waiting(mut completion) => match Pin::new(&mut completion).poll(cx) {
                Poll::Pending => {
                    this.state = State::Waiting(completion);
                    Poll::Pending
                }
                Poll::Ready(outcome) => Poll::Ready(settle(outcome).and_then(T::phase3)),
            },
            State::Rejected(e) => Poll::Ready(Err(e)),
            State::Finished => panic!("PendingTask polled after completion"),
        }
    }
}

/// Adapter running a plain closure as phase 2.
pub struct ClosureTask<F, R> {
    f: F,
    _result: PhantomData<fn() -> R>,
}

impl<F, R> ClosureTask<F, R> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _result: PhantomData,
        }
    }
}

impl<F, R> ThreePhaseTask for ClosureTask<F, R>
where
    F: FnOnce(&Environment) -> R + Send + 'static,
    R: Send + 'static,
{
    type Transfer = R;
    type Output = R;

    fn phase2(self, env: &Environment) -> Result<R> {
        Ok((self.f)(env))
    }

    fn phase3(transfer: R) -> Result<R> {
        Ok(transfer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IsolateConfig;
    use crate::isolate::Isolate;
    use std::sync::mpsc;

    struct Describe {
        input: u32,
    }

    impl ThreePhaseTask for Describe {
        type Transfer = (u32, u64);
        type Output = String;

        fn phase2(self, env: &Environment) -> Result<(u32, u64)> {
            Ok((self.input * 2, env.id().as_u64()))
        }

        fn phase3((value, isolate): (u32, u64)) -> Result<String> {
            Ok(format!("{value}@{isolate}"))
        }
    }

    #[test]
    fn test_run_sync_goes_through_all_phases() {
        let isolate = Isolate::new(IsolateConfig::default()).unwrap();
        let output = run_sync(isolate.holder(), Describe { input: 21 }).unwrap();
        assert_eq!(output, format!("42@{}", isolate.id().as_u64()));
    }

    #[tokio::test]
    async fn test_run_async_matches_run_sync() {
        let isolate = Isolate::new(IsolateConfig::default()).unwrap();
        let sync = run_sync(isolate.holder(), Describe { input: 5 }).unwrap();
        let pending = run_async(isolate.holder(), Describe { input: 5 }).await.unwrap();
        assert_eq!(sync, pending);
    }

    #[test]
    fn test_run_sync_on_own_isolate_runs_inline() {
        let isolate = Isolate::new(IsolateConfig::default()).unwrap();
        let holder = isolate.holder().clone();

        let nested = isolate
            .holder()
            .execute_sync(move |_| holder.execute_sync(|env| env.id()))
            .unwrap()
            .unwrap();

        assert_eq!(nested, isolate.id());
    }

    #[tokio::test]
    async fn test_run_async_on_disposed_isolate_rejects() {
        let isolate = Isolate::new(IsolateConfig::default()).unwrap();
        isolate.dispose();

        let result = run_async(isolate.holder(), Describe { input: 1 }).await;
        assert!(matches!(result, Err(Error::TargetDisposed)));
    }

    #[tokio::test]
    async fn test_queued_task_rejects_when_isolate_disposed() {
        let isolate = Isolate::new(IsolateConfig::default()).unwrap();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        let blocker = isolate.holder().execute(move |_| {
            started_tx.send(()).unwrap();
            release_rx.recv().unwrap();
        });
        started_rx.recv().unwrap();

        let queued = run_async(isolate.holder(), Describe { input: 3 });
        isolate.dispose();
        release_tx.send(()).unwrap();

        // Already running when the isolate was disposed, so it completes.
        blocker.await.unwrap();
        assert!(matches!(queued.await, Err(Error::TargetDisposed)));
    }

    #[test]
    fn test_phase2_error_reaches_caller() {
        struct Failing;

        impl ThreePhaseTask for Failing {
            type Transfer = ();
            type Output = ();

            fn phase2(self, _env: &Environment) -> Result<()> {
                Err(Error::InvalidContext)
            }

            fn phase3(_: ()) -> Result<()> {
                unreachable!("phase 3 must not run after a failed phase 2")
            }
        }

        let isolate = Isolate::new(IsolateConfig::default()).unwrap();
        assert!(matches!(
            run_sync(isolate.holder(), Failing),
            Err(Error::InvalidContext)
        ));
    }
}
