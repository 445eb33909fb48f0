//! Driving storage futures.
//!
//! A storage future is polled once, inline, with a no-op waker. If it is
//! already complete its continuation runs right there, inside the calling
//! turn. Otherwise the future moves to a [`Spawner`] and the continuation
//! runs whenever it completes. Writes of one store share an ordered queue
//! so they reach the backend in commit order.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::channel::mpsc;
use futures::future::BoxFuture;
use futures::task::noop_waker_ref;
use futures::{FutureExt, StreamExt};

use crate::store::lock;

type SpawnFn = dyn Fn(BoxFuture<'static, ()>) + Send + Sync;

/// Where pending storage work runs.
///
/// The default uses the tokio runtime current at spawn time and, when there
/// is none, a short-lived thread driving the future with
/// `futures::executor::block_on`.
#[derive(Clone)]
pub struct Spawner {
    spawn: Arc<SpawnFn>,
}

impl Spawner {
    /// Use a custom spawn function.
    pub fn new<F>(spawn: F) -> Self
    where
        F: Fn(BoxFuture<'static, ()>) + Send + Sync + 'static,
    {
        Self {
            spawn: Arc::new(spawn),
        }
    }

    /// Spawn onto a specific tokio runtime.
    pub fn tokio(handle: tokio::runtime::Handle) -> Self {
        Self::new(move |future| {
            handle.spawn(future);
        })
    }

    /// Run a future to completion in the background.
    pub fn spawn(&self, future: BoxFuture<'static, ()>) {
        (self.spawn)(future)
    }
}

impl Default for Spawner {
    fn default() -> Self {
        Self::new(|future| match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(future);
            }
            Err(_) => {
                let spawned = std::thread::Builder::new()
                    .name("stowage-io".to_string())
                    .spawn(move || futures::executor::block_on(future));
                if let Err(err) = spawned {
                    tracing::warn!(error = %err, "failed to start storage worker thread");
                }
            }
        })
    }
}

impl fmt::Debug for Spawner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spawner").finish_non_exhaustive()
    }
}

/// Poll once without a real waker. Hands the future back if it is pending.
pub(crate) fn poll_now<F>(mut future: F) -> Result<F::Output, F>
where
    F: Future + Unpin,
{
    let mut cx = Context::from_waker(noop_waker_ref());
    match future.poll_unpin(&mut cx) {
        Poll::Ready(output) => Ok(output),
        Poll::Pending => Err(future),
    }
}

type Job = BoxFuture<'static, ()>;

/// Runs storage operations one after another, in submission order.
///
/// While nothing is queued an operation is polled inline and, if it
/// finishes there, never touches the spawner. Once one is pending, it and
/// everything submitted after it go through a channel drained by a single
/// spawned driver. The driver exits when the queue empties.
pub(crate) struct OrderedQueue {
    state: Arc<Mutex<QueueState>>,
}

struct QueueState {
    queued: usize,
    sender: Option<mpsc::UnboundedSender<Job>>,
}

impl OrderedQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                queued: 0,
                sender: None,
            })),
        }
    }

    /// Queue `future`, running `on_done` with its output.
    ///
    /// Returns `true` if `on_done` ran before returning.
    pub(crate) fn submit<F, D>(&self, future: F, spawner: &Spawner, on_done: D) -> bool
    where
        F: Future + Unpin + Send + 'static,
        F::Output: Send,
        D: FnOnce(F::Output) + Send + 'static,
    {
        let mut state = lock::lock(&self.state);

        if let Some(sender) = &state.sender {
            let job = async move { on_done(future.await) }.boxed();
            // The driver holds the receiver until `queued` drops to zero,
            // and clears `sender` in the same critical section.
            let _ = sender.unbounded_send(job);
            state.queued += 1;
            return false;
        }

        let pending = match poll_now(future) {
            Ok(output) => {
                drop(state);
                on_done(output);
                return true;
            }
            Err(pending) => pending,
        };

        let (sender, receiver) = mpsc::unbounded();
        let job = async move { on_done(pending.await) }.boxed();
        // The receiver is still alive, so the send cannot fail.
        let _ = sender.unbounded_send(job);
        state.queued = 1;
        state.sender = Some(sender);
        drop(state);

        spawner.spawn(Self::drain(Arc::clone(&self.state), receiver).boxed());
        false
    }

    async fn drain(state: Arc<Mutex<QueueState>>, mut receiver: mpsc::UnboundedReceiver<Job>) {
        while let Some(job) = receiver.next().await {
            job.await;

            let mut queue = lock::lock(&state);
            queue.queued -= 1;
            if queue.queued == 0 {
                queue.sender = None;
                return;
            }
        }
    }
}

impl fmt::Debug for OrderedQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderedQueue")
            .field("queued", &lock::lock(&self.state).queued)
            .finish()
    }
}
