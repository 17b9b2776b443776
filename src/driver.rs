use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Returned from a suspension point once the loop has been asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// How a driver loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverExit {
    Completed,
    Cancelled,
    Failed,
}

/// Suspension points of a driver loop.
///
/// Waiting is a bounded `recv_timeout` on the control channel, so a cancel
/// signal (or the handle being dropped) wakes the loop immediately.
#[derive(Debug)]
pub struct Pacer {
    control: Receiver<()>,
}

impl Pacer {
    /// Sleep for `duration` unless cancelled first.
    pub fn wait(&self, duration: Duration) -> Result<(), Cancelled> {
        match self.control.recv_timeout(duration) {
            Err(RecvTimeoutError::Timeout) => Ok(()),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Err(Cancelled),
        }
    }

    /// Non-blocking cancellation check.
    pub fn checkpoint(&self) -> Result<(), Cancelled> {
        match self.control.try_recv() {
            Err(TryRecvError::Empty) => Ok(()),
            Ok(()) | Err(TryRecvError::Disconnected) => Err(Cancelled),
        }
    }

    /// Poll `ready` every `poll` until it holds or `limit` has passed.
    /// Returns the final readiness.
    pub fn wait_until(
        &self,
        mut ready: impl FnMut() -> bool,
        poll: Duration,
        limit: Duration,
    ) -> Result<bool, Cancelled> {
        let mut waited = Duration::ZERO;
        while !ready() && waited < limit {
            self.wait(poll)?;
            waited += poll;
        }
        Ok(ready())
    }
}

/// A driver loop running on its own thread.
#[derive(Debug)]
pub struct DriverHandle {
    cancel: Sender<()>,
    thread: JoinHandle<DriverExit>,
}

impl DriverHandle {
    /// Run `body` on a named thread. If `body` panics, `on_panic` runs on
    /// the same thread and the exit is reported as [`DriverExit::Failed`].
    pub fn spawn<F, P>(name: &str, body: F, on_panic: P) -> std::io::Result<Self>
    where
        F: FnOnce(&Pacer) -> DriverExit + Send + 'static,
        P: FnOnce() + Send + 'static,
    {
        let (cancel, control) = mpsc::channel();
        let thread = thread::Builder::new().name(name.to_string()).spawn(move || {
            let pacer = Pacer { control };
            match panic::catch_unwind(AssertUnwindSafe(|| body(&pacer))) {
                Ok(exit) => exit,
                Err(_) => {
                    tracing::error!("session driver panicked; ending session");
                    on_panic();
                    DriverExit::Failed
                }
            }
        })?;
        Ok(Self { cancel, thread })
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Signal cancellation and wait for the loop to stop.
    pub fn cancel_and_join(self) -> DriverExit {
        // A loop that already returned has dropped its receiver.
        let _ = self.cancel.send(());
        self.join()
    }

    /// Wait for the loop to finish on its own.
    pub fn join(self) -> DriverExit {
        self.thread.join().unwrap_or(DriverExit::Failed)
    }
}
