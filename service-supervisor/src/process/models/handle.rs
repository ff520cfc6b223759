use tokio::sync::{oneshot, watch};

/// Resolves the moment the worker process is gone, and never before.
///
/// Cloning is cheap; every clone observes the same exit. An exit that happened
/// before [`EarlyExitSignal::wait`] was called is still observed.
#[derive(Debug, Clone)]
pub struct EarlyExitSignal {
    rx: watch::Receiver<Option<String>>,
}

/// Sending half of an [`EarlyExitSignal`]. Owned by whoever watches the process.
#[derive(Debug)]
pub struct ExitNotifier {
    tx: watch::Sender<Option<String>>,
}

impl EarlyExitSignal {
    pub fn channel() -> (ExitNotifier, EarlyExitSignal) {
        let (tx, rx) = watch::channel(None);
        (ExitNotifier { tx }, EarlyExitSignal { rx })
    }

    /// Waits for the exit and returns its description.
    ///
    /// If the notifier is dropped without reporting an exit this never resolves.
    pub async fn wait(&self) -> String {
        let mut rx = self.rx.clone();
        loop {
            if let Some(reason) = rx.borrow_and_update().clone() {
                return reason;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    pub fn has_exited(&self) -> bool {
        self.rx.borrow().is_some()
    }
}

impl ExitNotifier {
    pub fn notify(self, reason: impl Into<String>) {
        let _ = self.tx.send(Some(reason.into()));
    }
}

/// The supervisor's exclusive handle on a live worker process.
///
/// Dropping the handle kills the process.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Option<u32>,
    kill: Option<oneshot::Sender<()>>,
    exit: EarlyExitSignal,
}

impl ProcessHandle {
    pub fn new(pid: Option<u32>, kill: oneshot::Sender<()>, exit: EarlyExitSignal) -> Self {
        Self {
            pid,
            kill: Some(kill),
            exit,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn exit_signal(&self) -> EarlyExitSignal {
        self.exit.clone()
    }

    /// Requests termination. Returns `false` if a kill was already requested.
    ///
    /// Does not wait for the process to be gone; use the exit signal for that.
    pub fn kill(&mut self) -> bool {
        match self.kill.take() {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_exit_before_wait_is_not_lost() {
        let (notifier, signal) = EarlyExitSignal::channel();
        notifier.notify("exit status: 1");
        assert!(signal.has_exited());
        assert_eq!(signal.wait().await, "exit status: 1");
        // every clone sees it
        assert_eq!(signal.clone().wait().await, "exit status: 1");
    }

    #[tokio::test]
    async fn test_dropped_notifier_never_resolves() {
        let (notifier, signal) = EarlyExitSignal::channel();
        drop(notifier);
        let waited = tokio::time::timeout(Duration::from_millis(50), signal.wait()).await;
        assert!(waited.is_err());
        assert!(!signal.has_exited());
    }

    #[tokio::test]
    async fn test_kill_is_requested_once_and_on_drop() {
        let (_notifier, signal) = EarlyExitSignal::channel();
        let (tx, mut rx) = oneshot::channel();
        let mut handle = ProcessHandle::new(Some(42), tx, signal.clone());
        assert_eq!(handle.pid(), Some(42));
        assert!(handle.kill());
        assert!(!handle.kill());
        assert!(rx.try_recv().is_ok());

        let (tx, rx) = oneshot::channel();
        drop(ProcessHandle::new(None, tx, signal));
        assert!(rx.await.is_ok());
    }
}
