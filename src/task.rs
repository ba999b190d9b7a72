use tokio::task::JoinHandle;

/// Aborts a spawned task when dropped
pub(crate) struct TaskGuard(JoinHandle<()>);

impl TaskGuard {
    pub(crate) fn new(handle: JoinHandle<()>) -> Self {
        TaskGuard(handle)
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}
