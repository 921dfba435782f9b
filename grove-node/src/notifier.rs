//! Periodic observer notification

use std::future::Future;
use std::ops::ControlFlow;
use std::time::Duration;

use tokio::task::JoinHandle;

/// A background task that runs `tick` once per interval until it breaks or
/// is stopped. The first tick happens one interval after spawning.
pub struct Notifier {
    task: JoinHandle<()>,
}

impl Notifier {
    pub fn spawn<F, Fut>(uri: &'static str, interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ControlFlow<()>> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            tracing::debug!(uri, ?interval, "notifier started");
            loop {
                tokio::time::sleep(interval).await;
                if tick().await.is_break() {
                    break;
                }
            }
            tracing::debug!(uri, "notifier finished");
        });
        Self { task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn stop(self) {
        self.task.abort();
    }
}
