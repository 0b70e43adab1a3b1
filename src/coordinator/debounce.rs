use std::future::Future;
use std::sync::atomic::Ordering;
use std::time::Duration;

use log::debug;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::metrics::METRICS;

/// Collapses bursts of refresh requests into one execution.
///
/// Behavior:
/// - The first request opens a window of `window`
/// - Requests arriving inside the window are absorbed
/// - When the window closes the action runs exactly once
/// - Requests arriving while the action runs open a new window
///
/// Only the worker task ever runs the action, so executions
/// never overlap.
///
/// The worker stops once every `Debouncer` clone is dropped.
#[derive(Clone)]
pub struct Debouncer {
    tx: mpsc::UnboundedSender<()>,
}

impl Debouncer {
    /// Spawns the worker task. Must be called within a tokio runtime.
    pub fn spawn<F, Fut>(window: Duration, action: F) -> (Self, JoinHandle<()>)
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<()>();

        let handle = tokio::spawn(async move {
            while rx.recv().await.is_some() {
                sleep(window).await;

                let mut absorbed = 0usize;
                while rx.try_recv().is_ok() {
                    absorbed += 1;
                }
                if absorbed > 0 {
                    debug!("Debounced {} extra refresh request(s)", absorbed);
                    METRICS.requests_coalesced.fetch_add(absorbed, Ordering::Relaxed);
                }

                action().await;
            }
        });

        (Self { tx }, handle)
    }

    /// Requests an execution soon. Never blocks.
    pub fn request(&self) {
        METRICS.refresh_requests.fetch_add(1, Ordering::Relaxed);
        // Send only fails once the worker is gone, i.e. during shutdown.
        let _ = self.tx.send(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn counting_debouncer(window: Duration) -> (Debouncer, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let (debouncer, _) = Debouncer::spawn(window, {
            let runs = runs.clone();
            move || {
                let runs = runs.clone();
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                }
            }
        });
        (debouncer, runs)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_runs_once() {
        let (debouncer, runs) = counting_debouncer(Duration::from_secs(1));

        for _ in 0..10 {
            debouncer.request();
        }
        sleep(Duration::from_secs(5)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_requests_run_separately() {
        let (debouncer, runs) = counting_debouncer(Duration::from_secs(1));

        debouncer.request();
        sleep(Duration::from_secs(2)).await;
        debouncer.request();
        sleep(Duration::from_secs(2)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_runs_without_requests() {
        let (_debouncer, runs) = counting_debouncer(Duration::from_secs(1));
        sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }
}
