//! Readiness polling for freshly spawned workers.

use crate::process::EarlyExitSignal;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(120_000);
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(250);

/// Polls a worker's health endpoint until it answers 200.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    client: reqwest::Client,
    timeout: Duration,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
            interval,
        }
    }

    /// Races the poll loop against the process exit.
    ///
    /// Returns `true` on the first 200. Returns `false` when the timeout is
    /// exceeded or when the process exits first; an exit wins even if a 200
    /// is about to arrive.
    pub async fn wait_until_ready(&self, health_url: &str, early_exit: &EarlyExitSignal) -> bool {
        let started = Instant::now();
        tokio::select! {
            biased;
            reason = early_exit.wait() => {
                warn!("Health: process behind {} exited before becoming ready ({})", health_url, reason);
                false
            }
            ready = self.poll_until_ready(health_url, started) => ready,
        }
    }

    async fn poll_until_ready(&self, health_url: &str, started: Instant) -> bool {
        loop {
            let elapsed = started.elapsed();
            if elapsed >= self.timeout {
                warn!(
                    "Health: {} did not return a healthy response within {} seconds",
                    health_url,
                    self.timeout.as_secs_f64()
                );
                return false;
            }

            // Never let a hanging request outlive the overall ceiling.
            let request = self
                .client
                .get(health_url)
                .timeout(self.timeout - elapsed)
                .send();
            match request.await {
                Ok(response) if response.status() == reqwest::StatusCode::OK => {
                    info!(
                        "Health: {} ready after {:.2} seconds",
                        health_url,
                        started.elapsed().as_secs_f64()
                    );
                    return true;
                }
                Ok(response) => debug!("Health: {} answered {}", health_url, response.status()),
                // Connection refused while the worker boots.
                Err(e) => debug!("Health: {} not reachable yet: {}", health_url, e),
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serves `/health`, answering 503 for the first `failures` hits and 200 afterwards.
    async fn flaky_server(failures: usize) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new().route(
            "/health",
            get(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < failures {
                        StatusCode::SERVICE_UNAVAILABLE
                    } else {
                        StatusCode::OK
                    }
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{}/health", addr), hits)
    }

    async fn closed_port_url() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{}/health", addr)
    }

    fn fast_monitor(timeout_ms: u64) -> HealthMonitor {
        HealthMonitor::new(Duration::from_millis(timeout_ms), Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_ready_after_non_200_answers() {
        let _ = env_logger::builder().is_test(true).try_init();
        let (url, hits) = flaky_server(3).await;
        let (_notifier, exit) = EarlyExitSignal::channel();

        assert!(fast_monitor(5_000).wait_until_ready(&url, &exit).await);
        assert_eq!(hits.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_gives_up_after_timeout() {
        let (url, _) = flaky_server(usize::MAX).await;
        let (_notifier, exit) = EarlyExitSignal::channel();

        let started = Instant::now();
        assert!(!fast_monitor(300).wait_until_ready(&url, &exit).await);
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_connection_refused_is_retried_until_timeout() {
        let url = closed_port_url().await;
        let (_notifier, exit) = EarlyExitSignal::channel();
        assert!(!fast_monitor(200).wait_until_ready(&url, &exit).await);
    }

    #[tokio::test]
    async fn test_early_exit_wins_over_pending_readiness() {
        let url = closed_port_url().await;
        let (notifier, exit) = EarlyExitSignal::channel();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            notifier.notify("exit status: 1");
        });

        let started = Instant::now();
        assert!(!fast_monitor(10_000).wait_until_ready(&url, &exit).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_exit_already_observed_beats_a_healthy_endpoint() {
        let (url, _) = flaky_server(0).await;
        let (notifier, exit) = EarlyExitSignal::channel();
        notifier.notify("exit status: 0");
        assert!(!fast_monitor(5_000).wait_until_ready(&url, &exit).await);
    }
}
