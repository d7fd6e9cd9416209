//! Task runner
//!
//! Steps every oracle task once per cycle. A failing task backs off and, after
//! too many consecutive failures, is paused by its circuit breaker; the other
//! tasks keep running either way.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::retry::{CircuitBreakerConfig, RetryConfig};
use crate::server::{SharedMetrics, SharedStats};
use crate::tasks::{OracleTask, StepReport};

struct TaskSlot {
    task: Box<dyn OracleTask>,
    consecutive_failures: u32,
    /// Skipped until this instant (backoff or open circuit)
    not_before: Option<Instant>,
}

pub struct TaskRunner {
    slots: Vec<TaskSlot>,
    poll_interval: Duration,
    retry_config: RetryConfig,
    circuit_breaker: CircuitBreakerConfig,
    stats: SharedStats,
    metrics: SharedMetrics,
    cycle_count: u64,
}

impl TaskRunner {
    pub fn new(
        tasks: Vec<Box<dyn OracleTask>>,
        poll_interval: Duration,
        stats: SharedStats,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            slots: tasks
                .into_iter()
                .map(|task| TaskSlot {
                    task,
                    consecutive_failures: 0,
                    not_before: None,
                })
                .collect(),
            poll_interval,
            retry_config: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            stats,
            metrics,
            cycle_count: 0,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig, circuit_breaker: CircuitBreakerConfig) -> Self {
        self.retry_config = retry;
        self.circuit_breaker = circuit_breaker;
        self
    }

    /// Run cycles until a shutdown message arrives
    pub async fn run(&mut self, mut shutdown: mpsc::Receiver<()>) -> eyre::Result<()> {
        info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            tasks = self.slots.len(),
            "Oracle task runner starting poll loop"
        );

        loop {
            tokio::select! {
                _ = self.run_cycle() => {}
                _ = shutdown.recv() => {
                    info!("Shutdown signal received, stopping tasks");
                    return Ok(());
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                _ = shutdown.recv() => {
                    info!("Shutdown signal received, stopping tasks");
                    return Ok(());
                }
            }
        }
    }

    /// Step every task that is not backing off
    pub async fn run_cycle(&mut self) {
        self.cycle_count += 1;

        // Log every 12 cycles to show the oracle is alive
        if self.cycle_count % 12 == 1 {
            let failing: Vec<&str> = self
                .slots
                .iter()
                .filter(|s| s.consecutive_failures > 0)
                .map(|s| s.task.name())
                .collect();
            info!(cycle = self.cycle_count, ?failing, "Oracle heartbeat");
        }

        for slot in &mut self.slots {
            let now = Instant::now();
            if slot.not_before.is_some_and(|t| now < t) {
                continue;
            }
            let name = slot.task.name();

            match slot.task.step().await {
                Ok(report) => {
                    if slot.consecutive_failures > 0 {
                        info!(task = name, "Task recovered");
                    }
                    slot.consecutive_failures = 0;
                    slot.not_before = None;
                    if !report.is_idle() {
                        debug!(task = name, ?report, "Task step complete");
                    }
                    record_report(&self.stats, &self.metrics, name, &report).await;
                }
                Err(e) => {
                    slot.consecutive_failures += 1;
                    self.metrics
                        .step_failures_total
                        .with_label_values(&[name])
                        .inc();

                    if slot.consecutive_failures >= self.circuit_breaker.threshold {
                        warn!(
                            task = name,
                            failures = slot.consecutive_failures,
                            pause_secs = self.circuit_breaker.pause_duration.as_secs(),
                            error = %e,
                            "Circuit breaker tripped, pausing task"
                        );
                        self.metrics.circuit_breaker_trips_total.inc();
                        slot.not_before = Some(now + self.circuit_breaker.pause_duration);
                        slot.consecutive_failures = 0;
                    } else {
                        let backoff = self
                            .retry_config
                            .backoff_for_attempt(slot.consecutive_failures - 1);
                        error!(
                            task = name,
                            error = %e,
                            kind = ?e.kind(),
                            consecutive_failures = slot.consecutive_failures,
                            next_backoff_secs = backoff.as_secs(),
                            "Task step failed, will retry with backoff"
                        );
                        slot.not_before = Some(now + backoff);
                    }
                }
            }

            self.metrics
                .consecutive_failures
                .with_label_values(&[name])
                .set(slot.consecutive_failures as i64);
            if let Some(block) = slot.task.checkpoint() {
                record_checkpoint(&self.stats, &self.metrics, name, block).await;
            }
        }

        self.stats.write().await.cycles = self.cycle_count;
    }
}

async fn record_report(stats: &SharedStats, metrics: &SharedMetrics, task: &str, report: &StepReport) {
    for (result, count) in [
        ("submitted", report.submitted),
        ("already_applied", report.already_applied),
        ("rejected", report.rejected),
        ("deferred", report.deferred),
    ] {
        if count > 0 {
            metrics
                .submissions_total
                .with_label_values(&[task, result])
                .inc_by(count as u64);
        }
    }

    let mut stats = stats.write().await;
    let submitted = report.submitted as u64;
    match task {
        "deposit_scan" => stats.deposits_submitted += submitted,
        "signature_scan" => stats.signatures_submitted += submitted,
        "clear_scan" => stats.receipts_cleared += submitted,
        _ => {}
    }
    stats.already_applied += report.already_applied as u64;
    stats.rejected += report.rejected as u64;
}

async fn record_checkpoint(stats: &SharedStats, metrics: &SharedMetrics, task: &str, block: u64) {
    let mut stats = stats.write().await;
    match task {
        "deposit_scan" => {
            stats.deposit_checkpoint = block;
            metrics.deposit_checkpoint.set(block as i64);
        }
        "clear_scan" => {
            stats.clear_checkpoint = block;
            metrics.clear_checkpoint.set(block as i64);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OracleError;
    use crate::server::{Metrics, OracleStats};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::sync::RwLock;
    use transfer_gateway::GatewayError;

    struct Flaky {
        calls: Arc<AtomicU32>,
        fail: bool,
    }

    #[async_trait]
    impl OracleTask for Flaky {
        fn name(&self) -> &'static str {
            if self.fail {
                "flaky"
            } else {
                "deposit_scan"
            }
        }

        async fn step(&mut self) -> Result<StepReport, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(GatewayError::ChainUnavailable {
                    reason: "down".into(),
                }
                .into())
            } else {
                Ok(StepReport {
                    submitted: 1,
                    ..Default::default()
                })
            }
        }

        fn checkpoint(&self) -> Option<u64> {
            Some(7)
        }
    }

    fn runner(tasks: Vec<Box<dyn OracleTask>>) -> (TaskRunner, SharedStats, SharedMetrics) {
        let stats: SharedStats = Arc::new(RwLock::new(OracleStats::default()));
        let metrics: SharedMetrics = Arc::new(Metrics::new().unwrap());
        let runner = TaskRunner::new(tasks, Duration::from_millis(10), stats.clone(), metrics.clone())
            .with_retry(
                RetryConfig {
                    initial_backoff: Duration::from_secs(60),
                    ..Default::default()
                },
                CircuitBreakerConfig {
                    threshold: 2,
                    pause_duration: Duration::from_secs(300),
                },
            );
        (runner, stats, metrics)
    }

    #[tokio::test]
    async fn test_failing_task_backs_off_without_blocking_others() {
        let good_calls = Arc::new(AtomicU32::new(0));
        let bad_calls = Arc::new(AtomicU32::new(0));
        let (mut runner, stats, metrics) = runner(vec![
            Box::new(Flaky {
                calls: bad_calls.clone(),
                fail: true,
            }),
            Box::new(Flaky {
                calls: good_calls.clone(),
                fail: false,
            }),
        ]);

        runner.run_cycle().await;
        runner.run_cycle().await;
        runner.run_cycle().await;

        // the failing task is backing off after its first failure
        assert_eq!(bad_calls.load(Ordering::SeqCst), 1);
        assert_eq!(good_calls.load(Ordering::SeqCst), 3);

        let stats = stats.read().await;
        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.deposits_submitted, 3);
        assert_eq!(stats.deposit_checkpoint, 7);
        assert_eq!(
            metrics
                .step_failures_total
                .with_label_values(&["flaky"])
                .get(),
            1
        );
    }

    #[tokio::test]
    async fn test_circuit_breaker_trips() {
        let calls = Arc::new(AtomicU32::new(0));
        let (mut runner, _, metrics) = runner(vec![Box::new(Flaky {
            calls: calls.clone(),
            fail: true,
        })]);
        runner.retry_config.initial_backoff = Duration::ZERO;

        runner.run_cycle().await;
        runner.run_cycle().await;
        assert_eq!(metrics.circuit_breaker_trips_total.get(), 1);

        // paused now
        runner.run_cycle().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shutdown_stops_run() {
        let (mut runner, _, _) = runner(Vec::new());
        let (tx, rx) = mpsc::channel(1);
        tx.send(()).await.unwrap();
        runner.run(rx).await.unwrap();
    }
}
