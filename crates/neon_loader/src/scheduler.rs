//! The scheduler task driving rule execution.

use core::sync::atomic::{AtomicUsize, Ordering};
use core::time::Duration;
use std::sync::Arc;

use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use neon_core::mediator::{FetchMediator, StoreMediator};

use crate::LoaderRule;
use crate::config::LoaderConfig;

/// One timed run of every rule, executed by a bounded worker pool.
///
/// Runs are strictly serialized: the next tick is armed only after the
/// previous run has drained.
pub(crate) struct Scheduler {
    pub(crate) config: LoaderConfig,
    pub(crate) rules: Arc<Vec<LoaderRule>>,
    pub(crate) store: Arc<dyn StoreMediator>,
    pub(crate) fetch: Arc<dyn FetchMediator>,
    pub(crate) stop: CancellationToken,
}

impl Scheduler {
    /// The scheduler state machine: wait, run, adjust the period, repeat.
    pub(crate) async fn run(self) {
        let mut failsafe = false;

        if self.config.exec_startup > 0 {
            if !self.wait(Duration::from_secs(self.config.exec_startup)).await {
                return;
            }
            let any_failed = self.execute().await;
            failsafe = self.next_mode(failsafe, any_failed);
        }

        loop {
            let period = if failsafe {
                self.config.exec_failsafe_interval
            } else {
                self.config.exec_interval
            };
            if period == 0 {
                tracing::debug!("loader periodic execution disabled, scheduler exiting");
                return;
            }
            if !self.wait(Duration::from_secs(period)).await {
                return;
            }
            let any_failed = self.execute().await;
            failsafe = self.next_mode(failsafe, any_failed);
        }
    }

    /// Sleeps for `period` unless stopped first. Returns false on stop.
    async fn wait(&self, period: Duration) -> bool {
        tokio::select! {
            () = tokio::time::sleep(period) => true,
            () = self.stop.cancelled() => false,
        }
    }

    /// Applies the failsafe transition rules after a run.
    fn next_mode(&self, failsafe: bool, any_failed: bool) -> bool {
        if any_failed {
            if !failsafe && self.config.exec_failsafe_interval > 0 {
                tracing::warn!(
                    interval = self.config.exec_failsafe_interval,
                    "loader entering failsafe mode"
                );
                return true;
            }
            failsafe
        } else {
            if failsafe {
                tracing::info!("loader leaving failsafe mode");
            }
            false
        }
    }

    /// Executes one run: every rule is enqueued as a job, the worker pool
    /// drains the queue, failures are counted but never abort siblings.
    /// Returns true when any rule failed.
    async fn execute(&self) -> bool {
        let ctx = self.stop.child_token();
        let workers = self.config.exec_workers.max(1);
        let (tx, rx) = mpsc::channel::<usize>(workers);
        let rx = Arc::new(Mutex::new(rx));
        let failures = Arc::new(AtomicUsize::new(0));

        let mut pool = Vec::with_capacity(workers);
        for _ in 0..workers {
            let rx = Arc::clone(&rx);
            let rules = Arc::clone(&self.rules);
            let store = Arc::clone(&self.store);
            let fetch = Arc::clone(&self.fetch);
            let failures = Arc::clone(&failures);
            let ctx = ctx.clone();
            pool.push(tokio::spawn(async move {
                loop {
                    let job = { rx.lock().await.recv().await };
                    let Some(index) = job else { break };
                    let rule = &rules[index];
                    let result = tokio::select! {
                        result = rule.parser.parse(&ctx, store.as_ref(), fetch.as_ref()) => result,
                        () = ctx.cancelled() => break,
                    };
                    match result {
                        Ok(()) => tracing::debug!(rule = %rule.name, "loader rule succeeded"),
                        Err(err) => {
                            failures.fetch_add(1, Ordering::Relaxed);
                            tracing::error!(rule = %rule.name, error = %err, "loader rule failed");
                        }
                    }
                }
            }));
        }

        let mut dispatched = 0usize;
        for index in 0..self.rules.len() {
            if self.config.exec_max_ops > 0
                && dispatched > 0
                && dispatched % self.config.exec_max_ops == 0
            {
                tracing::debug!(
                    dispatched,
                    delay = self.config.exec_max_delay,
                    "loader max ops reached, pausing dispatch"
                );
                if !self.wait(Duration::from_secs(self.config.exec_max_delay)).await {
                    break;
                }
            }
            if tx.send(index).await.is_err() {
                break;
            }
            dispatched += 1;
        }
        drop(tx);

        for worker in pool {
            let _ = worker.await;
        }

        let failed = failures.load(Ordering::Relaxed);
        tracing::debug!(dispatched, failed, "loader run drained");
        failed > 0
    }
}
