use crate::engine::RuleEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info};

/// Runs one evaluation pass per period.
///
/// A pass runs inside the loop body, so passes never overlap. Ticks that come
/// due while a pass is still running are dropped rather than queued.
pub struct Scheduler {
    engine: Arc<RuleEngine>,
    period: Duration,
}

impl Scheduler {
    pub fn new(engine: Arc<RuleEngine>, period: Duration) -> Self {
        Self { engine, period }
    }

    /// Runs until `shutdown` flips to true. Shutdown is only observed between
    /// passes, so an in-flight rewrite always completes.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Scheduler started, checking rules every {:?}", self.period);
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let start = Instant::now();
                    match self.engine.evaluate_pass().await {
                        Ok(report) => info!(
                            visited = report.visited,
                            closed = report.closed,
                            skipped = report.skipped,
                            notified = report.notified,
                            "Rule pass finished in {:?}",
                            start.elapsed()
                        ),
                        Err(e) => error!("Rule pass failed, will retry next tick: {}", e),
                    }
                    // Ticks that came due during an overrunning pass are dropped.
                    if start.elapsed() >= self.period {
                        ticker.reset();
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AssetSymbol;
    use crate::notify::{Notification, Notifier};
    use crate::price::PriceSource;
    use crate::store::RuleStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct SlowPrices {
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl PriceSource for SlowPrices {
        async fn get_price(&self, _asset: &AssetSymbol, _quote: &str) -> Result<f64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(1.0)
        }
    }

    struct Quiet;

    #[async_trait]
    impl Notifier for Quiet {
        async fn notify(&self, _notification: &Notification) -> Result<()> {
            Ok(())
        }
    }

    fn setup(delay: Duration) -> (TempDir, Arc<SlowPrices>, Arc<RuleEngine>) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RuleStore::new(dir.path().join("alarms.txt")));
        std::fs::write(store.path(), "Active|a|d|BTC|100.000000|Above\n").unwrap();
        let prices = Arc::new(SlowPrices {
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay,
        });
        let engine = Arc::new(RuleEngine::new(store, prices.clone(), Arc::new(Quiet), "USD"));
        (dir, prices, engine)
    }

    #[tokio::test(start_paused = true)]
    async fn slow_passes_never_overlap_and_drop_missed_ticks() {
        let (_dir, prices, engine) = setup(Duration::from_secs(25));
        let scheduler = Scheduler::new(engine, Duration::from_secs(10));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { scheduler.run(rx).await });
        tokio::time::sleep(Duration::from_secs(100)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(prices.max_in_flight.load(Ordering::SeqCst), 1);
        // Passes start at 10s, 45s and 80s; the one running at 100s finishes
        // before shutdown is seen.
        assert_eq!(prices.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_in_flight_pass() {
        let (_dir, prices, engine) = setup(Duration::from_secs(5));
        let scheduler = Scheduler::new(engine, Duration::from_secs(10));
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(async move { scheduler.run(rx).await });
        // Land in the middle of the first pass.
        tokio::time::sleep(Duration::from_secs(12)).await;
        assert_eq!(prices.in_flight.load(Ordering::SeqCst), 1);
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(prices.calls.load(Ordering::SeqCst), 1);
        assert_eq!(prices.in_flight.load(Ordering::SeqCst), 0);
    }
}
