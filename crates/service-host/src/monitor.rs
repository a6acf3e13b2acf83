//! Periodic connection supervision
//!
//! The monitor wakes on a fixed interval and asks every target to prove its
//! connection. A failing probe has already told its listener to reconnect, so
//! the monitor only logs.

use async_trait::async_trait;
use courier_gateway::{GatewayError, GatewayListener};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::host::ServiceHost;

/// Shortest interval the timer accepts; zero is raised to this
pub const MIN_MONITOR_INTERVAL: Duration = Duration::from_millis(1);

/// Something whose broker connection can be checked
#[async_trait]
pub trait ConnectionProbe: Send + Sync {
    fn name(&self) -> String;

    async fn assert_connected(&self) -> Result<(), GatewayError>;
}

#[async_trait]
impl ConnectionProbe for GatewayListener {
    fn name(&self) -> String {
        self.destination().uri().to_string()
    }

    async fn assert_connected(&self) -> Result<(), GatewayError> {
        GatewayListener::assert_connected(self).await
    }
}

#[async_trait]
impl ConnectionProbe for ServiceHost {
    fn name(&self) -> String {
        self.listener().destination().uri().to_string()
    }

    async fn assert_connected(&self) -> Result<(), GatewayError> {
        ServiceHost::assert_connected(self).await
    }
}

/// Monitor timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub interval: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
        }
    }
}

impl MonitorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_MONITOR_INTERVAL);
        self
    }
}

struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Runs `assert_connected` on every target once per interval
///
/// The first round happens one interval after [`start`]. Dropping the monitor
/// aborts the task; [`dispose`] stops it and waits for the current round.
///
/// [`start`]: ServiceHostMonitor::start
/// [`dispose`]: ServiceHostMonitor::dispose
pub struct ServiceHostMonitor {
    config: MonitorConfig,
    rounds: Arc<AtomicU64>,
    running: Mutex<Option<Running>>,
}

impl ServiceHostMonitor {
    pub fn start(mut config: MonitorConfig, targets: Vec<Arc<dyn ConnectionProbe>>) -> Self {
        // The field is public and may still hold zero
        config.interval = config.interval.max(MIN_MONITOR_INTERVAL);
        let rounds = Arc::new(AtomicU64::new(0));
        let (shutdown, rx) = watch::channel(false);
        let task = tokio::spawn(supervise(config.interval, targets, Arc::clone(&rounds), rx));
        info!("Connection monitor started, interval {:?}", config.interval);

        Self {
            config,
            rounds,
            running: Mutex::new(Some(Running { shutdown, task })),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Completed probe rounds
    pub fn rounds(&self) -> u64 {
        self.rounds.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Stop the timer and wait for the loop to exit
    pub async fn dispose(&self) {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };
        let _ = running.shutdown.send(true);
        if let Err(e) = running.task.await {
            warn!("Connection monitor ended abnormally: {}", e);
        }
        info!("Connection monitor stopped after {} rounds", self.rounds());
    }
}

impl Drop for ServiceHostMonitor {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.task.abort();
        }
    }
}

async fn supervise(
    interval: Duration,
    targets: Vec<Arc<dyn ConnectionProbe>>,
    rounds: Arc<AtomicU64>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                for target in &targets {
                    match target.assert_connected().await {
                        Ok(()) => debug!("{} is connected", target.name()),
                        Err(e) => warn!("Connection check for {} failed: {}", target.name(), e),
                    }
                }
                rounds.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct CountingProbe {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl ConnectionProbe for CountingProbe {
        fn name(&self) -> String {
            "probe".to_string()
        }

        async fn assert_connected(&self) -> Result<(), GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(GatewayError::Closed);
            }
            Ok(())
        }
    }

    fn probe(fail: bool) -> Arc<CountingProbe> {
        Arc::new(CountingProbe {
            calls: AtomicU32::new(0),
            fail,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_probe_after_one_interval() {
        let target = probe(false);
        let monitor = ServiceHostMonitor::start(
            MonitorConfig::new().with_interval(Duration::from_secs(10)),
            vec![target.clone() as Arc<dyn ConnectionProbe>],
        );

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 3);
        assert_eq!(monitor.rounds(), 3);

        monitor.dispose().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_probe_keeps_monitor_running() {
        let failing = probe(true);
        let healthy = probe(false);
        let monitor = ServiceHostMonitor::start(
            MonitorConfig::new().with_interval(Duration::from_secs(1)),
            vec![failing.clone() as Arc<dyn ConnectionProbe>, healthy.clone()],
        );

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(failing.calls.load(Ordering::SeqCst), 2);
        assert_eq!(healthy.calls.load(Ordering::SeqCst), 2);
        monitor.dispose().await;
    }

    #[test]
    fn test_zero_interval_is_raised_to_minimum() {
        let config = MonitorConfig::new().with_interval(Duration::ZERO);
        assert_eq!(config.interval, MIN_MONITOR_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_field_still_runs_rounds() {
        let target = probe(false);
        let config = MonitorConfig {
            interval: Duration::ZERO,
        };
        let monitor =
            ServiceHostMonitor::start(config, vec![target.clone() as Arc<dyn ConnectionProbe>]);
        assert_eq!(monitor.config().interval, MIN_MONITOR_INTERVAL);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(monitor.rounds() >= 1);

        monitor.dispose().await;
        assert!(!monitor.is_running());
        let calls = target.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispose_stops_timer() {
        let target = probe(false);
        let monitor = ServiceHostMonitor::start(
            MonitorConfig::new().with_interval(Duration::from_secs(1)),
            vec![target.clone() as Arc<dyn ConnectionProbe>],
        );

        tokio::time::sleep(Duration::from_millis(1500)).await;
        monitor.dispose().await;
        monitor.dispose().await;
        assert!(!monitor.is_running());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(target.calls.load(Ordering::SeqCst), 1);
    }
}
