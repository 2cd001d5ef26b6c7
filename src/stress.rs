//! Repeated connect/disconnect runs with periodic memory sampling.

use crate::backend::Backend;
use crate::config::StressConfig;
use crate::connection::{ConnectOutcome, ConnectionManager};
use crate::error::{Error, Result};
use crate::leak::{AllocationSource, LeakMonitor, MemorySample, ProcessInspector};
use tokio::time::{interval, MissedTickBehavior};

/// Memory sample tagged with the number of cycles completed when it was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleSample {
    pub cycles_completed: usize,
    pub sample: MemorySample,
}

/// Outcome of [`run_reconnect_cycles`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StressReport {
    pub cycles_completed: usize,
    pub samples_taken: usize,
    /// First sample of the run.
    pub baseline: Option<CycleSample>,
    /// Sample taken after the last cycle.
    pub last: Option<CycleSample>,
}

impl StressReport {
    fn growth_per_cycle(&self, value: impl Fn(&MemorySample) -> u64) -> Option<f64> {
        let (baseline, last) = (self.baseline?, self.last?);
        let cycles = last.cycles_completed.checked_sub(baseline.cycles_completed)?;
        if cycles == 0 {
            return None;
        }
        let growth = value(&last.sample) as f64 - value(&baseline.sample) as f64;
        Some(growth / cycles as f64)
    }

    /// Average change in allocated bytes per cycle between baseline and last sample.
    pub fn alloc_growth_per_cycle(&self) -> Option<f64> {
        self.growth_per_cycle(|s| s.allocated_bytes)
    }

    /// Average change in RSS (kB) per cycle between baseline and last sample.
    pub fn rss_growth_per_cycle_kb(&self) -> Option<f64> {
        self.growth_per_cycle(|s| s.rss_kb)
    }
}

/// Connect and disconnect `config.cycles` times on a fixed tick.
///
/// Cycle 0 takes the baseline sample, then every `sample_every`-th cycle
/// samples again, and a final sample follows the loop. A failing cycle stops
/// the run and is escalated through `config.cycle_failure`.
pub async fn run_reconnect_cycles<B, A, P>(
    manager: &mut ConnectionManager<B>,
    monitor: &mut LeakMonitor<A, P>,
    config: &StressConfig,
) -> Result<StressReport>
where
    B: Backend,
    A: AllocationSource,
    P: ProcessInspector,
{
    let mut report = StressReport {
        cycles_completed: 0,
        samples_taken: 0,
        baseline: None,
        last: None,
    };

    let mut tick = interval(config.cycle_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    for i in 0..config.cycles {
        tick.tick().await;
        tracing::info!(cycle = i, "reconnection");

        if let Err(e) = run_cycle(manager, config.verify_each_cycle).await {
            tracing::error!(cycle = i, error = %e, "reconnect cycle failed");
            // Leave the handle clean before handing the error back.
            let _ = manager.disconnect().await;
            return Err(config.cycle_failure.escalate(e));
        }
        report.cycles_completed = i + 1;

        if config.sample_every > 0 && i % config.sample_every == 0 {
            record(&mut report, monitor.sample());
        }
    }
    record(&mut report, monitor.sample());

    Ok(report)
}

async fn run_cycle<B: Backend>(manager: &mut ConnectionManager<B>, verify: bool) -> Result<()> {
    match manager.connect().await? {
        ConnectOutcome::Skipped => return Err(Error::NotConnected),
        ConnectOutcome::Connected | ConnectOutcome::AlreadyConnected => {}
    }
    if verify {
        if !manager.is_connected() {
            return Err(Error::NotConnected);
        }
        manager.ping().await?;
    }
    match manager.disconnect().await {
        // Already logged; the handle is disconnected regardless.
        Err(Error::Disconnect { .. }) => Ok(()),
        other => other,
    }
}

fn record(report: &mut StressReport, sample: MemorySample) {
    let tagged = CycleSample {
        cycles_completed: report.cycles_completed,
        sample,
    };
    report.samples_taken += 1;
    if report.baseline.is_none() {
        report.baseline = Some(tagged);
    }
    report.last = Some(tagged);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FailurePolicy;
    use crate::connection::Credentials;
    use crate::error::ErrorKind;
    use crate::leak::Untracked;
    use crate::loopback::LoopbackBackend;
    use chrono::Utc;
    use std::time::Duration;

    struct FixedInspector(u64);

    impl ProcessInspector for FixedInspector {
        fn rss_kb(&self, _pid: u32) -> Result<u64> {
            Ok(self.0)
        }
    }

    type Fixture = (
        ConnectionManager<LoopbackBackend>,
        LeakMonitor<Untracked, FixedInspector>,
    );

    fn setup(backend: &LoopbackBackend) -> Fixture {
        (
            ConnectionManager::new(
                backend.clone(),
                Credentials::new("u", "p", "loopback/ORCL"),
            ),
            LeakMonitor::with_inspector(Untracked, FixedInspector(2048)),
        )
    }

    fn sample(allocated_bytes: u64, rss_kb: u64) -> MemorySample {
        MemorySample {
            allocated_bytes,
            alloc_delta: 0,
            rss_kb,
            rss_delta_kb: 0,
            captured_at: Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_hundred_cycles() {
        let backend = LoopbackBackend::new();
        let (mut manager, mut monitor) = setup(&backend);

        let report = run_reconnect_cycles(&mut manager, &mut monitor, &StressConfig::new())
            .await
            .unwrap();

        assert_eq!(report.cycles_completed, 300);
        // cycles 0, 10, ..., 290 plus the final sample
        assert_eq!(report.samples_taken, 31);
        assert_eq!(report.baseline.unwrap().cycles_completed, 1);
        assert_eq!(report.last.unwrap().cycles_completed, 300);
        assert_eq!(report.rss_growth_per_cycle_kb(), Some(0.0));
        assert_eq!(manager.connect_count(), 300);
        assert_eq!(backend.open_sessions(), 0);
        assert!(!manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycles_follow_the_tick() {
        let backend = LoopbackBackend::new();
        let (mut manager, mut monitor) = setup(&backend);
        let config = StressConfig::new().with_cycles(11);

        let start = tokio::time::Instant::now();
        run_reconnect_cycles(&mut manager, &mut monitor, &config)
            .await
            .unwrap();
        // First tick fires immediately.
        assert_eq!(start.elapsed(), Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_cycle_stops_the_run() {
        let backend = LoopbackBackend::new();
        let (mut manager, mut monitor) = setup(&backend);
        let config = StressConfig::new().with_cycles(20);

        backend.set_down(true);
        let err = run_reconnect_cycles(&mut manager, &mut monitor, &config)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connect);
        assert_eq!(backend.total_opened(), 0);
        assert!(monitor.last().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_failure_releases_session() {
        let backend = LoopbackBackend::new();
        let (mut manager, mut monitor) = setup(&backend);
        backend.fail_pings(true);

        let err = run_reconnect_cycles(&mut manager, &mut monitor, &StressConfig::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Liveness);
        assert_eq!(backend.total_opened(), 1);
        assert_eq!(backend.open_sessions(), 0);
        assert!(!manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_failure_does_not_stop_the_run() {
        let backend = LoopbackBackend::new();
        let (mut manager, mut monitor) = setup(&backend);
        backend.fail_close(true);

        let config = StressConfig::new()
            .with_cycles(5)
            .with_cycle_failure(FailurePolicy::Fatal);
        let report = run_reconnect_cycles(&mut manager, &mut monitor, &config)
            .await
            .unwrap();
        assert_eq!(report.cycles_completed, 5);
        assert_eq!(backend.total_opened(), 5);
        assert_eq!(backend.open_sessions(), 0);
        assert!(!manager.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unverified_cycles_skip_ping() {
        let backend = LoopbackBackend::new();
        let (mut manager, mut monitor) = setup(&backend);
        backend.fail_pings(true);

        let config = StressConfig::new()
            .with_cycles(5)
            .with_verify_each_cycle(false)
            .with_sample_every(0);
        let report = run_reconnect_cycles(&mut manager, &mut monitor, &config)
            .await
            .unwrap();
        assert_eq!(report.cycles_completed, 5);
        assert_eq!(report.samples_taken, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_target_fails_the_cycle() {
        let mut manager =
            ConnectionManager::new(LoopbackBackend::new(), Credentials::new("", "", ""));
        let mut monitor = LeakMonitor::with_inspector(Untracked, FixedInspector(1));
        let err = run_reconnect_cycles(&mut manager, &mut monitor, &StressConfig::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test(start_paused = true)]
    #[should_panic(expected = "unrecoverable connection failure")]
    async fn test_fatal_cycle_policy_panics() {
        let backend = LoopbackBackend::new();
        let (mut manager, mut monitor) = setup(&backend);
        backend.refuse_next(1);
        let config = StressConfig::new().with_cycle_failure(FailurePolicy::Fatal);
        let _ = run_reconnect_cycles(&mut manager, &mut monitor, &config).await;
    }

    #[test]
    fn test_growth_per_cycle() {
        let report = StressReport {
            cycles_completed: 101,
            samples_taken: 2,
            baseline: Some(CycleSample {
                cycles_completed: 1,
                sample: sample(10_000, 4000),
            }),
            last: Some(CycleSample {
                cycles_completed: 101,
                sample: sample(10_500, 3900),
            }),
        };
        assert_eq!(report.alloc_growth_per_cycle(), Some(5.0));
        assert_eq!(report.rss_growth_per_cycle_kb(), Some(-1.0));
    }

    #[test]
    fn test_growth_needs_two_points() {
        let only = CycleSample {
            cycles_completed: 3,
            sample: sample(1, 1),
        };
        let report = StressReport {
            cycles_completed: 3,
            samples_taken: 1,
            baseline: Some(only),
            last: Some(only),
        };
        assert_eq!(report.alloc_growth_per_cycle(), None);
    }
}
