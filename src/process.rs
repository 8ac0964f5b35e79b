//! per-process sampled state.

use {
    crate::{
        source::{MetricsSource, Pid, ProcStat, ProcStatus, ProcessMemory, SourceError},
        stat::{UserHz, core_count},
    },
    std::{
        sync::Arc,
        time::{Duration, Instant},
    },
    tracing::trace,
};

/// shown in place of an owner name that could not be resolved.
pub const UNKNOWN_OWNER: &str = "?";

/// a tracked process.
#[derive(Clone, Debug)]
pub struct ProcessRecord {
    pid: Pid,
    owner: Arc<str>,
    command: Arc<str>,
    interval: Duration,
    stat: ProcStat,
    status: ProcStatus,
    /// percent of one core; at most `100 × cores`.
    utilization: f64,
    rate: RateState,
}

/// the outcome of trying to track a new pid.
#[derive(Debug)]
pub enum Creation {
    Tracked(ProcessRecord),
    /// the pid belongs to a kernel thread, which has no command line and is never tracked.
    Kernel,
}

/// what the previous sample saw, for computing a rate on the next one.
#[derive(Clone, Copy, Debug)]
pub struct RateState {
    /// `utime + stime` at the last sample.
    active: UserHz,
    /// the system-wide total ticks at the last sample.
    system: UserHz,
    at: Instant,
}

/// one full re-sample of a process, read without touching the record.
#[derive(Clone, Copy, Debug)]
pub struct Sample {
    stat: ProcStat,
    status: ProcStatus,
    system: UserHz,
    cores: usize,
    at: Instant,
}

/// an immutable copy of a record, as handed to the renderer.
#[derive(Clone, Debug, PartialEq)]
pub struct ProcessRow {
    pub pid: Pid,
    pub owner: Arc<str>,
    pub command: Arc<str>,
    pub state: char,
    pub priority: i64,
    pub nice: i64,
    pub threads: u32,
    pub memory: ProcessMemory,
    pub utilization: f64,
    /// cumulative user and system time.
    pub cpu_time: Duration,
}

// === impl ProcessRecord ===

impl ProcessRecord {
    /// starts tracking `pid`.
    ///
    /// fails if the process could not be read, e.g. because it exited. a single sample cannot
    /// yield a rate, so utilization starts at zero.
    pub fn new(
        pid: Pid,
        source: &dyn MetricsSource,
        interval: Duration,
        now: Instant,
    ) -> Result<Creation, SourceError> {
        let command = source.command(pid)?;
        if command.is_empty() {
            return Ok(Creation::Kernel);
        }

        let Sample {
            stat,
            status,
            system,
            cores: _,
            at,
        } = Sample::read(pid, source, now)?;
        let owner = Self::owner(source, status.uid);

        Ok(Creation::Tracked(Self {
            pid,
            owner,
            command: command.into(),
            interval,
            stat,
            status,
            utilization: 0.0,
            rate: RateState {
                active: stat.utime + stat.stime,
                system,
                at,
            },
        }))
    }

    /// re-samples the process if at least one interval passed since the last sample.
    ///
    /// a failed read keeps the last known values; the next call tries again.
    pub fn refresh(&mut self, source: &dyn MetricsSource, now: Instant) {
        if let Some(sample) = self.sample(source, now) {
            self.apply(sample);
        }
    }

    /// reads a new sample if one is due, without changing the record.
    pub fn sample(&self, source: &dyn MetricsSource, now: Instant) -> Option<Sample> {
        self.rate.sample(self.pid, self.interval, source, now)
    }

    /// folds a sample into the record and recomputes utilization.
    pub fn apply(&mut self, sample: Sample) {
        let Sample {
            stat,
            status,
            system,
            cores,
            at,
        } = sample;

        let active = stat.utime + stat.stime;
        if let Some(utilization) = utilization(
            active - self.rate.active,
            system - self.rate.system,
            cores,
        ) {
            self.utilization = utilization;
        }

        self.stat = stat;
        self.status = status;
        self.rate = RateState { active, system, at };
    }

    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn owner_name(&self) -> &str {
        &self.owner
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn utilization(&self) -> f64 {
        self.utilization
    }

    pub fn threads(&self) -> u32 {
        self.status.threads
    }

    /// cumulative user and system time.
    pub fn cpu_time(&self) -> Duration {
        let ticks = self.stat.utime + self.stat.stime;
        Duration::from_secs_f64(ticks.as_secs_f64())
    }

    pub fn rate_state(&self) -> RateState {
        self.rate
    }

    pub fn row(&self) -> ProcessRow {
        ProcessRow {
            pid: self.pid,
            owner: self.owner.clone(),
            command: self.command.clone(),
            state: self.stat.state,
            priority: self.stat.priority,
            nice: self.stat.nice,
            threads: self.status.threads,
            memory: self.status.memory,
            utilization: self.utilization,
            cpu_time: self.cpu_time(),
        }
    }

    /// resolves the owner once. failures fall back to the numeric uid and are not retried.
    fn owner(source: &dyn MetricsSource, uid: Option<u32>) -> Arc<str> {
        let Some(uid) = uid else {
            return UNKNOWN_OWNER.into();
        };

        match source.user_name(uid) {
            Ok(name) => name.into(),
            Err(error) => {
                trace!(uid, %error, "unresolved owner");
                uid.to_string().into()
            }
        }
    }
}

// === impl RateState ===

impl RateState {
    /// whether a re-sample is due at `now`.
    pub fn is_due(&self, interval: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.at) >= interval
    }

    /// reads a sample for `pid` if one is due.
    pub fn sample(
        &self,
        pid: Pid,
        interval: Duration,
        source: &dyn MetricsSource,
        now: Instant,
    ) -> Option<Sample> {
        if !self.is_due(interval, now) {
            return None;
        }

        Sample::read(pid, source, now)
            .inspect_err(|error| trace!(pid, %error, "keeping last known sample"))
            .ok()
    }
}

// === impl Sample ===

impl Sample {
    pub fn read(pid: Pid, source: &dyn MetricsSource, now: Instant) -> Result<Self, SourceError> {
        let stat = source.process_stat(pid)?;
        let status = source.process_status(pid)?;
        let cpus = source.cpu_totals()?;
        let system = cpus.first().map(|c| c.total()).unwrap_or_default();
        let cores = core_count(&cpus);

        Ok(Self {
            stat,
            status,
            system,
            cores,
            at: now,
        })
    }
}

/// the share of the system's ticks a process used, in percent of one core.
///
/// returns `None` if no system time elapsed, leaving the previous value in place.
pub fn utilization(active: UserHz, system: UserHz, cores: usize) -> Option<f64> {
    if system.get() == 0 {
        return None;
    }

    let cores = cores.max(1) as f64;
    let percent = active / system * cores * 100.0;
    Some(percent.clamp(0.0, 100.0 * cores))
}

#[cfg(test)]
mod tests {
    use {super::*, crate::source::MockSource};

    const INTERVAL: Duration = Duration::from_millis(1500);

    fn track(source: &MockSource, pid: Pid, now: Instant) -> ProcessRecord {
        match ProcessRecord::new(pid, source, INTERVAL, now).unwrap() {
            Creation::Tracked(record) => record,
            Creation::Kernel => panic!("{pid} should not be a kernel process"),
        }
    }

    #[test]
    fn rate_example() {
        let percent = utilization(UserHz::new(50), UserHz::new(1000), 4).unwrap();
        assert!((percent - 20.0).abs() < 1e-9);
    }

    #[test]
    fn rate_is_clamped() {
        let percent = utilization(UserHz::new(5000), UserHz::new(1000), 2).unwrap();
        assert_eq!(percent, 200.0);
    }

    #[test]
    fn no_system_time_means_no_rate() {
        assert_eq!(utilization(UserHz::new(5), UserHz::new(0), 4), None);
    }

    #[test]
    fn kernel_processes_are_not_tracked() {
        let source = MockSource::new(4, 1000);
        source.spawn(2, "");
        let creation = ProcessRecord::new(2, &source, INTERVAL, Instant::now()).unwrap();
        assert!(matches!(creation, Creation::Kernel));
    }

    #[test]
    fn vanished_process_fails_creation() {
        let source = MockSource::new(4, 1000);
        let err = ProcessRecord::new(9, &source, INTERVAL, Instant::now()).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn starts_idle_with_owner() {
        let source = MockSource::new(4, 1000);
        source.add_user(1000, "kate");
        source.spawn_owned(10, "vim notes.md", 1000, 1);
        source.set_ticks(10, 500, 100);

        let record = track(&source, 10, Instant::now());
        assert_eq!(record.utilization(), 0.0);
        assert_eq!(record.owner_name(), "kate");
        assert_eq!(record.command(), "vim notes.md");
    }

    #[test]
    fn unresolved_owner_falls_back_to_uid() {
        let source = MockSource::new(4, 1000);
        source.spawn_owned(10, "vim", 4242, 1);
        let record = track(&source, 10, Instant::now());
        assert_eq!(record.owner_name(), "4242");
    }

    #[test]
    fn computes_rate_across_samples() {
        let source = MockSource::new(4, 1000);
        source.spawn(10, "cc");
        let start = Instant::now();
        let mut record = track(&source, 10, start);

        source.set_total(2000);
        source.set_ticks(10, 30, 20);
        record.refresh(&source, start + INTERVAL);
        assert!((record.utilization() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn refresh_is_gated_by_interval() {
        let source = MockSource::new(4, 1000);
        source.spawn(10, "cc");
        let start = Instant::now();
        let mut record = track(&source, 10, start);
        let reads = source.stat_reads();

        source.set_total(2000);
        source.set_ticks(10, 50, 0);
        record.refresh(&source, start + INTERVAL / 2);
        assert_eq!(source.stat_reads(), reads);
        assert_eq!(record.utilization(), 0.0);

        record.refresh(&source, start + INTERVAL);
        assert_eq!(source.stat_reads(), reads + 1);
        assert!(record.utilization() > 0.0);
    }

    #[test]
    fn zero_system_delta_keeps_utilization_but_advances_state() {
        let source = MockSource::new(2, 1000);
        source.spawn(10, "cc");
        let start = Instant::now();
        let mut record = track(&source, 10, start);

        source.set_total(1100);
        source.set_ticks(10, 10, 0);
        record.refresh(&source, start + INTERVAL);
        let before = record.utilization();
        assert!((before - 20.0).abs() < 1e-9);

        // the system total does not move, so the rate cannot be computed.
        source.set_ticks(10, 60, 0);
        record.refresh(&source, start + INTERVAL * 2);
        assert_eq!(record.utilization(), before);

        // but the state moved on, so the next rate counts from the last sample.
        source.set_total(1200);
        source.set_ticks(10, 70, 0);
        record.refresh(&source, start + INTERVAL * 3);
        assert!((record.utilization() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn failed_refresh_keeps_last_values() {
        let source = MockSource::new(1, 1000);
        source.spawn_owned(10, "cc", 0, 3);
        let start = Instant::now();
        let mut record = track(&source, 10, start);

        source.set_threads(10, 7);
        source.break_reads(10);
        record.refresh(&source, start + INTERVAL);
        assert_eq!(record.threads(), 3);

        source.fix_reads(10);
        record.refresh(&source, start + INTERVAL * 2);
        assert_eq!(record.threads(), 7);
    }

    #[test]
    fn refresh_picks_up_state_changes() {
        let source = MockSource::new(1, 1000);
        source.spawn(10, "make");
        let start = Instant::now();
        let mut record = track(&source, 10, start);
        assert_eq!(record.row().state, 'S');

        source.set_state(10, 'R');
        record.refresh(&source, start + INTERVAL);
        assert_eq!(record.row().state, 'R');
    }

    #[test]
    fn utilization_stays_within_bounds() {
        let cores = 4;
        let source = MockSource::new(cores, 0);
        source.spawn(10, "spin");
        let start = Instant::now();
        let mut record = track(&source, 10, start);

        // an adversarial mix of deltas, including counters that run backwards.
        let steps: [(u64, u64); 6] = [(100, 10), (50, 500), (400, 10_000), (400, 20), (0, 0), (9, 1)];
        let (mut total, mut active) = (0u64, 0u64);
        for (i, (system, busy)) in steps.into_iter().enumerate() {
            total += system;
            active = if i == 4 { active / 2 } else { active + busy };
            source.set_total(total);
            source.set_ticks(10, active, 0);
            record.refresh(&source, start + INTERVAL * (i as u32 + 1));

            let percent = record.utilization();
            assert!((0.0..=100.0 * cores as f64).contains(&percent), "{percent}");
        }
    }

    #[test]
    fn rows_share_strings() {
        let source = MockSource::new(1, 1000);
        source.spawn(10, "a rather long command line");
        let record = track(&source, 10, Instant::now());
        let row = record.row();
        assert!(Arc::ptr_eq(&row.command, &record.command));
        assert_eq!(row.pid, 10);
    }
}
