use crate::{
    source::{MetricsSource, SourceError},
    stat::CpuTotals,
};

/// observes how busy each cpu was between successive readings.
#[derive(Debug, Default)]
pub struct Sentinel {
    /// the last observed sample set; index 0 is the aggregate.
    last: Option<Vec<CpuTotals>>,
    /// the last recording made.
    recording: Recording,
}

/// how busy the cpus were over one observation.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Recording {
    /// the aggregate of every cpu, in `0.0..=1.0`.
    pub system: f64,
    /// each core in order, in `0.0..=1.0`.
    pub cores: Vec<f64>,
}

// === impl Sentinel ===

impl Sentinel {
    pub fn new() -> Self {
        Self::default()
    }

    /// reads the cpu totals and returns a [`Recording`] of cpu time since this was last called.
    pub fn observe(&mut self, source: &dyn MetricsSource) -> Result<Recording, SourceError> {
        source.cpu_totals().map(|cpus| self.record(cpus))
    }

    /// compares `cpus` with the last sample set and keeps it for next time.
    ///
    /// NB: with nothing to compare against, e.g. on the first call or after the set of cpus
    /// changed, the ratio covers all time since boot. if no time passed since the last sample
    /// set, e.g. because it was served from a cache, the last recording is returned again.
    pub fn record(&mut self, cpus: Vec<CpuTotals>) -> Recording {
        let prev = self.last.take().filter(|prev| prev.len() == cpus.len());
        if let Some(prev) = prev.as_ref().filter(|prev| prev.first() == cpus.first()) {
            self.last = Some(prev.clone());
            return self.recording.clone();
        }

        let mut ratios = cpus.iter().enumerate().map(|(i, now)| match &prev {
            Some(prev) => busy_ratio(&prev[i], now),
            None => busy_ratio(&CpuTotals::default(), now),
        });
        let system = ratios.next().unwrap_or_default();
        let cores = ratios.collect();

        self.last = Some(cpus);
        self.recording = Recording { system, cores };
        self.recording.clone()
    }
}

/// the share of `a..b` that was not spent idle.
fn busy_ratio(a: &CpuTotals, b: &CpuTotals) -> f64 {
    let total = b.total() - a.total();
    if total.get() == 0 {
        return 0.0;
    }

    ((b.busy() - a.busy()) / total).clamp(0.0, 1.0)
}
