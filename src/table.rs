//! the set of tracked processes.

use {
    crate::{
        process::{Creation, ProcessRecord, ProcessRow, RateState, Sample},
        source::{MetricsSource, Pid},
    },
    std::{
        collections::{HashMap, HashSet},
        time::{Duration, Instant},
    },
    tracing::{debug, trace},
};

#[cfg(test)]
mod tests;

/// utilizations closer than this are tied, and ordered by pid.
const TIE_TOLERANCE: f64 = 1e-3;

/// owns every tracked [`ProcessRecord`], keyed by pid.
#[derive(Debug)]
pub struct ProcessTable {
    interval: Duration,
    records: HashMap<Pid, ProcessRecord>,
    /// live pids known to be kernel threads, so their command lines are not re-read.
    kernel: HashSet<Pid>,
    counts: TaskCounts,
    last_refresh: Option<Instant>,
    /// bumped by every applied refresh; plans from an older generation are discarded.
    generation: u64,
}

/// aggregate counts shown above the table.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TaskCounts {
    /// tracked processes.
    pub tasks: usize,
    /// threads across all tracked processes.
    pub threads: u64,
    /// the run-queue length, as reported by the source.
    pub running: u32,
}

/// the bookkeeping needed to refresh the table, copied out so the reads can happen unlocked.
#[derive(Debug)]
pub struct RefreshPlan {
    generation: u64,
    interval: Duration,
    now: Instant,
    tracked: Vec<(Pid, RateState)>,
    kernel: HashSet<Pid>,
}

/// the result of a refresh's reads, applied to the table in one step.
#[derive(Debug)]
pub struct Reconciliation {
    generation: u64,
    now: Instant,
    /// `None` if the pid scan failed.
    live: Option<HashSet<Pid>>,
    added: Vec<ProcessRecord>,
    kernel: Vec<Pid>,
    samples: Vec<(Pid, Sample)>,
    running: Option<u32>,
}

// === impl ProcessTable ===

impl ProcessTable {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            records: HashMap::new(),
            kernel: HashSet::new(),
            counts: TaskCounts::default(),
            last_refresh: None,
            generation: 0,
        }
    }

    /// reconciles the table against the live processes, at most once per interval.
    pub fn refresh(&mut self, source: &dyn MetricsSource, now: Instant) {
        if let Some(plan) = self.prepare(now) {
            let reconciliation = plan.collect(source);
            self.apply(reconciliation);
        }
    }

    /// begins a refresh, if one is due.
    ///
    /// this only copies bookkeeping; it does no i/o.
    pub fn prepare(&self, now: Instant) -> Option<RefreshPlan> {
        let due = self
            .last_refresh
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);
        if !due {
            return None;
        }

        let tracked = self
            .records
            .values()
            .map(|r| (r.pid(), r.rate_state()))
            .collect();

        Some(RefreshPlan {
            generation: self.generation,
            interval: self.interval,
            now,
            tracked,
            kernel: self.kernel.clone(),
        })
    }

    /// applies a reconciliation: additions, re-samples and removals in one transition.
    ///
    /// a reconciliation whose plan was prepared before another refresh was applied is dropped.
    pub fn apply(&mut self, reconciliation: Reconciliation) {
        let Reconciliation {
            generation,
            now,
            live,
            added,
            kernel,
            samples,
            running,
        } = reconciliation;

        if generation != self.generation {
            debug!(generation, current = self.generation, "discarding stale refresh");
            return;
        }

        // a failed pid scan tells us nothing about which processes exited. the attempt still
        // counts, so the scan is not retried before the next interval.
        let Some(live) = live else {
            self.last_refresh = Some(now);
            return;
        };

        for (pid, sample) in samples {
            if let Some(record) = self.records.get_mut(&pid) {
                record.apply(sample);
            }
        }

        let before = self.records.len();
        self.records.retain(|pid, _| live.contains(pid));
        let removed = before - self.records.len();

        self.kernel.retain(|pid| live.contains(pid));
        self.kernel.extend(kernel);

        let mut inserted = 0;
        for record in added {
            if live.contains(&record.pid()) {
                self.records.entry(record.pid()).or_insert_with(|| {
                    inserted += 1;
                    record
                });
            }
        }

        self.counts = TaskCounts {
            tasks: self.records.len(),
            threads: self.records.values().map(|r| u64::from(r.threads())).sum(),
            running: running.unwrap_or(self.counts.running),
        };
        self.last_refresh = Some(now);
        self.generation += 1;

        debug!(
            tasks = self.counts.tasks,
            inserted, removed, "reconciled process table"
        );
    }

    /// an independent copy of every record, busiest first.
    ///
    /// utilizations within 0.001 of each other are ties, ordered by ascending pid.
    pub fn snapshot(&self) -> Vec<ProcessRow> {
        order_rows(self.records.values().map(ProcessRecord::row).collect())
    }

    pub fn counts(&self) -> TaskCounts {
        self.counts
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.records.contains_key(&pid)
    }

    pub fn get(&self, pid: Pid) -> Option<&ProcessRecord> {
        self.records.get(&pid)
    }
}

// === impl RefreshPlan ===

impl RefreshPlan {
    /// performs every read the refresh needs. nothing here touches the table.
    pub fn collect(self, source: &dyn MetricsSource) -> Reconciliation {
        let Self {
            generation,
            interval,
            now,
            tracked,
            kernel,
        } = self;

        let live = match source.pids() {
            Ok(pids) => pids.into_iter().collect::<HashSet<_>>(),
            Err(error) => {
                debug!(%error, "failed to list processes");
                return Reconciliation {
                    generation,
                    now,
                    live: None,
                    added: Vec::new(),
                    kernel: Vec::new(),
                    samples: Vec::new(),
                    running: None,
                };
            }
        };

        let known = tracked.iter().map(|(pid, _)| *pid).collect::<HashSet<_>>();

        let samples = tracked
            .iter()
            .filter(|(pid, _)| live.contains(pid))
            .filter_map(|(pid, rate)| {
                let sample = rate.sample(*pid, interval, source, now)?;
                Some((*pid, sample))
            })
            .collect();

        let mut added = Vec::new();
        let mut kernel_threads = Vec::new();
        for &pid in live.iter().filter(|pid| !known.contains(pid) && !kernel.contains(pid)) {
            match ProcessRecord::new(pid, source, interval, now) {
                Ok(Creation::Tracked(record)) => added.push(record),
                Ok(Creation::Kernel) => kernel_threads.push(pid),
                // still live, so the next refresh tries again.
                Err(error) => trace!(pid, %error, "could not start tracking"),
            }
        }

        let running = source
            .running_tasks()
            .inspect_err(|error| debug!(%error, "failed to read run queue"))
            .ok();

        Reconciliation {
            generation,
            now,
            live: Some(live),
            added,
            kernel: kernel_threads,
            samples,
            running,
        }
    }
}

/// whether `a` belongs directly before `b`: busier first, and tied rows by ascending pid.
fn precedes(a: &ProcessRow, b: &ProcessRow) -> bool {
    if (a.utilization - b.utilization).abs() < TIE_TOLERANCE {
        a.pid < b.pid
    } else {
        a.utilization > b.utilization
    }
}

/// orders rows so that each one [`precedes`] the next.
///
/// ties are not transitive, so no comparator can promise this. `precedes` settles every pair of
/// distinct pids one way or the other, and such a relation always admits a chain through every
/// row; each row is inserted into it by binary search.
fn order_rows(mut rows: Vec<ProcessRow>) -> Vec<ProcessRow> {
    rows.sort_by(|a, b| {
        b.utilization
            .total_cmp(&a.utilization)
            .then(a.pid.cmp(&b.pid))
    });

    let mut ordered = Vec::<ProcessRow>::with_capacity(rows.len());
    for row in rows {
        let at = match (ordered.first(), ordered.last()) {
            (Some(first), _) if precedes(&row, first) => 0,
            (_, Some(last)) if precedes(last, &row) => ordered.len(),
            (None, _) | (_, None) => 0,
            _ => {
                // `ordered[lo]` precedes `row`, which precedes `ordered[hi]`.
                let (mut lo, mut hi) = (0, ordered.len() - 1);
                while hi - lo > 1 {
                    let mid = lo + (hi - lo) / 2;
                    if precedes(&ordered[mid], &row) {
                        lo = mid;
                    } else {
                        hi = mid;
                    }
                }
                hi
            }
        };
        ordered.insert(at, row);
    }

    ordered
}
