use {
    crate::stat::{CpuTotals, UserHz},
    std::{io, path::PathBuf, sync::Arc, time::Instant},
    thiserror::Error,
};

pub use self::{clock::*, metrics::*};

#[cfg(test)]
pub use self::mock::MockSource;

mod clock {
    use super::*;

    /// a source of monotonic time.
    pub trait Clock {
        fn now(&self) -> Instant;
    }

    #[derive(Clone, Copy, Debug, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> Instant {
            Instant::now()
        }
    }

    impl<C: Clock + ?Sized> Clock for Arc<C> {
        fn now(&self) -> Instant {
            (**self).now()
        }
    }

    /// a clock that only moves when told to.
    #[cfg(test)]
    #[derive(Debug)]
    pub struct ManualClock {
        now: parking_lot::Mutex<Instant>,
    }

    #[cfg(test)]
    impl ManualClock {
        pub fn new() -> Self {
            Self {
                now: parking_lot::Mutex::new(Instant::now()),
            }
        }

        pub fn advance(&self, by: std::time::Duration) {
            *self.now.lock() += by;
        }
    }

    #[cfg(test)]
    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock()
        }
    }
}

/// abstracts over providers of system and process metrics.
mod metrics {
    use super::*;

    pub type Pid = u32;

    /// a failed metrics read.
    #[derive(Debug, Error)]
    pub enum SourceError {
        /// the file is gone, usually because the process exited mid-read.
        #[error("{} not found", path.display())]
        NotFound { path: PathBuf },
        #[error("failed to read {}: {source}", path.display())]
        Unreadable {
            path: PathBuf,
            #[source]
            source: io::Error,
        },
        /// the file was read but its contents made no sense.
        #[error("malformed {}: {reason}", path.display())]
        Malformed { path: PathBuf, reason: String },
    }

    /// typed snapshot reads from the operating system.
    ///
    /// system-wide aggregate reads may be cached by the implementation; per-process reads
    /// never are.
    pub trait MetricsSource: Send + Sync {
        /// seconds since boot.
        fn uptime(&self) -> Result<u64, SourceError>;
        /// the aggregate cpu row followed by each core.
        fn cpu_totals(&self) -> Result<Vec<CpuTotals>, SourceError>;
        fn memory(&self) -> Result<MemoryInfo, SourceError>;
        fn load_average(&self) -> Result<LoadAverage, SourceError>;
        /// the run-queue length.
        fn running_tasks(&self) -> Result<u32, SourceError>;
        /// every live process id.
        fn pids(&self) -> Result<Vec<Pid>, SourceError>;
        fn process_stat(&self, pid: Pid) -> Result<ProcStat, SourceError>;
        fn process_status(&self, pid: Pid) -> Result<ProcStatus, SourceError>;
        /// the raw command line. empty for kernel-owned processes.
        fn command(&self, pid: Pid) -> Result<String, SourceError>;
        /// resolves a numeric owner id to a user name.
        fn user_name(&self, uid: u32) -> Result<String, SourceError>;
    }

    /// system memory, in kB.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct MemoryInfo {
        pub total: u64,
        pub free: u64,
        pub available: u64,
        pub buffers: u64,
        pub cached: u64,
        pub swap_cached: u64,
        pub reclaimable: u64,
        pub shared: u64,
        pub swap_total: u64,
        pub swap_free: u64,
    }

    #[derive(Clone, Copy, Debug, Default, PartialEq)]
    pub struct LoadAverage {
        pub one: f64,
        pub five: f64,
        pub fifteen: f64,
    }

    /// the scheduling fields of `/proc/<pid>/stat`.
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct ProcStat {
        pub state: char,
        pub utime: UserHz,
        pub stime: UserHz,
        pub priority: i64,
        pub nice: i64,
    }

    /// per-process memory, in kB.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ProcessMemory {
        pub virtual_kb: u64,
        pub resident_kb: u64,
        pub shared_kb: u64,
    }

    /// the fields of `/proc/<pid>/status` this crate uses.
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct ProcStatus {
        pub memory: ProcessMemory,
        pub threads: u32,
        pub uid: Option<u32>,
    }

    /// static facts about the host, read once.
    #[derive(Clone, Debug, Default, Eq, PartialEq)]
    pub struct HostInfo {
        pub os: String,
        pub kernel: String,
    }

    // === impl SourceError ===

    impl SourceError {
        /// classifies an i/o error on `path`.
        ///
        /// reading a `/proc/<pid>` file after the process exits yields `ENOENT` or `ESRCH`.
        pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
            let path = path.into();
            match (source.kind(), source.raw_os_error()) {
                (io::ErrorKind::NotFound, _) => Self::NotFound { path },
                (_, Some(libc::ESRCH)) => Self::NotFound { path },
                _ => Self::Unreadable { path, source },
            }
        }

        pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
            Self::Malformed {
                path: path.into(),
                reason: reason.into(),
            }
        }

        pub fn is_not_found(&self) -> bool {
            matches!(self, Self::NotFound { .. })
        }
    }

    // === impl MemoryInfo ===

    impl MemoryInfo {
        /// memory in use by processes, excluding buffers and page cache.
        pub fn used(&self) -> u64 {
            let Self {
                total,
                free,
                buffers,
                cached,
                ..
            } = *self;
            total.saturating_sub(free).saturating_sub(buffers + cached)
        }

        /// reclaimable page cache, excluding shared memory.
        pub fn cache(&self) -> u64 {
            (self.cached + self.reclaimable).saturating_sub(self.shared)
        }

        pub fn swap_used(&self) -> u64 {
            self.swap_total.saturating_sub(self.swap_free)
        }

        /// `part` as a fraction of total memory.
        pub fn ratio(&self, part: u64) -> f64 {
            ratio(part, self.total)
        }

        pub fn swap_ratio(&self) -> f64 {
            ratio(self.swap_used(), self.swap_total)
        }
    }

    fn ratio(part: u64, whole: u64) -> f64 {
        if whole == 0 {
            return 0.0;
        }
        (part as f64 / whole as f64).clamp(0.0, 1.0)
    }
}
