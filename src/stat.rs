use {
    std::{collections::BTreeMap, num::ParseIntError, ops::Not, str::FromStr},
    thiserror::Error,
};

pub use self::{cpu_time::CpuTotals, user_hz::UserHz};

mod cpu_time;
mod user_hz;


/// the parts of `/proc/stat` this crate cares about.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatSnapshot {
    /// the aggregate row first, then each core in ascending id order.
    pub cpus: Vec<CpuTotals>,
    /// the number of processes in runnable state.
    pub procs_running: u32,
}

/// an entry in the `/proc/stat` kernel statistics table.
///
/// see `proc_stat(5)` for more information.
#[derive(Debug, Eq, PartialEq)]
pub enum Entry {
    /// the amount of time that the system ("cpu" line) spent in various states.
    AllCpu { time: CpuTotals },
    /// the amount of time that a specific cpu ("cpuN" line) spent in various states.
    Cpu { id: CpuId, time: CpuTotals },
    /// the number of processes in runnable state.  (linux 2.5.45 onward.)
    ProcsRunning(u32),
    /// any other line: page, swap, intr, ctxt, btime, processes, softirq, and so on.
    Other,
}

#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct CpuId(u16);

#[derive(Debug, Error, Eq, PartialEq)]
pub enum EntryParseError {
    #[error("empty line")]
    Empty,
    #[error("invalid cpu id: {0}")]
    CpuIdParse(#[source] ParseIntError),
    #[error("invalid time value: {0}")]
    UserHzParse(#[source] ParseIntError),
    #[error("expected between 4 and 10 cpu time columns, found {found}")]
    CpuTime { found: usize },
    #[error("invalid procs_running value")]
    ProcsRunning,
    #[error("no aggregate cpu line")]
    MissingAggregate,
}

enum Either<'a> {
    Cpu(&'a str),
    Entry(&'a str),
}

// === impl StatSnapshot ===

impl StatSnapshot {
    /// parses the full text of `/proc/stat`.
    pub fn parse(text: &str) -> Result<Self, EntryParseError> {
        let mut system = None;
        let mut cores = BTreeMap::new();
        let mut procs_running = 0;

        for line in text.lines().filter(|l| l.trim().is_empty().not()) {
            match line.parse::<Entry>()? {
                Entry::AllCpu { time } => system = Some(time),
                Entry::Cpu { id, time } => {
                    cores.insert(id, time);
                }
                Entry::ProcsRunning(n) => procs_running = n,
                Entry::Other => {}
            }
        }

        let system = system.ok_or(EntryParseError::MissingAggregate)?;
        let cpus = std::iter::once(system).chain(cores.into_values()).collect();

        Ok(Self {
            cpus,
            procs_running,
        })
    }
}

/// the number of individual cores in a sample set led by the aggregate row, never less than one.
pub fn core_count(cpus: &[CpuTotals]) -> usize {
    cpus.len().saturating_sub(1).max(1)
}

// === impl Entry ===

impl FromStr for Entry {
    type Err = EntryParseError;
    fn from_str(entry: &str) -> Result<Self, Self::Err> {
        let tokens = entry.split_whitespace().collect::<Vec<_>>();
        let [kind, tokens @ ..] = tokens.as_slice() else {
            return Err(EntryParseError::Empty);
        };

        let cpu = match Self::parse_entry_kind(kind) {
            Either::Cpu(cpu) => cpu,
            Either::Entry("procs_running") => {
                return tokens
                    .first()
                    .and_then(|n| n.parse().ok())
                    .map(Self::ProcsRunning)
                    .ok_or(EntryParseError::ProcsRunning);
            }
            Either::Entry(_) => return Ok(Self::Other),
        };

        let id = Self::parse_cpu_id(cpu)?;
        let time = tokens
            .iter()
            .map(|t| t.parse::<UserHz>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(EntryParseError::UserHzParse)
            .and_then(CpuTotals::try_from)?;

        Ok(if let Some(id) = id {
            Self::Cpu { id, time }
        } else {
            Self::AllCpu { time }
        })
    }
}

impl Entry {
    fn parse_entry_kind(kind: &str) -> Either<'_> {
        if kind.starts_with("cpu") {
            Either::Cpu(kind)
        } else {
            Either::Entry(kind)
        }
    }

    fn parse_cpu_id(token: &str) -> Result<Option<CpuId>, EntryParseError> {
        // strip the token of its "cpu" prefix.
        let suffix = token.strip_prefix("cpu").unwrap_or(token);

        // if there is no suffix, this is the aggregate line.
        if suffix.is_empty() {
            return Ok(None);
        }

        suffix
            .parse::<u16>()
            .map(CpuId)
            .map(Some)
            .map_err(EntryParseError::CpuIdParse)
    }
}
