use super::*;

/// cumulative tick counters for one cpu, or for all of them.
///
/// a sample set is an ordered sequence: index 0 is the aggregate `cpu` row of `/proc/stat`,
/// indices 1..N are the individual `cpuN` rows.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct CpuTotals {
    /// time spent in user mode.
    pub user: UserHz,
    /// time spent in user mode with low priority (nice).
    pub nice: UserHz,
    /// time spent in system mode.
    pub system: UserHz,
    /// time spent in the idle task.
    ///
    /// this value should be USER_HZ times the second entry in the /proc/uptime pseudo-file.
    pub idle: UserHz,
    /// time waiting for i/o to complete.
    ///
    /// this value is not reliable, and may decrease in certain conditions.
    pub iowait: UserHz,
    /// time servicing interrupts.
    pub irq: UserHz,
    /// time servicing softirqs.
    pub softirq: UserHz,
    /// stolen time, which is the time spent in other operating systems when running in a
    /// virtualized environment.
    pub steal: UserHz,
    /// time spent running a virtual cpu for guest operating systems.
    ///
    /// the kernel already accounts this in `user`.
    pub guest: UserHz,
    /// time spent running a niced guest.
    ///
    /// the kernel already accounts this in `nice`.
    pub guest_nice: UserHz,
}

// === impl CpuTotals ===

impl CpuTotals {
    /// the number of tick columns a `cpu` row may carry.
    pub(super) const COLUMNS: usize = 10;

    /// the fewest columns accepted. kernels older than 2.6.11 lack steal and guest time.
    pub(super) const MIN_COLUMNS: usize = 4;

    /// returns the total ticks elapsed.
    ///
    /// guest time is folded into user and nice by the kernel, so it is not added again.
    pub fn total(&self) -> UserHz {
        let Self {
            user,
            nice,
            system,
            idle,
            iowait,
            irq,
            softirq,
            steal,
            guest: _,
            guest_nice: _,
        } = *self;

        user + nice + system + idle + iowait + irq + softirq + steal
    }

    /// returns the ticks spent doing anything but idling.
    pub fn busy(&self) -> UserHz {
        self.total() - self.idle
    }
}

impl TryFrom<Vec<UserHz>> for CpuTotals {
    type Error = EntryParseError;
    fn try_from(mut times: Vec<UserHz>) -> Result<Self, Self::Error> {
        if !(Self::MIN_COLUMNS..=Self::COLUMNS).contains(&times.len()) {
            return Err(EntryParseError::CpuTime { found: times.len() });
        }

        // missing trailing columns count as zero ticks.
        times.resize(Self::COLUMNS, UserHz::default());

        <_ as TryInto<[_; 10]>>::try_into(times)
            .map(Self::from)
            .map_err(|times| EntryParseError::CpuTime { found: times.len() })
    }
}

impl From<[UserHz; 10]> for CpuTotals {
    fn from(
        [
            user,
            nice,
            system,
            idle,
            iowait,
            irq,
            softirq,
            steal,
            guest,
            guest_nice,
        ]: [UserHz; 10],
    ) -> Self {
        Self {
            user,
            nice,
            system,
            idle,
            iowait,
            irq,
            softirq,
            steal,
            guest,
            guest_nice,
        }
    }
}

impl From<[u64; 10]> for CpuTotals {
    fn from(ticks: [u64; 10]) -> Self {
        ticks.map(UserHz::new).into()
    }
}
