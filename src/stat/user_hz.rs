use std::{
    ops::{Add, Div, Sub},
    str::FromStr,
    sync::OnceLock,
};

/// a count of kernel clock ticks.
#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub struct UserHz(u64);

// === impl UserHz ===

impl UserHz {
    /// the fallback tick rate, used if `sysconf(_SC_CLK_TCK)` reports nothing useful.
    const FALLBACK_FREQ: u64 = 100;

    pub const fn new(ticks: u64) -> Self {
        Self(ticks)
    }

    pub const fn get(self) -> u64 {
        let Self(ticks) = self;
        ticks
    }

    /// the number of clock ticks in a second.
    ///
    /// this is obtained once via `sysconf(_SC_CLK_TCK)`, which is what `getconf CLK_TCK`
    /// reports. it is usually 100Hz.
    pub fn freq() -> u64 {
        static FREQ: OnceLock<u64> = OnceLock::new();

        *FREQ.get_or_init(|| {
            // SAFETY: `sysconf` has no preconditions and does not touch caller memory.
            let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
            u64::try_from(ticks)
                .ok()
                .filter(|t| *t > 0)
                .unwrap_or(Self::FALLBACK_FREQ)
        })
    }

    /// converts this tick count into seconds.
    pub fn as_secs_f64(self) -> f64 {
        self.get() as f64 / Self::freq() as f64
    }
}

impl FromStr for UserHz {
    type Err = <u64 as FromStr>::Err;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl Add for UserHz {
    type Output = Self;
    fn add(self, rhs: Self) -> Self::Output {
        let (Self(lhs), Self(rhs)) = (self, rhs);
        Self(lhs.saturating_add(rhs))
    }
}

/// NB: counters such as iowait may go backwards, so subtraction saturates at zero.
impl Sub for UserHz {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self::Output {
        let (Self(lhs), Self(rhs)) = (self, rhs);
        Self(lhs.saturating_sub(rhs))
    }
}

impl Div for UserHz {
    type Output = f64;
    fn div(self, rhs: Self) -> Self::Output {
        let to_float = |Self(hz)| -> f64 { hz as f64 };
        let (lhs, rhs) = (to_float(self), to_float(rhs));

        lhs / rhs
    }
}
