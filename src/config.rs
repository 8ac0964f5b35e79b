use {crossterm::event::KeyCode, std::time::Duration};

/// runtime settings, fixed for the life of the monitor.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Config {
    /// how often metrics are sampled and the screen repainted.
    ///
    /// this also bounds how stale a cached reading may be, and how long shutdown may take.
    pub refresh_interval: Duration,
    /// the key that ends the session.
    pub quit_key: KeyCode,
}

impl Config {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1500);

    pub fn with_interval(refresh_interval: Duration) -> Self {
        Self {
            refresh_interval,
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval: Self::DEFAULT_INTERVAL,
            quit_key: KeyCode::Char('q'),
        }
    }
}
