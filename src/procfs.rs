//! a [`MetricsSource`] backed by the `/proc` pseudo-filesystem.
//!
//! see `proc(5)` for the formats parsed here.

use {
    crate::{
        cache::TtlCache,
        source::{
            Clock, HostInfo, LoadAverage, MemoryInfo, MetricsSource, Pid, ProcStat, ProcStatus,
            SourceError, SystemClock,
        },
        stat::{CpuTotals, StatSnapshot},
        users::UserNames,
    },
    parking_lot::Mutex,
    std::{
        fmt::Display,
        fs,
        path::{Path, PathBuf},
        str::FromStr,
        time::Duration,
    },
    tracing::trace,
};


/// reads metrics from `/proc`.
///
/// system-wide aggregates are cached for one refresh interval, so the underlying files are read
/// at most once per interval no matter how often they are asked for.
pub struct ProcFs<C = SystemClock> {
    root: PathBuf,
    os_release: PathBuf,
    users: UserNames,
    stat: Mutex<TtlCache<StatSnapshot, C>>,
    uptime: Mutex<TtlCache<u64, C>>,
    memory: Mutex<TtlCache<MemoryInfo, C>>,
    load: Mutex<TtlCache<LoadAverage, C>>,
}

// === impl ProcFs ===

/// where procfs is usually mounted.
pub const ROOT: &str = "/proc";

const OS_RELEASE: &str = "/etc/os-release";

impl ProcFs {
    pub fn new(interval: Duration) -> Self {
        Self::at(ROOT, interval)
    }

    /// reads from a procfs mounted at `root`.
    pub fn at(root: impl Into<PathBuf>, interval: Duration) -> Self {
        Self::with_clock(root, interval, SystemClock)
    }
}

impl<C: Clock + Clone> ProcFs<C> {
    pub fn with_clock(root: impl Into<PathBuf>, interval: Duration, clock: C) -> Self {
        Self {
            root: root.into(),
            os_release: PathBuf::from(OS_RELEASE),
            users: UserNames::default(),
            stat: cache(interval, &clock),
            uptime: cache(interval, &clock),
            memory: cache(interval, &clock),
            load: cache(interval, &clock),
        }
    }

    /// resolves owner names through a different `passwd(5)` file.
    pub fn passwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.users = UserNames::new(path);
        self
    }

    /// reads the distribution name from a different `os-release(5)` file.
    pub fn os_release(mut self, path: impl Into<PathBuf>) -> Self {
        self.os_release = path.into();
        self
    }
}

impl<C> ProcFs<C> {
    /// reads the distribution name and kernel release.
    ///
    /// these do not change while the monitor runs, so they are read once by the caller.
    pub fn host_info(&self) -> HostInfo {
        let os = read(&self.os_release)
            .ok()
            .and_then(|text| parse_os_release(&text))
            .unwrap_or_default();
        let kernel = read(&self.root.join("version"))
            .ok()
            .and_then(|text| text.split_whitespace().nth(2).map(str::to_owned))
            .unwrap_or_default();

        HostInfo { os, kernel }
    }

    fn path(&self, file: &str) -> PathBuf {
        self.root.join(file)
    }

    fn pid_path(&self, pid: Pid, file: &str) -> PathBuf {
        self.root.join(pid.to_string()).join(file)
    }

    fn read_stat(&self) -> Result<StatSnapshot, SourceError> {
        let path = self.path("stat");
        let text = read(&path)?;
        StatSnapshot::parse(&text).map_err(|e| SourceError::malformed(&path, e.to_string()))
    }
}

impl<C: Clock + Send + Sync> MetricsSource for ProcFs<C> {
    fn uptime(&self) -> Result<u64, SourceError> {
        let path = self.path("uptime");
        self.uptime
            .lock()
            .get_or_try_insert_with(|| {
                let text = read(&path)?;
                parse_uptime(&text).ok_or_else(|| SourceError::malformed(&path, "no uptime"))
            })
    }

    fn cpu_totals(&self) -> Result<Vec<CpuTotals>, SourceError> {
        self.stat
            .lock()
            .get_or_try_insert_with(|| self.read_stat())
            .map(|s| s.cpus)
    }

    fn memory(&self) -> Result<MemoryInfo, SourceError> {
        let path = self.path("meminfo");
        self.memory
            .lock()
            .get_or_try_insert_with(|| read(&path).map(|text| parse_meminfo(&text)))
    }

    fn load_average(&self) -> Result<LoadAverage, SourceError> {
        let path = self.path("loadavg");
        self.load
            .lock()
            .get_or_try_insert_with(|| {
                let text = read(&path)?;
                parse_loadavg(&text)
                    .ok_or_else(|| SourceError::malformed(&path, "expected three load averages"))
            })
    }

    fn running_tasks(&self) -> Result<u32, SourceError> {
        self.stat
            .lock()
            .get_or_try_insert_with(|| self.read_stat())
            .map(|s| s.procs_running)
    }

    fn pids(&self) -> Result<Vec<Pid>, SourceError> {
        let entries = fs::read_dir(&self.root).map_err(|e| SourceError::io(&self.root, e))?;

        let pids = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|entry| entry.file_name().to_str().and_then(parse_pid))
            .collect();

        Ok(pids)
    }

    fn process_stat(&self, pid: Pid) -> Result<ProcStat, SourceError> {
        let path = self.pid_path(pid, "stat");
        let text = read(&path)?;
        parse_pid_stat(&text).map_err(|reason| SourceError::malformed(&path, reason))
    }

    fn process_status(&self, pid: Pid) -> Result<ProcStatus, SourceError> {
        let path = self.pid_path(pid, "status");
        read(&path).map(|text| parse_pid_status(&text))
    }

    fn command(&self, pid: Pid) -> Result<String, SourceError> {
        let path = self.pid_path(pid, "cmdline");
        let bytes = fs::read(&path).map_err(|e| SourceError::io(&path, e))?;
        Ok(parse_cmdline(&bytes))
    }

    fn user_name(&self, uid: u32) -> Result<String, SourceError> {
        self.users.resolve(uid)
    }
}

/// an empty cache that holds each value for `ttl`.
fn cache<T, C: Clock + Clone>(ttl: Duration, clock: &C) -> Mutex<TtlCache<T, C>> {
    Mutex::new(TtlCache::with_clock(ttl, clock.clone()))
}

fn read(path: &Path) -> Result<String, SourceError> {
    trace!(path = %path.display(), "reading");
    fs::read_to_string(path).map_err(|e| SourceError::io(path, e))
}

fn parse_pid(name: &str) -> Option<Pid> {
    name.bytes()
        .all(|b| b.is_ascii_digit())
        .then(|| name.parse().ok())
        .flatten()
}

/// `/proc/uptime`: seconds since boot, then idle seconds.
fn parse_uptime(text: &str) -> Option<u64> {
    let secs = text.split_whitespace().next()?.parse::<f64>().ok()?;
    (secs >= 0.0).then_some(secs as u64)
}

/// `/proc/loadavg`: `0.00 0.01 0.05 1/234 5678`.
fn parse_loadavg(text: &str) -> Option<LoadAverage> {
    let mut fields = text.split_whitespace().map(str::parse::<f64>);
    let (Some(Ok(one)), Some(Ok(five)), Some(Ok(fifteen))) =
        (fields.next(), fields.next(), fields.next())
    else {
        return None;
    };

    Some(LoadAverage { one, five, fifteen })
}

/// `/proc/meminfo`: `Key:   value kB` lines. unknown keys are skipped.
fn parse_meminfo(text: &str) -> MemoryInfo {
    let mut memory = MemoryInfo::default();

    for (key, value) in key_values(text) {
        let field = match key {
            "MemTotal" => &mut memory.total,
            "MemFree" => &mut memory.free,
            "MemAvailable" => &mut memory.available,
            "Buffers" => &mut memory.buffers,
            "Cached" => &mut memory.cached,
            "SwapCached" => &mut memory.swap_cached,
            "SReclaimable" => &mut memory.reclaimable,
            "Shmem" => &mut memory.shared,
            "SwapTotal" => &mut memory.swap_total,
            "SwapFree" => &mut memory.swap_free,
            _ => continue,
        };
        *field = value;
    }

    memory
}

/// `/proc/<pid>/status`. kernel threads have no `Vm*` lines, which leaves their memory at zero.
fn parse_pid_status(text: &str) -> ProcStatus {
    let mut status = ProcStatus::default();

    for (key, value) in key_values(text) {
        match key {
            "VmSize" => status.memory.virtual_kb = value,
            "VmRSS" => status.memory.resident_kb = value,
            "RssShmem" => status.memory.shared_kb = value,
            "Threads" => status.threads = u32::try_from(value).unwrap_or(u32::MAX),
            // the real uid comes first, followed by effective, saved and filesystem uids.
            "Uid" => status.uid = u32::try_from(value).ok(),
            _ => {}
        }
    }

    status
}

/// splits `Key:  123 kB` lines into the key and the first numeric token.
fn key_values(text: &str) -> impl Iterator<Item = (&str, u64)> {
    text.lines().filter_map(|line| {
        let (key, rest) = line.split_once(':')?;
        let value = rest.split_whitespace().next()?.parse().ok()?;
        Some((key.trim(), value))
    })
}

/// `/proc/<pid>/stat`.
///
/// the second field is the command name in parentheses, which may itself contain spaces and
/// parentheses, so fields are counted from the last `)`.
fn parse_pid_stat(text: &str) -> Result<ProcStat, String> {
    let (_, rest) = text
        .rsplit_once(')')
        .ok_or_else(|| "no command name".to_owned())?;
    let fields = rest.split_whitespace().collect::<Vec<_>>();

    let state = stat_field(&fields, 3)?
        .chars()
        .next()
        .ok_or_else(|| "empty state".to_owned())?;

    Ok(ProcStat {
        state,
        utime: stat_number(&fields, 14)?,
        stime: stat_number(&fields, 15)?,
        priority: stat_number(&fields, 18)?,
        nice: stat_number(&fields, 19)?,
    })
}

/// returns field `n` of proc_pid_stat(5), given the fields after the command name.
fn stat_field<'a>(fields: &[&'a str], n: usize) -> Result<&'a str, String> {
    // index 0 of `fields` is field 3.
    fields
        .get(n - 3)
        .copied()
        .ok_or_else(|| format!("missing field {n}"))
}

fn stat_number<T>(fields: &[&str], n: usize) -> Result<T, String>
where
    T: FromStr,
    T::Err: Display,
{
    stat_field(fields, n)?
        .parse()
        .map_err(|e| format!("field {n}: {e}"))
}

/// `/proc/<pid>/cmdline`: arguments separated by NUL bytes. kernel threads have none.
fn parse_cmdline(bytes: &[u8]) -> String {
    bytes
        .split(|b| *b == 0)
        .filter(|arg| !arg.is_empty())
        .map(String::from_utf8_lossy)
        .collect::<Vec<_>>()
        .join(" ")
}

/// `os-release(5)`: the `PRETTY_NAME` value, unquoted.
fn parse_os_release(text: &str) -> Option<String> {
    text.lines()
        .filter_map(|line| line.split_once('='))
        .find(|(key, _)| key.trim() == "PRETTY_NAME")
        .map(|(_, value)| value.trim().trim_matches(['"', '\'']).to_owned())
}
