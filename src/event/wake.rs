//! waking a thread from a signal handler.
//!
//! a signal handler may only do async-signal-safe work, so the `SIGWINCH` handler here writes
//! one byte to a pipe and returns. an ordinary thread blocks in `poll(2)` on the other end.

use {
    std::{
        fmt, io,
        os::fd::{AsFd, AsRawFd, FromRawFd, OwnedFd},
        sync::atomic::{AtomicI32, Ordering},
    },
    tracing::debug,
};

/// written by the signal handler.
const SIGNAL: u8 = 1;
/// written by [`Waker::stop`]; ends the waiting thread.
const STOP: u8 = b'q';

/// the write end the `SIGWINCH` handler uses, or -1 when no handler is installed.
static SIGNAL_FD: AtomicI32 = AtomicI32::new(-1);

/// a self-pipe. writes from a [`Waker`] or the resize handler wake the thread waiting on it.
#[derive(Debug)]
pub struct WakeChannel {
    read: OwnedFd,
    write: OwnedFd,
}

/// a handle that can wake the thread waiting on a [`WakeChannel`].
#[derive(Debug)]
pub struct Waker {
    write: OwnedFd,
}

/// why [`WakeChannel::wait`] returned.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Wake {
    /// one or more signals arrived. bursts are coalesced.
    Signal,
    /// the channel was asked to stop.
    Stop,
}

/// routes `SIGWINCH` to a [`WakeChannel`] until dropped.
pub struct ResizeSignal {
    /// keeps the descriptor in [`SIGNAL_FD`] open.
    write: OwnedFd,
    previous: libc::sigaction,
}

// === impl WakeChannel ===

impl WakeChannel {
    pub fn new() -> io::Result<Self> {
        let mut fds = [-1; 2];
        // SAFETY: `fds` has room for the two descriptors `pipe2` writes.
        let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) };
        if rc == -1 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: `pipe2` succeeded, so both descriptors are open and owned by nobody else.
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
        Ok(Self { read, write })
    }

    pub fn waker(&self) -> io::Result<Waker> {
        self.write.try_clone().map(|write| Waker { write })
    }

    /// blocks until the channel is woken, then drains it.
    pub fn wait(&self) -> io::Result<Wake> {
        loop {
            let mut pollfd = libc::pollfd {
                fd: self.read.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            };
            // SAFETY: `pollfd` is a single valid entry and outlives the call.
            let rc = unsafe { libc::poll(&mut pollfd, 1, -1) };
            match rc {
                -1 => {
                    let error = io::Error::last_os_error();
                    if error.kind() == io::ErrorKind::Interrupted {
                        continue;
                    }
                    return Err(error);
                }
                0 => continue,
                _ => {}
            }

            match self.drain()? {
                Some(wake) => return Ok(wake),
                None => continue,
            }
        }
    }

    /// reads everything queued in the pipe. a stop request wins over any signals.
    fn drain(&self) -> io::Result<Option<Wake>> {
        let mut wake = None;
        let mut buf = [0u8; 64];
        loop {
            // SAFETY: `buf` is valid for writes of its whole length.
            let n = unsafe {
                libc::read(
                    self.read.as_raw_fd(),
                    buf.as_mut_ptr().cast(),
                    buf.len(),
                )
            };
            match n {
                -1 => {
                    let error = io::Error::last_os_error();
                    match error.kind() {
                        io::ErrorKind::WouldBlock => return Ok(wake),
                        io::ErrorKind::Interrupted => continue,
                        _ => return Err(error),
                    }
                }
                // every write end is closed; nothing can wake us again.
                0 => return Ok(Some(Wake::Stop)),
                n => {
                    let bytes = &buf[..n as usize];
                    if bytes.contains(&STOP) {
                        wake = Some(Wake::Stop);
                    } else if wake.is_none() {
                        wake = Some(Wake::Signal);
                    }
                }
            }
        }
    }
}

// === impl Waker ===

impl Waker {
    /// wakes the waiting thread as though a signal arrived.
    pub fn wake(&self) -> io::Result<()> {
        write_byte(self.write.as_raw_fd(), SIGNAL)
    }

    /// wakes the waiting thread and asks it to stop.
    pub fn stop(&self) -> io::Result<()> {
        write_byte(self.write.as_raw_fd(), STOP)
    }
}

/// writes one byte, without blocking. a full pipe already holds a pending wakeup.
fn write_byte(fd: i32, byte: u8) -> io::Result<()> {
    loop {
        // SAFETY: writes one byte from a live stack value.
        let n = unsafe { libc::write(fd, (&byte as *const u8).cast(), 1) };
        if n == 1 {
            return Ok(());
        }

        let error = io::Error::last_os_error();
        match error.kind() {
            io::ErrorKind::Interrupted => continue,
            io::ErrorKind::WouldBlock => return Ok(()),
            _ => return Err(error),
        }
    }
}

// === impl ResizeSignal ===

impl ResizeSignal {
    /// installs a `SIGWINCH` handler that wakes `channel`.
    ///
    /// only one handler may be installed at a time.
    pub fn install(channel: &WakeChannel) -> io::Result<Self> {
        let write = channel.write.as_fd().try_clone_to_owned()?;
        SIGNAL_FD
            .compare_exchange(-1, write.as_raw_fd(), Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| {
                io::Error::new(io::ErrorKind::AlreadyExists, "a resize handler is installed")
            })?;

        // SAFETY: a zeroed `sigaction` is a valid value to fill in.
        let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
        action.sa_sigaction = on_resize as extern "C" fn(libc::c_int) as libc::sighandler_t;
        action.sa_flags = libc::SA_RESTART;
        // SAFETY: `sa_mask` is a valid signal set owned by `action`.
        unsafe { libc::sigemptyset(&mut action.sa_mask) };

        // SAFETY: as above.
        let mut previous: libc::sigaction = unsafe { std::mem::zeroed() };
        // SAFETY: `action` and `previous` are valid for the duration of the call.
        if unsafe { libc::sigaction(libc::SIGWINCH, &action, &mut previous) } == -1 {
            let error = io::Error::last_os_error();
            SIGNAL_FD.store(-1, Ordering::Release);
            return Err(error);
        }

        debug!("installed resize handler");
        Ok(Self { write, previous })
    }
}

impl fmt::Debug for ResizeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResizeSignal")
            .field("write", &self.write)
            .finish_non_exhaustive()
    }
}

impl Drop for ResizeSignal {
    fn drop(&mut self) {
        // the handler may still run until the old disposition is back, so it must find no fd.
        SIGNAL_FD.store(-1, Ordering::Release);
        // SAFETY: restores the disposition saved by `install`.
        unsafe { libc::sigaction(libc::SIGWINCH, &self.previous, std::ptr::null_mut()) };
        debug!(fd = self.write.as_raw_fd(), "removed resize handler");
    }
}

extern "C" fn on_resize(_: libc::c_int) {
    // SAFETY: `__errno_location` is async-signal-safe and always returns a valid pointer.
    let errno = unsafe { *libc::__errno_location() };

    let fd = SIGNAL_FD.load(Ordering::Acquire);
    if fd >= 0 {
        let byte = SIGNAL;
        // SAFETY: `write(2)` is async-signal-safe; a failure here has nowhere to go.
        unsafe { libc::write(fd, (&byte as *const u8).cast(), 1) };
    }

    // SAFETY: as above.
    unsafe { *libc::__errno_location() = errno };
}
