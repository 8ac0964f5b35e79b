//! the event bus.
//!
//! three producers, a key listener, a ticker and a resize watcher, feed one queue drained by a
//! single consumer.

use {
    crate::{Error, config::Config},
    crossterm::event::KeyCode,
    std::{
        sync::{
            Arc,
            atomic::{AtomicBool, Ordering},
        },
        thread::{self, JoinHandle},
        time::Duration,
    },
    tracing::{debug, error, info},
};

pub use self::{
    input::{KeySource, TerminalKeys},
    queue::EventQueue,
    wake::{ResizeSignal, Wake, WakeChannel, Waker},
};

#[cfg(test)]
pub(crate) use self::input::mock::ScriptedKeys;

mod input;
mod queue;
mod ticker;
mod wake;

/// something the dashboard must react to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Event {
    /// the session is over.
    Quit,
    KeyPress(KeyCode),
    /// the terminal changed size.
    Resize,
    /// time to sample and repaint.
    Redraw,
}

/// owns the event queue, the shared running flag and every producer thread.
#[derive(Debug)]
pub struct EventBus {
    queue: Arc<EventQueue<Event>>,
    running: Arc<AtomicBool>,
    producers: Vec<Producer>,
    /// stops the resize watcher, if there is one.
    waker: Option<Waker>,
    /// routes `SIGWINCH` to the resize watcher, if installed.
    signal: Option<ResizeSignal>,
}

#[derive(Debug)]
struct Producer {
    name: &'static str,
    handle: JoinHandle<()>,
}

// === impl EventBus ===

impl EventBus {
    pub fn new() -> Self {
        Self {
            queue: Arc::new(EventQueue::new()),
            running: Arc::new(AtomicBool::new(true)),
            producers: Vec::new(),
            waker: None,
            signal: None,
        }
    }

    /// starts every producer against the controlling terminal.
    pub fn start(config: &Config) -> Result<Self, Error> {
        let mut bus = Self::new();
        bus.spawn_input(TerminalKeys, config.refresh_interval, config.quit_key)?;
        bus.spawn_ticker(config.refresh_interval)?;
        bus.watch_resize()?;
        info!(producers = bus.producers.len(), "event bus started");
        Ok(bus)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// the flag shared with every producer.
    pub fn running(&self) -> &Arc<AtomicBool> {
        &self.running
    }

    pub fn push(&self, event: Event) {
        self.queue.push(event);
    }

    /// waits up to `timeout` for the next event.
    pub fn next(&self, timeout: Duration) -> Option<Event> {
        self.queue.pop_timeout(timeout)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// forwards key presses from `keys`, polling at least once per `interval`.
    pub fn spawn_input(
        &mut self,
        keys: impl KeySource + 'static,
        interval: Duration,
        quit_key: KeyCode,
    ) -> Result<(), Error> {
        let (queue, running) = (self.queue.clone(), self.running.clone());
        self.spawn("input", move || {
            input::listen(keys, &queue, &running, interval, quit_key)
        })
    }

    /// pushes a redraw every `interval`.
    pub fn spawn_ticker(&mut self, interval: Duration) -> Result<(), Error> {
        let (queue, running) = (self.queue.clone(), self.running.clone());
        self.spawn("ticker", move || ticker::tick(&queue, &running, interval))
    }

    /// pushes a resize whenever the terminal changes size.
    pub fn watch_resize(&mut self) -> Result<(), Error> {
        let channel = WakeChannel::new().map_err(Error::Signal)?;
        let signal = ResizeSignal::install(&channel).map_err(Error::Signal)?;
        self.spawn_resize_watcher(channel)?;
        self.signal = Some(signal);
        Ok(())
    }

    /// pushes a resize whenever `channel` is woken.
    pub fn spawn_resize_watcher(&mut self, channel: WakeChannel) -> Result<(), Error> {
        let waker = channel.waker().map_err(Error::Signal)?;
        let (queue, running) = (self.queue.clone(), self.running.clone());
        self.spawn("resize", move || {
            watch(&channel, &queue, &running);
        })?;
        self.waker = Some(waker);
        Ok(())
    }

    /// stops and joins every producer, then returns whatever was left in the queue.
    ///
    /// every producer observes the cleared flag within one refresh interval, and the resize
    /// watcher is woken by its stop byte.
    pub fn shutdown(&mut self) -> Vec<Event> {
        self.running.store(false, Ordering::Release);

        if let Some(waker) = self.waker.take() {
            if let Err(error) = waker.stop() {
                error!(%error, "failed to stop the resize watcher");
            }
        }

        for Producer { name, handle } in self.producers.drain(..) {
            match handle.join() {
                Ok(()) => debug!(name, "producer stopped"),
                Err(_) => error!(name, "producer panicked"),
            }
        }
        self.signal.take();

        let drained = self.queue.drain();
        debug!(drained = drained.len(), "event bus stopped");
        drained
    }

    fn spawn(
        &mut self,
        name: &'static str,
        f: impl FnOnce() + Send + 'static,
    ) -> Result<(), Error> {
        let handle = thread::Builder::new()
            .name(format!("vantage-{name}"))
            .spawn(f)
            .map_err(|source| Error::Spawn { name, source })?;
        self.producers.push(Producer { name, handle });
        Ok(())
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if !self.producers.is_empty() {
            self.shutdown();
        }
    }
}

/// pushes a [`Event::Resize`] for every wakeup of `channel`, until it is stopped.
fn watch(channel: &WakeChannel, queue: &EventQueue<Event>, running: &AtomicBool) {
    loop {
        match channel.wait() {
            Ok(Wake::Signal) if running.load(Ordering::Acquire) => queue.push(Event::Resize),
            Ok(Wake::Signal) => {}
            Ok(Wake::Stop) => return,
            Err(error) => {
                error!(%error, "resize watcher failed");
                return;
            }
        }
    }
}
