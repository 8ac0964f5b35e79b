//! the consumer side of the event bus.

use {
    crate::{
        Error,
        config::Config,
        event::{Event, EventBus},
        process::ProcessRow,
        sentinel::{Recording, Sentinel},
        source::{Clock, HostInfo, LoadAverage, MemoryInfo, MetricsSource, SystemClock},
        table::{ProcessTable, TaskCounts},
    },
    crossterm::event::KeyCode,
    parking_lot::Mutex,
    std::{io, sync::Arc},
    tracing::{debug, info, trace},
};


/// rows above the table: cpu, memory and swap bars, and the system summary.
pub const UPPER_PANEL_HEIGHT: u16 = 10;

/// rows below the table, including its header.
pub const LOWER_PANEL_HEIGHT: u16 = 2;

/// how many table rows fit in a terminal `rows` tall. never less than one.
pub fn capacity(rows: u16) -> usize {
    usize::from(rows.saturating_sub(UPPER_PANEL_HEIGHT + LOWER_PANEL_HEIGHT)).max(1)
}

/// paints frames.
pub trait Renderer {
    /// the terminal size, as `(columns, rows)`.
    fn size(&self) -> io::Result<(u16, u16)>;
    /// blanks the screen ahead of a full repaint.
    fn clear(&mut self) -> io::Result<()>;
    fn draw(&mut self, frame: &Frame<'_>) -> io::Result<()>;
}

/// everything one repaint shows.
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a> {
    pub host: &'a HostInfo,
    pub cpus: &'a Recording,
    pub memory: MemoryInfo,
    pub load: LoadAverage,
    /// seconds since boot.
    pub uptime: u64,
    pub counts: TaskCounts,
    /// every tracked process, busiest first.
    pub rows: &'a [ProcessRow],
    pub navigation: Navigation,
}

/// the selected row and the window of rows that is visible.
///
/// when there are rows, `scroll <= selected < scroll + capacity` and `selected < len`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Navigation {
    /// index of the selected row.
    pub selected: usize,
    /// index of the first visible row.
    pub scroll: usize,
    /// how many rows are visible. at least one.
    pub capacity: usize,
    /// rows in the last snapshot.
    pub len: usize,
}

/// whether the consumer loop continues.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flow {
    Continue,
    Quit,
}

/// drains the event bus: the only caller of the renderer, and the only writer of layout state.
pub struct DashboardController<R, C = SystemClock> {
    config: Config,
    clock: C,
    source: Arc<dyn MetricsSource>,
    renderer: R,
    host: HostInfo,
    sentinel: Sentinel,
    /// held only to read or mutate, never across metric reads or painting.
    state: Mutex<State>,
}

struct State {
    navigation: Navigation,
    table: ProcessTable,
}

// === impl Navigation ===

impl Navigation {
    pub fn new(capacity: usize) -> Self {
        Self {
            selected: 0,
            scroll: 0,
            capacity: capacity.max(1),
            len: 0,
        }
    }

    /// moves the selection up one row, scrolling if it leaves the top. returns whether it moved.
    pub fn up(&mut self) -> bool {
        if self.selected == 0 {
            return false;
        }
        if self.selected == self.scroll {
            self.scroll -= 1;
        }
        self.selected -= 1;
        true
    }

    /// moves the selection down one row, scrolling if it leaves the bottom. returns whether it
    /// moved.
    pub fn down(&mut self) -> bool {
        if self.selected + 1 >= self.len {
            return false;
        }
        if self.selected == self.scroll + self.capacity - 1 {
            self.scroll += 1;
        }
        self.selected += 1;
        true
    }

    /// fits the view to a new capacity, pulling the selection up if it fell off the bottom.
    pub fn resize(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        if self.selected >= self.scroll + capacity {
            self.selected = self.scroll + capacity - 1;
        }
        self.capacity = capacity;
    }

    /// records the length of a new snapshot, keeping the selection on a row that exists.
    pub fn set_len(&mut self, len: usize) {
        self.len = len;
        let last = len.saturating_sub(1);
        if self.selected > last {
            self.selected = last;
        }
        if self.scroll > self.selected {
            self.scroll = self.selected;
        }
    }

    /// the indices of the visible rows.
    pub fn visible(&self) -> std::ops::Range<usize> {
        let end = (self.scroll + self.capacity).min(self.len);
        self.scroll.min(end)..end
    }
}

// === impl DashboardController ===

impl<R: Renderer> DashboardController<R> {
    pub fn new(
        config: Config,
        source: Arc<dyn MetricsSource>,
        renderer: R,
        host: HostInfo,
    ) -> Self {
        Self::with_clock(config, source, renderer, host, SystemClock)
    }
}

impl<R: Renderer, C: Clock> DashboardController<R, C> {
    pub fn with_clock(
        config: Config,
        source: Arc<dyn MetricsSource>,
        renderer: R,
        host: HostInfo,
        clock: C,
    ) -> Self {
        Self {
            config,
            clock,
            source,
            renderer,
            host,
            sentinel: Sentinel::new(),
            state: Mutex::new(State {
                navigation: Navigation::new(1),
                table: ProcessTable::new(config.refresh_interval),
            }),
        }
    }

    /// serves events until the session ends, then shuts the bus down.
    ///
    /// the bus is stopped and drained whether or not serving failed.
    pub fn run(mut self, mut bus: EventBus) -> Result<(), Error> {
        info!("dashboard running");
        let result = self.serve(&bus);

        let dropped = bus.shutdown();
        info!(dropped = dropped.len(), "dashboard stopped");
        result
    }

    fn serve(&mut self, bus: &EventBus) -> Result<(), Error> {
        self.handle(Event::Resize)?;

        while bus.is_running() {
            let Some(event) = bus.next(self.config.refresh_interval) else {
                continue;
            };
            if self.handle(event)? == Flow::Quit {
                break;
            }
        }

        Ok(())
    }

    /// reacts to one event.
    pub fn handle(&mut self, event: Event) -> Result<Flow, Error> {
        trace!(?event, "handling");
        match event {
            Event::Quit => return Ok(Flow::Quit),
            Event::KeyPress(code) => {
                if self.navigate(code) {
                    self.paint()?;
                }
            }
            Event::Resize => {
                let (_, rows) = self.renderer.size()?;
                self.state.lock().navigation.resize(capacity(rows));
                self.renderer.clear()?;
                self.paint()?;
            }
            Event::Redraw => self.paint()?,
        }

        Ok(Flow::Continue)
    }

    pub fn navigation(&self) -> Navigation {
        self.state.lock().navigation
    }

    /// applies a navigation key. returns whether the selection moved.
    fn navigate(&self, code: KeyCode) -> bool {
        let mut state = self.state.lock();
        match code {
            KeyCode::Up | KeyCode::Char('k') => state.navigation.up(),
            KeyCode::Down | KeyCode::Char('j') => state.navigation.down(),
            _ => false,
        }
    }

    /// reconciles the table, if due, reading metrics without holding the lock.
    fn refresh(&self) {
        let now = self.clock.now();
        let Some(plan) = self.state.lock().table.prepare(now) else {
            return;
        };
        let reconciliation = plan.collect(&*self.source);
        self.state.lock().table.apply(reconciliation);
    }

    fn paint(&mut self) -> Result<(), Error> {
        self.refresh();

        let source = &*self.source;
        let cpus = self
            .sentinel
            .observe(source)
            .inspect_err(|error| debug!(%error, "failed to read cpu totals"))
            .unwrap_or_default();
        let memory = source
            .memory()
            .inspect_err(|error| debug!(%error, "failed to read memory"))
            .unwrap_or_default();
        let load = source
            .load_average()
            .inspect_err(|error| debug!(%error, "failed to read load average"))
            .unwrap_or_default();
        let uptime = source
            .uptime()
            .inspect_err(|error| debug!(%error, "failed to read uptime"))
            .unwrap_or_default();

        let (rows, counts, navigation) = {
            let mut state = self.state.lock();
            let rows = state.table.snapshot();
            state.navigation.set_len(rows.len());
            (rows, state.table.counts(), state.navigation)
        };

        let frame = Frame {
            host: &self.host,
            cpus: &cpus,
            memory,
            load,
            uptime,
            counts,
            rows: &rows,
            navigation,
        };
        self.renderer.draw(&frame)?;
        Ok(())
    }
}

// === impl Frame ===

impl Frame<'_> {
    /// the visible rows, with whether each is selected.
    pub fn visible(&self) -> impl Iterator<Item = (&ProcessRow, bool)> {
        let Navigation { selected, .. } = self.navigation;
        let range = self.navigation.visible();
        let start = range.start;
        self.rows[range]
            .iter()
            .enumerate()
            .map(move |(i, row)| (row, start + i == selected))
    }
}
