use {
    crate::{
        dashboard::{Frame, Renderer, UPPER_PANEL_HEIGHT},
        format,
        meter::{Meter, load_color},
        process::ProcessRow,
        source::MemoryInfo,
    },
    crossterm::{
        ExecutableCommand, QueueableCommand, cursor,
        style::{self, Color, Stylize},
        terminal,
    },
    std::{
        io::{self, Stdout, Write},
        iter::once,
    },
};

/// column headers of the process table, padded to their column widths.
const HEADERS: [&str; 12] = [
    "    PID", "USER    ", "PRI", " NI", "  VIRT", "  RES", "  SHR", "S", "  CPU%", "  MEM%",
    "   TIME+ ", "COMMAND",
];

/// blank cells between table columns.
const COLUMN_GAP: usize = 1;

/// cpu bars stacked in one column before another column starts.
const BARS_PER_COLUMN: usize = 4;
const MIN_BAR_WIDTH: usize = 6;
const BAR_GAP: usize = 2;
const LEFT_PADDING: usize = 5;
const RIGHT_PADDING: usize = 5;
const TOP_PADDING: usize = 1;

/// paints frames onto a terminal with crossterm.
#[derive(Debug)]
pub struct Window<W = Stdout> {
    out: W,
    /// overrides the queried terminal size.
    size: Option<(u16, u16)>,
}

/// raw mode and the alternate screen, for as long as this lives.
#[derive(Debug)]
pub struct Session {
    _private: (),
}

/// === impl Window ===

impl Window {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Window<W> {
    pub fn new(out: W) -> Self {
        Self { out, size: None }
    }

    /// paints as though the terminal were `columns` by `rows`.
    pub fn with_size(out: W, columns: u16, rows: u16) -> Self {
        Self {
            out,
            size: Some((columns, rows)),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn draw_cpus(&mut self, frame: &Frame<'_>, columns: usize) -> io::Result<()> {
        let area = columns.saturating_sub(LEFT_PADDING + RIGHT_PADDING);
        let cores = &frame.cpus.cores;

        // a single core is shown as the aggregate, on one wide bar.
        if cores.len() <= 1 {
            let width = area.max(MIN_BAR_WIDTH + BAR_GAP) - BAR_GAP;
            let (x, y) = (LEFT_PADDING - 2, TOP_PADDING + 2);
            return self.draw_cpu(x, y, "CPU", frame.cpus.system, width);
        }

        let bar_columns = cores.len().div_ceil(BARS_PER_COLUMN);
        let bar_width = (area / bar_columns).max(MIN_BAR_WIDTH + BAR_GAP);
        for (i, &ratio) in cores.iter().enumerate() {
            let (column, row) = (i / BARS_PER_COLUMN, i % BARS_PER_COLUMN);
            let x = bar_width * column + LEFT_PADDING;
            let y = row + TOP_PADDING;
            self.draw_cpu(x, y, &i.to_string(), ratio, bar_width - BAR_GAP)?;
        }

        Ok(())
    }

    fn draw_cpu(&mut self, x: usize, y: usize, label: &str, ratio: f64, width: usize) -> io::Result<()> {
        let text = format!("{}%", format::percent(ratio * 100.0));
        let segments = [(ratio, load_color(ratio))];
        self.move_to(x, y)?;
        Meter {
            label,
            segments: &segments,
            text: &text,
            width,
        }
        .draw(&mut self.out)
    }

    fn draw_memory(&mut self, memory: &MemoryInfo, columns: usize) -> io::Result<()> {
        const LABEL_WIDTH: usize = 3;

        let area = columns.saturating_sub(LEFT_PADDING + RIGHT_PADDING);
        let width = (area / 2).max(MIN_BAR_WIDTH + BAR_GAP);
        let x = LEFT_PADDING + 1 - LABEL_WIDTH;
        let y = TOP_PADDING + BARS_PER_COLUMN;

        let used = memory.used();
        let text = format!(
            "{}/{}",
            format::memory(used, 1),
            format::memory(memory.total, 1)
        );
        let segments = [
            (memory.ratio(used), Color::Green),
            (memory.ratio(memory.buffers), Color::Blue),
            (memory.ratio(memory.cache()), Color::Yellow),
        ];
        self.move_to(x, y)?;
        Meter {
            label: "Mem",
            segments: &segments,
            text: &text,
            width,
        }
        .draw(&mut self.out)?;

        let text = format!(
            "{}/{}",
            format::memory(memory.swap_used(), 1),
            format::memory(memory.swap_total, 1)
        );
        let segments = [(memory.swap_ratio(), Color::Red)];
        self.move_to(x, y + 1)?;
        Meter {
            label: "Swp",
            segments: &segments,
            text: &text,
            width,
        }
        .draw(&mut self.out)
    }

    fn draw_summary(&mut self, frame: &Frame<'_>, columns: usize) -> io::Result<()> {
        let x = columns / 2;
        let y = TOP_PADDING + BARS_PER_COLUMN;
        for (i, line) in summary(frame).iter().enumerate() {
            self.move_to(x, y + i)?;
            self.out
                .queue(style::PrintStyledContent(clip(line, columns - x).cyan()))?;
        }
        Ok(())
    }

    fn draw_table(&mut self, frame: &Frame<'_>, columns: usize) -> io::Result<()> {
        let top = usize::from(UPPER_PANEL_HEIGHT);

        self.move_to(0, top)?;
        self.out.queue(style::PrintStyledContent(
            pad(&header_line(), columns).black().on_green(),
        ))?;

        let visible = frame.visible().collect::<Vec<_>>();
        for i in 0..frame.navigation.capacity {
            self.move_to(0, top + 1 + i)?;
            self.out
                .queue(terminal::Clear(terminal::ClearType::CurrentLine))?;

            let Some(&(row, selected)) = visible.get(i) else {
                continue;
            };
            let line = pad(&row_line(row, frame.memory.total), columns);
            if selected {
                self.out
                    .queue(style::PrintStyledContent(line.black().on_cyan()))?;
            } else {
                self.out.queue(style::Print(line))?;
            }
        }

        Ok(())
    }

    fn move_to(&mut self, x: usize, y: usize) -> io::Result<()> {
        let clamp = |n: usize| u16::try_from(n).unwrap_or(u16::MAX);
        self.out.queue(cursor::MoveTo(clamp(x), clamp(y))).map(drop)
    }
}

impl<W: Write> Renderer for Window<W> {
    fn size(&self) -> io::Result<(u16, u16)> {
        match self.size {
            Some(size) => Ok(size),
            None => terminal::size(),
        }
    }

    fn clear(&mut self) -> io::Result<()> {
        self.out
            .queue(terminal::Clear(terminal::ClearType::All))?
            .flush()
    }

    fn draw(&mut self, frame: &Frame<'_>) -> io::Result<()> {
        let (columns, _) = self.size()?;
        let columns = usize::from(columns);

        for y in 0..usize::from(UPPER_PANEL_HEIGHT) {
            self.move_to(0, y)?;
            self.out
                .queue(terminal::Clear(terminal::ClearType::CurrentLine))?;
        }
        self.draw_cpus(frame, columns)?;
        self.draw_memory(&frame.memory, columns)?;
        self.draw_summary(frame, columns)?;
        self.draw_table(frame, columns)?;

        self.out.queue(cursor::Hide)?;
        self.out.flush()
    }
}

/// === impl Session ===

impl Session {
    /// takes over the terminal.
    pub fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let session = Self { _private: () };
        io::stdout()
            .execute(terminal::EnterAlternateScreen)?
            .execute(cursor::Hide)?;
        Ok(session)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        // nothing useful can be done if restoring the terminal fails.
        let _ = io::stdout()
            .execute(cursor::Show)
            .and_then(|out| out.execute(terminal::LeaveAlternateScreen));
        let _ = terminal::disable_raw_mode();
    }
}

/// the lines shown right of the memory bars.
fn summary(frame: &Frame<'_>) -> [String; 5] {
    let Frame {
        host,
        load,
        uptime,
        counts,
        ..
    } = *frame;
    let threads = counts.threads.saturating_sub(counts.tasks as u64);

    [
        format!("OS: {}", host.os),
        format!("Kernel: {}", host.kernel),
        format!(
            "Tasks: {}, {threads} thr; {} running",
            counts.tasks, counts.running
        ),
        format!(
            "Load average: {:.2} {:.2} {:.2}",
            load.one, load.five, load.fifteen
        ),
        format!("Uptime: {}", format::uptime(uptime)),
    ]
}

fn header_line() -> String {
    HEADERS.join(&" ".repeat(COLUMN_GAP))
}

/// one process, laid out under [`HEADERS`].
fn row_line(row: &ProcessRow, memory_total: u64) -> String {
    let memory = if memory_total == 0 {
        0.0
    } else {
        row.memory.resident_kb as f64 / memory_total as f64 * 100.0
    };

    let fields = [
        row.pid.to_string(),
        clip(&row.owner, HEADERS[1].len()),
        row.priority.to_string(),
        row.nice.to_string(),
        format::memory(row.memory.virtual_kb, 0),
        format::memory(row.memory.resident_kb, 0),
        format::memory(row.memory.shared_kb, 0),
        row.state.to_string(),
        format::percent(row.utilization),
        format::percent(memory),
        format::cpu_time(row.cpu_time),
    ];

    let gap = " ".repeat(COLUMN_GAP);
    fields
        .iter()
        .zip(HEADERS)
        .map(|(field, header)| format!("{field:>width$}", width = header.len()))
        .chain(once(row.command.to_string()))
        .collect::<Vec<_>>()
        .join(&gap)
}

/// cuts `text` to at most `width` characters.
fn clip(text: &str, width: usize) -> String {
    text.chars().take(width).collect()
}

/// cuts or pads `text` to exactly `width` characters.
fn pad(text: &str, width: usize) -> String {
    format!("{:<width$}", clip(text, width))
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            dashboard::Navigation,
            sentinel::Recording,
            source::{HostInfo, LoadAverage, ProcessMemory},
            table::TaskCounts,
        },
        std::{sync::Arc, time::Duration},
    };

    fn row(pid: u32, command: &str) -> ProcessRow {
        ProcessRow {
            pid,
            owner: Arc::from("katelyn-the-great"),
            command: Arc::from(command),
            state: 'R',
            priority: 20,
            nice: -5,
            threads: 4,
            memory: ProcessMemory {
                virtual_kb: 2 * 1024 * 1024,
                resident_kb: 512 * 1024,
                shared_kb: 100,
            },
            utilization: 12.345,
            cpu_time: Duration::from_millis(83_470),
        }
    }

    #[test]
    fn rows_line_up_under_the_header() {
        let line = row_line(&row(4242, "cargo build"), 4 * 1024 * 1024);
        let header = header_line();

        // every column but the last ends where its header ends.
        let mut end = 0;
        for header in &HEADERS[..11] {
            end += header.len();
            assert_ne!(&line[end - 1..end], " ", "{line}");
            end += COLUMN_GAP;
        }
        assert_eq!(line.find("cargo build"), header.find("COMMAND"));
    }

    #[test]
    fn row_fields() {
        let line = row_line(&row(4242, "cargo build"), 4 * 1024 * 1024);
        assert_eq!(
            line,
            "   4242 katelyn-  20  -5     2G  512M  100K R   12.3   12.5  01:23.47 cargo build"
        );
    }

    #[test]
    fn zero_memory_total_is_not_a_division() {
        let line = row_line(&row(1, "init"), 0);
        assert!(line.contains("    0.0 "));
    }

    #[test]
    fn pads_and_clips() {
        assert_eq!(pad("abc", 5), "abc  ");
        assert_eq!(pad("abcdef", 3), "abc");
        assert_eq!(clip("abc", 10), "abc");
    }

    #[test]
    fn draws_a_frame() {
        let host = HostInfo {
            os: "Debian GNU/Linux 12 (bookworm)".to_owned(),
            kernel: "6.1.0-13-amd64".to_owned(),
        };
        let cpus = Recording {
            system: 0.5,
            cores: vec![0.1, 0.6, 0.9],
        };
        let rows = [row(1, "/sbin/init"), row(2, "sshd: kate")];
        let mut navigation = Navigation::new(5);
        navigation.set_len(rows.len());
        let frame = Frame {
            host: &host,
            cpus: &cpus,
            memory: MemoryInfo {
                total: 16_000_000,
                free: 8_000_000,
                ..MemoryInfo::default()
            },
            load: LoadAverage {
                one: 0.52,
                five: 0.58,
                fifteen: 0.59,
            },
            uptime: 90_061,
            counts: TaskCounts {
                tasks: 2,
                threads: 8,
                running: 1,
            },
            rows: &rows,
            navigation,
        };

        let mut window = Window::with_size(Vec::new(), 120, 17);
        window.draw(&frame).unwrap();
        let out = String::from_utf8(window.into_inner()).unwrap();

        for needle in [
            "OS: Debian GNU/Linux 12 (bookworm)",
            "Kernel: 6.1.0-13-amd64",
            "Tasks: 2, 6 thr; 1 running",
            "Load average: 0.52 0.58 0.59",
            "Uptime: 1 day, 01:01:01",
            "COMMAND",
            "/sbin/init",
            "sshd: kate",
            "90.0%",
            "Mem",
            "Swp",
        ] {
            assert!(out.contains(needle), "missing {needle:?}");
        }
    }
}
