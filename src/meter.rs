use {
    crossterm::{
        QueueableCommand,
        style::{self, Color, Stylize},
    },
    std::io::{self, Write},
};

/// a labelled bar of colored segments, e.g. `Mem[|||||||||      1.2G/15.6G]`.
#[derive(Clone, Debug)]
pub struct Meter<'a> {
    /// printed left of the bar.
    pub label: &'a str,
    /// each segment's share of the bar, drawn left to right.
    pub segments: &'a [(f64, Color)],
    /// printed right-aligned inside the bar.
    pub text: &'a str,
    /// total width, label and brackets included.
    pub width: usize,
}

/// === impl Meter ===

impl Meter<'_> {
    const FILL: char = '|';

    /// draws the meter at the cursor.
    pub fn draw(&self, writer: &mut impl Write) -> io::Result<()> {
        let Self {
            label, segments, text, ..
        } = *self;

        writer
            .queue(style::PrintStyledContent(label.cyan()))?
            .queue(style::PrintStyledContent("[".white().bold()))?;

        let fills = self.fills();
        for (&(_, color), &cells) in segments.iter().zip(&fills) {
            let bar = String::from(Self::FILL).repeat(cells);
            writer.queue(style::PrintStyledContent(bar.with(color)))?;
        }

        let gap = self.inner().saturating_sub(fills.iter().sum::<usize>() + text.len());
        writer
            .queue(style::Print(" ".repeat(gap)))?
            .queue(style::PrintStyledContent(text.white().bold()))?
            .queue(style::PrintStyledContent("]".white()))?;

        Ok(())
    }

    /// how many cells each segment fills.
    ///
    /// the text is never overdrawn; segments that overflow are cut short.
    pub fn fills(&self) -> Vec<usize> {
        let room = self.inner().saturating_sub(self.text.len());
        let mut left = room;
        self.segments
            .iter()
            .map(|&(ratio, _)| {
                let cells = (room as f64 * ratio.clamp(0.0, 1.0)) as usize;
                let cells = cells.min(left);
                left -= cells;
                cells
            })
            .collect()
    }

    /// cells between the brackets.
    fn inner(&self) -> usize {
        self.width.saturating_sub(self.label.len() + 2)
    }
}

/// the color of a cpu bar at `ratio` busy: green, then yellow from one half, then red from
/// four fifths.
pub fn load_color(ratio: f64) -> Color {
    if ratio < 0.5 {
        Color::Green
    } else if ratio < 0.8 {
        Color::Yellow
    } else {
        Color::Red
    }
}
