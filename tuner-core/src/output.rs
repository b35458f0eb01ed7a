//! # Output Module
//!
//! Where detections go. The terminal sink keeps a single status line and
//! rewrites it in place with a carriage return after every pass.

use std::io::{self, Write};

use crate::Detection;
use crate::tuning::Direction;

/// Receives one [`Detection`] per analysis pass.
pub trait DetectionSink {
    fn emit(&mut self, detection: &Detection) -> io::Result<()>;
}

impl DetectionSink for Vec<Detection> {
    fn emit(&mut self, detection: &Detection) -> io::Result<()> {
        self.push(detection.clone());
        Ok(())
    }
}

/// Glyphs placing the pitch relative to the target: `<<` below, `>>` above.
pub fn direction_glyph(direction: Direction) -> &'static str {
    match direction {
        Direction::Flat => "<<  ",
        Direction::Sharp => "  >>",
        Direction::InTune => "=><=",
        Direction::Neutral => "    ",
    }
}

/// Renders the status line for `detection`, without line control characters.
///
/// Every field has a fixed width so a shorter line never leaves residue of a
/// longer one behind.
pub fn format_detection(detection: &Detection) -> String {
    let cents = match detection.cents {
        Some(c) => format!("{:>+7.1}c", c),
        None => " ".repeat(8),
    };
    format!(
        "{:<7} {} {:>8.2} Hz  peak {:>8.2} Hz {}",
        detection.note.name,
        direction_glyph(detection.direction),
        detection.frequency,
        detection.peak_frequency,
        cents
    )
}

/// Single-line terminal status display.
pub struct TerminalSink<W: Write> {
    out: W,
    dirty: bool,
}

impl<W: Write> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self { out, dirty: false }
    }

    /// Ends the status line and hands back the writer.
    pub fn finish(mut self) -> io::Result<W> {
        if self.dirty {
            writeln!(self.out)?;
            self.out.flush()?;
        }
        Ok(self.out)
    }
}

impl<W: Write> DetectionSink for TerminalSink<W> {
    fn emit(&mut self, detection: &Detection) -> io::Result<()> {
        write!(self.out, "\r{}", format_detection(detection))?;
        self.out.flush()?;
        self.dirty = true;
        Ok(())
    }
}
