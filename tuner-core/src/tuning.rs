//! # Musical Tuning Module
//!
//! Reference note table and nearest-note classification.
//!
//! The table covers C0 (~16.35 Hz) to C8 (~4186.01 Hz) in 12-tone equal
//! temperament with A4 = 440 Hz. Index 0 holds the `unknown` sentinel at 0 Hz,
//! so the whole table is strictly increasing by frequency.
//!
//! ## Direction convention
//! [`Direction`] describes the detected pitch relative to the matched note:
//! `Sharp` means the pitch is above the reference and must come down, `Flat`
//! means it is below and must come up.

use once_cell::sync::Lazy;

/// Name of the sentinel entry returned for inaudible or missing pitches.
pub const UNKNOWN_NOTE: &str = "unknown";

/// Concert pitch the table is derived from, in Hz.
pub const A4_FREQUENCY: f32 = 440.0;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// A single entry of the note table.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    /// Note name (e.g. "A4", "C#3"), or [`UNKNOWN_NOTE`].
    pub name: String,
    /// Reference frequency in Hz.
    pub frequency: f32,
}

impl Note {
    pub fn is_unknown(&self) -> bool {
        self.frequency == 0.0
    }
}

/// Tuning direction of a detected pitch relative to its matched note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Below the reference; raise the pitch.
    Flat,
    /// Above the reference; lower the pitch.
    Sharp,
    /// Within tolerance of the reference.
    InTune,
    /// No note was matched.
    Neutral,
}

/// Result of classifying a frequency against the note table.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteMatch {
    pub note: &'static Note,
    pub direction: Direction,
    /// Deviation from the matched reference in cents; `None` for the sentinel.
    pub cents: Option<f32>,
}

/// Sentinel followed by C0..=C8.
static NOTES: Lazy<Vec<Note>> = Lazy::new(|| {
    let mut notes = Vec::with_capacity(98);
    notes.push(Note {
        name: UNKNOWN_NOTE.to_string(),
        frequency: 0.0,
    });

    // Semitone 57 counted from C0 is A4.
    for semitone in 0..=96 {
        let frequency = A4_FREQUENCY * 2.0_f32.powf((semitone as f32 - 57.0) / 12.0);
        let name = format!("{}{}", NOTE_NAMES[semitone % 12], semitone / 12);
        notes.push(Note { name, frequency });
    }
    notes
});

/// The full table, sentinel first.
pub fn note_table() -> &'static [Note] {
    &NOTES
}

/// The `unknown` sentinel entry.
pub fn unknown_note() -> &'static Note {
    &NOTES[0]
}

/// Classifies `freq` to the nearest table entry.
///
/// * Below `min_frequency` (or non-finite): the sentinel, `Neutral`.
/// * Below C0 or above C8: the boundary entry, pointing outward.
/// * Otherwise the bracketing entry on the same side of their arithmetic
///   midpoint; a frequency exactly on the midpoint goes to the lower entry.
///
/// Whatever entry is chosen, a distance strictly below `tolerance_hz` from
/// its reference is reported as `InTune`, as is a frequency exactly on it.
pub fn classify(freq: f32, min_frequency: f32, tolerance_hz: f32) -> NoteMatch {
    if !freq.is_finite() || freq <= 0.0 || freq < min_frequency {
        return NoteMatch {
            note: unknown_note(),
            direction: Direction::Neutral,
            cents: None,
        };
    }

    let notes = &NOTES[1..];
    let lowest = &notes[0];
    let highest = &notes[notes.len() - 1];

    let (note, direction) = if freq < lowest.frequency {
        (lowest, Direction::Flat)
    } else if freq > highest.frequency {
        (highest, Direction::Sharp)
    } else {
        // First entry at or above `freq`; always in range after the checks above.
        let upper = notes.partition_point(|n| n.frequency < freq);
        if upper == 0 {
            (lowest, Direction::InTune)
        } else {
            let below = &notes[upper - 1];
            let above = &notes[upper];
            let midpoint = (below.frequency + above.frequency) / 2.0;
            if freq > midpoint {
                (above, Direction::Flat)
            } else {
                (below, Direction::Sharp)
            }
        }
    };

    let offset = freq - note.frequency;
    let direction = if offset.abs() < tolerance_hz || offset == 0.0 {
        Direction::InTune
    } else {
        direction
    };

    NoteMatch {
        note,
        direction,
        cents: Some(calculate_cents_deviation(freq, note.frequency)),
    }
}

/// Deviation of `freq` from `target_freq` in cents (positive = sharp).
pub fn calculate_cents_deviation(freq: f32, target_freq: f32) -> f32 {
    1200.0 * (freq / target_freq).log2()
}
