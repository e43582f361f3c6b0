use crate::game::gameplay::GameEvent;
use log::trace;
use std::time::{Duration, Instant};

/// A MISS with no physical input this recent is a note scrolling past
/// untouched, and is not shown.
pub const GHOST_MISS_WINDOW: Duration = Duration::from_millis(300);
/// Minimum spacing between any two judgment labels on screen.
pub const MIN_LABEL_SPACING: Duration = Duration::from_millis(120);

const STATUS_WORDS: [&str; 5] = ["SCORE", "COMBO", "TIME", "READY", "WAIT"];
const JUDGMENT_WORDS: [&str; 7] = ["MISS", "BAD", "GOOD", "GREAT", "PERFECT", "MARVELOUS", "OK"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextKind {
    Status,
    Judgment,
    Other,
}

pub fn classify(text: &str) -> TextKind {
    let upper = text.to_uppercase();
    let is_number = !upper.is_empty() && upper.chars().all(|c| c.is_ascii_digit());
    if is_number || upper.chars().count() < 3 || STATUS_WORDS.iter().any(|w| upper.contains(w)) {
        return TextKind::Status;
    }
    if JUDGMENT_WORDS.iter().any(|w| upper.contains(w)) {
        return TextKind::Judgment;
    }
    TextKind::Other
}

/// Throttles judgment text. Scoring has already happened by the time text
/// reaches this filter; it only decides what is worth drawing.
#[derive(Debug, Default)]
pub struct DisplayFilter {
    last_input: Option<Instant>,
    last_judged_input: Option<Instant>,
    last_shown: Option<Instant>,
}

impl DisplayFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a physical press.
    pub fn note_input(&mut self, at: Instant) {
        self.last_input = Some(at);
    }

    pub fn admit_text(&mut self, text: &str, now: Instant) -> bool {
        if classify(text) != TextKind::Judgment {
            return true;
        }

        if text.to_uppercase().contains("MISS") {
            let recent = self
                .last_input
                .is_some_and(|at| now.saturating_duration_since(at) <= GHOST_MISS_WINDOW);
            if !recent {
                trace!("Hiding ghost miss");
                return false;
            }
        }

        // one label per physical press
        if self.last_input == self.last_judged_input {
            return false;
        }

        if let Some(shown) = self.last_shown {
            if now.saturating_duration_since(shown) < MIN_LABEL_SPACING {
                return false;
            }
        }

        self.last_shown = Some(now);
        self.last_judged_input = self.last_input;
        true
    }

    /// Whether `event` should be surfaced. Events without a caption have
    /// nothing to draw.
    pub fn admit_event(&mut self, event: &GameEvent, now: Instant) -> bool {
        match event.caption() {
            Some(caption) => self.admit_text(caption, now),
            None => false,
        }
    }
}
