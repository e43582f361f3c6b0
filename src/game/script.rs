//! Recorded input for headless runs, one event per line:
//!
//! ```text
//! # seconds  what
//! 1.000 key ArrowLeft down
//! 1.060 key ArrowLeft up
//! 2.500 touch 7 start 40
//! 3.000 pause
//! 3.500 speed -1
//! ```
//!
//! Times are wall seconds since the session started.

use crate::core::touch::TouchPhase;
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

#[derive(Clone, Debug, PartialEq)]
pub enum ScriptAction {
    Key { code: String, pressed: bool },
    Touch { id: u64, phase: TouchPhase, x: f32 },
    TogglePause,
    Speed(i32),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScriptEvent {
    pub at: f32,
    pub action: ScriptAction,
}

#[derive(Debug)]
pub enum ScriptError {
    Io(io::Error),
    Line { line: usize, reason: String },
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Io(e) => write!(f, "IO Error: {}", e),
            ScriptError::Line { line, reason } => write!(f, "Line {}: {}", line, reason),
        }
    }
}

impl Error for ScriptError {}

impl From<io::Error> for ScriptError {
    fn from(e: io::Error) -> Self {
        ScriptError::Io(e)
    }
}

fn parse_touch_phase(s: &str) -> Option<TouchPhase> {
    match s.to_ascii_lowercase().as_str() {
        "start" => Some(TouchPhase::Start),
        "move" => Some(TouchPhase::Move),
        "end" => Some(TouchPhase::End),
        "cancel" => Some(TouchPhase::Cancel),
        _ => None,
    }
}

fn parse_action(words: &[&str]) -> Result<ScriptAction, String> {
    match words {
        ["key", code, state] => {
            let pressed = match state.to_ascii_lowercase().as_str() {
                "down" => true,
                "up" => false,
                other => return Err(format!("key state '{}' must be down or up", other)),
            };
            Ok(ScriptAction::Key {
                code: code.to_string(),
                pressed,
            })
        }
        ["touch", id, phase, x] => {
            let id = id.parse().map_err(|_| format!("bad touch id '{}'", id))?;
            let phase = parse_touch_phase(phase).ok_or_else(|| format!("bad touch phase '{}'", phase))?;
            let x = x.parse().map_err(|_| format!("bad touch position '{}'", x))?;
            Ok(ScriptAction::Touch { id, phase, x })
        }
        ["pause"] => Ok(ScriptAction::TogglePause),
        ["speed", steps] => steps
            .parse()
            .map(ScriptAction::Speed)
            .map_err(|_| format!("bad speed step '{}'", steps)),
        _ => Err(format!("unrecognised event '{}'", words.join(" "))),
    }
}

pub fn parse(text: &str) -> Result<Vec<ScriptEvent>, ScriptError> {
    let mut events = Vec::new();
    for (index, raw) in text.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let words: Vec<&str> = line.split_whitespace().collect();
        let bad = |reason: String| ScriptError::Line {
            line: index + 1,
            reason,
        };

        let at: f32 = words[0]
            .parse()
            .map_err(|_| bad(format!("bad time '{}'", words[0])))?;
        if !at.is_finite() || at < 0.0 {
            return Err(bad(format!("time {} must be a non-negative number", at)));
        }
        let action = parse_action(&words[1..]).map_err(bad)?;
        events.push(ScriptEvent { at, action });
    }
    events.sort_by(|a, b| a.at.total_cmp(&b.at));
    Ok(events)
}

pub fn load(path: &Path) -> Result<Vec<ScriptEvent>, ScriptError> {
    let text = fs::read_to_string(path)?;
    parse(&text)
}
