use log::{debug, trace};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// A release arriving sooner than this after its press is held back until the
/// window closes, so contact jitter merges into one continuous press.
pub const MIN_PRESS: Duration = Duration::from_millis(50);
/// Presses closer together than this on one lane are discarded.
pub const MIN_INTER_PRESS: Duration = Duration::from_millis(80);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, bincode::Encode, bincode::Decode)]
#[repr(u8)]
pub enum Lane {
    Left,
    Down,
    Up,
    Right,
}

impl Lane {
    pub const ALL: [Lane; 4] = [Lane::Left, Lane::Down, Lane::Up, Lane::Right];

    #[inline(always)]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline(always)]
    pub const fn from_index(index: usize) -> Option<Lane> {
        match index {
            0 => Some(Lane::Left),
            1 => Some(Lane::Down),
            2 => Some(Lane::Up),
            3 => Some(Lane::Right),
            _ => None,
        }
    }

    /// Lane assignment for a MIDI key.
    #[inline(always)]
    pub const fn from_pitch(pitch: u8) -> Lane {
        match pitch % 4 {
            0 => Lane::Left,
            1 => Lane::Down,
            2 => Lane::Up,
            _ => Lane::Right,
        }
    }

    pub const fn glyph(self) -> &'static str {
        match self {
            Lane::Left => "◄",
            Lane::Down => "▼",
            Lane::Up => "▲",
            Lane::Right => "►",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputSource {
    Keyboard,
    Touch,
}

/// A hardware edge as delivered by a keyboard or touch driver.
#[derive(Clone, Copy, Debug)]
pub struct RawEdge {
    pub lane: Lane,
    pub pressed: bool,
    pub repeat: bool,
    pub source: InputSource,
    pub timestamp: Instant,
}

/// A debounced logical edge, ready for the judgment engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InputEdge {
    pub lane: Lane,
    pub pressed: bool,
    pub source: InputSource,
    pub timestamp: Instant,
}

#[inline(always)]
pub fn lane_from_key_name(code: &str) -> Option<Lane> {
    match code {
        "ArrowLeft" | "KeyA" => Some(Lane::Left),
        "ArrowDown" | "KeyS" => Some(Lane::Down),
        "ArrowUp" | "KeyW" => Some(Lane::Up),
        "ArrowRight" | "KeyD" => Some(Lane::Right),
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct LaneGate {
    held: bool,
    last_press: Option<Instant>,
    pending_release: Option<(Instant, InputSource)>,
}

/// Logical per-lane input state, as seen after debouncing.
#[derive(Clone, Debug, Default)]
pub struct InputState {
    lanes: [LaneGate; 4],
}

impl InputState {
    #[inline(always)]
    pub fn is_held(&self, lane: Lane) -> bool {
        self.lanes[lane.index()].held
    }

    #[inline(always)]
    pub fn last_press(&self, lane: Lane) -> Option<Instant> {
        self.lanes[lane.index()].last_press
    }

    pub fn held_lanes(&self) -> [bool; 4] {
        Lane::ALL.map(|lane| self.is_held(lane))
    }
}

/// Turns raw hardware edges into logical press/release events.
#[derive(Debug, Default)]
pub struct Debouncer {
    state: InputState,
    ready: VecDeque<InputEdge>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &InputState {
        &self.state
    }

    /// Feeds one hardware edge. Any delayed release that fell due before the
    /// edge's timestamp is delivered first.
    pub fn feed(&mut self, raw: RawEdge) {
        self.poll(raw.timestamp);

        if raw.pressed {
            self.on_press(raw);
        } else {
            self.on_release(raw);
        }
    }

    fn on_press(&mut self, raw: RawEdge) {
        if raw.repeat {
            trace!("Dropping auto-repeat on {:?}", raw.lane);
            return;
        }

        let last_press = self.state.last_press(raw.lane);
        let gate = &mut self.state.lanes[raw.lane.index()];

        if gate.pending_release.take().is_some() {
            debug!("Merged jitter release/press on {:?}", raw.lane);
            return;
        }

        if let Some(last) = last_press {
            if raw.timestamp.saturating_duration_since(last) < MIN_INTER_PRESS {
                debug!("Discarding rapid re-press on {:?}", raw.lane);
                return;
            }
        }

        gate.held = true;
        gate.last_press = Some(raw.timestamp);
        self.ready.push_back(InputEdge {
            lane: raw.lane,
            pressed: true,
            source: raw.source,
            timestamp: raw.timestamp,
        });
    }

    fn on_release(&mut self, raw: RawEdge) {
        let gate = &mut self.state.lanes[raw.lane.index()];
        if !gate.held || gate.pending_release.is_some() {
            return;
        }

        let held_for = gate
            .last_press
            .map_or(MIN_PRESS, |last| raw.timestamp.saturating_duration_since(last));

        if held_for < MIN_PRESS {
            let due = gate.last_press.map_or(raw.timestamp, |last| last + MIN_PRESS);
            gate.pending_release = Some((due, raw.source));
            return;
        }

        gate.held = false;
        self.ready.push_back(InputEdge {
            lane: raw.lane,
            pressed: false,
            source: raw.source,
            timestamp: raw.timestamp,
        });
    }

    /// Delivers every delayed release due at or before `now`.
    pub fn poll(&mut self, now: Instant) {
        for lane in Lane::ALL {
            let gate = &mut self.state.lanes[lane.index()];
            let Some((due, source)) = gate.pending_release else {
                continue;
            };
            if due > now {
                continue;
            }
            gate.pending_release = None;
            gate.held = false;
            self.ready.push_back(InputEdge {
                lane,
                pressed: false,
                source,
                timestamp: due,
            });
        }
    }

    #[inline(always)]
    pub fn next_edge(&mut self) -> Option<InputEdge> {
        self.ready.pop_front()
    }
}
