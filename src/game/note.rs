use crate::core::input::Lane;
use bincode::{Decode, Encode};

/// A note as extracted from MIDI, before any chart cleanup.
#[derive(Clone, Copy, Debug, PartialEq, Encode, Decode)]
pub struct RawNote {
    pub time: f32,
    pub lane: Lane,
    pub duration: f32,
    pub pitch: u8,
    pub velocity: f32,
}

impl RawNote {
    pub fn new(time: f32, pitch: u8, duration: f32, velocity: f32) -> Self {
        Self {
            time,
            lane: Lane::from_pitch(pitch),
            duration,
            pitch,
            velocity,
        }
    }

    #[inline(always)]
    pub fn end_time(&self) -> f32 {
        self.time + self.duration
    }

    #[inline(always)]
    pub fn is_hold(&self) -> bool {
        self.duration > 0.0
    }
}

/// Finished chart notes share the raw shape; the chart owns them read-only.
pub type ChartNote = RawNote;

/// A note on screen.
#[derive(Clone, Debug, PartialEq)]
pub struct Arrow {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub lane: Lane,
    pub hit_time: f32,
    pub duration: f32,
    pub active: bool,
    pub is_holding: bool,
    // song time the hold was grabbed, and tick bonuses paid since
    pub hold_started: f32,
    pub hold_ticks_paid: u32,
}

impl Arrow {
    #[inline(always)]
    pub fn is_hold(&self) -> bool {
        self.duration > 0.0
    }

    #[inline(always)]
    pub fn end_time(&self) -> f32 {
        self.hit_time + self.duration
    }
}
