use crate::core::input::{InputSource, Lane, RawEdge};
use std::collections::HashMap;
use std::time::Instant;

// Zone boundaries as fractions of the touch surface width. The right lane
// gets the widest zone.
const ZONE_SPLITS: [f32; 3] = [0.22, 0.44, 0.67];
const HYSTERESIS: f32 = 0.10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TouchPhase {
    Start,
    Move,
    End,
    Cancel,
}

/// Maps a horizontal position (0.0 = left edge, 1.0 = right edge) to a lane.
/// The finger's current lane is widened by the hysteresis band so resting on
/// a boundary does not flicker between lanes.
pub fn lane_for_fraction(fraction: f32, current: Option<Lane>) -> Lane {
    let [mut t1, mut t2, mut t3] = ZONE_SPLITS;

    match current {
        Some(Lane::Left) => t1 += HYSTERESIS,
        Some(Lane::Down) => {
            t1 -= HYSTERESIS;
            t2 += HYSTERESIS;
        }
        Some(Lane::Up) => {
            t2 -= HYSTERESIS;
            t3 += HYSTERESIS;
        }
        Some(Lane::Right) => t3 -= HYSTERESIS,
        None => {}
    }

    if fraction < t1 {
        Lane::Left
    } else if fraction < t2 {
        Lane::Down
    } else if fraction < t3 {
        Lane::Up
    } else {
        Lane::Right
    }
}

/// Tracks fingers on the touch surface and produces raw lane edges. A lane
/// presses on its first finger and releases when its last finger leaves.
#[derive(Debug)]
pub struct TouchSurface {
    left: f32,
    width: f32,
    touches: HashMap<u64, Lane>,
    lane_counts: [u32; 4],
}

impl TouchSurface {
    pub fn new(left: f32, width: f32) -> Self {
        Self {
            left,
            width,
            touches: HashMap::new(),
            lane_counts: [0; 4],
        }
    }

    pub fn fingers_on(&self, lane: Lane) -> u32 {
        self.lane_counts[lane.index()]
    }

    fn fraction(&self, x: f32) -> f32 {
        if self.width <= 0.0 {
            return 0.0;
        }
        (x - self.left) / self.width
    }

    pub fn handle(&mut self, id: u64, phase: TouchPhase, x: f32, timestamp: Instant) -> Vec<RawEdge> {
        let old_lane = self.touches.get(&id).copied();
        let new_lane = match phase {
            TouchPhase::Start | TouchPhase::Move => {
                Some(lane_for_fraction(self.fraction(x), old_lane))
            }
            TouchPhase::End | TouchPhase::Cancel => None,
        };

        if new_lane == old_lane {
            return Vec::new();
        }

        let mut edges = Vec::with_capacity(2);

        if let Some(old) = old_lane {
            let count = &mut self.lane_counts[old.index()];
            *count = count.saturating_sub(1);
            if *count == 0 {
                edges.push(raw(old, false, timestamp));
            }
        }

        match new_lane {
            Some(lane) => {
                if self.lane_counts[lane.index()] == 0 {
                    edges.push(raw(lane, true, timestamp));
                }
                self.lane_counts[lane.index()] += 1;
                self.touches.insert(id, lane);
            }
            None => {
                self.touches.remove(&id);
            }
        }

        edges
    }
}

fn raw(lane: Lane, pressed: bool, timestamp: Instant) -> RawEdge {
    RawEdge {
        lane,
        pressed,
        repeat: false,
        source: InputSource::Touch,
        timestamp,
    }
}
