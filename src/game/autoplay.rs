use crate::core::input::Lane;
use crate::game::gameplay::{self, PlayMode};
use log::trace;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// Wall seconds a tap stays down.
const TAP_LENGTH: f32 = 0.06;
// Song seconds a hold stays down past its end.
const HOLD_OVERRUN: f32 = 0.05;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BotAction {
    Press(Lane),
    Release(Lane),
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum ReleaseAt {
    Wall(f32),
    Song(f32),
}

/// A scripted player for headless runs. It presses each arrow at its hit
/// time, optionally off by a random amount, and in learn mode clears every
/// pending cluster.
pub struct Autoplay {
    jitter: f32,
    rng: StdRng,
    last_pressed: Option<u64>,
    next_offset: Option<(u64, f32)>,
    held: [Option<ReleaseAt>; 4],
}

impl Autoplay {
    /// `jitter` is the largest timing error, in seconds, either side.
    pub fn new(jitter: f32, seed: u64) -> Self {
        Self {
            jitter: jitter.max(0.0),
            rng: StdRng::seed_from_u64(seed),
            last_pressed: None,
            next_offset: None,
            held: [None; 4],
        }
    }

    fn offset_for(&mut self, id: u64) -> f32 {
        if let Some((pending, offset)) = self.next_offset {
            if pending == id {
                return offset;
            }
        }
        let offset = if self.jitter > 0.0 {
            self.rng.random_range(-self.jitter..=self.jitter)
        } else {
            0.0
        };
        self.next_offset = Some((id, offset));
        offset
    }

    fn press(&mut self, lane: Lane, release: ReleaseAt, actions: &mut Vec<BotAction>) {
        self.held[lane.index()] = Some(release);
        actions.push(BotAction::Press(lane));
    }

    /// What the bot does this frame. `song_time` is the clock reading and
    /// `wall` is seconds since the session began.
    pub fn step(&mut self, engine: &gameplay::State, song_time: f32, wall: f32) -> Vec<BotAction> {
        let mut actions = Vec::new();

        for lane in Lane::ALL {
            let due = match self.held[lane.index()] {
                Some(ReleaseAt::Wall(at)) => wall >= at,
                Some(ReleaseAt::Song(at)) => song_time >= at,
                None => false,
            };
            if due {
                self.held[lane.index()] = None;
                actions.push(BotAction::Release(lane));
            }
        }

        if engine.learn_paused {
            let lanes: Vec<Lane> = engine
                .pending_cluster
                .iter()
                .filter_map(|id| engine.arrows.iter().find(|a| a.id == *id))
                .map(|a| a.lane)
                .collect();
            for lane in lanes {
                if self.held[lane.index()].is_none() {
                    self.press(lane, ReleaseAt::Wall(wall + TAP_LENGTH), &mut actions);
                }
            }
            return actions;
        }
        if engine.mode == PlayMode::Learn {
            return actions;
        }

        let targets: Vec<(u64, Lane, f32, f32, bool)> = engine
            .arrows
            .iter()
            .filter(|a| a.active && !a.is_holding)
            .filter(|a| self.last_pressed.is_none_or(|last| a.id > last))
            .map(|a| (a.id, a.lane, a.hit_time, a.end_time(), a.is_hold()))
            .collect();

        for (id, lane, hit_time, end_time, is_hold) in targets {
            let offset = self.offset_for(id);
            if song_time < hit_time + offset {
                break;
            }
            self.last_pressed = Some(id);
            self.next_offset = None;
            if self.held[lane.index()].is_some() {
                trace!("Bot lane {:?} busy; skipping arrow {}", lane, id);
                continue;
            }
            let release = if is_hold {
                ReleaseAt::Song(end_time + HOLD_OVERRUN)
            } else {
                ReleaseAt::Wall(wall + TAP_LENGTH)
            };
            self.press(lane, release, &mut actions);
        }

        actions
    }
}
