use log::debug;
use std::time::Instant;

/// The song clock the gameplay reads from. The engine never advances time
/// itself; it only asks the clock to pause, resume or change rate.
pub trait ClockSource {
    /// Song position in seconds at `now`.
    fn position(&self, now: Instant) -> f32;
    fn rate(&self) -> f32;
    fn is_paused(&self) -> bool;
    fn pause(&mut self, now: Instant);
    fn resume(&mut self, now: Instant);
    fn set_rate(&mut self, rate: f32, now: Instant);

    /// Song time at which an input stamped `timestamp` happened, given that
    /// the clock is being read at `now`.
    fn position_at(&self, timestamp: Instant, now: Instant) -> f32 {
        let position = self.position(now);
        if self.is_paused() {
            return position;
        }
        let behind = now.saturating_duration_since(timestamp).as_secs_f32();
        position - behind * self.rate()
    }
}

/// Wall-clock transport, re-anchored on every pause, resume and rate change.
#[derive(Clone, Debug)]
pub struct Transport {
    anchor: Instant,
    anchor_position: f32,
    rate: f32,
    paused: bool,
}

impl Transport {
    /// Starts playing at `start_position` seconds as of `now`.
    pub fn start_at(start_position: f32, now: Instant) -> Self {
        Self {
            anchor: now,
            anchor_position: start_position,
            rate: 1.0,
            paused: false,
        }
    }

    fn reanchor(&mut self, now: Instant) {
        self.anchor_position = self.position(now);
        self.anchor = now;
    }
}

impl ClockSource for Transport {
    fn position(&self, now: Instant) -> f32 {
        if self.paused {
            return self.anchor_position;
        }
        let elapsed = now.saturating_duration_since(self.anchor).as_secs_f32();
        self.anchor_position + elapsed * self.rate
    }

    fn rate(&self) -> f32 {
        self.rate
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn pause(&mut self, now: Instant) {
        if self.paused {
            return;
        }
        self.reanchor(now);
        self.paused = true;
        debug!("Transport paused at {:.3}s", self.anchor_position);
    }

    fn resume(&mut self, now: Instant) {
        if !self.paused {
            return;
        }
        self.anchor = now;
        self.paused = false;
        debug!("Transport resumed at {:.3}s", self.anchor_position);
    }

    fn set_rate(&mut self, rate: f32, now: Instant) {
        if !rate.is_finite() || rate <= 0.0 {
            return;
        }
        self.reanchor(now);
        self.rate = rate;
        debug!("Transport rate set to {:.2}x", rate);
    }
}
