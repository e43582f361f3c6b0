use std::fmt;

/// Outer hit window, in pixels from the target line.
pub const HIT_WINDOW_PX: f32 = 80.0;
/// An unhit arrow this far past the target line is a miss.
pub const MISS_TOLERANCE_PX: f32 = 60.0;

pub const HOLD_COMPLETE_POINTS: u32 = 100;
pub const HOLD_TICK_POINTS: u32 = 5;
/// Song seconds of holding per tick bonus.
pub const HOLD_TICK_INTERVAL: f32 = 1.0 / 18.0;
pub const LEARN_CLEAR_POINTS: u32 = 10;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tier {
    Marvelous,
    Perfect,
    Great,
    Good,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Marvelous, Tier::Perfect, Tier::Great, Tier::Good];

    /// Exclusive upper bound on distance for this tier.
    pub const fn max_distance(self) -> f32 {
        match self {
            Tier::Marvelous => 25.0,
            Tier::Perfect => 45.0,
            Tier::Great => 70.0,
            Tier::Good => HIT_WINDOW_PX,
        }
    }

    pub const fn points(self) -> u32 {
        match self {
            Tier::Marvelous => 100,
            Tier::Perfect => 50,
            Tier::Great => 20,
            Tier::Good => 10,
        }
    }

    pub const fn fever_gain(self) -> f32 {
        match self {
            Tier::Marvelous => 5.0,
            Tier::Perfect => 3.0,
            Tier::Great => 1.0,
            Tier::Good => 0.0,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Tier::Marvelous => "MARVELOUS",
            Tier::Perfect => "PERFECT",
            Tier::Great => "GREAT",
            Tier::Good => "GOOD",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Tier for a hit `distance` pixels from the target, or `None` outside the
/// hit window.
pub fn classify_distance(distance: f32) -> Option<Tier> {
    let distance = distance.abs();
    Tier::ALL.into_iter().find(|tier| distance < tier.max_distance())
}
