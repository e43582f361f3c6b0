pub const MAX_HEALTH: f32 = 100.0;

pub struct HealthChange;
impl HealthChange {
    pub const HIT: f32 = 2.0;
    pub const LEARN_CLEAR: f32 = 2.0;
    pub const HOLD_COMPLETE: f32 = 5.0;
    pub const HOLD_DROP: f32 = -5.0;
    // only applied in standard mode
    pub const MISS: f32 = -10.0;
}

pub const FEVER_MAX: f32 = 100.0;
pub const FEVER_MISS_PENALTY: f32 = 20.0;
/// Meter drained per song second while fever is active.
pub const FEVER_DRAIN_PER_SECOND: f32 = 10.0;
pub const FEVER_SCORE_MULTIPLIER: u32 = 2;
