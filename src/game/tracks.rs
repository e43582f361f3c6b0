use crate::game::midi::TrackSummary;

pub const MAX_VOICED_TRACKS: usize = 5;
const MIN_NOTES: usize = 5;
const BUSY_TRACK_NOTES: usize = 1000;
const BUSY_TRACK_CAP: i32 = 500;

const DRUM_WEIGHT: i32 = 10_000;
const BASS_WEIGHT: i32 = 5_000;
const LEAD_WEIGHT: i32 = 2_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackRole {
    Drums,
    Bass,
    Lead,
    Other,
}

impl TrackRole {
    pub fn of(track: &TrackSummary) -> Self {
        if track.is_percussion {
            TrackRole::Drums
        } else if (32..=39).contains(&track.program) {
            TrackRole::Bass
        } else if (80..=95).contains(&track.program) {
            TrackRole::Lead
        } else {
            TrackRole::Other
        }
    }

    /// Mix level for the synth voice playing this role.
    pub const fn gain_db(self) -> f32 {
        match self {
            TrackRole::Drums => -6.0,
            TrackRole::Bass => -4.0,
            TrackRole::Lead | TrackRole::Other => -9.0,
        }
    }
}

/// How much a track matters for carrying the song. Nearly empty tracks score
/// -1 and are never voiced.
pub fn importance(track: &TrackSummary) -> i32 {
    if track.note_count < MIN_NOTES {
        return -1;
    }

    let role_weight = match TrackRole::of(track) {
        TrackRole::Drums => DRUM_WEIGHT,
        TrackRole::Bass => BASS_WEIGHT,
        TrackRole::Lead => LEAD_WEIGHT,
        TrackRole::Other => 0,
    };

    // melodies beat arpeggio spam
    let density = if track.note_count < BUSY_TRACK_NOTES {
        track.note_count as i32
    } else {
        BUSY_TRACK_CAP
    };

    role_weight + density
}

/// Indices of the tracks worth voicing, most important first.
pub fn select_voiced(tracks: &[TrackSummary], limit: usize) -> Vec<usize> {
    let mut scored: Vec<(usize, i32)> = tracks.iter().map(|t| (t.index, importance(t))).collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored
        .into_iter()
        .filter(|&(_, score)| score > 0)
        .take(limit)
        .map(|(index, _)| index)
        .collect()
}
