//! Turns raw MIDI notes into a playable chart.
//!
//! The passes run in a fixed order: sort, quantize flams onto a shared
//! timestamp, merge retriggered notes on a lane into one, collapse short holds
//! to taps, then drop chord notes that would need more fingers than the input
//! surface offers.

use crate::game::note::{ChartNote, RawNote};
use log::{debug, info};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

pub const QUANTIZE_WINDOW: f32 = 0.05;
pub const MERGE_GAP: f32 = 0.1;
pub const MIN_HOLD_SECONDS: f32 = 0.3;
const CHORD_EPSILON: f32 = 0.001;
const HOLD_EXPIRY_EPSILON: f32 = 0.0001;
const HOLD_PRIORITY_PENALTY: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputSurface {
    #[default]
    Keyboard,
    Touch,
}

impl InputSurface {
    pub const fn finger_budget(self) -> usize {
        match self {
            InputSurface::Keyboard => 4,
            InputSurface::Touch => 2,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            InputSurface::Keyboard => "Keyboard",
            InputSurface::Touch => "Touch",
        }
    }
}

impl fmt::Display for InputSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputSurface {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyboard" | "desktop" => Ok(InputSurface::Keyboard),
            "touch" | "mobile" => Ok(InputSurface::Touch),
            other => Err(format!("InputSurface '{}' must be Keyboard or Touch", other)),
        }
    }
}

/// A preprocessed chart plus the length of the song it came from.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Chart {
    pub notes: Vec<ChartNote>,
    pub song_duration: f32,
}

impl Chart {
    pub fn from_raw(raw: Vec<RawNote>, song_duration: f32, surface: InputSurface) -> Self {
        let raw_count = raw.len();
        let notes = build(raw, surface.finger_budget());
        info!(
            "Built chart: {} raw notes -> {} playable ({} fingers, {:.1}s)",
            raw_count,
            notes.len(),
            surface.finger_budget(),
            song_duration
        );
        Self { notes, song_duration }
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn last_note_time(&self) -> Option<f32> {
        self.notes.last().map(|n| n.time)
    }

    pub fn stars(&self) -> u8 {
        difficulty_stars(self.notes.len(), self.song_duration)
    }
}

#[inline(always)]
fn by_time(a: &RawNote, b: &RawNote) -> Ordering {
    a.time.total_cmp(&b.time)
}

/// Runs every pass and returns the chart ordered by (time, lane).
pub fn build(mut notes: Vec<RawNote>, finger_budget: usize) -> Vec<ChartNote> {
    notes.sort_by(by_time);
    quantize(&mut notes);
    let mut notes = merge_same_lane(notes);
    collapse_short_holds(&mut notes);
    let mut chart = enforce_finger_budget(&notes, finger_budget);
    chart.sort_by(|a, b| by_time(a, b).then(a.lane.cmp(&b.lane)));
    chart
}

/// Snaps each note onto its predecessor when their original times are closer
/// than the quantize window. Expects time-sorted input.
pub fn quantize(notes: &mut [RawNote]) {
    let mut prev_original = match notes.first() {
        Some(first) => first.time,
        None => return,
    };

    for i in 1..notes.len() {
        let original = notes[i].time;
        if (original - prev_original).abs() < QUANTIZE_WINDOW {
            notes[i].time = notes[i - 1].time;
        }
        prev_original = original;
    }
}

/// Folds a note into the last accepted note on its lane when the gap between
/// them is under `MERGE_GAP`. Expects time-sorted input.
pub fn merge_same_lane(notes: Vec<RawNote>) -> Vec<RawNote> {
    let mut accepted: Vec<RawNote> = Vec::with_capacity(notes.len());
    let mut last_on_lane: [Option<usize>; 4] = [None; 4];

    for note in notes {
        let lane = note.lane.index();
        if let Some(i) = last_on_lane[lane] {
            let prev = &mut accepted[i];
            let prev_end = prev.end_time();
            if note.time - prev_end < MERGE_GAP {
                let new_end = prev_end.max(note.end_time());
                prev.duration = new_end - prev.time;
                continue;
            }
        }
        last_on_lane[lane] = Some(accepted.len());
        accepted.push(note);
    }

    debug!("Merged chart down to {} notes", accepted.len());
    accepted
}

pub fn collapse_short_holds(notes: &mut [RawNote]) {
    for note in notes.iter_mut() {
        if note.duration < MIN_HOLD_SECONDS {
            note.duration = 0.0;
        }
    }
}

#[inline(always)]
fn priority(note: &RawNote) -> f32 {
    if note.is_hold() {
        note.velocity - HOLD_PRIORITY_PENALTY
    } else {
        note.velocity
    }
}

/// Keeps, at every chord, only as many notes as there are free fingers.
/// Holds occupy a finger until they end. Expects time-sorted input.
pub fn enforce_finger_budget(notes: &[RawNote], finger_budget: usize) -> Vec<RawNote> {
    let mut kept: Vec<RawNote> = Vec::with_capacity(notes.len());
    let mut hold_ends: Vec<f32> = Vec::new();
    let mut dropped = 0usize;

    let mut i = 0;
    while i < notes.len() {
        let t = notes[i].time;
        hold_ends.retain(|&end| end > t + HOLD_EXPIRY_EPSILON);

        let start = i;
        while i < notes.len() && (notes[i].time - t).abs() < CHORD_EPSILON {
            i += 1;
        }
        let group = &notes[start..i];

        let available = finger_budget.saturating_sub(hold_ends.len());
        if available == 0 {
            dropped += group.len();
            continue;
        }

        let mut ranked: Vec<RawNote> = group.to_vec();
        ranked.sort_by(|a, b| {
            priority(b)
                .total_cmp(&priority(a))
                .then(a.pitch.cmp(&b.pitch))
        });

        for note in ranked.iter().take(available) {
            if note.is_hold() {
                hold_ends.push(note.end_time());
            }
            kept.push(*note);
        }
        dropped += ranked.len().saturating_sub(available);
    }

    if dropped > 0 {
        debug!("Finger budget {} dropped {} notes", finger_budget, dropped);
    }
    kept
}

/// Star rating from notes per second.
pub fn difficulty_stars(note_count: usize, song_duration: f32) -> u8 {
    if song_duration <= 0.0 || note_count == 0 {
        return 1;
    }
    let nps = note_count as f32 / song_duration;
    if nps < 2.0 {
        1
    } else if nps < 4.0 {
        2
    } else if nps < 6.0 {
        3
    } else if nps < 9.0 {
        4
    } else {
        5
    }
}

pub fn stars_label(stars: u8) -> String {
    "★".repeat(stars.clamp(1, 5) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::input::Lane;

    fn tap(time: f32, pitch: u8) -> RawNote {
        RawNote::new(time, pitch, 0.0, 0.8)
    }

    fn hold(time: f32, pitch: u8, duration: f32) -> RawNote {
        RawNote::new(time, pitch, duration, 0.8)
    }

    fn times(notes: &[RawNote]) -> Vec<f32> {
        notes.iter().map(|n| n.time).collect()
    }

    #[test]
    fn quantize_snaps_flams_onto_the_first_note() {
        let mut notes = vec![tap(1.0, 60), tap(1.03, 61), tap(1.2, 62)];
        quantize(&mut notes);
        assert_eq!(times(&notes), vec![1.0, 1.0, 1.2]);
    }

    #[test]
    fn quantize_compares_against_original_times() {
        // 0.04 apart each: every step is within the window of its
        // predecessor's original time, so the whole run collapses.
        let mut notes = vec![tap(0.0, 60), tap(0.04, 61), tap(0.08, 62), tap(0.12, 63)];
        quantize(&mut notes);
        assert_eq!(times(&notes), vec![0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn quantize_is_idempotent() {
        let mut notes = vec![
            tap(0.0, 60),
            tap(0.03, 61),
            tap(0.2, 62),
            tap(0.26, 63),
            tap(0.29, 64),
            tap(0.5, 65),
            tap(0.549, 66),
        ];
        quantize(&mut notes);
        let once = times(&notes);
        quantize(&mut notes);
        assert_eq!(times(&notes), once);
        for pair in notes.windows(2) {
            let gap = pair[1].time - pair[0].time;
            assert!(gap == 0.0 || gap >= QUANTIZE_WINDOW, "gap {gap} left inside snap window");
        }
    }

    #[test]
    fn merge_spans_both_notes() {
        let merged = merge_same_lane(vec![hold(1.0, 60, 0.5), tap(1.55, 64)]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].time, 1.0);
        assert!((merged[0].end_time() - 1.55).abs() < 1e-6);

        let merged = merge_same_lane(vec![tap(1.0, 60), hold(1.05, 64, 1.0)]);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].duration - 1.05).abs() < 1e-6);
    }

    #[test]
    fn merge_keeps_the_longer_end() {
        let merged = merge_same_lane(vec![hold(1.0, 60, 2.0), tap(1.5, 64)]);
        assert_eq!(merged.len(), 1);
        assert!((merged[0].duration - 2.0).abs() < 1e-6);
    }

    #[test]
    fn merge_leaves_distant_or_other_lane_notes() {
        let merged = merge_same_lane(vec![tap(1.0, 60), tap(1.2, 64)]);
        assert_eq!(merged.len(), 2, "1.2 is 0.2s after 1.0 so it stays");
        let merged = merge_same_lane(vec![tap(1.0, 60), tap(1.0, 61)]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merge_reaches_past_other_lanes() {
        let merged = merge_same_lane(vec![tap(1.0, 60), tap(1.02, 61), hold(1.05, 64, 0.5)]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].lane, Lane::Left);
        assert!((merged[0].end_time() - 1.55).abs() < 1e-6);
        assert_eq!(merged[1].lane, Lane::Down);
    }

    #[test]
    fn cross_lane_flam_leaves_one_note_per_lane() {
        let chart = build(vec![tap(1.0, 60), tap(1.02, 61), tap(1.05, 64)], 4);
        let left = chart.iter().filter(|n| n.lane == Lane::Left).count();
        assert_eq!(left, 1);
        assert_eq!(chart.len(), 2);
        assert!(chart.iter().all(|n| n.time == 1.0));
    }

    #[test]
    fn short_holds_become_taps() {
        let mut notes = vec![hold(0.0, 60, 0.29), hold(1.0, 61, 0.3)];
        collapse_short_holds(&mut notes);
        assert_eq!(notes[0].duration, 0.0);
        assert_eq!(notes[1].duration, 0.3);
    }

    #[test]
    fn touch_budget_with_active_hold_leaves_one_chord_note() {
        let mut chord: Vec<RawNote> = (0..5u8)
            .map(|k| RawNote::new(1.0, 60 + k, 0.0, 0.5 + k as f32 * 0.1))
            .collect();
        let mut notes = vec![hold(0.0, 65, 2.0)];
        notes.append(&mut chord);

        let kept = enforce_finger_budget(&notes, InputSurface::Touch.finger_budget());
        let at_one: Vec<&RawNote> = kept.iter().filter(|n| n.time == 1.0).collect();
        assert_eq!(at_one.len(), 1);
        assert_eq!(at_one[0].pitch, 64, "loudest note wins");
    }

    #[test]
    fn full_pipeline_keeps_one_chord_note_under_touch_budget() {
        let mut raw: Vec<RawNote> = (0..5u8)
            .map(|k| RawNote::new(1.0, 60 + k, 0.0, 0.5 + k as f32 * 0.1))
            .collect();
        raw.push(hold(0.0, 65, 2.0));

        // 61 folds into the hold and 64 into 60, leaving 60, 62 and 63 to
        // compete for the one free finger
        let chart = build(raw, InputSurface::Touch.finger_budget());
        assert_eq!(chart.len(), 2);
        assert_eq!(chart[0].time, 0.0);
        assert_eq!(chart[1].pitch, 63);
    }

    #[test]
    fn ranking_prefers_taps_then_low_pitch() {
        let notes = vec![
            RawNote::new(0.0, 63, 1.0, 0.9),
            RawNote::new(0.0, 61, 0.0, 0.87),
            RawNote::new(0.0, 62, 0.0, 0.87),
        ];
        let kept = enforce_finger_budget(&notes, 2);
        let pitches: Vec<u8> = kept.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![61, 62], "hold priority 0.85 loses to 0.87 taps");
    }

    #[test]
    fn full_budget_drops_whole_group() {
        let notes = vec![
            hold(0.0, 60, 3.0),
            hold(0.0, 61, 3.0),
            tap(1.0, 62),
            tap(1.0, 63),
            tap(3.5, 62),
        ];
        let kept = enforce_finger_budget(&notes, 2);
        assert_eq!(times(&kept), vec![0.0, 0.0, 3.5]);
    }

    #[test]
    fn hold_ending_at_chord_time_frees_its_finger() {
        let notes = vec![hold(0.0, 60, 1.0), tap(1.0, 61), tap(1.0, 62)];
        let kept = enforce_finger_budget(&notes, 2);
        assert_eq!(kept.len(), 3);
    }

    #[test]
    fn finger_budget_is_never_exceeded() {
        let mut raw = Vec::new();
        for step in 0..40u8 {
            let t = step as f32 * 0.25;
            for k in 0..4u8 {
                let duration = if (step + k) % 3 == 0 { 0.9 } else { 0.0 };
                raw.push(RawNote::new(t, 48 + step % 7 + k * 5, duration, 0.3 + k as f32 * 0.15));
            }
        }

        for surface in [InputSurface::Touch, InputSurface::Keyboard] {
            let budget = surface.finger_budget();
            let chart = build(raw.clone(), budget);
            for sample in &chart {
                let t = sample.time;
                let busy = chart
                    .iter()
                    .filter(|n| {
                        (n.time - t).abs() < CHORD_EPSILON
                            || (n.time < t && n.end_time() > t + HOLD_EXPIRY_EPSILON)
                    })
                    .count();
                assert!(busy <= budget, "{busy} fingers needed at {t} with budget {budget}");
            }
        }
    }

    #[test]
    fn chart_is_ordered_by_time_then_lane() {
        let chart = build(vec![tap(2.0, 63), tap(1.0, 62), tap(1.0, 60)], 4);
        let order: Vec<(f32, Lane)> = chart.iter().map(|n| (n.time, n.lane)).collect();
        assert_eq!(order, vec![(1.0, Lane::Left), (1.0, Lane::Up), (2.0, Lane::Right)]);
    }

    #[test]
    fn empty_input_builds_empty_chart() {
        let chart = Chart::from_raw(Vec::new(), 0.0, InputSurface::Keyboard);
        assert!(chart.is_empty());
        assert_eq!(chart.stars(), 1);
    }

    #[test]
    fn stars_follow_notes_per_second() {
        assert_eq!(difficulty_stars(10, 0.0), 1);
        assert_eq!(difficulty_stars(0, 10.0), 1);
        assert_eq!(difficulty_stars(19, 10.0), 1);
        assert_eq!(difficulty_stars(20, 10.0), 2);
        assert_eq!(difficulty_stars(59, 10.0), 3);
        assert_eq!(difficulty_stars(89, 10.0), 4);
        assert_eq!(difficulty_stars(90, 10.0), 5);
        assert_eq!(stars_label(3), "★★★");
    }

    #[test]
    fn surface_parses_from_config_values() {
        assert_eq!("touch".parse::<InputSurface>(), Ok(InputSurface::Touch));
        assert_eq!(" Keyboard ".parse::<InputSurface>(), Ok(InputSurface::Keyboard));
        assert!("gamepad".parse::<InputSurface>().is_err());
    }
}
