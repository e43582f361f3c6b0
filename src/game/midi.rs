//! Standard MIDI File extraction.
//!
//! Only note on/off and velocity are read, plus the tempo map and enough per
//! track metadata (program, channel, note count) for the audio layer to pick
//! which tracks to voice. Times come out in seconds using one tempo map
//! shared by every track, which is how format 1 files are meant to be read.

use crate::game::note::RawNote;
use bincode::{Decode, Encode};
use log::{debug, info, warn};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

const DEFAULT_US_PER_QUARTER: f64 = 500_000.0;
const DEFAULT_TICKS_PER_QUARTER: f64 = 480.0;
const PERCUSSION_CHANNEL: u8 = 9;

#[derive(Debug)]
pub enum MidiError {
    Io(io::Error),
    Parse(midly::Error),
}

impl From<io::Error> for MidiError {
    fn from(err: io::Error) -> Self {
        MidiError::Io(err)
    }
}

impl From<midly::Error> for MidiError {
    fn from(err: midly::Error) -> Self {
        MidiError::Parse(err)
    }
}

impl fmt::Display for MidiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiError::Io(e) => write!(f, "IO Error: {}", e),
            MidiError::Parse(e) => write!(f, "Malformed MIDI: {}", e),
        }
    }
}

impl std::error::Error for MidiError {}

/// What the audio layer needs to know about one track.
#[derive(Clone, Debug, PartialEq, Encode, Decode)]
pub struct TrackSummary {
    pub index: usize,
    pub program: u8,
    pub channel: Option<u8>,
    pub is_percussion: bool,
    pub note_count: usize,
}

#[derive(Clone, Debug, Default)]
pub struct MidiSong {
    pub notes: Vec<RawNote>,
    /// End of the last sounding note, in seconds.
    pub duration: f32,
    pub tracks: Vec<TrackSummary>,
}

struct TempoMap {
    ticks_per_quarter: f64,
    // (tick, seconds at tick, microseconds per quarter from tick on)
    segments: Vec<(u64, f64, f64)>,
    // set for SMPTE timecode files, where ticks map to time directly
    seconds_per_tick: Option<f64>,
}

impl TempoMap {
    fn build(smf: &Smf<'_>) -> Self {
        let (ticks_per_quarter, seconds_per_tick) = match smf.header.timing {
            Timing::Metrical(t) if t.as_int() > 0 => (t.as_int() as f64, None),
            Timing::Metrical(_) => (DEFAULT_TICKS_PER_QUARTER, None),
            Timing::Timecode(fps, subframes) => {
                let fps = match fps {
                    midly::Fps::Fps24 => 24.0,
                    midly::Fps::Fps25 => 25.0,
                    midly::Fps::Fps29 => 29.97,
                    midly::Fps::Fps30 => 30.0,
                };
                let per_second = fps * subframes.max(1) as f64;
                (DEFAULT_TICKS_PER_QUARTER, Some(1.0 / per_second))
            }
        };

        let mut changes: Vec<(u64, f64)> = Vec::new();
        for track in &smf.tracks {
            let mut tick: u64 = 0;
            for event in track {
                tick += event.delta.as_int() as u64;
                if let TrackEventKind::Meta(MetaMessage::Tempo(us)) = event.kind {
                    changes.push((tick, us.as_int() as f64));
                }
            }
        }
        changes.sort_by_key(|&(tick, _)| tick);

        let mut segments = vec![(0u64, 0.0f64, DEFAULT_US_PER_QUARTER)];
        for (tick, us_per_quarter) in changes {
            let seconds = seconds_in_segment(segments[segments.len() - 1], tick, ticks_per_quarter);
            if let Some(last) = segments.last_mut() {
                if last.0 == tick {
                    last.2 = us_per_quarter;
                    continue;
                }
            }
            segments.push((tick, seconds, us_per_quarter));
        }

        Self {
            ticks_per_quarter,
            segments,
            seconds_per_tick,
        }
    }

    fn seconds_at(&self, tick: u64) -> f64 {
        if let Some(per_tick) = self.seconds_per_tick {
            return tick as f64 * per_tick;
        }
        let idx = self.segments.partition_point(|&(start, _, _)| start <= tick);
        let segment = self.segments[idx.saturating_sub(1)];
        seconds_in_segment(segment, tick, self.ticks_per_quarter)
    }
}

#[inline(always)]
fn seconds_in_segment(segment: (u64, f64, f64), tick: u64, ticks_per_quarter: f64) -> f64 {
    let (start_tick, start_seconds, us_per_quarter) = segment;
    let delta = tick.saturating_sub(start_tick) as f64;
    start_seconds + delta / ticks_per_quarter * (us_per_quarter / 1_000_000.0)
}

pub fn load(path: &Path) -> Result<MidiSong, MidiError> {
    let bytes = fs::read(path)?;
    parse(&bytes)
}

pub fn parse(bytes: &[u8]) -> Result<MidiSong, MidiError> {
    let smf = Smf::parse(bytes)?;
    Ok(extract(&smf))
}

pub fn extract(smf: &Smf<'_>) -> MidiSong {
    let tempo = TempoMap::build(smf);
    let mut notes: Vec<RawNote> = Vec::new();
    let mut tracks: Vec<TrackSummary> = Vec::with_capacity(smf.tracks.len());
    let mut duration = 0.0f64;

    for (index, track) in smf.tracks.iter().enumerate() {
        let mut summary = TrackSummary {
            index,
            program: 0,
            channel: None,
            is_percussion: false,
            note_count: 0,
        };
        let mut program_seen = false;
        let mut open: HashMap<(u8, u8), VecDeque<(u64, u8)>> = HashMap::new();
        let mut tick: u64 = 0;

        let mut close = |channel: u8, key: u8, start: u64, vel: u8, end: u64, summary: &mut TrackSummary| {
            let start_s = tempo.seconds_at(start);
            let end_s = tempo.seconds_at(end).max(start_s);
            duration = duration.max(end_s);
            notes.push(RawNote::new(
                start_s as f32,
                key,
                (end_s - start_s) as f32,
                vel as f32 / 127.0,
            ));
            summary.note_count += 1;
            if summary.channel.is_none() {
                summary.channel = Some(channel);
            }
            if channel == PERCUSSION_CHANNEL {
                summary.is_percussion = true;
            }
        };

        for event in track {
            tick += event.delta.as_int() as u64;
            let TrackEventKind::Midi { channel, message } = event.kind else {
                continue;
            };
            let ch = channel.as_int();

            match message {
                MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                    open.entry((ch, key.as_int()))
                        .or_default()
                        .push_back((tick, vel.as_int()));
                }
                // NoteOn with velocity 0 is a NoteOff
                MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                    let k = key.as_int();
                    if let Some((start, vel)) = open.get_mut(&(ch, k)).and_then(VecDeque::pop_front) {
                        close(ch, k, start, vel, tick, &mut summary);
                    }
                }
                MidiMessage::ProgramChange { program } if !program_seen => {
                    summary.program = program.as_int();
                    program_seen = true;
                }
                _ => {}
            }
        }

        let mut dangling: Vec<((u8, u8), (u64, u8))> = open
            .into_iter()
            .flat_map(|(key, starts)| starts.into_iter().map(move |s| (key, s)))
            .collect();
        dangling.sort_by_key(|&((ch, key), (start, _))| (start, ch, key));
        if !dangling.is_empty() {
            debug!("Track {}: closing {} unterminated notes", index, dangling.len());
        }
        for ((ch, key), (start, vel)) in dangling {
            close(ch, key, start, vel, tick, &mut summary);
        }

        tracks.push(summary);
    }

    info!(
        "Extracted {} notes from {} tracks ({:.2}s)",
        notes.len(),
        tracks.len(),
        duration
    );

    MidiSong {
        notes,
        duration: duration as f32,
        tracks,
    }
}

/// Reads a MIDI file, falling back to an empty song when it cannot be read.
pub fn load_or_empty(path: &Path) -> MidiSong {
    match load(path) {
        Ok(song) => song,
        Err(e) => {
            warn!("Could not load MIDI {:?}: {}", path, e);
            MidiSong::default()
        }
    }
}
