use crate::game::chart::{Chart, InputSurface};
use crate::game::midi::{self, TrackSummary};
use crate::game::note::ChartNote;
use bincode::{Decode, Encode};
use log::{info, warn};
use std::error::Error;
use std::fmt;
use std::fs;
use std::hash::Hasher;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use twox_hash::XxHash64;

#[derive(Debug)]
pub enum CacheError {
    Io(io::Error),
    Encode(bincode::error::EncodeError),
    Decode(bincode::error::DecodeError),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Io(e) => write!(f, "IO Error: {}", e),
            CacheError::Encode(e) => write!(f, "Could not encode chart: {}", e),
            CacheError::Decode(e) => write!(f, "Could not decode cached chart: {}", e),
        }
    }
}

impl Error for CacheError {}

impl From<io::Error> for CacheError {
    fn from(e: io::Error) -> Self {
        CacheError::Io(e)
    }
}

impl From<bincode::error::EncodeError> for CacheError {
    fn from(e: bincode::error::EncodeError) -> Self {
        CacheError::Encode(e)
    }
}

impl From<bincode::error::DecodeError> for CacheError {
    fn from(e: bincode::error::DecodeError) -> Self {
        CacheError::Decode(e)
    }
}

#[derive(Encode, Decode)]
struct CachedChart {
    source_hash: u64,
    finger_budget: u32,
    song_duration: f32,
    notes: Vec<ChartNote>,
    tracks: Vec<TrackSummary>,
}

/// A preprocessed chart together with the track metadata the audio layer
/// voices it with.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadedSong {
    pub chart: Chart,
    pub tracks: Vec<TrackSummary>,
}

/// Hash of the MIDI file contents and the finger budget it is charted for.
pub fn content_hash(path: &Path, surface: InputSurface) -> Result<u64, io::Error> {
    let mut file = fs::File::open(path)?;
    let mut hasher = XxHash64::with_seed(0);
    let mut buffer = [0; 8192];
    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.write(&buffer[..bytes_read]);
    }
    hasher.write(&(surface.finger_budget() as u32).to_le_bytes());
    Ok(hasher.finish())
}

/// Preprocessed charts on disk, one bincode file per content hash.
#[derive(Clone, Debug)]
pub struct ChartCache {
    dir: PathBuf,
    // read cached charts
    fastload: bool,
    // write freshly built charts
    cache_charts: bool,
}

impl ChartCache {
    pub fn new(dir: impl Into<PathBuf>, fastload: bool, cache_charts: bool) -> Self {
        Self {
            dir: dir.into(),
            fastload,
            cache_charts,
        }
    }

    fn path_for(&self, hash: u64) -> PathBuf {
        self.dir.join(format!("{:x}.bin", hash))
    }

    pub fn lookup(&self, hash: u64, surface: InputSurface) -> Result<Option<LoadedSong>, CacheError> {
        let path = self.path_for(hash);
        if !path.exists() {
            return Ok(None);
        }
        let buffer = fs::read(&path)?;
        let (cached, _) =
            bincode::decode_from_slice::<CachedChart, _>(&buffer, bincode::config::standard())?;
        if cached.source_hash != hash || cached.finger_budget as usize != surface.finger_budget() {
            info!("Cache stale for: {:?}", path.file_name().unwrap_or_default());
            return Ok(None);
        }
        Ok(Some(LoadedSong {
            chart: Chart {
                notes: cached.notes,
                song_duration: cached.song_duration,
            },
            tracks: cached.tracks,
        }))
    }

    pub fn store(&self, hash: u64, surface: InputSurface, song: &LoadedSong) -> Result<(), CacheError> {
        fs::create_dir_all(&self.dir)?;
        let cached = CachedChart {
            source_hash: hash,
            finger_budget: surface.finger_budget() as u32,
            song_duration: song.chart.song_duration,
            notes: song.chart.notes.clone(),
            tracks: song.tracks.clone(),
        };
        let encoded = bincode::encode_to_vec(&cached, bincode::config::standard())?;
        fs::write(self.path_for(hash), encoded)?;
        Ok(())
    }

    /// Builds the chart for the MIDI file at `path`, going through the cache
    /// when enabled. Cache problems are logged and never fail the load; an
    /// unreadable or malformed file yields an empty chart.
    pub fn load_chart(&self, path: &Path, surface: InputSurface) -> LoadedSong {
        let hash = match content_hash(path, surface) {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!("Failed to hash {:?}: {}. Caching disabled for it.", path, e);
                None
            }
        };

        if let Some(hash) = hash {
            if self.fastload {
                match self.lookup(hash, surface) {
                    Ok(Some(song)) => {
                        info!("Cache hit for: {:?}", path.file_name().unwrap_or_default());
                        return song;
                    }
                    Ok(None) => info!("Cache miss for: {:?}", path.file_name().unwrap_or_default()),
                    Err(e) => warn!("Could not read cached chart {:x}: {}", hash, e),
                }
            } else {
                info!("Building chart for {:?} (fastload disabled)", path.file_name().unwrap_or_default());
            }
        }

        let midi = midi::load_or_empty(path);
        let song = LoadedSong {
            chart: Chart::from_raw(midi.notes, midi.duration, surface),
            tracks: midi.tracks,
        };

        // an empty chart usually means the file was unreadable
        if let Some(hash) = hash.filter(|_| self.cache_charts && !song.chart.is_empty()) {
            if let Err(e) = self.store(hash, surface, &song) {
                warn!("Failed to write cache file for chart {:x}: {}", hash, e);
            }
        }
        song
    }
}
