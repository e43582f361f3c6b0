use chrono::Local;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Repository assumed for favorites saved before keys carried one.
pub const DEFAULT_REPO: &str = "local";
const KEY_SEPARATOR: &str = "::";

/// Stable identifier for a song across sessions.
pub fn song_key(repo: &str, file_name: &str) -> String {
    format!("{}{}{}", repo, KEY_SEPARATOR, file_name)
}

fn migrate_favorite_key(raw: &str) -> String {
    if raw.contains(KEY_SEPARATOR) {
        raw.to_string()
    } else {
        song_key(DEFAULT_REPO, raw)
    }
}

// --- Rank Letters ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rank {
    S,
    A,
    B,
    C,
    F,
}

impl Rank {
    pub fn from_score(score: u32) -> Self {
        if score > 10_000 {
            Rank::S
        } else if score > 5_000 {
            Rank::A
        } else if score > 2_500 {
            Rank::B
        } else if score > 1_000 {
            Rank::C
        } else {
            Rank::F
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Rank::S => "S",
            Rank::A => "A",
            Rank::B => "B",
            Rank::C => "C",
            Rank::F => "F",
        }
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// --- Store ---

#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "IO Error: {}", e),
            StoreError::Json(e) => write!(f, "Score file is not valid JSON: {}", e),
        }
    }
}

impl Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Json(e)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighScore {
    pub score: u32,
    pub rank: Rank,
    /// RFC 3339 local time.
    pub achieved_at: String,
}

/// High scores, difficulty ratings and favorites, keyed by [`song_key`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ScoreStore {
    #[serde(default)]
    high_scores: BTreeMap<String, HighScore>,
    #[serde(default)]
    difficulty: BTreeMap<String, u8>,
    #[serde(default)]
    favorites: BTreeSet<String>,
    #[serde(skip)]
    path: PathBuf,
}

impl ScoreStore {
    /// Reads the store at `path`. A missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            info!("No score file at {:?}; starting fresh.", path);
            return Ok(Self {
                path: path.to_path_buf(),
                ..Self::default()
            });
        }

        let text = fs::read_to_string(path)?;
        let mut store: ScoreStore = serde_json::from_str(&text)?;
        store.favorites = store.favorites.iter().map(|k| migrate_favorite_key(k)).collect();
        store.path = path.to_path_buf();
        info!(
            "Loaded {} high score(s) and {} favorite(s) from {:?}",
            store.high_scores.len(),
            store.favorites.len(),
            path
        );
        Ok(store)
    }

    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(store) => store,
            Err(e) => {
                warn!("Failed to load scores from {:?}: {}. Using an empty store.", path, e);
                Self {
                    path: path.to_path_buf(),
                    ..Self::default()
                }
            }
        }
    }

    pub fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(&self.path, text)?;
        Ok(())
    }

    pub fn high_score(&self, key: &str) -> u32 {
        self.high_scores.get(key).map_or(0, |h| h.score)
    }

    pub fn record(&self, key: &str) -> Option<&HighScore> {
        self.high_scores.get(key)
    }

    /// Keeps `score` if it beats the stored one. Returns true on a new record.
    pub fn submit_score(&mut self, key: &str, score: u32) -> bool {
        if score <= self.high_score(key) {
            return false;
        }
        info!("New high score for {}: {}", key, score);
        self.high_scores.insert(
            key.to_string(),
            HighScore {
                score,
                rank: Rank::from_score(score),
                achieved_at: Local::now().to_rfc3339(),
            },
        );
        true
    }

    pub fn set_difficulty(&mut self, key: &str, stars: u8) {
        self.difficulty.insert(key.to_string(), stars);
    }

    pub fn difficulty(&self, key: &str) -> Option<u8> {
        self.difficulty.get(key).copied()
    }

    /// Flips the favorite flag. Returns whether the song is now a favorite.
    pub fn toggle_favorite(&mut self, key: &str) -> bool {
        if self.favorites.remove(key) {
            false
        } else {
            self.favorites.insert(key.to_string());
            true
        }
    }

    pub fn is_favorite(&self, key: &str) -> bool {
        self.favorites.contains(key)
    }

    pub fn favorites(&self) -> impl Iterator<Item = &str> {
        self.favorites.iter().map(String::as_str)
    }
}
