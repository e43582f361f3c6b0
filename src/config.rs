use crate::game::chart::InputSurface;
use crate::game::gameplay::{PlayMode, Playfield};
use configparser::ini::Ini;
use log::{info, warn};
use once_cell::sync::Lazy;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const CONFIG_PATH: &str = "config.ini";
const SECTION: &str = "Options";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub input_surface: InputSurface,
    pub play_mode: PlayMode,
    pub canvas_width: f32,
    pub canvas_height: f32,
    /// Pixels per frame at 60 fps.
    pub scroll_speed: f32,
    pub demo_level: u32,
    pub cache_charts: bool,
    pub fastload: bool,
    pub scores_path: PathBuf,
    pub chart_cache_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_surface: InputSurface::Keyboard,
            play_mode: PlayMode::Standard,
            canvas_width: 400.0,
            canvas_height: 600.0,
            scroll_speed: 8.0,
            demo_level: 1,
            cache_charts: true,
            fastload: true,
            scores_path: PathBuf::from("save/scores.json"),
            chart_cache_dir: PathBuf::from("cache/charts"),
        }
    }
}

impl Config {
    pub fn playfield(&self) -> Playfield {
        Playfield {
            width: self.canvas_width,
            height: self.canvas_height,
            scroll_speed: self.scroll_speed,
        }
    }
}

static CONFIG: Lazy<Mutex<Config>> = Lazy::new(|| Mutex::new(Config::default()));

fn flag(value: bool) -> Option<String> {
    Some(if value { "1" } else { "0" }.to_string())
}

fn create_default_file(path: &Path) -> Result<(), std::io::Error> {
    info!("'{}' not found, creating it with default values.", path.display());
    let d = Config::default();
    let mut conf = Ini::new();
    conf.set(SECTION, "InputSurface", Some(d.input_surface.as_str().to_string()));
    conf.set(SECTION, "PlayMode", Some(d.play_mode.as_str().to_string()));
    conf.set(SECTION, "CanvasWidth", Some(d.canvas_width.to_string()));
    conf.set(SECTION, "CanvasHeight", Some(d.canvas_height.to_string()));
    conf.set(SECTION, "ScrollSpeed", Some(d.scroll_speed.to_string()));
    conf.set(SECTION, "DemoLevel", Some(d.demo_level.to_string()));
    conf.set(SECTION, "CacheCharts", flag(d.cache_charts));
    conf.set(SECTION, "FastLoad", flag(d.fastload));
    conf.set(SECTION, "ScoresPath", Some(d.scores_path.to_string_lossy().into_owned()));
    conf.set(SECTION, "ChartCacheDir", Some(d.chart_cache_dir.to_string_lossy().into_owned()));
    conf.write(path)
}

fn parse_or<T: std::str::FromStr>(conf: &Ini, key: &str, default: T) -> T {
    match conf.get(SECTION, key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Invalid {} value '{}', using default.", key, raw);
            default
        }),
        None => default,
    }
}

fn positive_or(value: f32, key: &str, default: f32) -> f32 {
    if value.is_finite() && value > 0.0 {
        value
    } else {
        warn!("{} must be positive, using {}.", key, default);
        default
    }
}

/// Reads the options at `path`, writing a default file first if there is
/// none. Missing or invalid keys fall back to their defaults.
pub fn load_from(path: &Path) -> Config {
    let default = Config::default();
    if !path.exists() {
        if let Err(e) = create_default_file(path) {
            warn!("Failed to create default config file: {}", e);
            return default;
        }
    }

    let mut conf = Ini::new();
    if let Err(e) = conf.load(path) {
        warn!("Failed to load '{}': {}. Using defaults.", path.display(), e);
        return default;
    }

    let canvas_width = parse_or(&conf, "CanvasWidth", default.canvas_width);
    let canvas_height = parse_or(&conf, "CanvasHeight", default.canvas_height);
    let scroll_speed = parse_or(&conf, "ScrollSpeed", default.scroll_speed);

    Config {
        input_surface: parse_or(&conf, "InputSurface", default.input_surface),
        play_mode: parse_or(&conf, "PlayMode", default.play_mode),
        canvas_width: positive_or(canvas_width, "CanvasWidth", default.canvas_width),
        canvas_height: positive_or(canvas_height, "CanvasHeight", default.canvas_height),
        scroll_speed: positive_or(scroll_speed, "ScrollSpeed", default.scroll_speed),
        demo_level: parse_or(&conf, "DemoLevel", default.demo_level),
        cache_charts: parse_or::<u8>(&conf, "CacheCharts", 1) != 0,
        fastload: parse_or::<u8>(&conf, "FastLoad", 1) != 0,
        scores_path: conf
            .get(SECTION, "ScoresPath")
            .map_or(default.scores_path, PathBuf::from),
        chart_cache_dir: conf
            .get(SECTION, "ChartCacheDir")
            .map_or(default.chart_cache_dir, PathBuf::from),
    }
}

pub fn load() {
    let loaded = load_from(Path::new(CONFIG_PATH));
    info!("Configuration loaded: {:?}", loaded);
    *CONFIG.lock().unwrap_or_else(|e| e.into_inner()) = loaded;
}

/// Returns a copy of the currently loaded configuration.
pub fn get() -> Config {
    CONFIG.lock().unwrap_or_else(|e| e.into_inner()).clone()
}
