use crate::core::clock::{ClockSource, Transport};
use crate::core::input::InputSource;
use crate::game::autoplay::{Autoplay, BotAction};
use crate::game::chart::{stars_label, InputSurface};
use crate::game::chart_cache::{ChartCache, LoadedSong};
use crate::game::gameplay::{self, GameEvent, GameOverReason, PlayMode, SONG_END_GRACE};
use crate::game::scores::{self, Rank, ScoreStore};
use crate::game::script::{self, ScriptAction, ScriptEvent};
use crate::game::session::Session;
use crate::game::tracks::{self, TrackRole, MAX_VOICED_TRACKS};
use clap::Parser;
use log::{debug, error, info, warn, LevelFilter};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

mod config;
mod core;
mod game;

const FRAME_RATE: f32 = 60.0;
// frames allowed per song second before a run is abandoned
const FRAME_BUDGET_FACTOR: f32 = 4.0;
const FRAME_BUDGET_SLACK: f32 = 30.0;

#[derive(Parser, Debug)]
#[command(name = "neondance", about = "Plays a MIDI chart headlessly and reports the result")]
struct Opt {
    /// MIDI file to chart. Without one a random demo is played.
    midi: Option<PathBuf>,

    /// standard, learn or practice. Defaults to the configured mode.
    #[arg(long)]
    mode: Option<PlayMode>,

    /// Chart for a touch screen (two fingers) instead of a keyboard.
    #[arg(long)]
    touch: bool,

    /// Song repository the MIDI file belongs to, used in score keys.
    #[arg(long, default_value = scores::DEFAULT_REPO)]
    repo: String,

    /// Recorded input to play instead of the bot.
    #[arg(long)]
    script: Option<PathBuf>,

    /// Largest bot timing error, in milliseconds.
    #[arg(long, default_value_t = 0.0)]
    jitter_ms: f32,

    #[arg(long, default_value_t = 1)]
    seed: u64,

    /// Length of a demo run, in seconds.
    #[arg(long, default_value_t = 60.0)]
    demo_seconds: f32,

    /// Toggle the song's favorite mark.
    #[arg(long)]
    favorite: bool,

    #[arg(short, long)]
    verbose: bool,
}

enum Driver {
    Bot(Autoplay),
    Script { events: Vec<ScriptEvent>, next: usize },
}

impl Driver {
    fn drive(&mut self, session: &mut Session<Transport>, wall: f32, now: Instant, t0: Instant) {
        match self {
            Driver::Bot(bot) => {
                let song_time = session.song_time(now);
                for action in bot.step(&session.engine, song_time, wall) {
                    match action {
                        BotAction::Press(lane) => session.press(lane, InputSource::Keyboard, false, now),
                        BotAction::Release(lane) => session.release(lane, InputSource::Keyboard, now),
                    }
                }
            }
            Driver::Script { events, next } => {
                while let Some(event) = events.get(*next).filter(|e| e.at <= wall) {
                    let at = t0 + Duration::from_secs_f32(event.at);
                    match &event.action {
                        ScriptAction::Key { code, pressed } => session.key(code, *pressed, false, at),
                        ScriptAction::Touch { id, phase, x } => session.touch(*id, *phase, *x, at),
                        ScriptAction::TogglePause => {
                            session.toggle_practice_pause(at);
                        }
                        ScriptAction::Speed(steps) => {
                            session.change_practice_speed(*steps, at);
                        }
                    }
                    *next += 1;
                }
            }
        }
    }
}

fn lane_glyph(event: &GameEvent) -> &'static str {
    match event {
        GameEvent::Hit { lane, .. }
        | GameEvent::Miss { lane }
        | GameEvent::HoldComplete { lane }
        | GameEvent::HoldDrop { lane }
        | GameEvent::LearnCleared { lane } => lane.glyph(),
        _ => " ",
    }
}

fn log_voiced_tracks(song: &LoadedSong) {
    for index in tracks::select_voiced(&song.tracks, MAX_VOICED_TRACKS) {
        if let Some(track) = song.tracks.iter().find(|t| t.index == index) {
            let role = TrackRole::of(track);
            info!(
                "Voicing track {} as {:?} ({} notes, {:+.0} dB)",
                index,
                role,
                track.note_count,
                role.gain_db()
            );
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    let opt = Opt::parse();

    env_logger::Builder::from_default_env()
        .filter_level(LevelFilter::Info)
        .filter_module(
            "neondance::game::gameplay",
            if opt.verbose { LevelFilter::Debug } else { LevelFilter::Info },
        )
        .filter_module("neondance::core::input", LevelFilter::Info)
        .filter_module("neondance::game::autoplay", LevelFilter::Warn)
        .init();

    info!("Application starting...");

    config::load();
    let config = config::get();
    let mode = opt.mode.unwrap_or(config.play_mode);
    let surface = if opt.touch { InputSurface::Touch } else { config.input_surface };

    let (engine, song_key, frame_limit) = match &opt.midi {
        Some(path) => {
            let cache = ChartCache::new(&config.chart_cache_dir, config.fastload, config.cache_charts);
            let song = cache.load_chart(path, surface);
            let chart = Arc::new(song.chart.clone());
            info!(
                "Loaded {:?}: {} notes over {:.1}s, {}",
                path.file_name().unwrap_or_default(),
                chart.notes.len(),
                chart.song_duration,
                stars_label(chart.stars())
            );
            log_voiced_tracks(&song);
            let file_name = path.file_name().map_or_else(|| path.to_string_lossy(), |n| n.to_string_lossy());
            let frames = ((chart.song_duration + SONG_END_GRACE) * FRAME_BUDGET_FACTOR + FRAME_BUDGET_SLACK)
                * FRAME_RATE;
            (
                gameplay::init(Arc::clone(&chart), config.playfield()),
                Some((scores::song_key(&opt.repo, &file_name), chart.stars())),
                frames as u64,
            )
        }
        None => {
            info!("No MIDI file given; playing a random demo.");
            (
                gameplay::init_demo(config.playfield(), config.demo_level, opt.seed),
                None,
                (opt.demo_seconds.max(0.0) * FRAME_RATE) as u64,
            )
        }
    };

    let mut driver = match &opt.script {
        Some(path) => {
            let events = script::load(path)?;
            info!("Playing {} scripted events from {:?}", events.len(), path);
            Driver::Script { events, next: 0 }
        }
        None => Driver::Bot(Autoplay::new(opt.jitter_ms / 1000.0, opt.seed)),
    };

    let t0 = Instant::now();
    let mut session = Session::new(engine, Transport::start_at(0.0, t0));
    session.start(mode, t0);

    let mut outcome = None;
    for frame in 0..frame_limit {
        let wall = frame as f32 / FRAME_RATE;
        let now = t0 + Duration::from_secs_f32(wall);
        driver.drive(&mut session, wall, now, t0);

        for shown in session.frame(now) {
            if shown.visible {
                if let Some(caption) = shown.event.caption() {
                    info!("[{:7.3}s] {} {}", session.song_time(now), lane_glyph(&shown.event), caption);
                }
            } else {
                debug!("[{:7.3}s] hidden {:?}", session.song_time(now), shown.event);
            }
            if let GameEvent::GameOver { reason, score } = shown.event {
                outcome = Some((reason, score));
            }
        }
        if session.is_over() {
            break;
        }
    }
    debug!(
        "Song clock left at {:.2}x{}",
        session.clock().rate(),
        if session.clock().is_paused() { ", paused" } else { "" }
    );
    if session.skipped_frames() > 0 {
        warn!("{} frames were skipped", session.skipped_frames());
    }
    gameplay::acknowledge(&mut session.engine);

    let player = &session.engine.player;
    let reason = match outcome {
        Some((reason, _)) => format!("{:?}", reason),
        None => "Stopped".to_string(),
    };
    println!(
        "{}: score {} rank {} max combo {}",
        reason,
        player.score,
        Rank::from_score(player.score),
        player.max_combo
    );

    if let Some((key, stars)) = song_key {
        let mut store = ScoreStore::load_or_default(&config.scores_path);
        store.set_difficulty(&key, stars);
        let previous = store.high_score(&key);
        if matches!(outcome, Some((GameOverReason::Completed, _))) && store.submit_score(&key, player.score) {
            println!("New high score! (previous {})", previous);
        }
        if let Some(best) = store.record(&key) {
            println!("Best: {} ({}) on {}", best.score, best.rank, best.achieved_at);
        }
        if let Some(stars) = store.difficulty(&key) {
            println!("Difficulty: {}", stars_label(stars));
        }
        if opt.favorite {
            let now_favorite = store.toggle_favorite(&key);
            info!("{} is {} a favorite", key, if now_favorite { "now" } else { "no longer" });
        }
        if store.is_favorite(&key) {
            println!("Favorite ({} in total)", store.favorites().count());
        }
        if let Err(e) = store.save() {
            error!("Failed to save scores: {}", e);
            return Err(e.into());
        }
    }

    info!("Application exited gracefully.");
    Ok(())
}
