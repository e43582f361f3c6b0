use crate::core::input::Lane;
use crate::game::chart::Chart;
use crate::game::judgment::{
    self, Tier, HOLD_COMPLETE_POINTS, HOLD_TICK_INTERVAL, HOLD_TICK_POINTS, LEARN_CLEAR_POINTS,
    MISS_TOLERANCE_PX,
};
use crate::game::life::{
    HealthChange, FEVER_DRAIN_PER_SECOND, FEVER_MAX, FEVER_MISS_PENALTY, FEVER_SCORE_MULTIPLIER,
    MAX_HEALTH,
};
use crate::game::note::Arrow;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// Scroll speeds are given in pixels per frame at this rate.
pub const REFERENCE_FPS: f32 = 60.0;
pub const SPAWN_Y: f32 = -50.0;
const TARGET_OFFSET_FROM_BOTTOM: f32 = 100.0;
const CULL_MARGIN: f32 = 500.0;
const MAX_SPAWNS_PER_TICK: usize = 50;
/// Song seconds after the last note before a finished chart counts as complete.
pub const SONG_END_GRACE: f32 = 3.0;

const LEARN_TRIGGER_BAND: f32 = 30.0;
const LEARN_CLUSTER_RADIUS: f32 = 20.0;
const LEARN_DUPLICATE_RADIUS: f32 = 10.0;

pub const PRACTICE_SPEED_STEP: f32 = 0.25;
pub const PRACTICE_SPEED_MIN: f32 = 0.25;
pub const PRACTICE_SPEED_MAX: f32 = 2.0;

const DEMO_BASE_CHANCE: f32 = 0.02;
const DEMO_CHANCE_PER_LEVEL: f32 = 0.005;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameState {
    Menu,
    Playing,
    GameOver,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum PlayMode {
    #[default]
    Standard,
    Learn,
    Practice,
}

impl PlayMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            PlayMode::Standard => "Standard",
            PlayMode::Learn => "Learn",
            PlayMode::Practice => "Practice",
        }
    }
}

impl fmt::Display for PlayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(PlayMode::Standard),
            "learn" => Ok(PlayMode::Learn),
            "practice" => Ok(PlayMode::Practice),
            other => Err(format!("'{}' is not a valid play mode", other)),
        }
    }
}

/// Screen geometry the arrows move through.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Playfield {
    pub width: f32,
    pub height: f32,
    /// Pixels per reference frame.
    pub scroll_speed: f32,
}

impl Default for Playfield {
    fn default() -> Self {
        Self {
            width: 400.0,
            height: 600.0,
            scroll_speed: 8.0,
        }
    }
}

impl Playfield {
    #[inline(always)]
    pub fn target_y(&self) -> f32 {
        self.height - TARGET_OFFSET_FROM_BOTTOM
    }

    #[inline(always)]
    pub fn lane_width(&self) -> f32 {
        self.width / 4.0
    }

    #[inline(always)]
    pub fn lane_center_x(&self, lane: Lane) -> f32 {
        self.lane_width() * (lane.index() as f32 + 0.5)
    }

    #[inline(always)]
    pub fn pixels_per_second(&self) -> f32 {
        self.scroll_speed * REFERENCE_FPS
    }

    /// Seconds an arrow takes from the spawn line to the target.
    #[inline(always)]
    pub fn travel_time(&self) -> f32 {
        (self.target_y() - SPAWN_Y) / self.pixels_per_second()
    }

    #[inline(always)]
    pub fn cull_y(&self) -> f32 {
        self.height + CULL_MARGIN
    }

    /// Arrow position is a pure function of the clock.
    #[inline(always)]
    pub fn y_at(&self, hit_time: f32, song_time: f32) -> f32 {
        self.target_y() - (hit_time - song_time) * self.pixels_per_second()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlayerState {
    pub score: u32,
    pub health: f32,
    pub combo: u32,
    pub max_combo: u32,
    pub fever: f32,
    pub fever_active: bool,
}

impl Default for PlayerState {
    fn default() -> Self {
        Self {
            score: 0,
            health: MAX_HEALTH,
            combo: 0,
            max_combo: 0,
            fever: 0.0,
            fever_active: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameOverReason {
    Completed,
    Failed,
}

#[derive(Clone, Debug, PartialEq)]
pub enum GameEvent {
    SongStarted { mode: PlayMode },
    Hit { lane: Lane, tier: Tier, points: u32 },
    Miss { lane: Lane },
    HoldComplete { lane: Lane },
    HoldDrop { lane: Lane },
    LearnPaused { lanes: Vec<Lane> },
    LearnCleared { lane: Lane },
    LearnResumed,
    FeverStarted,
    FeverEnded,
    SpeedChanged { rate: f32 },
    PracticePaused { paused: bool },
    GameOver { reason: GameOverReason, score: u32 },
}

impl GameEvent {
    /// Text a UI would flash for this event, if any.
    pub fn caption(&self) -> Option<&'static str> {
        match self {
            GameEvent::SongStarted { .. } => Some("READY"),
            GameEvent::Hit { tier, .. } => Some(tier.label()),
            GameEvent::Miss { .. } => Some("MISS"),
            GameEvent::HoldComplete { .. } => Some("COMPLETE!"),
            GameEvent::HoldDrop { .. } => Some("DROP"),
            GameEvent::LearnPaused { .. } => Some("WAIT"),
            GameEvent::LearnCleared { .. } => Some("GOOD!"),
            GameEvent::FeverStarted => Some("FEVER!"),
            GameEvent::GameOver { reason: GameOverReason::Completed, .. } => Some("SONG COMPLETE"),
            GameEvent::GameOver { reason: GameOverReason::Failed, .. } => Some("GAME OVER"),
            GameEvent::LearnResumed
            | GameEvent::FeverEnded
            | GameEvent::SpeedChanged { .. }
            | GameEvent::PracticePaused { .. } => None,
        }
    }
}

/// What the engine wants done to the song clock. The session applies these
/// after each tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClockRequest {
    Pause,
    Resume,
    SetRate(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickError {
    NonFiniteClock(f32),
}

impl fmt::Display for TickError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickError::NonFiniteClock(t) => write!(f, "Clock produced a non-finite song time: {}", t),
        }
    }
}

impl Error for TickError {}

struct DemoSpawner {
    rng: StdRng,
    level: u32,
}

pub struct State {
    pub chart: Arc<Chart>,
    pub playfield: Playfield,
    pub game_state: GameState,
    pub mode: PlayMode,
    pub player: PlayerState,
    pub arrows: Vec<Arrow>,
    /// Arrow ids the player still has to clear while a learn pause is held.
    pub pending_cluster: Vec<u64>,
    pub learn_paused: bool,
    pub practice_paused: bool,
    pub practice_speed: f32,
    pub song_time: f32,

    spawn_cursor: usize,
    next_arrow_id: u64,
    last_tick: Option<f32>,
    demo: Option<DemoSpawner>,
    events: VecDeque<GameEvent>,
    clock_requests: VecDeque<ClockRequest>,
    log_timer: f32,
}

impl State {
    pub fn is_demo(&self) -> bool {
        self.demo.is_some()
    }

    pub fn active_arrows(&self) -> impl Iterator<Item = &Arrow> {
        self.arrows.iter().filter(|a| a.active)
    }
}

pub fn init(chart: Arc<Chart>, playfield: Playfield) -> State {
    info!(
        "Initializing gameplay: {} notes, {:.1}s, travel time {:.3}s",
        chart.notes.len(),
        chart.song_duration,
        playfield.travel_time()
    );
    State {
        chart,
        playfield,
        game_state: GameState::Menu,
        mode: PlayMode::Standard,
        player: PlayerState::default(),
        arrows: Vec::new(),
        pending_cluster: Vec::new(),
        learn_paused: false,
        practice_paused: false,
        practice_speed: 1.0,
        song_time: 0.0,
        spawn_cursor: 0,
        next_arrow_id: 0,
        last_tick: None,
        demo: None,
        events: VecDeque::new(),
        clock_requests: VecDeque::new(),
        log_timer: 0.0,
    }
}

/// A session with no chart; taps are generated at random while playing.
pub fn init_demo(playfield: Playfield, level: u32, seed: u64) -> State {
    info!("Initializing random demo at level {} (seed {})", level, seed);
    let mut state = init(Arc::new(Chart::default()), playfield);
    state.demo = Some(DemoSpawner {
        rng: StdRng::seed_from_u64(seed),
        level,
    });
    state
}

pub fn start(state: &mut State, mode: PlayMode) {
    info!("Starting song in {} mode", mode);
    state.mode = mode;
    state.game_state = GameState::Playing;
    state.player = PlayerState::default();
    state.arrows.clear();
    state.pending_cluster.clear();
    state.learn_paused = false;
    state.practice_paused = false;
    state.practice_speed = 1.0;
    state.song_time = 0.0;
    state.spawn_cursor = 0;
    state.last_tick = None;
    state.log_timer = 0.0;

    state.clock_requests.clear();
    state.clock_requests.push_back(ClockRequest::SetRate(1.0));
    state.events.push_back(GameEvent::SongStarted { mode });
}

/// Leaves the game-over screen.
pub fn acknowledge(state: &mut State) {
    if state.game_state == GameState::GameOver {
        debug!("Game over acknowledged; back to menu");
        state.game_state = GameState::Menu;
    }
}

pub fn drain_events(state: &mut State) -> Vec<GameEvent> {
    state.events.drain(..).collect()
}

pub fn take_clock_requests(state: &mut State) -> Vec<ClockRequest> {
    state.clock_requests.drain(..).collect()
}

fn apply_health_change(state: &mut State, delta: f32) {
    let player = &mut state.player;
    player.health = (player.health + delta).clamp(0.0, MAX_HEALTH);
}

#[inline(always)]
fn bump_combo(state: &mut State) {
    let player = &mut state.player;
    player.combo = player.combo.saturating_add(1);
    player.max_combo = player.max_combo.max(player.combo);
}

#[inline(always)]
fn add_score(state: &mut State, points: u32) {
    state.player.score = state.player.score.saturating_add(points);
}

fn add_fever(state: &mut State, amount: f32) {
    if amount <= 0.0 {
        return;
    }
    let player = &mut state.player;
    player.fever = (player.fever + amount).min(FEVER_MAX);
    if player.fever >= FEVER_MAX && !player.fever_active {
        player.fever_active = true;
        info!("Fever started at {:.2}s", state.song_time);
        state.events.push_back(GameEvent::FeverStarted);
    }
}

fn drain_fever(state: &mut State, amount: f32) {
    let player = &mut state.player;
    player.fever = (player.fever - amount).max(0.0);
    if player.fever_active && player.fever <= 0.0 {
        player.fever_active = false;
        debug!("Fever ended at {:.2}s", state.song_time);
        state.events.push_back(GameEvent::FeverEnded);
    }
}

fn register_hit(state: &mut State, lane: Lane, tier: Tier) {
    let multiplier = if state.player.fever_active {
        FEVER_SCORE_MULTIPLIER
    } else {
        1
    };
    let points = tier.points() * multiplier;
    add_score(state, points);
    bump_combo(state);
    apply_health_change(state, HealthChange::HIT);
    add_fever(state, tier.fever_gain());
    state.events.push_back(GameEvent::Hit { lane, tier, points });
}

fn register_miss(state: &mut State, lane: Lane) {
    state.player.combo = 0;
    drain_fever(state, FEVER_MISS_PENALTY);
    if state.mode == PlayMode::Standard {
        apply_health_change(state, HealthChange::MISS);
    }
    debug!("MISS on {:?} at {:.2}s", lane, state.song_time);
    state.events.push_back(GameEvent::Miss { lane });
}

/// A logical press on `lane`, stamped with the song time it happened at.
/// Returns true if the press produced a judgment.
pub fn handle_press(state: &mut State, lane: Lane, song_time: f32) -> bool {
    match state.game_state {
        GameState::GameOver => {
            acknowledge(state);
            return false;
        }
        GameState::Menu => return false,
        GameState::Playing => {}
    }
    if !song_time.is_finite() {
        warn!("Ignoring press on {:?} with song time {}", lane, song_time);
        return false;
    }
    if state.practice_paused {
        return false;
    }
    if state.learn_paused {
        return clear_learn_note(state, lane);
    }
    judge_a_tap(state, lane, song_time)
}

fn judge_a_tap(state: &mut State, lane: Lane, song_time: f32) -> bool {
    let playfield = state.playfield;
    let target_y = playfield.target_y();

    let closest = state
        .arrows
        .iter()
        .enumerate()
        .filter(|(_, a)| a.active && !a.is_holding && a.lane == lane)
        .map(|(i, a)| (i, (playfield.y_at(a.hit_time, song_time) - target_y).abs()))
        .min_by(|a, b| a.1.total_cmp(&b.1));

    let Some((index, distance)) = closest else {
        return false;
    };
    let Some(tier) = judgment::classify_distance(distance) else {
        return false;
    };

    let arrow = &mut state.arrows[index];
    if arrow.is_hold() {
        arrow.is_holding = true;
        arrow.hold_started = song_time;
        arrow.hold_ticks_paid = 0;
    } else {
        arrow.active = false;
    }
    debug!(
        "{} on {:?}: {:.1}px off at {:.3}s",
        tier, lane, distance, song_time
    );

    register_hit(state, lane, tier);
    true
}

fn find_arrow(arrows: &[Arrow], id: u64) -> Option<&Arrow> {
    arrows.iter().find(|a| a.id == id)
}

fn clear_learn_note(state: &mut State, lane: Lane) -> bool {
    let anchor = state
        .pending_cluster
        .iter()
        .filter_map(|&id| find_arrow(&state.arrows, id))
        .find(|a| a.lane == lane)
        .map(|a| a.y);
    let Some(anchor_y) = anchor else {
        return false;
    };

    let cleared: Vec<u64> = state
        .pending_cluster
        .iter()
        .filter_map(|&id| find_arrow(&state.arrows, id))
        .filter(|a| a.lane == lane && (a.y - anchor_y).abs() < LEARN_DUPLICATE_RADIUS)
        .map(|a| a.id)
        .collect();

    for arrow in state.arrows.iter_mut().filter(|a| cleared.contains(&a.id)) {
        arrow.active = false;
        arrow.is_holding = false;
    }
    state.pending_cluster.retain(|id| !cleared.contains(id));

    add_score(state, LEARN_CLEAR_POINTS);
    bump_combo(state);
    apply_health_change(state, HealthChange::LEARN_CLEAR);
    state.events.push_back(GameEvent::LearnCleared { lane });

    if state.pending_cluster.is_empty() {
        info!("Cluster cleared; resuming at {:.2}s", state.song_time);
        state.learn_paused = false;
        state.clock_requests.push_back(ClockRequest::Resume);
        state.events.push_back(GameEvent::LearnResumed);
    }
    true
}

pub fn toggle_practice_pause(state: &mut State) -> bool {
    if state.mode != PlayMode::Practice || state.game_state != GameState::Playing {
        return false;
    }
    state.practice_paused = !state.practice_paused;
    let request = if state.practice_paused {
        ClockRequest::Pause
    } else {
        ClockRequest::Resume
    };
    state.clock_requests.push_back(request);
    state.events.push_back(GameEvent::PracticePaused {
        paused: state.practice_paused,
    });
    info!(
        "Practice {} at {:.2}s",
        if state.practice_paused { "paused" } else { "resumed" },
        state.song_time
    );
    true
}

/// Moves the practice playback rate by `steps` increments. Returns the rate
/// in effect afterwards.
pub fn change_practice_speed(state: &mut State, steps: i32) -> f32 {
    if state.mode != PlayMode::Practice || state.game_state != GameState::Playing {
        return state.practice_speed;
    }
    let speed = (state.practice_speed + steps as f32 * PRACTICE_SPEED_STEP)
        .clamp(PRACTICE_SPEED_MIN, PRACTICE_SPEED_MAX);
    if (speed - state.practice_speed).abs() > f32::EPSILON {
        state.practice_speed = speed;
        state.clock_requests.push_back(ClockRequest::SetRate(speed));
        state.events.push_back(GameEvent::SpeedChanged { rate: speed });
        info!("Practice speed set to {:.2}x", speed);
    }
    state.practice_speed
}

fn push_arrow(state: &mut State, lane: Lane, hit_time: f32, duration: f32) {
    let id = state.next_arrow_id;
    state.next_arrow_id += 1;
    state.arrows.push(Arrow {
        id,
        x: state.playfield.lane_center_x(lane),
        y: SPAWN_Y,
        lane,
        hit_time,
        duration,
        active: true,
        is_holding: false,
        hold_started: 0.0,
        hold_ticks_paid: 0,
    });
}

fn spawn_arrows(state: &mut State, song_time: f32) {
    let travel_time = state.playfield.travel_time();

    if let Some(demo) = state.demo.as_mut() {
        let chance = DEMO_BASE_CHANCE + demo.level as f32 * DEMO_CHANCE_PER_LEVEL;
        if demo.rng.random::<f32>() < chance {
            let lane = Lane::from_index(demo.rng.random_range(0..4)).unwrap_or(Lane::Left);
            push_arrow(state, lane, song_time + travel_time, 0.0);
        }
        return;
    }

    let mut spawned = 0;
    while spawned < MAX_SPAWNS_PER_TICK {
        let Some(note) = state.chart.notes.get(state.spawn_cursor).copied() else {
            break;
        };
        if song_time < note.time - travel_time {
            break;
        }
        push_arrow(state, note.lane, note.time, note.duration);
        state.spawn_cursor += 1;
        spawned += 1;
    }
}

fn position_arrows(state: &mut State, song_time: f32) {
    let playfield = state.playfield;
    for arrow in &mut state.arrows {
        arrow.y = playfield.y_at(arrow.hit_time, song_time);
    }
}

fn chart_finished(state: &State, song_time: f32) -> bool {
    if state.is_demo() || state.spawn_cursor < state.chart.notes.len() {
        return false;
    }
    if state.arrows.iter().any(|a| a.active) {
        return false;
    }
    match state.chart.last_note_time() {
        Some(last) => song_time > last + SONG_END_GRACE,
        None => true,
    }
}

fn finish(state: &mut State, reason: GameOverReason) {
    match reason {
        GameOverReason::Completed => info!(
            "Song complete. Score: {}, Max Combo: {}",
            state.player.score, state.player.max_combo
        ),
        GameOverReason::Failed => info!("Player has failed!"),
    }
    state.game_state = GameState::GameOver;
    state.learn_paused = false;
    state.practice_paused = false;
    state.events.push_back(GameEvent::GameOver {
        reason,
        score: state.player.score,
    });
}

fn detect_learn_cluster(state: &mut State) -> bool {
    let target_y = state.playfield.target_y();
    let anchor = state
        .arrows
        .iter()
        .filter(|a| a.active && !a.is_holding && (a.y - target_y).abs() < LEARN_TRIGGER_BAND)
        .min_by(|a, b| (a.y - target_y).abs().total_cmp(&(b.y - target_y).abs()))
        .map(|a| a.y);
    let Some(anchor_y) = anchor else {
        return false;
    };

    let cluster: Vec<&Arrow> = state
        .arrows
        .iter()
        .filter(|a| a.active && !a.is_holding && (a.y - anchor_y).abs() < LEARN_CLUSTER_RADIUS)
        .collect();
    let mut lanes: Vec<Lane> = cluster.iter().map(|a| a.lane).collect();
    lanes.sort();
    lanes.dedup();
    state.pending_cluster = cluster.iter().map(|a| a.id).collect();

    info!(
        "Waiting for {} note(s) on {:?} at {:.2}s",
        state.pending_cluster.len(),
        lanes,
        state.song_time
    );
    state.learn_paused = true;
    state.clock_requests.push_back(ClockRequest::Pause);
    state.events.push_back(GameEvent::LearnPaused { lanes });
    true
}

// Tick bonus owed for holding from the grab up to `until`.
fn accrue_hold_ticks(arrow: &mut Arrow, until: f32) -> u32 {
    let held_for = (until - arrow.hold_started).max(0.0);
    let due = (held_for / HOLD_TICK_INTERVAL) as u32;
    let fresh = due.saturating_sub(arrow.hold_ticks_paid);
    arrow.hold_ticks_paid = arrow.hold_ticks_paid.max(due);
    fresh * HOLD_TICK_POINTS
}

fn handle_hold_let_go(state: &mut State, lane: Lane) {
    state.player.combo = 0;
    apply_health_change(state, HealthChange::HOLD_DROP);
    debug!("Hold dropped on {:?} at {:.2}s", lane, state.song_time);
    state.events.push_back(GameEvent::HoldDrop { lane });
}

fn handle_hold_success(state: &mut State, lane: Lane) {
    add_score(state, HOLD_COMPLETE_POINTS);
    apply_health_change(state, HealthChange::HOLD_COMPLETE);
    bump_combo(state);
    debug!("Hold complete on {:?} at {:.2}s", lane, state.song_time);
    state.events.push_back(GameEvent::HoldComplete { lane });
}

fn update_active_holds(state: &mut State, held: &[bool; 4], song_time: f32) {
    for index in 0..state.arrows.len() {
        let (lane, end_time) = {
            let arrow = &state.arrows[index];
            if !arrow.active || !arrow.is_holding {
                continue;
            }
            (arrow.lane, arrow.end_time())
        };

        if !held[lane.index()] {
            let arrow = &mut state.arrows[index];
            arrow.active = false;
            arrow.is_holding = false;
            handle_hold_let_go(state, lane);
            continue;
        }

        let bonus = accrue_hold_ticks(&mut state.arrows[index], song_time.min(end_time));
        add_score(state, bonus);

        if song_time >= end_time {
            let arrow = &mut state.arrows[index];
            arrow.active = false;
            arrow.is_holding = false;
            handle_hold_success(state, lane);
        }
    }
}

fn apply_passive_misses(state: &mut State) {
    let miss_y = state.playfield.target_y() + MISS_TOLERANCE_PX;
    let mut missed = Vec::new();
    for arrow in &mut state.arrows {
        if arrow.active && !arrow.is_holding && arrow.y > miss_y {
            arrow.active = false;
            missed.push(arrow.lane);
        }
    }
    for lane in missed {
        register_miss(state, lane);
    }
}

#[inline(always)]
fn cull_scrolled_out_arrows(state: &mut State) {
    let cull_y = state.playfield.cull_y();
    state.arrows.retain(|a| a.active || a.y < cull_y);
}

/// Advances the session to `song_time`. `held` is the debounced per-lane
/// hold state.
pub fn update(state: &mut State, song_time: f32, held: &[bool; 4]) -> Result<(), TickError> {
    if !song_time.is_finite() {
        return Err(TickError::NonFiniteClock(song_time));
    }
    if state.game_state != GameState::Playing || state.learn_paused || state.practice_paused {
        return Ok(());
    }

    let delta_time = state.last_tick.map_or(0.0, |last| (song_time - last).max(0.0));
    state.last_tick = Some(song_time);
    state.song_time = song_time;

    spawn_arrows(state, song_time);
    position_arrows(state, song_time);

    if chart_finished(state, song_time) {
        finish(state, GameOverReason::Completed);
        return Ok(());
    }

    if state.mode == PlayMode::Learn {
        detect_learn_cluster(state);
    }

    update_active_holds(state, held, song_time);
    apply_passive_misses(state);

    if state.player.fever_active {
        drain_fever(state, FEVER_DRAIN_PER_SECOND * delta_time);
    }

    cull_scrolled_out_arrows(state);

    if state.mode == PlayMode::Standard && state.player.health <= 0.0 {
        finish(state, GameOverReason::Failed);
        return Ok(());
    }

    state.log_timer += delta_time;
    if state.log_timer >= 1.0 {
        info!(
            "Time: {:.2}, Combo: {}, Score: {}, Health: {:.0}, Active Arrows: {}",
            song_time,
            state.player.combo,
            state.player.score,
            state.player.health,
            state.active_arrows().count()
        );
        state.log_timer -= 1.0;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::note::RawNote;

    const IDLE: [bool; 4] = [false; 4];
    const LEFT_HELD: [bool; 4] = [true, false, false, false];

    fn chart_of(notes: Vec<RawNote>) -> Arc<Chart> {
        let song_duration = notes.iter().map(|n| n.end_time()).fold(0.0, f32::max);
        Arc::new(Chart { notes, song_duration })
    }

    // pitch 60 lands on the left lane
    fn note(time: f32, duration: f32) -> RawNote {
        RawNote::new(time, 60, duration, 0.8)
    }

    fn playing(notes: Vec<RawNote>, mode: PlayMode) -> State {
        let mut state = init(chart_of(notes), Playfield::default());
        start(&mut state, mode);
        drain_events(&mut state);
        take_clock_requests(&mut state);
        state
    }

    fn run(state: &mut State, from: f32, to: f32, held: &[bool; 4]) {
        let mut t = from;
        while t <= to {
            update(state, t, held).unwrap();
            t += 0.05;
        }
    }

    #[test]
    fn geometry_matches_reference_canvas() {
        let field = Playfield::default();
        assert_eq!(field.target_y(), 500.0);
        assert_eq!(field.pixels_per_second(), 480.0);
        assert!((field.travel_time() - 550.0 / 480.0).abs() < 1e-6);
        assert_eq!(field.lane_center_x(Lane::Up), 250.0);
        assert_eq!(field.y_at(2.0, 2.0), 500.0);
    }

    #[test]
    fn tap_on_time_is_marvelous() {
        let mut state = playing(vec![note(1.0, 0.0)], PlayMode::Standard);
        update(&mut state, 0.5, &IDLE).unwrap();
        assert_eq!(state.arrows.len(), 1);

        assert!(handle_press(&mut state, Lane::Left, 1.0));
        assert_eq!(state.player.score, 100);
        assert_eq!(state.player.combo, 1);
        assert_eq!(
            drain_events(&mut state),
            vec![GameEvent::Hit {
                lane: Lane::Left,
                tier: Tier::Marvelous,
                points: 100
            }]
        );
        assert!(!state.arrows[0].active);
    }

    #[test]
    fn press_outside_window_or_wrong_lane_is_ignored() {
        let mut state = playing(vec![note(1.0, 0.0)], PlayMode::Standard);
        update(&mut state, 0.5, &IDLE).unwrap();

        // 0.5s early is 240px away
        assert!(!handle_press(&mut state, Lane::Left, 0.5));
        assert!(!handle_press(&mut state, Lane::Right, 1.0));
        assert_eq!(state.player, PlayerState::default());
        assert!(drain_events(&mut state).is_empty());
    }

    #[test]
    fn press_tier_uses_press_time_not_frame_time() {
        let mut state = playing(vec![note(1.0, 0.0)], PlayMode::Standard);
        update(&mut state, 1.05, &IDLE).unwrap();
        // 30px late at 1.0625
        assert!(handle_press(&mut state, Lane::Left, 1.0625));
        assert_eq!(state.player.score, Tier::Perfect.points());
    }

    #[test]
    fn unpressed_tap_misses_once() {
        let mut state = playing(vec![note(1.0, 0.0)], PlayMode::Standard);
        run(&mut state, 0.0, 2.0, &IDLE);

        let misses = drain_events(&mut state)
            .into_iter()
            .filter(|e| matches!(e, GameEvent::Miss { .. }))
            .count();
        assert_eq!(misses, 1);
        assert_eq!(state.player.combo, 0);
        assert_eq!(state.player.health, 90.0);
        assert_eq!(state.game_state, GameState::Playing);
    }

    #[test]
    fn misses_cost_no_health_outside_standard() {
        let mut state = playing(vec![note(1.0, 0.0)], PlayMode::Practice);
        run(&mut state, 0.0, 2.0, &IDLE);
        assert_eq!(state.player.health, MAX_HEALTH);
    }

    #[test]
    fn held_hold_completes_at_its_end() {
        let mut state = playing(vec![note(1.0, 1.0)], PlayMode::Standard);
        update(&mut state, 0.5, &IDLE).unwrap();
        assert!(handle_press(&mut state, Lane::Left, 1.0));
        assert!(state.arrows[0].is_holding);

        for t in [1.0, 1.25, 1.5, 1.75] {
            update(&mut state, t, &LEFT_HELD).unwrap();
        }
        let before = state.player.score;
        drain_events(&mut state);

        update(&mut state, 2.0, &LEFT_HELD).unwrap();
        assert!(drain_events(&mut state).contains(&GameEvent::HoldComplete { lane: Lane::Left }));
        assert!(state.player.score >= before + HOLD_COMPLETE_POINTS);
        assert_eq!(state.player.health, MAX_HEALTH);
        assert_eq!(state.player.combo, 2);
        assert!(!state.arrows[0].active);
    }

    #[test]
    fn hold_bonus_follows_song_time_not_tick_count() {
        let mut coarse = playing(vec![note(1.0, 2.0)], PlayMode::Standard);
        let mut fine = playing(vec![note(1.0, 2.0)], PlayMode::Standard);
        for state in [&mut coarse, &mut fine] {
            update(state, 0.5, &IDLE).unwrap();
            handle_press(state, Lane::Left, 1.0);
        }
        update(&mut coarse, 2.0, &LEFT_HELD).unwrap();
        let mut t = 1.0;
        while t < 2.0 {
            update(&mut fine, t, &LEFT_HELD).unwrap();
            t += 1.0 / 120.0;
        }
        update(&mut fine, 2.0, &LEFT_HELD).unwrap();
        let diff = coarse.player.score.abs_diff(fine.player.score);
        assert!(diff <= HOLD_TICK_POINTS, "{} vs {}", coarse.player.score, fine.player.score);
        assert!(coarse.player.score > 100);
    }

    #[test]
    fn early_release_drops_the_hold() {
        let mut state = playing(vec![note(1.0, 1.0)], PlayMode::Standard);
        update(&mut state, 0.5, &IDLE).unwrap();
        handle_press(&mut state, Lane::Left, 1.0);
        update(&mut state, 1.25, &LEFT_HELD).unwrap();
        drain_events(&mut state);

        update(&mut state, 1.5, &IDLE).unwrap();
        assert_eq!(drain_events(&mut state), vec![GameEvent::HoldDrop { lane: Lane::Left }]);
        assert_eq!(state.player.combo, 0);
        assert_eq!(state.player.health, 95.0);
        assert!(!state.arrows[0].active);
    }

    #[test]
    fn score_never_decreases_and_combo_resets() {
        let notes: Vec<RawNote> = (0..12).map(|i| note(1.0 + i as f32 * 0.5, 0.0)).collect();
        let mut state = playing(notes, PlayMode::Standard);
        let mut last_score = 0;
        let mut t = 0.0;
        let mut i = 0;
        while state.game_state == GameState::Playing && t < 20.0 {
            update(&mut state, t, &IDLE).unwrap();
            // press every other note, spot on
            if i % 20 == 0 {
                handle_press(&mut state, Lane::Left, t);
            }
            for event in drain_events(&mut state) {
                if matches!(event, GameEvent::Miss { .. }) {
                    assert_eq!(state.player.combo, 0);
                }
            }
            assert!(state.player.score >= last_score);
            last_score = state.player.score;
            t += 0.05;
            i += 1;
        }
        assert!(state.player.max_combo >= 1);
    }

    #[test]
    fn health_running_out_fails_standard() {
        let notes: Vec<RawNote> = (0..10).map(|i| note(1.0 + i as f32 * 0.3, 0.0)).collect();
        let mut state = playing(notes, PlayMode::Standard);
        run(&mut state, 0.0, 6.0, &IDLE);
        assert_eq!(state.game_state, GameState::GameOver);
        assert_eq!(state.player.health, 0.0);
        assert!(drain_events(&mut state).contains(&GameEvent::GameOver {
            reason: GameOverReason::Failed,
            score: 0
        }));
    }

    #[test]
    fn empty_chart_completes_on_first_tick() {
        let mut state = playing(Vec::new(), PlayMode::Standard);
        update(&mut state, 0.0, &IDLE).unwrap();
        assert_eq!(state.game_state, GameState::GameOver);
        assert_eq!(
            drain_events(&mut state),
            vec![GameEvent::GameOver {
                reason: GameOverReason::Completed,
                score: 0
            }]
        );
    }

    #[test]
    fn finished_chart_completes_after_grace() {
        let mut state = playing(vec![note(1.0, 0.0)], PlayMode::Standard);
        update(&mut state, 0.5, &IDLE).unwrap();
        handle_press(&mut state, Lane::Left, 1.0);
        update(&mut state, 3.9, &IDLE).unwrap();
        assert_eq!(state.game_state, GameState::Playing);
        update(&mut state, 4.1, &IDLE).unwrap();
        assert_eq!(state.game_state, GameState::GameOver);

        // any press acknowledges
        handle_press(&mut state, Lane::Up, 4.2);
        assert_eq!(state.game_state, GameState::Menu);
    }

    #[test]
    fn non_finite_time_is_rejected_without_side_effects() {
        let mut state = playing(vec![note(1.0, 0.0)], PlayMode::Standard);
        update(&mut state, 0.5, &IDLE).unwrap();
        let arrows = state.arrows.clone();
        assert!(matches!(
            update(&mut state, f32::NAN, &IDLE),
            Err(TickError::NonFiniteClock(_))
        ));
        assert!(update(&mut state, f32::INFINITY, &IDLE).is_err());
        assert_eq!(state.arrows, arrows);
        assert_eq!(state.song_time, 0.5);
    }

    #[test]
    fn learn_mode_waits_for_the_cluster() {
        let notes = vec![note(1.0, 0.0), RawNote::new(1.0, 62, 0.0, 0.8)];
        let mut state = playing(notes, PlayMode::Learn);
        let mut t = 0.0;
        while !state.learn_paused && t < 2.0 {
            update(&mut state, t, &IDLE).unwrap();
            t += 1.0 / 60.0;
        }
        assert!(state.learn_paused);
        assert_eq!(take_clock_requests(&mut state), vec![ClockRequest::Pause]);
        assert!(drain_events(&mut state).contains(&GameEvent::LearnPaused {
            lanes: vec![Lane::Left, Lane::Up]
        }));

        // frozen while waiting
        let frozen = state.arrows.clone();
        update(&mut state, t + 5.0, &IDLE).unwrap();
        assert_eq!(state.arrows, frozen);

        assert!(!handle_press(&mut state, Lane::Right, t));
        assert!(handle_press(&mut state, Lane::Left, t));
        assert!(state.learn_paused);
        assert!(handle_press(&mut state, Lane::Up, t));
        assert!(!state.learn_paused);
        assert_eq!(take_clock_requests(&mut state), vec![ClockRequest::Resume]);
        assert_eq!(state.player.score, 2 * LEARN_CLEAR_POINTS);
        assert_eq!(state.player.combo, 2);
        assert!(state.active_arrows().next().is_none());
    }

    #[test]
    fn one_press_clears_same_lane_duplicates() {
        let mut state = playing(vec![note(1.0, 0.0), note(1.005, 0.0)], PlayMode::Learn);
        let mut t = 0.0;
        while !state.learn_paused && t < 2.0 {
            update(&mut state, t, &IDLE).unwrap();
            t += 1.0 / 60.0;
        }
        assert_eq!(state.pending_cluster, vec![0, 1]);
        assert_eq!(take_clock_requests(&mut state), vec![ClockRequest::Pause]);

        assert!(handle_press(&mut state, Lane::Left, t));
        assert!(!state.learn_paused);
        assert!(state.pending_cluster.is_empty());
        assert_eq!(take_clock_requests(&mut state), vec![ClockRequest::Resume]);
        assert_eq!(state.player.score, LEARN_CLEAR_POINTS);
        assert_eq!(state.player.combo, 1);
        assert!(state.active_arrows().next().is_none());
    }

    #[test]
    fn learn_duplicate_radius_is_exclusive() {
        let mut state = playing(vec![note(5.0, 0.0)], PlayMode::Learn);
        push_arrow(&mut state, Lane::Left, 5.0, 0.0);
        push_arrow(&mut state, Lane::Left, 5.0, 0.0);
        state.arrows[0].y = 500.0;
        state.arrows[1].y = 510.0;
        state.pending_cluster = vec![0, 1];
        state.learn_paused = true;

        assert!(handle_press(&mut state, Lane::Left, 5.0));
        assert_eq!(state.pending_cluster, vec![1]);
        assert!(state.learn_paused);
        assert!(state.arrows[1].active);
    }

    #[test]
    fn practice_speed_is_stepped_and_clamped() {
        let mut state = playing(vec![note(1.0, 0.0)], PlayMode::Practice);
        assert_eq!(change_practice_speed(&mut state, 1), 1.25);
        assert_eq!(change_practice_speed(&mut state, 10), PRACTICE_SPEED_MAX);
        assert_eq!(change_practice_speed(&mut state, -20), PRACTICE_SPEED_MIN);
        assert_eq!(change_practice_speed(&mut state, -1), PRACTICE_SPEED_MIN);
        assert_eq!(
            take_clock_requests(&mut state),
            vec![
                ClockRequest::SetRate(1.25),
                ClockRequest::SetRate(PRACTICE_SPEED_MAX),
                ClockRequest::SetRate(PRACTICE_SPEED_MIN),
            ]
        );

        let mut standard = playing(vec![note(1.0, 0.0)], PlayMode::Standard);
        assert_eq!(change_practice_speed(&mut standard, 1), 1.0);
        assert!(!toggle_practice_pause(&mut standard));
    }

    #[test]
    fn practice_pause_freezes_and_ignores_presses() {
        let mut state = playing(vec![note(1.0, 0.0)], PlayMode::Practice);
        update(&mut state, 0.5, &IDLE).unwrap();
        assert!(toggle_practice_pause(&mut state));
        assert!(!handle_press(&mut state, Lane::Left, 1.0));
        update(&mut state, 1.0, &IDLE).unwrap();
        assert_eq!(state.song_time, 0.5);
        assert!(toggle_practice_pause(&mut state));
        assert_eq!(
            take_clock_requests(&mut state),
            vec![ClockRequest::Pause, ClockRequest::Resume]
        );
    }

    #[test]
    fn fever_doubles_points_then_drains() {
        let notes = vec![note(1.0, 0.0), note(1.5, 0.0)];
        let mut state = playing(notes, PlayMode::Standard);
        update(&mut state, 0.5, &IDLE).unwrap();
        state.player.fever = 99.0;

        handle_press(&mut state, Lane::Left, 1.0);
        assert!(state.player.fever_active);
        assert_eq!(state.player.score, 100);
        handle_press(&mut state, Lane::Left, 1.5);
        assert_eq!(state.player.score, 300);

        run(&mut state, 1.5, 3.5, &IDLE);
        assert!(state.player.fever < FEVER_MAX);
        let events = drain_events(&mut state);
        assert!(events.contains(&GameEvent::FeverStarted));

        // a miss knocks the meter down
        let mut missed = playing(vec![note(1.0, 0.0)], PlayMode::Standard);
        missed.player.fever = 50.0;
        run(&mut missed, 0.0, 2.0, &IDLE);
        assert_eq!(missed.player.fever, 30.0);
    }

    #[test]
    fn spawns_are_capped_per_tick() {
        let notes: Vec<RawNote> = (0..120).map(|i| RawNote::new(1.0 + i as f32 * 0.001, 60 + (i % 4) as u8, 0.0, 0.5)).collect();
        let mut state = playing(notes, PlayMode::Practice);
        update(&mut state, 0.5, &IDLE).unwrap();
        assert_eq!(state.arrows.len(), MAX_SPAWNS_PER_TICK);
        update(&mut state, 0.51, &IDLE).unwrap();
        assert_eq!(state.arrows.len(), 2 * MAX_SPAWNS_PER_TICK);
    }

    #[test]
    fn demo_spawns_taps_deterministically() {
        let make = || {
            let mut state = init_demo(Playfield::default(), 5, 7);
            start(&mut state, PlayMode::Practice);
            for i in 0..600 {
                update(&mut state, i as f32 / 60.0, &IDLE).unwrap();
            }
            let arrows = state.arrows.iter().map(|a| (a.lane, a.hit_time)).collect::<Vec<_>>();
            (state.next_arrow_id, arrows)
        };
        let first = make();
        assert!(first.0 > 0);
        assert_eq!(first, make());
    }

    #[test]
    fn captions_name_the_judgment() {
        let hit = GameEvent::Hit {
            lane: Lane::Down,
            tier: Tier::Great,
            points: 20,
        };
        assert_eq!(hit.caption(), Some("GREAT"));
        assert_eq!(GameEvent::Miss { lane: Lane::Up }.caption(), Some("MISS"));
        assert_eq!(GameEvent::LearnResumed.caption(), None);
        assert_eq!("learn".parse::<PlayMode>(), Ok(PlayMode::Learn));
        assert!("arcade".parse::<PlayMode>().is_err());
    }
}
