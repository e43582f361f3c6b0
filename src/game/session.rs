use crate::core::clock::ClockSource;
use crate::core::input::{lane_from_key_name, Debouncer, InputSource, Lane, RawEdge};
use crate::core::touch::{TouchPhase, TouchSurface};
use crate::game::display_filter::DisplayFilter;
use crate::game::gameplay::{self, ClockRequest, GameEvent, GameState, PlayMode};
use log::{debug, error};
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

/// An engine event plus whether the judgment text for it should be drawn.
#[derive(Clone, Debug, PartialEq)]
pub struct FrameEvent {
    pub event: GameEvent,
    pub visible: bool,
}

/// One song session: the clock, the input pipeline, the engine and the
/// judgment display throttle, driven once per rendered frame.
pub struct Session<C: ClockSource> {
    clock: C,
    debouncer: Debouncer,
    touch: TouchSurface,
    filter: DisplayFilter,
    pub engine: gameplay::State,
    skipped_frames: u32,
}

impl<C: ClockSource> Session<C> {
    pub fn new(engine: gameplay::State, clock: C) -> Self {
        let touch = TouchSurface::new(0.0, engine.playfield.width);
        Self {
            clock,
            debouncer: Debouncer::new(),
            touch,
            filter: DisplayFilter::new(),
            engine,
            skipped_frames: 0,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn skipped_frames(&self) -> u32 {
        self.skipped_frames
    }

    pub fn song_time(&self, now: Instant) -> f32 {
        self.clock.position(now)
    }

    pub fn is_over(&self) -> bool {
        self.engine.game_state == GameState::GameOver
    }

    pub fn start(&mut self, mode: PlayMode, now: Instant) {
        gameplay::start(&mut self.engine, mode);
        self.apply_clock_requests(now);
    }

    pub fn press(&mut self, lane: Lane, source: InputSource, repeat: bool, at: Instant) {
        if !repeat {
            self.filter.note_input(at);
        }
        self.debouncer.feed(RawEdge {
            lane,
            pressed: true,
            repeat,
            source,
            timestamp: at,
        });
    }

    pub fn release(&mut self, lane: Lane, source: InputSource, at: Instant) {
        self.debouncer.feed(RawEdge {
            lane,
            pressed: false,
            repeat: false,
            source,
            timestamp: at,
        });
    }

    /// Keyboard edge by key code name. Unmapped keys are ignored.
    pub fn key(&mut self, code: &str, pressed: bool, repeat: bool, at: Instant) {
        let Some(lane) = lane_from_key_name(code) else {
            debug!("Ignoring unmapped key {}", code);
            return;
        };
        if pressed {
            self.press(lane, InputSource::Keyboard, repeat, at);
        } else {
            self.release(lane, InputSource::Keyboard, at);
        }
    }

    pub fn touch(&mut self, id: u64, phase: TouchPhase, x: f32, at: Instant) {
        if phase == TouchPhase::Start {
            self.filter.note_input(at);
        }
        for raw in self.touch.handle(id, phase, x, at) {
            debug!(
                "Touch {} {} {:?}; {} finger(s) there",
                id,
                if raw.pressed { "pressed" } else { "released" },
                raw.lane,
                self.touch.fingers_on(raw.lane)
            );
            self.debouncer.feed(raw);
        }
    }

    pub fn toggle_practice_pause(&mut self, now: Instant) -> bool {
        let toggled = gameplay::toggle_practice_pause(&mut self.engine);
        self.apply_clock_requests(now);
        toggled
    }

    pub fn change_practice_speed(&mut self, steps: i32, now: Instant) -> f32 {
        let speed = gameplay::change_practice_speed(&mut self.engine, steps);
        self.apply_clock_requests(now);
        speed
    }

    fn apply_clock_requests(&mut self, now: Instant) {
        for request in gameplay::take_clock_requests(&mut self.engine) {
            match request {
                ClockRequest::Pause => self.clock.pause(now),
                ClockRequest::Resume => self.clock.resume(now),
                ClockRequest::SetRate(rate) => self.clock.set_rate(rate, now),
            }
        }
    }

    fn process_input_edges(&mut self, now: Instant) {
        self.debouncer.poll(now);
        while let Some(edge) = self.debouncer.next_edge() {
            if !edge.pressed {
                continue;
            }
            let at = self.clock.position_at(edge.timestamp, now);
            gameplay::handle_press(&mut self.engine, edge.lane, at);
        }
    }

    /// Runs one frame at wall time `now` and returns what the engine
    /// reported. A failing tick is logged and skipped.
    pub fn frame(&mut self, now: Instant) -> Vec<FrameEvent> {
        self.process_input_edges(now);

        let song_time = self.clock.position(now);
        let held = self.debouncer.state().held_lanes();
        let engine = &mut self.engine;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            gameplay::update(engine, song_time, &held)
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.skipped_frames += 1;
                error!("Skipping frame: {}", e);
            }
            Err(_) => {
                self.skipped_frames += 1;
                error!("Gameplay tick panicked at {:.3}s; skipping frame", song_time);
            }
        }

        self.apply_clock_requests(now);

        gameplay::drain_events(&mut self.engine)
            .into_iter()
            .map(|event| {
                let visible = self.filter.admit_event(&event, now);
                FrameEvent { event, visible }
            })
            .collect()
    }
}
