// Clock - Tick source driving the sequencer
// MidiClock owns a timer thread; ManualClock is stepped by its host

use super::{SequencerError, lock};
use super::timeline::DEFAULT_TEMPO_MICROS;
use crate::midi::event::MetaMessage;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// One elapsed tick
///
/// `generation` identifies the run (incremented by every continue/stop/seek)
/// so a listener can drop ticks computed for a run that has since ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick {
    pub generation: u64,
    pub tick: u64,
}

/// Callback invoked for every elapsed tick, never with a clock lock held
pub type TickHandler = Arc<dyn Fn(ClockTick) + Send + Sync>;

/// Timing source consumed by the sequencer
///
/// The clock owns wall-clock timing; musical semantics stay in the sequencer.
pub trait Clock: Send + Sync {
    fn set_tick_handler(&self, handler: TickHandler);

    fn ppqn(&self) -> u16;
    fn set_ppqn(&self, ppqn: u16);

    /// Microseconds per quarter note
    fn tempo(&self) -> u32;
    fn set_tempo(&self, micros_per_quarter: u32);

    fn speed(&self) -> f64;
    fn set_speed(&self, speed: f64);

    /// Start ticking from the current tick count, returns the run generation
    fn continue_clock(&self) -> Result<u64, SequencerError>;
    fn stop(&self);

    /// Next tick to be emitted (ticks elapsed so far)
    fn current_ticks(&self) -> u64;
    fn set_ticks(&self, ticks: u64);

    /// Release the timing resource. Idempotent.
    fn shutdown(&self);

    /// Retune from a meta event played while running
    fn process_meta(&self, meta: &MetaMessage) {
        if let Some(tempo) = meta.tempo_micros() {
            self.set_tempo(tempo);
        }
    }
}

/// Clock parameters shared by both implementations
struct ClockState {
    ppqn: u16,
    tempo: u32,
    speed: f64,
    next_tick: u64,
    running: bool,
    generation: u64,
    /// Wall-clock instant and fractional tick position of the last re-anchor
    anchor: Option<(Instant, f64)>,
    shutdown: bool,
    handler: Option<TickHandler>,
}

impl ClockState {
    fn new() -> Self {
        Self {
            ppqn: 96,
            tempo: DEFAULT_TEMPO_MICROS,
            speed: 1.0,
            next_tick: 0,
            running: false,
            generation: 0,
            anchor: None,
            shutdown: false,
            handler: None,
        }
    }

    /// Ticks per second at the current tempo and speed
    fn rate(&self) -> f64 {
        self.ppqn as f64 * 1_000_000.0 / self.tempo as f64 * self.speed
    }

    fn position_at(&self, now: Instant) -> f64 {
        match self.anchor {
            Some((at, ticks)) => ticks + now.saturating_duration_since(at).as_secs_f64() * self.rate(),
            None => self.next_tick as f64,
        }
    }

    /// Keep the elapsed position when the rate changes
    fn reanchor(&mut self, now: Instant) {
        if self.running {
            let position = self.position_at(now);
            self.anchor = Some((now, position));
        }
    }

    fn start(&mut self, now: Instant) -> u64 {
        self.generation += 1;
        self.running = true;
        self.anchor = Some((now, self.next_tick as f64));
        self.generation
    }

    fn halt(&mut self) {
        if self.running {
            self.generation += 1;
        }
        self.running = false;
        self.anchor = None;
    }

    fn set_ticks(&mut self, ticks: u64, now: Instant) {
        self.next_tick = ticks;
        if self.running {
            self.generation += 1;
            self.anchor = Some((now, ticks as f64));
        }
    }
}

struct ClockShared {
    state: Mutex<ClockState>,
    wake: Condvar,
    resolution: Duration,
}

/// Real-time clock backed by a dedicated timer thread
///
/// The thread wakes every `resolution`, emits all ticks that became due since
/// the last wake-up and goes back to sleep. While stopped it parks on a
/// condition variable.
pub struct MidiClock {
    shared: Arc<ClockShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl MidiClock {
    /// Spawn the timer thread
    pub fn new(resolution: Duration) -> Result<Self, SequencerError> {
        let shared = Arc::new(ClockShared {
            state: Mutex::new(ClockState::new()),
            wake: Condvar::new(),
            resolution: resolution.max(Duration::from_micros(100)),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("sequencer-clock".to_string())
            .spawn(move || Self::run(thread_shared))
            .map_err(|e| SequencerError::Clock(format!("Failed to spawn clock thread: {}", e)))?;

        log::debug!(target: "Clock", "Clock thread started ({:?} resolution)", resolution);

        Ok(Self {
            shared,
            thread: Mutex::new(Some(handle)),
        })
    }

    fn run(shared: Arc<ClockShared>) {
        let mut state = lock(&shared.state);
        loop {
            while !state.running && !state.shutdown {
                state = shared
                    .wake
                    .wait(state)
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
            }
            if state.shutdown {
                break;
            }

            let due = state.position_at(Instant::now()).floor() as u64;
            let from = state.next_tick;
            let batch = if due >= from {
                state
                    .handler
                    .clone()
                    .map(|handler| (handler, state.generation, from, due))
            } else {
                None
            };
            if batch.is_some() {
                state.next_tick = due + 1;
            }

            if let Some((handler, generation, from, to)) = batch {
                drop(state);
                for tick in from..=to {
                    handler(ClockTick { generation, tick });
                }
                state = lock(&shared.state);
            }

            if state.shutdown {
                break;
            }
            if state.running {
                state = shared
                    .wake
                    .wait_timeout(state, shared.resolution)
                    .map(|(guard, _)| guard)
                    .unwrap_or_else(|poisoned| poisoned.into_inner().0);
            }
        }
        log::debug!(target: "Clock", "Clock thread exiting");
    }

    fn state(&self) -> MutexGuard<'_, ClockState> {
        lock(&self.shared.state)
    }
}

impl Clock for MidiClock {
    fn set_tick_handler(&self, handler: TickHandler) {
        self.state().handler = Some(handler);
    }

    fn ppqn(&self) -> u16 {
        self.state().ppqn
    }

    fn set_ppqn(&self, ppqn: u16) {
        let mut state = self.state();
        state.reanchor(Instant::now());
        state.ppqn = ppqn.max(1);
    }

    fn tempo(&self) -> u32 {
        self.state().tempo
    }

    fn set_tempo(&self, micros_per_quarter: u32) {
        let mut state = self.state();
        state.reanchor(Instant::now());
        state.tempo = micros_per_quarter.max(1);
    }

    fn speed(&self) -> f64 {
        self.state().speed
    }

    fn set_speed(&self, speed: f64) {
        if !(speed.is_finite() && speed > 0.0) {
            return;
        }
        let mut state = self.state();
        state.reanchor(Instant::now());
        state.speed = speed;
    }

    fn continue_clock(&self) -> Result<u64, SequencerError> {
        let mut state = self.state();
        if state.shutdown {
            return Err(SequencerError::Clock("clock has been shut down".to_string()));
        }
        let generation = state.start(Instant::now());
        self.shared.wake.notify_all();
        Ok(generation)
    }

    fn stop(&self) {
        self.state().halt();
        self.shared.wake.notify_all();
    }

    fn current_ticks(&self) -> u64 {
        self.state().next_tick
    }

    fn set_ticks(&self, ticks: u64) {
        self.state().set_ticks(ticks, Instant::now());
        self.shared.wake.notify_all();
    }

    fn shutdown(&self) {
        {
            let mut state = self.state();
            state.halt();
            state.shutdown = true;
            // Drop the handler so it cannot keep its owner alive
            state.handler = None;
        }
        self.shared.wake.notify_all();

        let handle = lock(&self.thread).take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Called from a tick handler: the loop exits on its own
                return;
            }
            if handle.join().is_err() {
                log::error!(target: "Clock", "Clock thread panicked");
            }
        }
    }
}

impl Drop for MidiClock {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Clock stepped explicitly by its host
///
/// `advance` emits ticks synchronously on the caller's thread. Useful when
/// time comes from elsewhere (an audio callback, a synchronised network
/// timer) and for deterministic tests.
pub struct ManualClock {
    state: Mutex<ClockState>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClockState::new()),
        }
    }

    /// Emit up to `ticks` ticks while running, returns how many were emitted
    ///
    /// Stops early if the clock is stopped or repositioned by a handler.
    pub fn advance(&self, ticks: u64) -> u64 {
        let mut emitted = 0;
        while emitted < ticks {
            let (handler, clock_tick) = {
                let mut state = lock(&self.state);
                if !state.running {
                    break;
                }
                let Some(handler) = state.handler.clone() else {
                    break;
                };
                let tick = state.next_tick;
                state.next_tick += 1;
                (
                    handler,
                    ClockTick {
                        generation: state.generation,
                        tick,
                    },
                )
            };
            handler(clock_tick);
            emitted += 1;
        }
        emitted
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).running
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn set_tick_handler(&self, handler: TickHandler) {
        lock(&self.state).handler = Some(handler);
    }

    fn ppqn(&self) -> u16 {
        lock(&self.state).ppqn
    }

    fn set_ppqn(&self, ppqn: u16) {
        lock(&self.state).ppqn = ppqn.max(1);
    }

    fn tempo(&self) -> u32 {
        lock(&self.state).tempo
    }

    fn set_tempo(&self, micros_per_quarter: u32) {
        lock(&self.state).tempo = micros_per_quarter.max(1);
    }

    fn speed(&self) -> f64 {
        lock(&self.state).speed
    }

    fn set_speed(&self, speed: f64) {
        if speed.is_finite() && speed > 0.0 {
            lock(&self.state).speed = speed;
        }
    }

    fn continue_clock(&self) -> Result<u64, SequencerError> {
        let mut state = lock(&self.state);
        if state.shutdown {
            return Err(SequencerError::Clock("clock has been shut down".to_string()));
        }
        Ok(state.start(Instant::now()))
    }

    fn stop(&self) {
        lock(&self.state).halt();
    }

    fn current_ticks(&self) -> u64 {
        lock(&self.state).next_tick
    }

    fn set_ticks(&self, ticks: u64) {
        lock(&self.state).set_ticks(ticks, Instant::now());
    }

    fn shutdown(&self) {
        let mut state = lock(&self.state);
        state.halt();
        state.shutdown = true;
        state.handler = None;
    }
}
