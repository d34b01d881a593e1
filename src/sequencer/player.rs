// Sequencer Player - Plays a score by advancing track cursors on clock ticks
// One playback lock serializes tick passes and control commands

use super::chaser::{ChannelChaser, ChannelStopper};
use super::clock::{Clock, ClockTick, MidiClock};
use super::cursor::TrackCursor;
use super::dispatcher::MessageDispatcher;
use super::tempo_map::{TempoMap, check_speed};
use super::timeline::Tempo;
use super::transport::{SharedTransportState, TransportState};
use super::{SequencerError, lock};
use crate::config::SequencerConfig;
use crate::messaging::{Notification, NotificationCategory, NotificationProducer, NotificationSink};
use crate::midi::event::{ChannelMessage, MidiMessage};
use crate::score::Score;
use arc_swap::ArcSwapOption;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::{self, ThreadId};

/// A score with the tempo map built from it, replaced as one unit
struct LoadedScore {
    score: Arc<Score>,
    tempo_map: Arc<TempoMap>,
}

/// State guarded by the playback lock
#[derive(Default)]
struct PlaybackState {
    cursors: Vec<TrackCursor>,
    tracks_remaining: usize,
    /// Clock generation of the current run; ticks from other runs are dropped
    generation: u64,
    /// First tick the current run has not dispatched yet
    next_tick: u64,
    stopper: ChannelStopper,
}

/// Playback lock guard that records the owning thread
struct StateGuard<'a> {
    owner: &'a Mutex<Option<ThreadId>>,
    state: MutexGuard<'a, PlaybackState>,
}

impl Deref for StateGuard<'_> {
    type Target = PlaybackState;

    fn deref(&self) -> &PlaybackState {
        &self.state
    }
}

impl DerefMut for StateGuard<'_> {
    fn deref_mut(&mut self) -> &mut PlaybackState {
        &mut self.state
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        // Runs before the MutexGuard field is released
        *lock(self.owner) = None;
    }
}

enum Entry<'a> {
    Locked(StateGuard<'a>),
    /// The calling thread already holds the playback lock
    Reentrant,
}

/// Notifications raised under the lock, delivered once it is released
#[derive(Default)]
struct Deferred {
    stopped: Option<Vec<ChannelMessage>>,
    completed: bool,
}

struct SequencerInner {
    config: SequencerConfig,
    clock: Arc<dyn Clock>,
    state: Mutex<PlaybackState>,
    lock_owner: Mutex<Option<ThreadId>>,
    loaded: ArcSwapOption<LoadedScore>,
    transport: SharedTransportState,
    dispatcher: MessageDispatcher,
}

impl SequencerInner {
    fn acquire(&self) -> Entry<'_> {
        let me = thread::current().id();
        if *lock(&self.lock_owner) == Some(me) {
            return Entry::Reentrant;
        }
        let state = lock(&self.state);
        *lock(&self.lock_owner) = Some(me);
        Entry::Locked(StateGuard {
            owner: &self.lock_owner,
            state,
        })
    }

    fn acquire_for(&self, operation: &'static str) -> Result<StateGuard<'_>, SequencerError> {
        match self.acquire() {
            Entry::Locked(guard) => Ok(guard),
            Entry::Reentrant => {
                log::warn!(target: "Sequencer", "Rejected re-entrant {}", operation);
                Err(SequencerError::Reentrant(operation))
            }
        }
    }

    fn ensure_live(&self) -> Result<(), SequencerError> {
        if self.transport.is_disposed() {
            Err(SequencerError::Disposed)
        } else {
            Ok(())
        }
    }

    fn flush(&self, deferred: Deferred) {
        if let Some(messages) = deferred.stopped {
            self.dispatcher.stopped(&messages);
        }
        if deferred.completed {
            log::info!(target: "Sequencer", "Playback completed");
            self.dispatcher.report(Notification::info(
                NotificationCategory::Playback,
                "Playback completed".to_string(),
            ));
            self.dispatcher.completed();
        }
    }

    /// Stop the current run, returns the safety messages if it was playing
    fn stop_locked(&self, state: &mut PlaybackState) -> Option<Vec<ChannelMessage>> {
        if !self.transport.is_playing() {
            return None;
        }
        self.transport.set_playing(false);
        self.clock.stop();
        // The clock may have claimed ticks the last pass never reached
        self.clock.set_ticks(state.next_tick);
        state.cursors.clear();
        state.tracks_remaining = 0;

        log::debug!(target: "Sequencer", "Stopped at tick {}", self.clock.current_ticks());
        Some(state.stopper.all_sound_off())
    }

    /// Start a run from the clock's current tick
    fn continue_locked(
        &self,
        state: &mut PlaybackState,
        deferred: &mut Deferred,
    ) -> Result<(), SequencerError> {
        let Some(loaded) = self.loaded.load_full() else {
            log::debug!(target: "Sequencer", "Continue ignored: no score loaded");
            return Ok(());
        };

        if let Some(messages) = self.stop_locked(state) {
            deferred.stopped = Some(messages);
        }

        let position = self.clock.current_ticks();
        let tracks = loaded.score.tracks();
        let cursors: Vec<TrackCursor> = tracks
            .iter()
            .enumerate()
            .map(|(index, track)| TrackCursor::new(index, track, position))
            .collect();

        // A track already past its end never reports end-of-track
        let remaining = cursors
            .iter()
            .zip(tracks)
            .filter(|(cursor, track)| !cursor.is_exhausted(track))
            .count();
        if remaining == 0 {
            log::debug!(target: "Sequencer", "Nothing left to play at tick {}", position);
            return Ok(());
        }

        self.clock.set_ppqn(loaded.score.division());
        self.clock.set_tempo(loaded.tempo_map.tempo_at(position));
        self.transport.take_stop_request();

        if position > 0 && self.config.chase_on_seek {
            let mut chaser = ChannelChaser::new();
            for (cursor, track) in cursors.iter().zip(tracks) {
                chaser.process_events(cursor.skipped(track));
            }
            if !chaser.is_empty() {
                self.dispatcher.chased(&chaser.messages());
                if self.transport.take_stop_request() {
                    return Ok(());
                }
            }
        }

        state.cursors = cursors;
        state.tracks_remaining = remaining;
        state.next_tick = position;
        self.transport.set_playing(true);

        match self.clock.continue_clock() {
            Ok(generation) => {
                state.generation = generation;
                log::debug!(
                    target: "Sequencer",
                    "Playing from tick {} ({} track(s), tempo {} µs/quarter)",
                    position,
                    remaining,
                    self.clock.tempo()
                );
                Ok(())
            }
            Err(e) => {
                self.transport.set_playing(false);
                state.cursors.clear();
                state.tracks_remaining = 0;
                log::error!(target: "Sequencer", "Failed to start clock: {}", e);
                self.dispatcher
                    .report(Notification::error(NotificationCategory::Clock, e.to_string()));
                Err(e)
            }
        }
    }

    fn on_tick(&self, tick: ClockTick) {
        if self.transport.is_disposed() {
            return;
        }

        let mut deferred = Deferred::default();
        {
            let Entry::Locked(mut guard) = self.acquire() else {
                log::warn!(
                    target: "Sequencer",
                    "Tick {} delivered inside a tick pass, ignored",
                    tick.tick
                );
                return;
            };
            if !self.transport.is_playing() || guard.generation != tick.generation {
                return;
            }
            let Some(loaded) = self.loaded.load_full() else {
                return;
            };

            let completed = self.run_pass(&mut guard, &loaded.score, tick.tick);
            guard.next_tick = tick.tick + 1;
            if completed || self.transport.take_stop_request() {
                deferred.stopped = self.stop_locked(&mut guard);
                deferred.completed = completed;
            }
        }
        self.flush(deferred);
    }

    /// Dispatch every event due at `tick`, returns true once all tracks ended
    fn run_pass(&self, state: &mut PlaybackState, score: &Score, tick: u64) -> bool {
        let PlaybackState {
            cursors,
            tracks_remaining,
            stopper,
            ..
        } = state;
        let tracks = score.tracks();

        for cursor in cursors.iter_mut() {
            let Some(track) = tracks.get(cursor.track_index()) else {
                continue;
            };
            for event in cursor.advance(track, tick) {
                match &event.message {
                    MidiMessage::Channel(message) => {
                        stopper.process(message);
                        self.dispatcher.dispatch_channel(message);
                    }
                    MidiMessage::Meta(meta) if meta.is_end_of_track() => {
                        *tracks_remaining = tracks_remaining.saturating_sub(1);
                    }
                    MidiMessage::Meta(meta) => {
                        self.clock.process_meta(meta);
                        self.dispatcher.dispatch_meta(meta);
                    }
                    MidiMessage::SysEx(sysex) => self.dispatcher.dispatch_sysex(sysex),
                }

                if self.transport.stop_requested() {
                    return false;
                }
            }
        }

        *tracks_remaining == 0
    }
}

/// Tick-driven score player
///
/// All commands are safe to call from any thread. Listener callbacks run on
/// the clock's thread while the playback lock is held: `stop()` from a
/// callback is deferred to the end of the tick pass, other mutating calls
/// from a callback fail with [`SequencerError::Reentrant`].
pub struct Sequencer {
    inner: Arc<SequencerInner>,
}

impl Sequencer {
    /// Create a sequencer driven by a real-time [`MidiClock`]
    pub fn new(
        config: SequencerConfig,
        notifications: NotificationProducer,
    ) -> Result<Self, SequencerError> {
        config
            .validate()
            .map_err(|e| SequencerError::InvalidArgument(e.to_string()))?;
        let clock = MidiClock::new(config.clock_resolution())?;
        Self::with_clock(config, Arc::new(clock), notifications)
    }

    /// Create a sequencer driven by any clock
    pub fn with_clock(
        config: SequencerConfig,
        clock: Arc<dyn Clock>,
        notifications: NotificationProducer,
    ) -> Result<Self, SequencerError> {
        config
            .validate()
            .map_err(|e| SequencerError::InvalidArgument(e.to_string()))?;

        clock.set_speed(config.speed);
        clock.set_tempo(config.default_tempo_us);

        let inner = Arc::new(SequencerInner {
            config,
            clock,
            state: Mutex::new(PlaybackState::default()),
            lock_owner: Mutex::new(None),
            loaded: ArcSwapOption::empty(),
            transport: SharedTransportState::new(),
            dispatcher: MessageDispatcher::new(NotificationSink::new(notifications)),
        });

        let weak: Weak<SequencerInner> = Arc::downgrade(&inner);
        inner.clock.set_tick_handler(Arc::new(move |tick: ClockTick| {
            if let Some(inner) = weak.upgrade() {
                inner.on_tick(tick);
            }
        }));

        log::debug!(target: "Sequencer", "Sequencer created");
        Ok(Self { inner })
    }

    /// Listener registration for played events and playback notifications
    pub fn dispatcher(&self) -> &MessageDispatcher {
        &self.inner.dispatcher
    }

    /// Load a score, stopping playback and rewinding to tick 0
    ///
    /// Scores timed in SMPTE frames are rejected.
    pub fn set_score(&self, score: Arc<Score>) -> Result<(), SequencerError> {
        let inner = &self.inner;
        inner.ensure_live()?;
        if score.is_smpte() {
            return Err(SequencerError::InvalidArgument(
                "SMPTE time base is not supported".to_string(),
            ));
        }

        let mut deferred = Deferred::default();
        {
            let mut guard = inner.acquire_for("set_score")?;
            deferred.stopped = inner.stop_locked(&mut guard);

            let tempo_map = TempoMap::build(&score, inner.config.default_tempo_us);
            inner.clock.set_ticks(0);
            inner.clock.set_ppqn(score.division());
            inner.clock.set_tempo(tempo_map.tempo_at(0));

            log::info!(
                target: "Sequencer",
                "Score loaded: {} track(s), {} ticks, {:.0} ms",
                score.track_count(),
                score.total_length_ticks(),
                tempo_map.duration_millis()
            );
            inner.loaded.store(Some(Arc::new(LoadedScore {
                score,
                tempo_map: Arc::new(tempo_map),
            })));
        }
        inner.flush(deferred);
        Ok(())
    }

    pub fn score(&self) -> Option<Arc<Score>> {
        self.inner
            .loaded
            .load_full()
            .map(|loaded| Arc::clone(&loaded.score))
    }

    pub fn tempo_map(&self) -> Option<Arc<TempoMap>> {
        self.inner
            .loaded
            .load_full()
            .map(|loaded| Arc::clone(&loaded.tempo_map))
    }

    /// Rewind to tick 0 and play
    pub fn start(&self) -> Result<(), SequencerError> {
        let inner = &self.inner;
        inner.ensure_live()?;

        let mut deferred = Deferred::default();
        let result = {
            let mut guard = inner.acquire_for("start")?;
            deferred.stopped = inner.stop_locked(&mut guard);
            inner.clock.set_ticks(0);
            inner.continue_locked(&mut guard, &mut deferred)
        };
        inner.flush(deferred);
        result
    }

    /// Play from the current position
    ///
    /// Does nothing when no score is loaded.
    pub fn continue_playback(&self) -> Result<(), SequencerError> {
        let inner = &self.inner;
        inner.ensure_live()?;

        let mut deferred = Deferred::default();
        let result = {
            let mut guard = inner.acquire_for("continue_playback")?;
            inner.continue_locked(&mut guard, &mut deferred)
        };
        inner.flush(deferred);
        result
    }

    /// Stop playback, keeping the position
    ///
    /// Once this returns no further event of the stopped run is dispatched.
    /// Called from a listener, the stop takes effect at the end of the
    /// current event.
    pub fn stop(&self) -> Result<(), SequencerError> {
        let inner = &self.inner;
        inner.ensure_live()?;

        match inner.acquire() {
            Entry::Reentrant => {
                log::debug!(target: "Sequencer", "Stop requested from inside a tick pass");
                inner.transport.request_stop();
            }
            Entry::Locked(mut guard) => {
                let deferred = Deferred {
                    stopped: inner.stop_locked(&mut guard),
                    completed: false,
                };
                drop(guard);
                inner.flush(deferred);
            }
        }
        Ok(())
    }

    /// Move to `ticks`, resuming playback if it was running
    pub fn set_position(&self, ticks: u64) -> Result<(), SequencerError> {
        let inner = &self.inner;
        inner.ensure_live()?;

        let mut deferred = Deferred::default();
        let result = {
            let mut guard = inner.acquire_for("set_position")?;
            let Some(loaded) = inner.loaded.load_full() else {
                log::debug!(target: "Sequencer", "set_position ignored: no score loaded");
                return Ok(());
            };
            let length = loaded.tempo_map.length_ticks();
            if ticks > length {
                return Err(SequencerError::OutOfRange(format!(
                    "position {} is past the end of the score ({})",
                    ticks, length
                )));
            }

            let was_playing = inner.transport.is_playing();
            deferred.stopped = inner.stop_locked(&mut guard);
            inner.clock.set_ticks(ticks);
            if was_playing {
                inner.continue_locked(&mut guard, &mut deferred)
            } else {
                Ok(())
            }
        };
        inner.flush(deferred);
        result
    }

    /// Current position in ticks, never past the end of the loaded score
    pub fn position(&self) -> Result<u64, SequencerError> {
        let ticks = self.inner.clock.current_ticks();
        Ok(match self.loaded()? {
            Some(loaded) => ticks.min(loaded.tempo_map.length_ticks()),
            None => ticks,
        })
    }

    /// Playback speed multiplier; 2.0 plays twice as fast
    pub fn set_speed(&self, speed: f64) -> Result<(), SequencerError> {
        self.inner.ensure_live()?;
        check_speed(speed)?;
        self.inner.clock.set_speed(speed);
        Ok(())
    }

    pub fn speed(&self) -> Result<f64, SequencerError> {
        self.inner.ensure_live()?;
        Ok(self.inner.clock.speed())
    }

    /// Tempo the clock currently runs at
    pub fn tempo(&self) -> Result<Tempo, SequencerError> {
        self.inner.ensure_live()?;
        Tempo::from_micros_per_quarter(self.inner.clock.tempo())
    }

    /// Lock-free
    pub fn is_playing(&self) -> bool {
        !self.inner.transport.is_disposed() && self.inner.transport.is_playing()
    }

    pub fn state(&self) -> TransportState {
        if self.is_playing() {
            TransportState::Playing
        } else {
            TransportState::Stopped
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.transport.is_disposed()
    }

    fn loaded(&self) -> Result<Option<Arc<LoadedScore>>, SequencerError> {
        self.inner.ensure_live()?;
        Ok(self.inner.loaded.load_full())
    }

    /// Elapsed playback time in milliseconds, 0 without a score
    pub fn current_time_ms(&self) -> Result<u64, SequencerError> {
        let Some(loaded) = self.loaded()? else {
            return Ok(0);
        };
        let map = &loaded.tempo_map;
        let ticks = self.inner.clock.current_ticks().min(map.length_ticks());
        Ok(map.ticks_to_millis(ticks, self.inner.clock.speed())?.round() as u64)
    }

    /// Score duration in milliseconds at the current speed, 0 without a score
    pub fn duration_ms(&self) -> Result<u64, SequencerError> {
        let Some(loaded) = self.loaded()? else {
            return Ok(0);
        };
        let speed = self.inner.clock.speed();
        Ok((loaded.tempo_map.duration_millis() / speed).round() as u64)
    }

    /// Elapsed fraction of the score's duration, in `[0, 1]`
    pub fn current_progress(&self) -> Result<f64, SequencerError> {
        let Some(loaded) = self.loaded()? else {
            return Ok(0.0);
        };
        let map = &loaded.tempo_map;
        let ticks = self.inner.clock.current_ticks().min(map.length_ticks());
        map.ticks_to_progress(ticks)
    }

    pub fn progress_to_ticks(&self, progress: f64) -> Result<u64, SequencerError> {
        let loaded = self.loaded()?.ok_or(SequencerError::NotLoaded)?;
        loaded.tempo_map.progress_to_ticks(progress)
    }

    /// Milliseconds from the start of the score to `ticks` at the current speed
    pub fn ticks_to_milliseconds(&self, ticks: u64) -> Result<f64, SequencerError> {
        let loaded = self.loaded()?.ok_or(SequencerError::NotLoaded)?;
        loaded
            .tempo_map
            .ticks_to_millis(ticks, self.inner.clock.speed())
    }

    /// Stop playback and release the clock. Idempotent.
    ///
    /// Every other operation fails with [`SequencerError::Disposed`] afterwards.
    pub fn dispose(&self) {
        let inner = &self.inner;
        if !inner.transport.mark_disposed() {
            return;
        }

        let mut deferred = Deferred::default();
        match inner.acquire() {
            Entry::Locked(mut guard) => deferred.stopped = inner.stop_locked(&mut guard),
            Entry::Reentrant => inner.transport.request_stop(),
        }
        inner.flush(deferred);

        // Outside the playback lock: the clock thread may be waiting for it
        inner.clock.shutdown();
        log::debug!(target: "Sequencer", "Sequencer disposed");
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        self.dispose();
    }
}
