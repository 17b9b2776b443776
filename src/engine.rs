//! The session engine: observable state, player commands and the timed
//! driver loop that walks a generated sequence.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::config::{Preferences, PreferencesStore};
use crate::driver::{Cancelled, DriverExit, DriverHandle, Pacer};
use crate::error::SessionError;
use crate::observable::Observable;
use crate::sequence::{MatchPolicy, SequenceGenerator};
use crate::session::{
    letter_for, GameState, GameType, MatchResult, Modality, SessionConfig, SessionPhase,
    SessionRuntime, StepStimulus,
};
use crate::speech::SpeechSynthesizer;
use crate::util::lock;

/// Upper bound on the wait for the speech engine before an audio session.
pub const SPEECH_READY_TIMEOUT: Duration = Duration::from_millis(3000);
const SPEECH_READY_POLL: Duration = Duration::from_millis(100);

/// Result of a session that ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub game_type: GameType,
    pub n_back: usize,
    pub number_of_events: usize,
    pub score: u32,
    pub total_matches: u32,
    pub new_highscore: bool,
    pub finished_at: DateTime<Local>,
}

/// Every value the presentation layer can observe.
#[derive(Debug)]
pub struct SessionState {
    pub game_state: Observable<GameState>,
    pub score: Observable<u32>,
    pub highscore: Observable<u32>,
    pub total_matches: Observable<u32>,
    pub is_game_over: Observable<bool>,
    pub visual_result: Observable<MatchResult>,
    pub audio_result: Observable<MatchResult>,
    pub progress: Observable<f32>,
    pub phase: Observable<SessionPhase>,
    pub last_summary: Observable<Option<SessionSummary>>,
}

/// Copy of every observable value at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub game_state: GameState,
    pub score: u32,
    pub highscore: u32,
    pub total_matches: u32,
    pub is_game_over: bool,
    pub visual_result: MatchResult,
    pub audio_result: MatchResult,
    pub progress: f32,
    pub phase: SessionPhase,
}

impl SessionState {
    pub fn new(config: SessionConfig, highscore: u32) -> Self {
        Self {
            game_state: Observable::new(GameState {
                config,
                ..GameState::default()
            }),
            score: Observable::new(0),
            highscore: Observable::new(highscore),
            total_matches: Observable::new(0),
            is_game_over: Observable::new(false),
            visual_result: Observable::new(MatchResult::None),
            audio_result: Observable::new(MatchResult::None),
            progress: Observable::new(0.0),
            phase: Observable::new(SessionPhase::Idle),
            last_summary: Observable::new(None),
        }
    }

    pub fn match_result(&self, modality: Modality) -> &Observable<MatchResult> {
        match modality {
            Modality::Visual => &self.visual_result,
            Modality::Audio => &self.audio_result,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            game_state: self.game_state.get(),
            score: self.score.get(),
            highscore: self.highscore.get(),
            total_matches: self.total_matches.get(),
            is_game_over: self.is_game_over.get(),
            visual_result: self.visual_result.get(),
            audio_result: self.audio_result.get(),
            progress: self.progress.get(),
            phase: self.phase.get(),
        }
    }

    /// Mirror runtime fields. `is_game_over` is left to the caller so it can
    /// be raised last.
    fn publish(&self, runtime: &SessionRuntime) {
        self.score.set(runtime.score());
        self.total_matches.set(runtime.total_matches());
        self.visual_result.set(runtime.result(Modality::Visual));
        self.audio_result.set(runtime.result(Modality::Audio));
        self.progress.set(runtime.progress());
        self.phase.set(runtime.phase());
    }

    fn show_stimulus(&self, stimulus: Option<StepStimulus>) {
        self.game_state.update(|gs| {
            gs.event_index = stimulus.map(|s| s.index);
            gs.visual_value = stimulus.and_then(|s| s.visual);
            gs.audio_value = stimulus.and_then(|s| s.audio);
        });
    }
}

/// Commands and state a presentation layer needs from an n-back game.
pub trait GameEngine: Send + Sync {
    fn state(&self) -> &SessionState;

    fn set_game_type(&self, game_type: GameType);
    fn set_n_back(&self, n_back: usize);
    fn set_number_of_events(&self, number_of_events: usize);
    fn set_match_percentage(&self, percentage: u32);
    fn set_event_interval(&self, interval: Duration);
    fn set_number_of_combinations(&self, letters: usize);
    fn set_grid_size(&self, grid_size: usize);

    fn start_game(&self) -> Result<(), SessionError>;
    /// `None` when the check was ignored.
    fn check_visual_match(&self) -> Option<MatchResult>;
    fn check_audio_match(&self) -> Option<MatchResult>;
    fn reset_game(&self);
    fn reset_settings(&self);
}

struct Shared {
    state: SessionState,
    runtime: Mutex<Option<SessionRuntime>>,
    generator: Mutex<SequenceGenerator>,
    preferences: Arc<dyn PreferencesStore>,
    speech: Arc<dyn SpeechSynthesizer>,
}

/// The concrete engine. One driver thread at most is alive per session.
pub struct Session {
    shared: Arc<Shared>,
    driver: Mutex<Option<DriverHandle>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.shared.state)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Session {
    pub fn new(
        preferences: Arc<dyn PreferencesStore>,
        speech: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self::with_generator(preferences, speech, SequenceGenerator::new())
    }

    /// Like [`Session::new`] with a caller-supplied (typically seeded) generator.
    pub fn with_generator(
        preferences: Arc<dyn PreferencesStore>,
        speech: Arc<dyn SpeechSynthesizer>,
        generator: SequenceGenerator,
    ) -> Self {
        let prefs = preferences.load().unwrap_or_else(|e| {
            tracing::warn!("could not read preferences, using defaults: {e}");
            Preferences::default()
        });
        let mut config = SessionConfig::from(&prefs);
        config.match_policy = generator.policy();

        Self {
            shared: Arc::new(Shared {
                state: SessionState::new(config, prefs.highscore),
                runtime: Mutex::new(None),
                generator: Mutex::new(generator),
                preferences,
                speech,
            }),
            driver: Mutex::new(None),
        }
    }

    /// Session-local; not persisted.
    pub fn set_match_policy(&self, policy: MatchPolicy) {
        self.shared.edit_config(|c| c.match_policy = policy);
    }

    /// True while a driver loop is still walking a sequence.
    pub fn is_running(&self) -> bool {
        lock(&self.driver)
            .as_ref()
            .is_some_and(|driver| !driver.is_finished())
    }

    fn stop_driver(&self, driver: &mut Option<DriverHandle>) {
        if let Some(previous) = driver.take() {
            let exit = previous.cancel_and_join();
            tracing::debug!(?exit, "previous session driver stopped");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let mut driver = lock(&self.driver);
        self.stop_driver(&mut driver);
    }
}

impl GameEngine for Session {
    fn state(&self) -> &SessionState {
        &self.shared.state
    }

    fn set_game_type(&self, game_type: GameType) {
        self.shared.edit_config(|c| c.game_type = game_type);
    }

    fn set_n_back(&self, n_back: usize) {
        self.shared.edit_config(|c| c.n_back = n_back);
        self.shared.persist("n_back", |p| p.n_back = n_back);
    }

    fn set_number_of_events(&self, number_of_events: usize) {
        self.shared
            .edit_config(|c| c.number_of_events = number_of_events);
        self.shared
            .persist("number_of_events", |p| p.number_of_events = number_of_events);
    }

    fn set_match_percentage(&self, percentage: u32) {
        self.shared.edit_config(|c| c.match_percentage = percentage);
    }

    fn set_event_interval(&self, interval: Duration) {
        let millis = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.shared.edit_config(|c| c.event_interval = interval);
        self.shared
            .persist("event_interval_ms", |p| p.event_interval_ms = millis);
    }

    fn set_number_of_combinations(&self, letters: usize) {
        self.shared.edit_config(|c| c.letter_count = letters);
        self.shared
            .persist("number_of_combinations", |p| p.number_of_combinations = letters);
    }

    fn set_grid_size(&self, grid_size: usize) {
        self.shared.edit_config(|c| c.grid_size = grid_size);
        self.shared.persist("grid_size", |p| p.grid_size = grid_size);
    }

    fn start_game(&self) -> Result<(), SessionError> {
        let config = self.shared.state.game_state.get().config;
        // Generate before touching anything shared: a bad config must leave
        // a running session alone.
        let runtime = {
            let mut generator = lock(&self.shared.generator);
            SessionRuntime::prepare(config.clone(), &mut generator)?
        };

        let mut driver = lock(&self.driver);
        self.stop_driver(&mut driver);

        tracing::info!(
            game_type = %config.game_type,
            n_back = config.n_back,
            events = config.number_of_events,
            interval_ms = config.event_interval.as_millis() as u64,
            total_matches = runtime.total_matches(),
            "starting session"
        );
        self.shared.install(runtime);

        let shared = Arc::clone(&self.shared);
        let on_panic = Arc::clone(&self.shared);
        match DriverHandle::spawn(
            "nback-session",
            move |pacer| shared.run(pacer),
            move || on_panic.abort(),
        ) {
            Ok(handle) => {
                *driver = Some(handle);
                Ok(())
            }
            Err(e) => {
                tracing::error!("could not spawn session driver: {e}");
                self.shared.clear();
                Err(e.into())
            }
        }
    }

    fn check_visual_match(&self) -> Option<MatchResult> {
        self.shared.check(Modality::Visual)
    }

    fn check_audio_match(&self) -> Option<MatchResult> {
        self.shared.check(Modality::Audio)
    }

    fn reset_game(&self) {
        let mut driver = lock(&self.driver);
        self.stop_driver(&mut driver);
        self.shared.clear();
    }

    fn reset_settings(&self) {
        if let Err(e) = self.shared.preferences.reset_settings() {
            tracing::warn!("failed to reset stored settings: {e}");
        }
        let defaults = SessionConfig::from(&Preferences::default());
        self.shared.edit_config(|c| {
            c.n_back = defaults.n_back;
            c.number_of_events = defaults.number_of_events;
            c.event_interval = defaults.event_interval;
            c.grid_size = defaults.grid_size;
            c.letter_count = defaults.letter_count;
        });
    }
}

impl Shared {
    fn edit_config(&self, f: impl FnOnce(&mut SessionConfig)) {
        self.state.game_state.update(|gs| f(&mut gs.config));
    }

    fn persist(&self, key: &str, mut f: impl FnMut(&mut Preferences)) {
        if let Err(e) = self.preferences.update(&mut f) {
            tracing::warn!(key, "failed to persist preference: {e}");
        }
    }

    fn install(&self, runtime: SessionRuntime) {
        let mut slot = lock(&self.runtime);
        self.state.show_stimulus(None);
        self.state.last_summary.set(None);
        self.state.publish(&runtime);
        self.state.is_game_over.set(false);
        *slot = Some(runtime);
    }

    fn clear(&self) {
        let mut slot = lock(&self.runtime);
        *slot = None;
        self.state.show_stimulus(None);
        self.state.score.set(0);
        self.state.total_matches.set(0);
        self.state.visual_result.set(MatchResult::None);
        self.state.audio_result.set(MatchResult::None);
        self.state.progress.set(0.0);
        self.state.phase.set(SessionPhase::Idle);
        self.state.is_game_over.set(false);
    }

    /// End the session without recording a score.
    fn abort(&self) {
        let mut slot = lock(&self.runtime);
        if let Some(runtime) = slot.as_mut() {
            runtime.finish();
            self.state.publish(runtime);
        } else {
            self.state.phase.set(SessionPhase::Finished);
        }
        self.state.is_game_over.set(true);
    }

    fn check(&self, modality: Modality) -> Option<MatchResult> {
        let mut slot = lock(&self.runtime);
        let runtime = slot.as_mut()?;
        let Some(result) = runtime.check(modality) else {
            tracing::trace!(%modality, "match check ignored");
            return None;
        };
        self.state.publish(runtime);
        tracing::debug!(
            %modality,
            index = ?runtime.current_event_index(),
            ?result,
            score = runtime.score(),
            "match checked"
        );
        Some(result)
    }

    fn begin_step(&self, index: usize) -> Option<StepStimulus> {
        let mut slot = lock(&self.runtime);
        let runtime = slot.as_mut()?;
        let stimulus = runtime.begin_step(index);
        self.state.show_stimulus(Some(stimulus));
        self.state.publish(runtime);
        Some(stimulus)
    }

    fn end_step(&self) {
        let mut slot = lock(&self.runtime);
        if let Some(runtime) = slot.as_mut() {
            if runtime.end_step() {
                tracing::debug!(
                    index = ?runtime.current_event_index(),
                    score = runtime.score(),
                    "dual step rewarded"
                );
            }
            self.state.publish(runtime);
        }
    }

    fn finish(&self) {
        let summary = {
            let mut slot = lock(&self.runtime);
            let Some(runtime) = slot.as_mut() else {
                return;
            };
            let score = runtime.finish();
            self.state.publish(runtime);
            let config = runtime.config();
            SessionSummary {
                game_type: config.game_type,
                n_back: config.n_back,
                number_of_events: config.number_of_events,
                score,
                total_matches: runtime.total_matches(),
                new_highscore: score > self.state.highscore.get(),
                finished_at: Local::now(),
            }
        };

        if summary.new_highscore {
            let score = summary.score;
            self.persist("highscore", |p| p.highscore = score);
            self.state.highscore.set(score);
        }
        tracing::info!(
            score = summary.score,
            total_matches = summary.total_matches,
            new_highscore = summary.new_highscore,
            "session finished"
        );
        self.state.last_summary.set(Some(summary));
        self.state.is_game_over.set(true);
    }

    fn wait_for_speech(&self, pacer: &Pacer) -> Result<bool, Cancelled> {
        let ready = pacer.wait_until(
            || self.speech.is_ready(),
            SPEECH_READY_POLL,
            SPEECH_READY_TIMEOUT,
        )?;
        if !ready {
            tracing::warn!(
                timeout_ms = SPEECH_READY_TIMEOUT.as_millis() as u64,
                "speech engine not ready; audio stimuli will be silent"
            );
        }
        Ok(ready)
    }

    fn speak(&self, stimulus: StepStimulus) -> bool {
        let Some(letter) = stimulus.audio.and_then(letter_for) else {
            return true;
        };
        match self.speech.speak(&letter.to_string()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(index = stimulus.index, "speech failed, continuing silently: {e}");
                false
            }
        }
    }

    fn run(&self, pacer: &Pacer) -> DriverExit {
        let plan = lock(&self.runtime)
            .as_ref()
            .map(|rt| (rt.config().game_type, rt.config().event_interval, rt.len()));
        // The runtime is installed before the driver spawns and cleared only
        // after it has been joined.
        debug_assert!(plan.is_some(), "session driver started without a runtime");
        let Some((game_type, interval, len)) = plan else {
            return DriverExit::Failed;
        };

        let mut speaking = false;
        if game_type.uses_audio() {
            match self.wait_for_speech(pacer) {
                Ok(ready) => speaking = ready,
                Err(Cancelled) => return DriverExit::Cancelled,
            }
        }

        for index in 0..len {
            if pacer.checkpoint().is_err() {
                return DriverExit::Cancelled;
            }
            let stimulus = self.begin_step(index);
            debug_assert!(stimulus.is_some(), "runtime cleared under a live driver");
            let Some(stimulus) = stimulus else {
                return DriverExit::Failed;
            };
            if speaking {
                speaking = self.speak(stimulus);
            }
            if pacer.wait(interval).is_err() {
                tracing::debug!(index, "session cancelled");
                return DriverExit::Cancelled;
            }
            self.end_step();
        }

        self.finish();
        DriverExit::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FilePreferencesStore, MemoryPreferencesStore};
    use crate::speech::{CaptionSpeech, SilentSpeech};

    fn session(prefs: Preferences) -> Session {
        Session::with_generator(
            Arc::new(MemoryPreferencesStore::new(prefs)),
            Arc::new(CaptionSpeech::new()),
            SequenceGenerator::seeded(9),
        )
    }

    #[test]
    fn new_session_reads_preferences() {
        let s = session(Preferences {
            highscore: 11,
            n_back: 3,
            grid_size: 4,
            ..Preferences::default()
        });
        let snapshot = s.state().snapshot();
        assert_eq!(snapshot.highscore, 11);
        assert_eq!(snapshot.game_state.config.n_back, 3);
        assert_eq!(snapshot.game_state.config.visual_combinations(), Some(16));
        assert_eq!(snapshot.phase, SessionPhase::Idle);
        assert!(!snapshot.is_game_over);
    }

    #[test]
    fn persisted_setters_write_through() {
        let prefs = Arc::new(MemoryPreferencesStore::default());
        let s = Session::new(prefs.clone(), Arc::new(CaptionSpeech::new()));
        s.set_n_back(4);
        s.set_number_of_events(30);
        s.set_event_interval(Duration::from_millis(1500));
        s.set_number_of_combinations(20);
        s.set_grid_size(5);
        s.set_match_percentage(50);
        s.set_game_type(GameType::AudioVisual);

        let stored = prefs.load().unwrap();
        assert_eq!(stored.n_back, 4);
        assert_eq!(stored.number_of_events, 30);
        assert_eq!(stored.event_interval_ms, 1500);
        assert_eq!(stored.number_of_combinations, 20);
        assert_eq!(stored.grid_size, 5);

        let config = s.state().game_state.get().config;
        assert_eq!(config.match_percentage, 50);
        assert_eq!(config.game_type, GameType::AudioVisual);
    }

    #[test]
    fn reset_settings_restores_defaults_but_keeps_session_local_fields() {
        let prefs = Arc::new(MemoryPreferencesStore::new(Preferences {
            highscore: 8,
            ..Preferences::default()
        }));
        let s = Session::new(prefs.clone(), Arc::new(CaptionSpeech::new()));
        s.set_n_back(5);
        s.set_match_percentage(60);
        s.reset_settings();

        let config = s.state().game_state.get().config;
        assert_eq!(config.n_back, 2);
        assert_eq!(config.match_percentage, 60);
        assert_eq!(prefs.load().unwrap().highscore, 8);
        assert_eq!(prefs.load().unwrap().n_back, 2);
    }

    #[test]
    fn checks_before_start_are_ignored() {
        let s = session(Preferences::default());
        assert_eq!(s.check_visual_match(), None);
        assert_eq!(s.check_audio_match(), None);
        assert_eq!(s.state().score.get(), 0);
    }

    #[test]
    fn unreadable_preferences_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "not json").unwrap();
        let s = Session::new(
            Arc::new(FilePreferencesStore::with_path(&path)),
            Arc::new(CaptionSpeech::new()),
        );

        let snapshot = s.state().snapshot();
        assert_eq!(snapshot.highscore, 0);
        assert_eq!(snapshot.game_state.config, SessionConfig::default());
        assert_eq!(snapshot.phase, SessionPhase::Idle);
    }

    #[test]
    fn start_game_reports_running_before_the_first_step() {
        let s = Session::new(
            Arc::new(MemoryPreferencesStore::default()),
            Arc::new(SilentSpeech),
        );
        s.set_game_type(GameType::Audio);
        s.start_game().unwrap();

        assert_eq!(s.state().phase.get(), SessionPhase::Running);
        assert!(!s.state().is_game_over.get());
        assert_eq!(s.state().game_state.get().event_index, None);
        // still waiting on the speech engine, so there is nothing to check yet
        assert_eq!(s.check_audio_match(), None);
        s.reset_game();
        assert_eq!(s.state().phase.get(), SessionPhase::Idle);
    }

    #[test]
    fn invalid_config_does_not_start() {
        let s = session(Preferences::default());
        s.set_n_back(0);
        assert!(matches!(s.start_game(), Err(SessionError::Config(_))));
        assert!(!s.is_running());
        assert_eq!(s.state().phase.get(), SessionPhase::Idle);
    }
}
