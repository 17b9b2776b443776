use std::sync::Mutex;
use std::time::Duration;

use crate::engine::{GameEngine, SessionState};
use crate::error::SessionError;
use crate::session::{GameState, GameType, MatchResult, SessionConfig, SessionPhase};
use crate::util::lock;

/// A command received by [`StubEngine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCommand {
    SetGameType(GameType),
    SetNBack(usize),
    SetNumberOfEvents(usize),
    SetMatchPercentage(u32),
    SetEventInterval(Duration),
    SetNumberOfCombinations(usize),
    SetGridSize(usize),
    StartGame,
    CheckVisualMatch,
    CheckAudioMatch,
    ResetGame,
    ResetSettings,
}

/// Deterministic engine for driving a front-end without a timed loop.
///
/// State starts at fixed values and only configuration commands change it.
#[derive(Debug)]
pub struct StubEngine {
    state: SessionState,
    commands: Mutex<Vec<EngineCommand>>,
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl StubEngine {
    pub const SCORE: u32 = 2;
    pub const HIGHSCORE: u32 = 42;
    pub const TOTAL_MATCHES: u32 = 6;
    pub const PROGRESS: f32 = 0.5;

    pub fn new() -> Self {
        let state = SessionState::new(SessionConfig::default(), Self::HIGHSCORE);
        state.game_state.set(GameState {
            config: SessionConfig::default(),
            event_index: Some(9),
            visual_value: Some(5),
            audio_value: None,
        });
        state.score.set(Self::SCORE);
        state.total_matches.set(Self::TOTAL_MATCHES);
        state.progress.set(Self::PROGRESS);
        state.phase.set(SessionPhase::Running);
        Self {
            state,
            commands: Mutex::new(Vec::new()),
        }
    }

    /// Every command received so far, oldest first.
    pub fn commands(&self) -> Vec<EngineCommand> {
        lock(&self.commands).clone()
    }

    fn record(&self, command: EngineCommand) {
        lock(&self.commands).push(command);
    }

    fn edit(&self, f: impl FnOnce(&mut SessionConfig)) {
        self.state.game_state.update(|gs| f(&mut gs.config));
    }
}

impl GameEngine for StubEngine {
    fn state(&self) -> &SessionState {
        &self.state
    }

    fn set_game_type(&self, game_type: GameType) {
        self.record(EngineCommand::SetGameType(game_type));
        self.edit(|c| c.game_type = game_type);
    }

    fn set_n_back(&self, n_back: usize) {
        self.record(EngineCommand::SetNBack(n_back));
        self.edit(|c| c.n_back = n_back);
    }

    fn set_number_of_events(&self, number_of_events: usize) {
        self.record(EngineCommand::SetNumberOfEvents(number_of_events));
        self.edit(|c| c.number_of_events = number_of_events);
    }

    fn set_match_percentage(&self, percentage: u32) {
        self.record(EngineCommand::SetMatchPercentage(percentage));
        self.edit(|c| c.match_percentage = percentage);
    }

    fn set_event_interval(&self, interval: Duration) {
        self.record(EngineCommand::SetEventInterval(interval));
        self.edit(|c| c.event_interval = interval);
    }

    fn set_number_of_combinations(&self, letters: usize) {
        self.record(EngineCommand::SetNumberOfCombinations(letters));
        self.edit(|c| c.letter_count = letters);
    }

    fn set_grid_size(&self, grid_size: usize) {
        self.record(EngineCommand::SetGridSize(grid_size));
        self.edit(|c| c.grid_size = grid_size);
    }

    fn start_game(&self) -> Result<(), SessionError> {
        self.record(EngineCommand::StartGame);
        Ok(())
    }

    fn check_visual_match(&self) -> Option<MatchResult> {
        self.record(EngineCommand::CheckVisualMatch);
        None
    }

    fn check_audio_match(&self) -> Option<MatchResult> {
        self.record(EngineCommand::CheckAudioMatch);
        None
    }

    fn reset_game(&self) {
        self.record(EngineCommand::ResetGame);
    }

    fn reset_settings(&self) {
        self.record(EngineCommand::ResetSettings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_values() {
        let stub = StubEngine::new();
        let snapshot = stub.state().snapshot();
        assert_eq!(snapshot.score, 2);
        assert_eq!(snapshot.highscore, 42);
        assert_eq!(snapshot.total_matches, 6);
        assert_eq!(snapshot.progress, 0.5);
        assert_eq!(snapshot.game_state.event_value(), Some(5));
    }

    #[test]
    fn records_commands_in_order() {
        let stub = StubEngine::new();
        stub.set_n_back(3);
        stub.start_game().unwrap();
        stub.check_visual_match();
        stub.reset_game();
        assert_eq!(
            stub.commands(),
            vec![
                EngineCommand::SetNBack(3),
                EngineCommand::StartGame,
                EngineCommand::CheckVisualMatch,
                EngineCommand::ResetGame,
            ]
        );
        assert_eq!(stub.state().game_state.get().config.n_back, 3);
        assert_eq!(stub.state().score.get(), 2);
    }
}
