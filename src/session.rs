use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Preferences;
use crate::error::ConfigError;
use crate::evaluator::{ChannelState, MatchEvaluator};
use crate::sequence::{MatchPolicy, Sequence, SequenceGenerator, Stimulus};

/// Letters that can be spoken as audio stimuli; stimulus `v` is the `v`-th.
pub const LETTERS: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Letter spoken for an audio stimulus, if it is within the alphabet.
pub fn letter_for(stimulus: Stimulus) -> Option<char> {
    let idx = usize::try_from(stimulus).ok()?.checked_sub(1)?;
    LETTERS.as_bytes().get(idx).map(|&b| char::from(b))
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    clap::ValueEnum,
    strum_macros::Display,
)]
pub enum GameType {
    Audio,
    #[default]
    Visual,
    AudioVisual,
}

impl GameType {
    pub fn uses_audio(self) -> bool {
        matches!(self, GameType::Audio | GameType::AudioVisual)
    }

    pub fn uses_visual(self) -> bool {
        matches!(self, GameType::Visual | GameType::AudioVisual)
    }

    pub fn is_dual(self) -> bool {
        self == GameType::AudioVisual
    }

    pub fn uses(self, modality: Modality) -> bool {
        match modality {
            Modality::Visual => self.uses_visual(),
            Modality::Audio => self.uses_audio(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum Modality {
    Visual,
    Audio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchResult {
    #[default]
    None,
    Correct,
    Incorrect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Running,
    Finished,
}

/// Everything the caller sets before `start_game`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub game_type: GameType,
    pub n_back: usize,
    pub number_of_events: usize,
    pub match_percentage: u32,
    pub event_interval: Duration,
    pub grid_size: usize,
    pub letter_count: usize,
    pub match_policy: MatchPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::from(&Preferences::default())
    }
}

impl From<&Preferences> for SessionConfig {
    fn from(prefs: &Preferences) -> Self {
        Self {
            game_type: GameType::default(),
            n_back: prefs.n_back,
            number_of_events: prefs.number_of_events,
            match_percentage: 30,
            event_interval: Duration::from_millis(prefs.event_interval_ms),
            grid_size: prefs.grid_size,
            letter_count: prefs.number_of_combinations,
            match_policy: MatchPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Grid cells available to the visual channel; `None` when the square
    /// of `grid_size` overflows.
    pub fn visual_combinations(&self) -> Option<usize> {
        self.grid_size.checked_mul(self.grid_size)
    }

    /// Letters available to the audio channel.
    pub fn audio_combinations(&self) -> usize {
        self.letter_count
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_back < 1 {
            return Err(ConfigError::InvalidNBack(self.n_back));
        }
        if self.number_of_events < 1 {
            return Err(ConfigError::InvalidNumberOfEvents(self.number_of_events));
        }
        if self.match_percentage > 100 {
            return Err(ConfigError::InvalidMatchPercentage(self.match_percentage));
        }
        if self.event_interval.is_zero() {
            return Err(ConfigError::InvalidEventInterval);
        }
        if self.game_type.uses_visual() {
            if self.grid_size < 1 {
                return Err(ConfigError::InvalidGridSize(self.grid_size));
            }
            let fits = self
                .visual_combinations()
                .is_some_and(|cells| Stimulus::try_from(cells).is_ok());
            if !fits {
                return Err(ConfigError::GridTooLarge(self.grid_size));
            }
        }
        if self.game_type.uses_audio() {
            if self.letter_count < 1 {
                return Err(ConfigError::InvalidCombinations(self.letter_count));
            }
            let available = LETTERS.len();
            if self.letter_count > available {
                return Err(ConfigError::TooManyLetters {
                    requested: self.letter_count,
                    available,
                });
            }
        }
        Ok(())
    }
}

/// Configuration plus the stimulus currently on display.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GameState {
    pub config: SessionConfig,
    /// Step currently on display; distinguishes repeats of the same stimulus.
    pub event_index: Option<usize>,
    pub visual_value: Option<Stimulus>,
    pub audio_value: Option<Stimulus>,
}

impl GameState {
    /// Stimulus of the primary channel: visual when displayed, audio otherwise.
    pub fn event_value(&self) -> Option<Stimulus> {
        self.visual_value.or(self.audio_value)
    }
}

/// Stimuli published at the start of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepStimulus {
    pub index: usize,
    pub visual: Option<Stimulus>,
    pub audio: Option<Stimulus>,
}

/// Mutable state of one running session.
///
/// Created fresh by [`SessionRuntime::prepare`] on every start and driven
/// through `begin_step` / `check` / `end_step` / `finish`.
#[derive(Debug, Clone)]
pub struct SessionRuntime {
    config: SessionConfig,
    evaluator: MatchEvaluator,
    visual: Option<Sequence>,
    audio: Option<Sequence>,
    current_event_index: Option<usize>,
    visual_checked: bool,
    audio_checked: bool,
    visual_result: MatchResult,
    audio_result: MatchResult,
    score: u32,
    total_matches: u32,
    progress: f32,
    phase: SessionPhase,
}

impl SessionRuntime {
    /// Validate `config` and generate one sequence per active modality,
    /// visual first, then audio.
    pub fn prepare(
        config: SessionConfig,
        generator: &mut SequenceGenerator,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        generator.set_policy(config.match_policy);

        let visual = if config.game_type.uses_visual() {
            let cells = config
                .visual_combinations()
                .ok_or(ConfigError::GridTooLarge(config.grid_size))?;
            Some(generator.generate(
                config.number_of_events,
                cells,
                config.match_percentage,
                config.n_back,
            )?)
        } else {
            None
        };
        let audio = if config.game_type.uses_audio() {
            Some(generator.generate(
                config.number_of_events,
                config.audio_combinations(),
                config.match_percentage,
                config.n_back,
            )?)
        } else {
            None
        };

        Ok(Self::with_sequences(config, visual, audio))
    }

    /// Build a runtime around sequences that were generated elsewhere.
    pub fn with_sequences(
        config: SessionConfig,
        visual: Option<Sequence>,
        audio: Option<Sequence>,
    ) -> Self {
        let evaluator = MatchEvaluator::new(config.n_back);
        let total_matches = evaluator.expected_matches(
            config.game_type,
            config.number_of_events,
            config.match_percentage,
            visual.as_ref(),
            audio.as_ref(),
        );
        Self {
            config,
            evaluator,
            visual,
            audio,
            current_event_index: None,
            visual_checked: false,
            audio_checked: false,
            visual_result: MatchResult::None,
            audio_result: MatchResult::None,
            score: 0,
            total_matches: u32::try_from(total_matches).unwrap_or(u32::MAX),
            progress: 0.0,
            phase: SessionPhase::Running,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn sequence(&self, modality: Modality) -> Option<&Sequence> {
        match modality {
            Modality::Visual => self.visual.as_ref(),
            Modality::Audio => self.audio.as_ref(),
        }
    }

    /// Number of steps the driver walks through.
    pub fn len(&self) -> usize {
        self.visual
            .as_ref()
            .or(self.audio.as_ref())
            .map_or(0, Sequence::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Step on display; `None` until the first `begin_step`.
    pub fn current_event_index(&self) -> Option<usize> {
        self.current_event_index
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn total_matches(&self) -> u32 {
        self.total_matches
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn is_game_over(&self) -> bool {
        self.phase == SessionPhase::Finished
    }

    pub fn result(&self, modality: Modality) -> MatchResult {
        match modality {
            Modality::Visual => self.visual_result,
            Modality::Audio => self.audio_result,
        }
    }

    pub fn is_checked(&self, modality: Modality) -> bool {
        match modality {
            Modality::Visual => self.visual_checked,
            Modality::Audio => self.audio_checked,
        }
    }

    /// Move to `index`: clear both channels' flags and results, update
    /// progress and return the stimuli to publish.
    pub fn begin_step(&mut self, index: usize) -> StepStimulus {
        self.current_event_index = Some(index);
        self.visual_checked = false;
        self.audio_checked = false;
        self.visual_result = MatchResult::None;
        self.audio_result = MatchResult::None;
        let len = self.len();
        self.progress = if len == 0 {
            1.0
        } else {
            (index + 1) as f32 / len as f32
        };
        StepStimulus {
            index,
            visual: self.visual.as_ref().and_then(|s| s.get(index)),
            audio: self.audio.as_ref().and_then(|s| s.get(index)),
        }
    }

    /// Record the player's claim that `modality` matches at the current
    /// index. Returns `None` when the check is ignored: before the first
    /// step, after the session finished, for a modality the game does not
    /// use, or already checked.
    pub fn check(&mut self, modality: Modality) -> Option<MatchResult> {
        if self.phase != SessionPhase::Running || !self.config.game_type.uses(modality) {
            return None;
        }
        let index = self.current_event_index?;
        if self.is_checked(modality) {
            return None;
        }
        let sequence = self.sequence(modality)?;
        let result = self.evaluator.judge(sequence, index);

        match modality {
            Modality::Visual => {
                self.visual_checked = true;
                self.visual_result = result;
            }
            Modality::Audio => {
                self.audio_checked = true;
                self.audio_result = result;
            }
        }
        if !self.config.game_type.is_dual() && result == MatchResult::Correct {
            self.score += 1;
        }
        Some(result)
    }

    /// Close the current step. Dual sessions score here: one point when the
    /// pressed channels equal the due channels and at least one was due.
    pub fn end_step(&mut self) -> bool {
        if self.phase != SessionPhase::Running || !self.config.game_type.is_dual() {
            return false;
        }
        let Some(index) = self.current_event_index else {
            return false;
        };
        let due = self
            .evaluator
            .due_at(self.visual.as_ref(), self.audio.as_ref(), index);
        let pressed = ChannelState::new(self.visual_checked, self.audio_checked);
        let rewarded = self.evaluator.rewards_step(due, pressed);
        if rewarded {
            self.score += 1;
        }
        rewarded
    }

    /// Mark the session finished and return the final score.
    pub fn finish(&mut self) -> u32 {
        self.phase = SessionPhase::Finished;
        self.progress = 1.0;
        self.score
    }
}
