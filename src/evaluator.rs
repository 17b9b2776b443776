use crate::sequence::{target_match_count, Sequence};
use crate::session::{GameType, MatchResult};

/// Per-channel flags for one step: either "a match is due" or "the player
/// pressed", depending on which side of the comparison it describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelState {
    pub visual: bool,
    pub audio: bool,
}

impl ChannelState {
    pub fn new(visual: bool, audio: bool) -> Self {
        Self { visual, audio }
    }

    pub fn any(&self) -> bool {
        self.visual || self.audio
    }
}

/// Decides correctness of player responses for a fixed n.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchEvaluator {
    n_back: usize,
}

impl MatchEvaluator {
    pub fn new(n_back: usize) -> Self {
        Self { n_back }
    }

    pub fn n_back(&self) -> usize {
        self.n_back
    }

    /// Whether an n-back match objectively exists at `index`.
    pub fn is_due(&self, sequence: &Sequence, index: usize) -> bool {
        sequence.is_match_at(index, self.n_back)
    }

    /// A response at `index` is correct exactly when a match is due there.
    /// Indices before `n_back` are always incorrect.
    pub fn judge(&self, sequence: &Sequence, index: usize) -> MatchResult {
        if self.is_due(sequence, index) {
            MatchResult::Correct
        } else {
            MatchResult::Incorrect
        }
    }

    /// Dual-mode step reward: the pressed channels must equal the due
    /// channels exactly, and at least one channel must have been due.
    pub fn rewards_step(&self, due: ChannelState, pressed: ChannelState) -> bool {
        due.any() && due == pressed
    }

    /// Due state of both channels at `index`. A missing sequence is never due.
    pub fn due_at(
        &self,
        visual: Option<&Sequence>,
        audio: Option<&Sequence>,
        index: usize,
    ) -> ChannelState {
        ChannelState {
            visual: visual.is_some_and(|s| self.is_due(s, index)),
            audio: audio.is_some_and(|s| self.is_due(s, index)),
        }
    }

    /// Expected number of correct responses for a whole session.
    ///
    /// Single-modality sessions use the generator's quota formula; dual
    /// sessions count indices where either channel is due.
    pub fn expected_matches(
        &self,
        game_type: GameType,
        number_of_events: usize,
        match_percentage: u32,
        visual: Option<&Sequence>,
        audio: Option<&Sequence>,
    ) -> usize {
        match game_type {
            GameType::Audio | GameType::Visual => {
                target_match_count(number_of_events, match_percentage)
            }
            GameType::AudioVisual => {
                let len = visual
                    .map(Sequence::len)
                    .max(audio.map(Sequence::len))
                    .unwrap_or(0);
                (0..len)
                    .filter(|&i| self.due_at(visual, audio, i).any())
                    .count()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(values: &[u32]) -> Sequence {
        Sequence::from(values.to_vec())
    }

    #[test]
    fn judge_before_n_back_is_incorrect() {
        let evaluator = MatchEvaluator::new(2);
        let s = seq(&[1, 1, 1]);
        assert_eq!(evaluator.judge(&s, 0), MatchResult::Incorrect);
        assert_eq!(evaluator.judge(&s, 1), MatchResult::Incorrect);
        assert_eq!(evaluator.judge(&s, 2), MatchResult::Correct);
    }

    #[test]
    fn judge_compares_with_n_back_predecessor() {
        let evaluator = MatchEvaluator::new(2);
        let s = seq(&[3, 4, 5, 7, 2, 7]);
        assert_eq!(evaluator.judge(&s, 5), MatchResult::Correct);
        assert_eq!(evaluator.judge(&s, 4), MatchResult::Incorrect);
        assert_eq!(evaluator.judge(&s, 99), MatchResult::Incorrect);
    }

    #[test]
    fn rewards_step_requires_exact_parity() {
        let evaluator = MatchEvaluator::new(1);
        let cases = [
            // (due, pressed, rewarded)
            (ChannelState::new(false, false), ChannelState::new(false, false), false),
            (ChannelState::new(false, false), ChannelState::new(true, false), false),
            (ChannelState::new(false, true), ChannelState::new(false, true), true),
            (ChannelState::new(false, true), ChannelState::new(true, true), false),
            (ChannelState::new(false, true), ChannelState::new(false, false), false),
            (ChannelState::new(true, false), ChannelState::new(true, false), true),
            (ChannelState::new(true, false), ChannelState::new(false, true), false),
            (ChannelState::new(true, true), ChannelState::new(true, true), true),
            (ChannelState::new(true, true), ChannelState::new(true, false), false),
        ];
        for (due, pressed, rewarded) in cases {
            assert_eq!(
                evaluator.rewards_step(due, pressed),
                rewarded,
                "due {due:?} pressed {pressed:?}"
            );
        }
    }

    #[test]
    fn expected_matches_single_uses_formula() {
        let evaluator = MatchEvaluator::new(2);
        assert_eq!(
            evaluator.expected_matches(GameType::Visual, 20, 30, None, None),
            6
        );
        assert_eq!(
            evaluator.expected_matches(GameType::Audio, 15, 50, None, None),
            8
        );
    }

    #[test]
    fn expected_matches_dual_counts_union_of_due_indices() {
        let evaluator = MatchEvaluator::new(1);
        let visual = seq(&[1, 1, 2, 2, 3]);
        let audio = seq(&[4, 5, 5, 5, 6]);
        // visual due at 1 and 3, audio due at 2 and 3
        assert_eq!(
            evaluator.expected_matches(GameType::AudioVisual, 5, 30, Some(&visual), Some(&audio)),
            3
        );
    }
}
