use std::sync::Mutex;

use crate::error::SpeechError;
use crate::util::lock;

/// Text-to-speech collaborator used for audio stimuli.
///
/// `speak` must not block: the session driver calls it once per step right
/// before the response window opens.
pub trait SpeechSynthesizer: Send + Sync {
    fn is_ready(&self) -> bool;
    fn speak(&self, text: &str) -> Result<(), SpeechError>;
}

/// A synthesizer that never becomes ready. Audio sessions run silently.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentSpeech;

impl SpeechSynthesizer for SilentSpeech {
    fn is_ready(&self) -> bool {
        false
    }

    fn speak(&self, _text: &str) -> Result<(), SpeechError> {
        Err(SpeechError::NotReady)
    }
}

/// Always-ready synthesizer that shows its utterances as captions.
#[derive(Debug, Default)]
pub struct CaptionSpeech {
    last: Mutex<Option<(u64, String)>>,
}

impl CaptionSpeech {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent utterance with a counter that increases on every call,
    /// so repeated letters can be told apart.
    pub fn last(&self) -> Option<(u64, String)> {
        lock(&self.last).clone()
    }

    pub fn clear(&self) {
        *lock(&self.last) = None;
    }
}

impl SpeechSynthesizer for CaptionSpeech {
    fn is_ready(&self) -> bool {
        true
    }

    fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let mut last = lock(&self.last);
        let counter = last.as_ref().map_or(0, |(n, _)| n + 1);
        *last = Some((counter, text.to_string()));
        Ok(())
    }
}
