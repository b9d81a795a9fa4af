//! Input controller: turns typed text or captured speech into finalized
//! user utterances. It never talks to the backend itself.

use crate::speech::{RecognitionEvent, SpeechCapability, SpeechError, SpeechRecognizer};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("speech recognition is not available on this system")]
    CapabilityUnavailable,
    #[error(transparent)]
    Speech(#[from] SpeechError),
}

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// Single-line editable buffer with a character cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextInput {
    buffer: String,
    cursor: usize,
}

impl TextInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> &str {
        &self.buffer
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn insert(&mut self, c: char) {
        let byte_pos = char_to_byte_index(&self.buffer, self.cursor);
        self.buffer.insert(byte_pos, c);
        self.cursor += 1;
    }

    pub fn backspace(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let byte_pos = char_to_byte_index(&self.buffer, self.cursor);
            self.buffer.remove(byte_pos);
        }
    }

    pub fn delete(&mut self) {
        if self.cursor < self.buffer.chars().count() {
            let byte_pos = char_to_byte_index(&self.buffer, self.cursor);
            self.buffer.remove(byte_pos);
        }
    }

    pub fn move_left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.buffer.chars().count());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.buffer.chars().count();
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.cursor = 0;
    }

    /// Finalizes the buffer. Blank input is a silent no-op and is kept as is.
    pub fn submit(&mut self) -> Option<String> {
        let text = self.buffer.trim();
        if text.is_empty() {
            return None;
        }
        let text = text.to_string();
        self.clear();
        Some(text)
    }
}

/// What a speech event meant for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechOutcome {
    /// Nothing to do (partial result, duplicate end).
    Ignored,
    /// A finished utterance; capture has been stopped.
    Utterance(String),
    /// Capture ended; the recording indicator should clear.
    Ended,
    /// The engine reported a failure; capture has been stopped.
    Failed(String),
}

/// Continuous listening wrapped around a recognizer capability.
pub struct SpeechInput {
    recognizer: Box<dyn SpeechRecognizer>,
    recording: bool,
}

impl SpeechInput {
    /// Fails fast when the host has no speech capability.
    pub fn new(capability: SpeechCapability) -> Result<Self, InputError> {
        match capability {
            SpeechCapability::Available(recognizer) => Ok(Self {
                recognizer,
                recording: false,
            }),
            SpeechCapability::Unavailable => Err(InputError::CapabilityUnavailable),
        }
    }

    /// Whether the recording indicator is on.
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Stopped → listening begins capture; listening → stopped ends it.
    ///
    /// Stopping leaves the indicator on until the recognizer reports `End`.
    pub fn toggle(&mut self) -> Result<(), InputError> {
        if self.recording {
            self.recognizer.stop();
        } else {
            self.recognizer.start()?;
            self.recording = true;
        }
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.recognizer.is_listening() {
            self.recognizer.stop();
        }
    }

    pub fn on_event(&mut self, event: RecognitionEvent) -> SpeechOutcome {
        match event {
            RecognitionEvent::Result { is_final: false, .. } => SpeechOutcome::Ignored,
            RecognitionEvent::Result { text, is_final: true } => {
                let text = text.trim().to_string();
                if text.is_empty() {
                    return SpeechOutcome::Ignored;
                }
                debug!(chars = text.len(), "Final speech result");
                self.recognizer.stop();
                SpeechOutcome::Utterance(text)
            }
            RecognitionEvent::End => {
                // The engine may stop on its own; make sure it is reset.
                self.stop();
                if self.recording {
                    self.recording = false;
                    SpeechOutcome::Ended
                } else {
                    SpeechOutcome::Ignored
                }
            }
            RecognitionEvent::Error(message) => {
                warn!(%message, "Speech recognition error");
                self.recognizer.stop();
                self.recording = false;
                SpeechOutcome::Failed(message)
            }
        }
    }
}

/// The two input modalities behind one interface.
pub enum InputController {
    Text(TextInput),
    Speech(SpeechInput),
}

impl InputController {
    pub fn text() -> Self {
        InputController::Text(TextInput::new())
    }

    pub fn speech(capability: SpeechCapability) -> Result<Self, InputError> {
        SpeechInput::new(capability).map(InputController::Speech)
    }

    pub fn is_speech(&self) -> bool {
        matches!(self, InputController::Speech(_))
    }

    pub fn is_recording(&self) -> bool {
        match self {
            InputController::Speech(speech) => speech.is_recording(),
            InputController::Text(_) => false,
        }
    }
}
