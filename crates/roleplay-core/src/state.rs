//! UI-agnostic conversation state types
//!
//! The transcript is the ordered record of a training conversation. It is
//! shared between the session lifecycle, the backend calls and whatever UI
//! renders it, and it never depends on a specific UI framework.

use serde::{Deserialize, Serialize};

/// Who authored a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    #[serde(rename = "AI")]
    Ai,
    User,
}

impl Speaker {
    pub fn label(&self) -> &'static str {
        match self {
            Speaker::Ai => "AI",
            Speaker::User => "User",
        }
    }
}

/// One utterance by either party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
}

impl Turn {
    pub fn ai(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Ai,
            text: text.into(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("turn text must not be empty")]
    EmptyTurn,
}

/// Append-only, chronologically ordered list of turns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    /// Starts a conversation with the counterpart's greeting.
    pub fn seeded(greeting: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::ai(greeting)],
        }
    }

    pub fn append(&mut self, turn: Turn) -> Result<(), TranscriptError> {
        if turn.text.trim().is_empty() {
            return Err(TranscriptError::EmptyTurn);
        }
        self.turns.push(turn);
        Ok(())
    }

    pub fn snapshot(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Turn> {
        self.turns.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_transcript_starts_with_ai_greeting() {
        let transcript = Transcript::seeded("Hello...");
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.snapshot()[0], Turn::ai("Hello..."));
    }

    #[test]
    fn test_append_preserves_order() {
        let mut transcript = Transcript::seeded("Hello...");
        transcript.append(Turn::user("I'd like a quote")).unwrap();
        transcript.append(Turn::ai("Sure, what's your budget?")).unwrap();

        let speakers: Vec<Speaker> = transcript.iter().map(|t| t.speaker).collect();
        assert_eq!(speakers, vec![Speaker::Ai, Speaker::User, Speaker::Ai]);
        assert_eq!(transcript.last().unwrap().text, "Sure, what's your budget?");
    }

    #[test]
    fn test_append_rejects_blank_text() {
        let mut transcript = Transcript::seeded("Hello...");
        assert_eq!(
            transcript.append(Turn::user("   ")),
            Err(TranscriptError::EmptyTurn)
        );
        assert_eq!(transcript.len(), 1);
    }

    #[test]
    fn test_speaker_wire_format() {
        let json = serde_json::to_string(&Turn::ai("hi")).unwrap();
        assert_eq!(json, r#"{"speaker":"AI","text":"hi"}"#);

        let turn: Turn = serde_json::from_str(r#"{"speaker":"User","text":"yo"}"#).unwrap();
        assert_eq!(turn.speaker, Speaker::User);
    }
}
