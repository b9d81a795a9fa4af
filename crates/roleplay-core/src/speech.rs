//! Speech capture capabilities.
//!
//! A recognizer is an injected capability: either available (start/stop plus
//! a stream of [`RecognitionEvent`]s) or unavailable. The session only sees
//! the trait, so tests substitute a mock and the terminal client plugs in an
//! external listening command.

use crate::api::ApiError;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("no speech command configured")]
    NotConfigured,
    #[error("speech command not found: {0}")]
    CommandMissing(String),
    #[error("failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },
    #[error("speech command failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// What a listening recognizer reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionEvent {
    Result { text: String, is_final: bool },
    /// Capture ended, either on request or because the engine stopped.
    End,
    Error(String),
}

/// Receives recognition events; called from the recognizer's reader task.
pub type RecognitionSink = Arc<dyn Fn(RecognitionEvent) + Send + Sync>;

#[cfg_attr(test, mockall::automock)]
pub trait SpeechRecognizer: Send {
    fn start(&mut self) -> Result<(), SpeechError>;
    fn stop(&mut self);
    fn is_listening(&self) -> bool;
}

/// Whether the host can capture speech at all.
pub enum SpeechCapability {
    Available(Box<dyn SpeechRecognizer>),
    Unavailable,
}

impl SpeechCapability {
    /// Builds a [`CommandRecognizer`] if `command` is configured and its
    /// program can be found.
    pub fn detect(command: Option<&str>, sink: RecognitionSink) -> Self {
        let Some((program, args)) = command.and_then(split_command) else {
            return SpeechCapability::Unavailable;
        };
        match resolve_program(&program) {
            Some(path) => {
                debug!(program = %path.display(), "Speech recognizer available");
                SpeechCapability::Available(Box::new(CommandRecognizer::new(path, args, sink)))
            }
            None => {
                warn!(%program, "Speech recognizer command not found on PATH");
                SpeechCapability::Unavailable
            }
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, SpeechCapability::Available(_))
    }
}

/// Continuous listening backed by an external command.
///
/// The command prints one line per recognition result: `partial: <text>`
/// for interim hypotheses, `final: <text>` (or a bare line) for a finished
/// utterance. End of output means capture ended.
pub struct CommandRecognizer {
    program: PathBuf,
    args: Vec<String>,
    sink: RecognitionSink,
    child: Option<Child>,
}

impl CommandRecognizer {
    pub fn new(program: PathBuf, args: Vec<String>, sink: RecognitionSink) -> Self {
        Self {
            program,
            args,
            sink,
            child: None,
        }
    }
}

impl SpeechRecognizer for CommandRecognizer {
    fn start(&mut self) -> Result<(), SpeechError> {
        if self.is_listening() {
            return Ok(());
        }

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpeechError::Spawn {
                program: self.program.display().to_string(),
                reason: e.to_string(),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SpeechError::Failed("recognizer stdout unavailable".to_string()))?;
        let sink = self.sink.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if let Some(event) = parse_recognition_line(&line) {
                            sink(event);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        sink(RecognitionEvent::Error(e.to_string()));
                        break;
                    }
                }
            }
            sink(RecognitionEvent::End);
        });

        info!(program = %self.program.display(), "Listening started");
        self.child = Some(child);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                warn!(error = %e, "Failed to stop recognizer");
            }
            info!("Listening stopped");
        }
    }

    fn is_listening(&self) -> bool {
        self.child.is_some()
    }
}

impl Drop for CommandRecognizer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn parse_recognition_line(line: &str) -> Option<RecognitionEvent> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (text, is_final) = if let Some(rest) = line.strip_prefix("partial:") {
        (rest, false)
    } else if let Some(rest) = line.strip_prefix("final:") {
        (rest, true)
    } else if let Some(rest) = line.strip_prefix("error:") {
        return Some(RecognitionEvent::Error(rest.trim().to_string()));
    } else {
        (line, true)
    };
    Some(RecognitionEvent::Result {
        text: text.trim().to_string(),
        is_final,
    })
}

/// Splits a configured command line on whitespace into program and arguments.
pub(crate) fn split_command(command: &str) -> Option<(String, Vec<String>)> {
    let mut parts = command.split_whitespace().map(String::from);
    let program = parts.next()?;
    Some((program, parts.collect()))
}

/// Finds `program` either as a path or in one of the `PATH` directories.
pub(crate) fn resolve_program(program: &str) -> Option<PathBuf> {
    let candidate = PathBuf::from(program);
    if candidate.components().count() > 1 {
        return candidate.is_file().then_some(candidate);
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|p| p.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[test]
    fn test_parse_recognition_line() {
        assert_eq!(
            parse_recognition_line("partial: I'd like"),
            Some(RecognitionEvent::Result {
                text: "I'd like".into(),
                is_final: false
            })
        );
        assert_eq!(
            parse_recognition_line("final: I'd like a quote"),
            Some(RecognitionEvent::Result {
                text: "I'd like a quote".into(),
                is_final: true
            })
        );
        assert_eq!(
            parse_recognition_line("hello there"),
            Some(RecognitionEvent::Result {
                text: "hello there".into(),
                is_final: true
            })
        );
        assert_eq!(
            parse_recognition_line("error: microphone busy"),
            Some(RecognitionEvent::Error("microphone busy".into()))
        );
        assert_eq!(parse_recognition_line("   "), None);
    }

    #[test]
    fn test_split_command() {
        assert_eq!(
            split_command("whisper-stream --lang en"),
            Some(("whisper-stream".into(), vec!["--lang".into(), "en".into()]))
        );
        assert_eq!(split_command("   "), None);
    }

    #[test]
    fn test_detect_without_command_is_unavailable() {
        let sink: RecognitionSink = Arc::new(|_| {});
        assert!(!SpeechCapability::detect(None, sink.clone()).is_available());
        assert!(!SpeechCapability::detect(Some("definitely-not-a-real-recognizer-xyz"), sink)
            .is_available());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_recognizer_streams_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: RecognitionSink = Arc::new(move |event| {
            let _ = tx.send(event);
        });

        let script = "echo 'partial: I would'; echo 'final: I would like a quote'";
        let mut recognizer = CommandRecognizer::new(
            PathBuf::from("/bin/sh"),
            vec!["-c".into(), script.into()],
            sink,
        );
        recognizer.start().unwrap();
        assert!(recognizer.is_listening());

        let mut events = Vec::new();
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            let done = event == RecognitionEvent::End;
            events.push(event);
            if done {
                break;
            }
        }

        assert_eq!(
            events,
            vec![
                RecognitionEvent::Result {
                    text: "I would".into(),
                    is_final: false
                },
                RecognitionEvent::Result {
                    text: "I would like a quote".into(),
                    is_final: true
                },
                RecognitionEvent::End,
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stop_ends_capture() {
        let ended = Arc::new(Mutex::new(false));
        let flag = ended.clone();
        let sink: RecognitionSink = Arc::new(move |event| {
            if event == RecognitionEvent::End {
                *flag.lock().unwrap() = true;
            }
        });

        let mut recognizer =
            CommandRecognizer::new(PathBuf::from("/bin/sh"), vec!["-c".into(), "exec sleep 30".into()], sink);
        recognizer.start().unwrap();
        recognizer.stop();
        assert!(!recognizer.is_listening());

        for _ in 0..50 {
            if *ended.lock().unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(*ended.lock().unwrap());
    }
}
