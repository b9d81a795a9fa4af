//! Vocalization of the counterpart's lines.

use crate::api::ApiClient;
use crate::config::Config;
use crate::speech::{resolve_program, split_command, SpeechError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceMode {
    #[default]
    Off,
    Local,
    Remote,
}

impl VoiceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoiceMode::Off => "off",
            VoiceMode::Local => "local",
            VoiceMode::Remote => "remote",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "off" => Some(VoiceMode::Off),
            "local" => Some(VoiceMode::Local),
            "remote" => Some(VoiceMode::Remote),
            _ => None,
        }
    }

    pub fn all() -> Vec<VoiceMode> {
        vec![VoiceMode::Off, VoiceMode::Local, VoiceMode::Remote]
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            VoiceMode::Off => "Silent",
            VoiceMode::Local => "Local speech synthesis",
            VoiceMode::Remote => "Server speech synthesis",
        }
    }

    pub fn next(&self) -> Self {
        match self {
            VoiceMode::Off => VoiceMode::Local,
            VoiceMode::Local => VoiceMode::Remote,
            VoiceMode::Remote => VoiceMode::Off,
        }
    }
}

/// Turns text into audible speech.
#[async_trait]
pub trait Vocalizer: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), SpeechError>;
}

/// Speaks through a local text-to-speech command, e.g. `espeak -v en`.
pub struct LocalSynthesizer {
    program: PathBuf,
    args: Vec<String>,
}

impl LocalSynthesizer {
    pub fn from_command(command: &str) -> Result<Self, SpeechError> {
        let (program, args) = split_command(command).ok_or(SpeechError::NotConfigured)?;
        let program = resolve_program(&program).ok_or(SpeechError::CommandMissing(program))?;
        Ok(Self { program, args })
    }
}

#[async_trait]
impl Vocalizer for LocalSynthesizer {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| SpeechError::Spawn {
                program: self.program.display().to_string(),
                reason: e.to_string(),
            })?;

        if !status.success() {
            return Err(SpeechError::Failed(format!("synthesizer exited with {}", status)));
        }
        Ok(())
    }
}

/// Requests audio from the backend and pipes it into a player command.
pub struct RemoteSynthesizer {
    api: ApiClient,
    program: PathBuf,
    args: Vec<String>,
}

impl RemoteSynthesizer {
    pub fn new(api: ApiClient, player_command: &str) -> Result<Self, SpeechError> {
        let (program, args) = split_command(player_command).ok_or(SpeechError::NotConfigured)?;
        let program = resolve_program(&program).ok_or(SpeechError::CommandMissing(program))?;
        Ok(Self { api, program, args })
    }
}

#[async_trait]
impl Vocalizer for RemoteSynthesizer {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let audio = self.api.synthesize(text).await?;
        debug!(bytes = audio.len(), "Playing synthesized audio");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SpeechError::Spawn {
                program: self.program.display().to_string(),
                reason: e.to_string(),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&audio)
                .await
                .map_err(|e| SpeechError::Failed(e.to_string()))?;
        }

        let status = child
            .wait()
            .await
            .map_err(|e| SpeechError::Failed(e.to_string()))?;
        if !status.success() {
            return Err(SpeechError::Failed(format!("player exited with {}", status)));
        }
        Ok(())
    }
}

/// Picks the vocalizer for the configured mode. `None` means stay silent.
pub fn build_vocalizer(config: &Config, api: &ApiClient) -> Option<Arc<dyn Vocalizer>> {
    let built: Result<Arc<dyn Vocalizer>, SpeechError> = match config.voice_mode {
        VoiceMode::Off => return None,
        VoiceMode::Local => config
            .synthesizer_command
            .as_deref()
            .ok_or(SpeechError::NotConfigured)
            .and_then(LocalSynthesizer::from_command)
            .map(|v| Arc::new(v) as Arc<dyn Vocalizer>),
        VoiceMode::Remote => config
            .audio_player_command
            .as_deref()
            .ok_or(SpeechError::NotConfigured)
            .and_then(|cmd| RemoteSynthesizer::new(api.clone(), cmd))
            .map(|v| Arc::new(v) as Arc<dyn Vocalizer>),
    };

    match built {
        Ok(vocalizer) => Some(vocalizer),
        Err(e) => {
            warn!(mode = config.voice_mode.as_str(), error = %e, "Vocalization disabled");
            None
        }
    }
}

/// Speaks `text` in the background. Failures are logged and otherwise ignored.
pub fn speak_detached(vocalizer: Arc<dyn Vocalizer>, text: String) {
    tokio::spawn(async move {
        if let Err(e) = vocalizer.speak(&text).await {
            warn!(error = %e, "Vocalization failed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voice_mode_round_trip_names() {
        for mode in VoiceMode::all() {
            assert_eq!(VoiceMode::from_str(mode.as_str()), Some(mode));
        }
        assert_eq!(VoiceMode::from_str("LOCAL"), Some(VoiceMode::Local));
        assert_eq!(VoiceMode::from_str("loud"), None);
        assert_eq!(VoiceMode::Remote.next(), VoiceMode::Off);
    }

    #[test]
    fn test_build_vocalizer_off_or_unconfigured_is_silent() {
        let api = crate::api::test_server::client("http://localhost:1", None);
        let mut config = Config::new();
        assert!(build_vocalizer(&config, &api).is_none());

        config.voice_mode = VoiceMode::Local;
        assert!(build_vocalizer(&config, &api).is_none());

        config.synthesizer_command = Some("no-such-tts-binary-xyz".into());
        assert!(build_vocalizer(&config, &api).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_local_synthesizer_reports_exit_status() {
        let ok = LocalSynthesizer::from_command("true").unwrap();
        ok.speak("Hello").await.unwrap();

        let failing = LocalSynthesizer::from_command("false").unwrap();
        let err = failing.speak("Hello").await.unwrap_err();
        assert!(matches!(err, SpeechError::Failed(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_remote_synthesizer_pipes_audio_to_player() {
        use axum::{routing::post, Router};

        let router = Router::new().route(
            "/api/app/simulation/synthesize",
            post(|| async { vec![1u8, 2, 3, 4] }),
        );
        let base = crate::api::test_server::spawn(router).await;
        let api = crate::api::test_server::client(&base, Some("tok"));

        let player = RemoteSynthesizer::new(api, "cat").unwrap();
        player.speak("Sure, what's your budget?").await.unwrap();
    }
}
