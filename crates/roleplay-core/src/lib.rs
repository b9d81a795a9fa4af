pub mod api;
pub mod config;
pub mod input;
pub mod models;
pub mod session;
pub mod speech;
pub mod state;
pub mod voice;

// Re-export main types for convenience
pub use api::{ApiClient, ApiError, SimulationBackend};
pub use config::Config;
pub use input::{InputController, InputError, SpeechInput, SpeechOutcome, TextInput};
pub use models::{AccessToken, ExchangeRequest, Feedback, Scenario, ScenarioDraft};
pub use session::{Effect, SessionEvent, SessionId, SessionState, SimulationSession};
pub use speech::{RecognitionEvent, RecognitionSink, SpeechCapability, SpeechError};
pub use state::{Speaker, Transcript, Turn};
pub use voice::{build_vocalizer, speak_detached, VoiceMode, Vocalizer};
