use ratatui::layout::Rect;
use ratatui::widgets::ListState;
use roleplay_core::api::ApiError;
use roleplay_core::input::{InputController, SpeechOutcome, TextInput};
use roleplay_core::models::{Scenario, ScenarioDraft};
use roleplay_core::session::{perform, Effect, SessionEvent, SessionId, SessionState, SimulationSession};
use roleplay_core::speech::{RecognitionEvent, RecognitionSink, SpeechCapability};
use roleplay_core::voice::{build_vocalizer, speak_detached, Vocalizer, VoiceMode};
use roleplay_core::{ApiClient, Config};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use crate::tui::{AppEvent, BackendResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Login,
    Dashboard,
    Simulation,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginField {
    Username,
    Password,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthAction {
    Login,
    Register,
}

pub const ADMIN_FIELDS: [&str; 4] = [
    "Title",
    "Goal",
    "Customer persona",
    "Required keywords (comma separated)",
];

/// Everything owned by the simulation screen. Dropped on navigation away.
pub struct SimulationView {
    pub scenario: Scenario,
    pub session: SimulationSession,
    pub input: InputController,
    pub scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
}

impl SimulationView {
    pub fn is_concluded(&self) -> bool {
        self.session.state() == SessionState::Concluded
    }

    /// Scroll transcript to bottom so the newest turn is visible
    pub fn scroll_to_bottom(&mut self) {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: usize = 0;
        for turn in self.session.transcript().iter() {
            total_lines += 1; // Speaker line ("You:" or "AI:")
            for line in turn.text.lines() {
                // Use character count, not byte length, for proper UTF-8 handling
                let char_count = line.chars().count();
                total_lines += (char_count / wrap_width) + 1;
            }
            total_lines += 1; // Blank line after turn
        }

        if self.session.is_busy() {
            total_lines += 2; // "AI:" + "Thinking..."
        }

        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        let total_lines = u16::try_from(total_lines).unwrap_or(u16::MAX);
        self.scroll = total_lines.saturating_sub(visible_height);
    }
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,

    // Collaborators
    pub config: Config,
    config_path: PathBuf,
    pub api: ApiClient,
    pub vocalizer: Option<Arc<dyn Vocalizer>>,
    events: UnboundedSender<AppEvent>,

    // Login state
    pub auth_action: AuthAction,
    pub login_focus: LoginField,
    pub username_input: TextInput,
    pub password_input: TextInput,
    pub auth_pending: bool,

    // Dashboard state
    pub scenarios: Vec<Scenario>,
    pub scenario_state: ListState,
    pub scenarios_loading: bool,
    pending_scenario: Option<i64>,

    // Simulation state
    pub simulation: Option<SimulationView>,

    // Admin state
    pub admin_inputs: [TextInput; 4],
    pub admin_focus: usize,
    pub admin_scenarios: Vec<Scenario>,
    pub admin_state: ListState,
    pub admin_pending: bool,

    /// Blocking notice, shown as a popup until dismissed
    pub notice: Option<String>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Panel areas for mouse hit-testing (updated during render)
    pub list_area: Option<Rect>,
    pub chat_area: Option<Rect>,
}

impl App {
    /// `start_scenario` opens that scenario as soon as the list has loaded.
    pub fn new(
        config: Config,
        config_path: PathBuf,
        api: ApiClient,
        events: UnboundedSender<AppEvent>,
        start_scenario: Option<i64>,
    ) -> Self {
        let vocalizer = build_vocalizer(&config, &api);

        let mut username_input = TextInput::new();
        if let Some(username) = &config.username {
            username.chars().for_each(|c| username_input.insert(c));
        }

        let mut app = Self {
            should_quit: false,
            screen: Screen::Login,
            input_mode: InputMode::Editing,
            config,
            config_path,
            api,
            vocalizer,
            events,
            auth_action: AuthAction::Login,
            login_focus: if username_input.is_empty() {
                LoginField::Username
            } else {
                LoginField::Password
            },
            username_input,
            password_input: TextInput::new(),
            auth_pending: false,
            scenarios: Vec::new(),
            scenario_state: ListState::default(),
            scenarios_loading: false,
            pending_scenario: start_scenario,
            simulation: None,
            admin_inputs: Default::default(),
            admin_focus: 0,
            admin_scenarios: Vec::new(),
            admin_state: ListState::default(),
            admin_pending: false,
            notice: None,
            animation_frame: 0,
            list_area: None,
            chat_area: None,
        };

        if app.api.is_authenticated() {
            app.open_dashboard();
        }
        app
    }

    // Login methods
    pub fn login_input_mut(&mut self) -> &mut TextInput {
        match self.login_focus {
            LoginField::Username => &mut self.username_input,
            LoginField::Password => &mut self.password_input,
        }
    }

    pub fn toggle_login_field(&mut self) {
        self.login_focus = match self.login_focus {
            LoginField::Username => LoginField::Password,
            LoginField::Password => LoginField::Username,
        };
    }

    pub fn toggle_auth_action(&mut self) {
        self.auth_action = match self.auth_action {
            AuthAction::Login => AuthAction::Register,
            AuthAction::Register => AuthAction::Login,
        };
    }

    pub fn submit_auth(&mut self) {
        if self.auth_pending {
            return;
        }
        let username = self.username_input.value().trim().to_string();
        let password = self.password_input.value().to_string();
        if username.is_empty() || password.is_empty() {
            self.notice = Some("Username and password are required.".to_string());
            return;
        }

        self.auth_pending = true;
        let api = self.api.clone();
        let tx = self.events.clone();
        match self.auth_action {
            AuthAction::Login => {
                tokio::spawn(async move {
                    let result = api.login(&username, &password).await;
                    let _ = tx.send(AppEvent::Backend(BackendResult::LoggedIn { username, result }));
                });
            }
            AuthAction::Register => {
                tokio::spawn(async move {
                    let result = api.register(&username, &password).await;
                    let _ = tx.send(AppEvent::Backend(BackendResult::Registered(result)));
                });
            }
        }
    }

    pub fn logout(&mut self) {
        self.persist("token", |config| config.token = None);
        self.config.token = None;
        self.api = self.api.clone().with_token(None);
        self.vocalizer = build_vocalizer(&self.config, &self.api);
        self.leave_simulation();
        self.password_input.clear();
        self.scenarios.clear();
        self.admin_scenarios.clear();
        self.screen = Screen::Login;
        self.input_mode = InputMode::Editing;
        info!("Logged out");
    }

    // Dashboard methods
    pub fn open_dashboard(&mut self) {
        self.screen = Screen::Dashboard;
        self.input_mode = InputMode::Normal;
        self.load_scenarios();
    }

    pub fn load_scenarios(&mut self) {
        if self.scenarios_loading {
            return;
        }
        self.scenarios_loading = true;
        let api = self.api.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = api.list_scenarios().await;
            let _ = tx.send(AppEvent::Backend(BackendResult::Scenarios(result)));
        });
    }

    pub fn scenario_nav_down(&mut self) {
        let len = self.scenarios.len();
        if len > 0 {
            let i = self.scenario_state.selected().unwrap_or(0);
            self.scenario_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn scenario_nav_up(&mut self) {
        let i = self.scenario_state.selected().unwrap_or(0);
        self.scenario_state.select(Some(i.saturating_sub(1)));
    }

    pub fn selected_scenario(&self) -> Option<&Scenario> {
        self.scenario_state.selected().and_then(|i| self.scenarios.get(i))
    }

    // Simulation methods
    pub fn start_simulation(&mut self, scenario: Scenario) {
        let session = SimulationSession::new(
            scenario.id,
            &self.config.greeting,
            self.vocalizer.is_some(),
        );
        let id = session.id();
        let opening = session.opening_effects();

        self.simulation = Some(SimulationView {
            scenario,
            session,
            input: InputController::text(),
            scroll: 0,
            chat_height: 0,
            chat_width: 0,
        });
        self.screen = Screen::Simulation;
        self.input_mode = InputMode::Editing;
        self.run_effects(id, opening);
    }

    /// Discards the session. Late results for it are dropped by id.
    pub fn leave_simulation(&mut self) {
        if let Some(mut view) = self.simulation.take() {
            if let InputController::Speech(speech) = &mut view.input {
                speech.stop();
            }
            info!(session_id = %view.session.id(), "Simulation session discarded");
        }
        if self.screen == Screen::Simulation {
            self.screen = Screen::Dashboard;
            self.input_mode = InputMode::Normal;
        }
    }

    pub fn submit_text(&mut self) {
        let Some(view) = self.simulation.as_mut() else {
            return;
        };
        // Keep the draft while a request is outstanding
        if view.session.state() != SessionState::Active {
            return;
        }
        if let InputController::Text(input) = &mut view.input {
            if let Some(text) = input.submit() {
                self.dispatch(SessionEvent::Utterance(text));
            }
        }
    }

    pub fn request_end(&mut self) {
        let recording = self.simulation.as_ref().is_some_and(|v| v.input.is_recording());
        if recording {
            self.notice = Some("Stop recording before ending the session.".to_string());
            return;
        }
        self.dispatch(SessionEvent::EndRequested);
    }

    /// Feeds an event into the current session and carries out its effects.
    fn dispatch(&mut self, event: SessionEvent) {
        let Some(view) = self.simulation.as_mut() else {
            return;
        };
        let id = view.session.id();
        match view.session.handle(event) {
            Ok(effects) => {
                view.scroll_to_bottom();
                if view.is_concluded() {
                    if let InputController::Speech(speech) = &mut view.input {
                        speech.stop();
                    }
                    self.input_mode = InputMode::Normal;
                }
                self.run_effects(id, effects);
            }
            Err(rejected) => debug!(session_id = %id, %rejected, "Session event dropped"),
        }
    }

    fn run_effects(&mut self, id: SessionId, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Respond(_) | Effect::Analyze(_) => {
                    let api = self.api.clone();
                    let tx = self.events.clone();
                    tokio::spawn(async move {
                        if let Some(event) = perform(&effect, &api).await {
                            let _ = tx.send(AppEvent::Session(id, event));
                        }
                    });
                }
                Effect::Vocalize(text) => {
                    if let Some(vocalizer) = &self.vocalizer {
                        speak_detached(vocalizer.clone(), text);
                    }
                }
                Effect::Notify(message) => self.notice = Some(message),
            }
        }
    }

    pub fn on_session_event(&mut self, id: SessionId, event: SessionEvent) {
        match &self.simulation {
            Some(view) if view.session.id() == id => self.dispatch(event),
            _ => debug!(session_id = %id, "Dropping result for a discarded session"),
        }
    }

    pub fn on_recognition(&mut self, id: SessionId, event: RecognitionEvent) {
        let Some(view) = self.simulation.as_mut() else {
            return;
        };
        if view.session.id() != id {
            return;
        }
        let InputController::Speech(speech) = &mut view.input else {
            return;
        };

        match speech.on_event(event) {
            SpeechOutcome::Utterance(text) => self.dispatch(SessionEvent::Utterance(text)),
            SpeechOutcome::Failed(message) => {
                self.notice = Some(format!("Speech recognition error: {}", message));
            }
            SpeechOutcome::Ended | SpeechOutcome::Ignored => {}
        }
    }

    /// Switches between typed and spoken input for the current session.
    pub fn toggle_speech_mode(&mut self) {
        let Some(view) = self.simulation.as_mut() else {
            return;
        };

        if let InputController::Speech(speech) = &mut view.input {
            speech.stop();
            view.input = InputController::text();
            self.input_mode = InputMode::Editing;
            return;
        }

        let id = view.session.id();
        let tx = self.events.clone();
        let sink: RecognitionSink = Arc::new(move |event| {
            let _ = tx.send(AppEvent::Recognition(id, event));
        });
        let capability = SpeechCapability::detect(self.config.recognizer_command.as_deref(), sink);

        match InputController::speech(capability) {
            Ok(input) => {
                view.input = input;
                self.input_mode = InputMode::Normal;
            }
            Err(e) => {
                self.notice = Some(format!("{}. Text input stays active.", capitalize(&e.to_string())));
            }
        }
    }

    pub fn toggle_recording(&mut self) {
        let Some(view) = self.simulation.as_mut() else {
            return;
        };
        let active = view.session.state() == SessionState::Active;
        let InputController::Speech(speech) = &mut view.input else {
            return;
        };
        // Capture only starts while the session can accept an utterance
        if !speech.is_recording() && !active {
            return;
        }
        if let Err(e) = speech.toggle() {
            self.notice = Some(format!("Could not start listening: {}", e));
        }
    }

    pub fn cycle_voice_mode(&mut self) {
        let mode = self.config.voice_mode.next();
        self.config.voice_mode = mode;
        self.persist("voice mode", |config| config.voice_mode = mode);

        self.vocalizer = build_vocalizer(&self.config, &self.api);
        if mode != VoiceMode::Off && self.vocalizer.is_none() {
            self.notice = Some(format!(
                "{} is not configured. Check the synthesizer settings in the config file.",
                mode.display_name()
            ));
        }
        if let Some(view) = self.simulation.as_mut() {
            view.session.set_vocalize(self.vocalizer.is_some());
        }
    }

    // Admin methods
    pub fn open_admin(&mut self) {
        self.screen = Screen::Admin;
        self.input_mode = InputMode::Normal;
        self.admin_focus = 0;
        let api = self.api.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = api.admin_scenarios().await;
            let _ = tx.send(AppEvent::Backend(BackendResult::AdminScenarios(result)));
        });
    }

    pub fn admin_input_mut(&mut self) -> &mut TextInput {
        &mut self.admin_inputs[self.admin_focus]
    }

    pub fn admin_next_field(&mut self) {
        self.admin_focus = (self.admin_focus + 1) % ADMIN_FIELDS.len();
    }

    pub fn admin_prev_field(&mut self) {
        self.admin_focus = (self.admin_focus + ADMIN_FIELDS.len() - 1) % ADMIN_FIELDS.len();
    }

    pub fn admin_nav_down(&mut self) {
        let len = self.admin_scenarios.len();
        if len > 0 {
            let i = self.admin_state.selected().unwrap_or(0);
            self.admin_state.select(Some((i + 1).min(len - 1)));
        }
    }

    pub fn admin_nav_up(&mut self) {
        let i = self.admin_state.selected().unwrap_or(0);
        self.admin_state.select(Some(i.saturating_sub(1)));
    }

    pub fn submit_admin_form(&mut self) {
        if self.admin_pending {
            return;
        }
        let [title, goal, persona, keywords] = &self.admin_inputs;
        let draft = match ScenarioDraft::from_form(
            title.value(),
            goal.value(),
            persona.value(),
            keywords.value(),
        ) {
            Ok(draft) => draft,
            Err(e) => {
                self.notice = Some(capitalize(&e.to_string()));
                return;
            }
        };

        self.admin_pending = true;
        let api = self.api.clone();
        let tx = self.events.clone();
        tokio::spawn(async move {
            let result = api.create_scenario(&draft).await;
            let _ = tx.send(AppEvent::Backend(BackendResult::ScenarioCreated(result)));
        });
    }

    // Background results
    pub fn on_backend(&mut self, result: BackendResult) {
        match result {
            BackendResult::LoggedIn { username, result } => {
                self.auth_pending = false;
                match result {
                    Ok(token) => self.complete_login(username, token.access_token),
                    Err(e) => self.notice = Some(e.to_string()),
                }
            }
            BackendResult::Registered(result) => {
                self.auth_pending = false;
                match result {
                    Ok(message) => {
                        self.notice = Some(format!("{} You can now log in.", message));
                        self.auth_action = AuthAction::Login;
                        self.login_focus = LoginField::Password;
                    }
                    Err(e) => self.notice = Some(e.to_string()),
                }
            }
            BackendResult::Scenarios(result) => {
                self.scenarios_loading = false;
                match result {
                    Ok(scenarios) => self.set_scenarios(scenarios),
                    Err(e) => self.handle_api_error(e),
                }
            }
            BackendResult::AdminScenarios(result) => match result {
                Ok(scenarios) => {
                    self.admin_state.select(if scenarios.is_empty() { None } else { Some(0) });
                    self.admin_scenarios = scenarios;
                }
                Err(e) => self.handle_api_error(e),
            },
            BackendResult::ScenarioCreated(result) => {
                self.admin_pending = false;
                match result {
                    Ok(scenario) => {
                        info!(scenario_id = scenario.id, "Scenario created");
                        self.notice = Some(format!("Scenario \"{}\" created.", scenario.title));
                        self.admin_inputs.iter_mut().for_each(TextInput::clear);
                        self.admin_focus = 0;
                        self.admin_scenarios.push(scenario.clone());
                        self.scenarios.push(scenario);
                    }
                    Err(e) => self.handle_api_error(e),
                }
            }
        }
    }

    fn complete_login(&mut self, username: String, token: String) {
        self.persist("token", |config| {
            config.username = Some(username.clone());
            config.token = Some(token.clone());
        });
        self.config.username = Some(username);
        self.config.token = Some(token.clone());
        self.api = self.api.clone().with_token(Some(token));
        self.vocalizer = build_vocalizer(&self.config, &self.api);
        self.password_input.clear();
        self.open_dashboard();
    }

    fn set_scenarios(&mut self, scenarios: Vec<Scenario>) {
        self.scenarios = scenarios;
        self.scenario_state
            .select(if self.scenarios.is_empty() { None } else { Some(0) });

        if let Some(id) = self.pending_scenario.take() {
            match self.scenarios.iter().find(|s| s.id == id).cloned() {
                Some(scenario) => self.start_simulation(scenario),
                None => self.notice = Some(format!("Scenario {} was not found.", id)),
            }
        }
    }

    fn handle_api_error(&mut self, err: ApiError) {
        if matches!(err, ApiError::Server { status: 401, .. }) {
            self.logout();
            self.notice = Some("Your session has expired. Please log in again.".to_string());
        } else {
            self.notice = Some(err.to_string());
        }
    }

    /// Writes a setting through to the config file.
    fn persist(&self, what: &str, edit: impl FnOnce(&mut Config)) {
        if let Err(e) = Config::update(&self.config_path, edit) {
            warn!(error = %e, "Failed to save {}", what);
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        let busy = self.auth_pending
            || self.scenarios_loading
            || self.admin_pending
            || self.simulation.as_ref().is_some_and(|v| v.session.is_busy());
        if busy {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
