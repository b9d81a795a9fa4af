use clap::{Parser, Subcommand};
use colored::*;
use dialoguer::{Input, Password, theme::ColorfulTheme};
use anyhow::{Context, Result};
use roleplay_core::models::{Scenario, ScenarioDraft};
use roleplay_core::{ApiClient, Config, VoiceMode};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod app;
mod handler;
mod tui;
mod ui;

use app::App;
use tui::{EventHandler, Tui};

#[derive(Parser)]
#[command(name = "roleplay")]
#[command(version, about = "Practice sales and customer-service conversations with an AI counterpart")]
struct Cli {
    /// Backend base URL (overrides config and ROLEPLAY_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in and store the access token
    Login {
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Create a new account
    Register {
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Forget the stored access token
    Logout,
    /// List available training scenarios
    Scenarios,
    /// Manage scenarios (admin accounts only)
    Admin {
        #[command(subcommand)]
        command: AdminCommands,
    },
    /// Show or set how AI replies are spoken
    Voice {
        /// off, local or remote
        mode: Option<String>,
    },
    /// Open the training UI (default)
    Train {
        /// Start this scenario right away
        #[arg(short, long)]
        scenario: Option<i64>,
    },
}

#[derive(Subcommand)]
enum AdminCommands {
    /// List every scenario
    List,
    /// Create a scenario interactively
    Create,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = init_logging() {
        eprintln!("{}: {:#}", "Logging disabled".yellow(), e);
    }

    let mut config = Config::load()?;
    if let Some(url) = cli.api_url {
        config.api_url = url;
    }
    let api = ApiClient::from_config(&config).context("Failed to create HTTP client")?;
    info!(api_url = %config.api_url, "Starting roleplay");

    match cli.command {
        Some(Commands::Login { username }) => login(&config, &api, username).await?,
        Some(Commands::Register { username }) => register(&api, username).await?,
        Some(Commands::Logout) => logout()?,
        Some(Commands::Scenarios) => list_scenarios(&api).await?,
        Some(Commands::Admin { command: AdminCommands::List }) => admin_list(&api).await?,
        Some(Commands::Admin { command: AdminCommands::Create }) => admin_create(&api).await?,
        Some(Commands::Voice { mode }) => voice(&config, mode)?,
        Some(Commands::Train { scenario }) => run_tui(config, api, scenario).await?,
        None => run_tui(config, api, None).await?,
    }

    Ok(())
}

/// Logs go to a file so they never draw over the terminal UI.
fn init_logging() -> Result<()> {
    let dir = Config::config_dir()?;
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("roleplay.log");
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

async fn run_tui(config: Config, api: ApiClient, scenario: Option<i64>) -> Result<()> {
    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let mut events = EventHandler::new();
    let config_path = Config::config_path()?;
    let mut app = App::new(config, config_path, api, events.sender(), scenario);

    let result = run_app(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;
    result
}

async fn run_app(terminal: &mut Tui, app: &mut App, events: &mut EventHandler) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        match events.next().await {
            Some(event) => handler::handle_event(app, event)?,
            None => break,
        }
    }
    Ok(())
}

fn prompt_username(default: Option<String>) -> Result<String> {
    let theme = ColorfulTheme::default();
    let mut input = Input::<String>::with_theme(&theme).with_prompt("Username");
    if let Some(name) = default {
        input = input.default(name);
    }
    Ok(input.interact_text()?.trim().to_string())
}

async fn login(config: &Config, api: &ApiClient, username: Option<String>) -> Result<()> {
    let username = match username {
        Some(name) => name,
        None => prompt_username(config.username.clone())?,
    };
    let password = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("Password")
        .interact()?;

    println!("🔐 Logging in to {}", api.base_url().cyan());
    match api.login(&username, &password).await {
        Ok(token) => {
            Config::save_token(&username, &token.access_token)?;
            println!("{} Logged in as {}", "✓".green(), username.bold());
        }
        Err(e) => println!("{}: {}", "Login failed".red(), e),
    }
    Ok(())
}

async fn register(api: &ApiClient, username: Option<String>) -> Result<()> {
    let username = match username {
        Some(name) => name,
        None => prompt_username(None)?,
    };
    let password = Password::with_theme(&ColorfulTheme::default())
        .with_prompt("Password")
        .with_confirmation("Repeat password", "Passwords do not match")
        .interact()?;

    match api.register(&username, &password).await {
        Ok(message) => {
            println!("{} {}", "✓".green(), message);
            println!("Log in with: {}", format!("roleplay login -u {}", username).bold());
        }
        Err(e) => println!("{}: {}", "Registration failed".red(), e),
    }
    Ok(())
}

fn logout() -> Result<()> {
    Config::clear_token()?;
    println!("{} Logged out", "✓".green());
    Ok(())
}

fn voice(config: &Config, mode: Option<String>) -> Result<()> {
    let Some(name) = mode else {
        println!("\n{}", "🔊 Voice Modes".bold().blue());
        for mode in VoiceMode::all() {
            let marker = if mode == config.voice_mode { "●".green() } else { "○".dimmed() };
            println!("  {} {:<7} {}", marker, mode.as_str().bold(), mode.display_name().dimmed());
        }
        println!("\nChange with: {}", "roleplay voice <mode>".bold());
        return Ok(());
    };

    match VoiceMode::from_str(&name) {
        Some(mode) => {
            Config::save_voice_mode(mode)?;
            println!("{} Voice set to {}", "✓".green(), mode.display_name().bold());
        }
        None => println!("{}: {} (expected off, local or remote)", "Unknown voice mode".red(), name),
    }
    Ok(())
}

fn print_scenarios(scenarios: &[Scenario]) {
    if scenarios.is_empty() {
        println!("{}", "No scenarios found".yellow());
        return;
    }

    for scenario in scenarios {
        println!(
            "{} {}",
            format!("#{}", scenario.id).bold().blue(),
            scenario.title.bold().yellow()
        );
        println!("   {} {}", "Goal:".dimmed(), scenario.goal);
        if !scenario.required_keywords.is_empty() {
            println!(
                "   {} {}",
                "Keywords:".dimmed(),
                scenario.required_keywords.join(", ").cyan()
            );
        }
        println!();
    }
}

async fn list_scenarios(api: &ApiClient) -> Result<()> {
    println!("\n{}", "🎭 Training Scenarios".bold().blue());
    println!("{}\n", "=".repeat(30).dimmed());

    match api.list_scenarios().await {
        Ok(scenarios) => {
            print_scenarios(&scenarios);
            if !scenarios.is_empty() {
                println!("Start one with: {}", "roleplay train --scenario <id>".bold());
            }
        }
        Err(e) => println!("{}: {}", "Could not load scenarios".red(), e),
    }
    Ok(())
}

async fn admin_list(api: &ApiClient) -> Result<()> {
    println!("\n{}", "🛠  All Scenarios".bold().blue());
    println!("{}\n", "=".repeat(30).dimmed());

    match api.admin_scenarios().await {
        Ok(scenarios) => print_scenarios(&scenarios),
        Err(e) => println!("{}: {}", "Could not load scenarios".red(), e),
    }
    Ok(())
}

async fn admin_create(api: &ApiClient) -> Result<()> {
    let theme = ColorfulTheme::default();
    let ask = |prompt: &str| -> Result<String> {
        Ok(Input::<String>::with_theme(&theme)
            .with_prompt(prompt)
            .interact_text()?)
    };

    let title = ask("Title")?;
    let goal = ask("Goal")?;
    let persona = ask("Customer persona")?;
    let keywords = ask("Required keywords (comma separated)")?;

    let draft = match ScenarioDraft::from_form(&title, &goal, &persona, &keywords) {
        Ok(draft) => draft,
        Err(e) => {
            println!("{}: {}", "Invalid scenario".red(), e);
            return Ok(());
        }
    };

    match api.create_scenario(&draft).await {
        Ok(scenario) => println!(
            "{} Created scenario {} {}",
            "✓".green(),
            format!("#{}", scenario.id).bold(),
            scenario.title.yellow()
        ),
        Err(e) => println!("{}: {}", "Could not create scenario".red(), e),
    }
    Ok(())
}
