use clap::{Parser, Subcommand};
use inquire::Text;

use crate::config::{KNOWN_KEYS, Settings};
use crate::error::{AppError, Result};
use crate::models::event::EventView;
use crate::models::user::User;
use crate::runtime::{AppState, Tables};
use crate::service::account_service::DEMO_USERNAME;
use crate::service::command_executor::{CommandExecutor, Outcome};
use crate::service::provider::ProviderAdapter;

#[derive(Parser)]
#[command(name = "drvyn", about = "Drvyn calendar assistant")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat as an existing user; returned commands are applied to their calendar.
    Chat {
        #[arg(long, default_value = DEMO_USERNAME)]
        username: String,
    },
    /// Create the demo account if it does not exist yet.
    SeedDemo,
    /// Print a user's events.
    Events {
        #[arg(long, default_value = DEMO_USERNAME)]
        username: String,
    },
    /// Report which settings are present and whether the data directory loads.
    Check,
}

pub async fn cli(settings: &Settings, lookup: &dyn Fn(&str) -> Option<String>) {
    // Fine to panic here
    let cli = Cli::parse();
    if let Commands::Check = cli.command {
        check(settings, lookup);
        return;
    }

    let state = match AppState::load(settings) {
        Ok(state) => state,
        Err(e) => {
            println!("Failed to load data from {}: {}", settings.db_location, e);
            return;
        }
    };
    let result = match &cli.command {
        Commands::Chat { username } => chat(&state, username).await,
        Commands::SeedDemo => seed_demo(&state).await,
        Commands::Events { username } => print_events(&state, username).await,
        Commands::Check => Ok(()),
    };
    if let Err(e) = result {
        println!("{}", e);
    }
}

async fn lookup_user(state: &AppState, username: &str) -> Result<User> {
    state
        .accounts
        .find_by_username(username)
        .await
        .ok_or_else(|| AppError::NotFound(format!("No user named {}", username)))
}

async fn chat(state: &AppState, username: &str) -> Result<()> {
    let user = lookup_user(state, username).await?;
    let executor = CommandExecutor::new(state.events.clone());
    println!(
        "Chatting as {} via {}. Submit an empty line to quit.",
        user.username,
        state.chat.provider_name()
    );

    loop {
        let Ok(input) = Text::new("You:").prompt() else {
            break;
        };
        if input.trim().is_empty() {
            break;
        }
        let reply = state.chat.submit(&user, &input).await?;
        for outcome in executor.apply(user.id, &reply.commands).await? {
            print_outcome(&outcome);
        }
    }
    Ok(())
}

fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Added(event) => {
            let view = EventView::from(event);
            println!("+ {} ({} to {})", view.title, view.start, view.end);
        }
        Outcome::Removed(event) => println!("- {}", event.title),
        Outcome::Message(text) => println!("Drvyn: {}", text),
        Outcome::Skipped(reason) => println!("! {}", reason),
    }
}

async fn seed_demo(state: &AppState) -> Result<()> {
    match state.accounts.seed_demo().await? {
        Some(user) => println!("Created demo user {} (id {})", user.username, user.id),
        None => println!("Demo user already exists"),
    }
    Ok(())
}

async fn print_events(state: &AppState, username: &str) -> Result<()> {
    let user = lookup_user(state, username).await?;
    let events = state.events.list(user.id).await;
    if events.is_empty() {
        println!("No events for {}", user.username);
    }
    for event in events.iter().map(EventView::from) {
        println!("[{}] {} ({} to {})", event.id, event.title, event.start, event.end);
    }
    Ok(())
}

/// Never prints values, only whether each key is set.
fn check(settings: &Settings, lookup: &dyn Fn(&str) -> Option<String>) {
    println!("Configuration:");
    for key in KNOWN_KEYS {
        let present = lookup(key).is_some_and(|v| !v.trim().is_empty());
        println!("  {:<24} {}", key, if present { "set" } else { "not set" });
    }

    let provider = ProviderAdapter::from_settings(&settings.provider);
    println!(
        "Provider: {} ({})",
        provider.name(),
        if provider.is_configured() { "ready" } else { "not configured" }
    );

    match Tables::load(&settings.db_location) {
        Ok(_) => println!("Data directory {}: ok", settings.db_location),
        Err(e) => println!("Data directory {}: {}", settings.db_location, e),
    }
}
