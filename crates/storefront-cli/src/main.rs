//! Storefront CLI - log in to the storefront API and call it with a
//! persistent, self-renewing session.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use storefront_core::{AuthClient, Config, LoginRedirect};

const USERNAME_ENV: &str = "STOREFRONT_USERNAME";
const PASSWORD_ENV: &str = "STOREFRONT_PASSWORD";

const USAGE: &str = "\
Usage: storefront <command>

Commands:
  login [email]             Log in and remember the session
  register <name> <email>   Create an account and log in
  logout                    Forget the stored session
  whoami                    Show the logged-in user
  get <path>                GET an API path and print the JSON response";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

/// The terminal's version of "navigate to the login screen"
struct PromptLogin;

impl LoginRedirect for PromptLogin {
    fn redirect_to_login(&self) {
        eprintln!("Session expired. Please log in again with `storefront login`.");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        eprintln!("{}", USAGE);
        return Ok(());
    };

    let mut config = Config::load()?;
    let store = Arc::new(config.credential_store()?);
    let client = config.client(store, Arc::new(PromptLogin))?;
    info!(base_url = client.base_url(), "Storefront CLI starting");

    match (command.as_str(), &args[1..]) {
        ("login", rest) => login(&client, &mut config, rest.first().cloned()).await,
        ("register", [name, email]) => register(&client, &mut config, name, email).await,
        ("logout", []) => {
            if client.logout() {
                println!("Logged out.");
            } else {
                println!("Not logged in.");
            }
            Ok(())
        }
        ("whoami", []) => {
            whoami(&client);
            Ok(())
        }
        ("get", [path]) => get(&client, path).await,
        ("help" | "--help" | "-h", _) => {
            println!("{}", USAGE);
            Ok(())
        }
        _ => {
            eprintln!("{}", USAGE);
            anyhow::bail!("Unknown command: {}", args.join(" "))
        }
    }
}

async fn login(client: &AuthClient, config: &mut Config, username: Option<String>) -> Result<()> {
    let username = match username
        .or_else(|| std::env::var(USERNAME_ENV).ok())
        .or_else(|| config.last_username.clone())
    {
        Some(username) => username,
        None => prompt("Email: ")?,
    };
    let password = password()?;

    let session = client.login(&username, &password).await?;
    println!(
        "Logged in as {}.",
        session.identity.name().unwrap_or(&username)
    );

    config.last_username = Some(username);
    config.save()?;
    Ok(())
}

async fn register(client: &AuthClient, config: &mut Config, name: &str, email: &str) -> Result<()> {
    let password = password()?;

    let session = client.register(name, email, &password).await?;
    println!(
        "Account created. Logged in as {}.",
        session.identity.name().unwrap_or(name)
    );

    config.last_username = Some(email.to_string());
    config.save()?;
    Ok(())
}

fn whoami(client: &AuthClient) {
    let Some(session) = client.store().session() else {
        println!("Not logged in.");
        return;
    };

    let identity = &session.identity;
    println!("Name:   {}", identity.name().unwrap_or("-"));
    println!("Email:  {}", identity.email().unwrap_or("-"));
    if identity.is_admin() {
        println!("Role:   admin");
    }
    println!(
        "Token:  issued {}m ago ({})",
        session.token_age_minutes(),
        session.refreshed_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
    );
}

async fn get(client: &AuthClient, path: &str) -> Result<()> {
    let body: serde_json::Value = client.get_json(path).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn password() -> Result<String> {
    match std::env::var(PASSWORD_ENV) {
        Ok(password) if !password.is_empty() => Ok(password),
        _ => rpassword::prompt_password("Password: ").context("Failed to read password"),
    }
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{}", label);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read input")?;
    let value = line.trim().to_string();
    if value.is_empty() {
        anyhow::bail!("No value entered");
    }
    Ok(value)
}
