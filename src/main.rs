//! Clinivault: clinic access-control core
//!
//! Admin command line for account bootstrap and token checks.
//!
//! ```text
//! clinivault register <username> <email> [--role admin|clinician|patient]
//! clinivault login <username>
//! clinivault whoami
//! ```
//!
//! Passwords and tokens are read from stdin, one line each, so they never
//! appear in the process list or shell history.

use std::io::BufRead;

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use zeroize::Zeroizing;

use clinivault::adapters::sanitize::SanitizingMakeWriter;
use clinivault::application::{Registration, SqliteClinic};
use clinivault::config::ClinicConfig;
use clinivault::Role;

const USAGE: &str = "Usage:
  clinivault register <username> <email> [--role admin|clinician|patient]
  clinivault login <username>
  clinivault whoami";

enum Command {
    Register {
        username: String,
        email: String,
        role: Role,
    },
    Login {
        username: String,
    },
    WhoAmI,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Command> {
    let Some(command) = args.next() else {
        bail!("{USAGE}");
    };

    match command.as_str() {
        "register" => {
            let (Some(username), Some(email)) = (args.next(), args.next()) else {
                bail!("{USAGE}");
            };
            let role = match (args.next().as_deref(), args.next()) {
                (None, _) => Role::Patient,
                (Some("--role"), Some(value)) => value
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Unknown role: {value}"))?,
                _ => bail!("{USAGE}"),
            };
            Ok(Command::Register { username, email, role })
        }
        "login" => match args.next() {
            Some(username) => Ok(Command::Login { username }),
            None => bail!("{USAGE}"),
        },
        "whoami" => Ok(Command::WhoAmI),
        _ => bail!("Unknown command: {command}\n{USAGE}"),
    }
}

fn read_secret_line(prompt: &str) -> Result<Zeroizing<String>> {
    eprint!("{prompt}: ");
    let mut line = Zeroizing::new(String::new());
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read stdin")?;
    let trimmed = Zeroizing::new(line.trim_end_matches(['\r', '\n']).to_string());
    if trimmed.is_empty() {
        bail!("{prompt} must not be empty");
    }
    Ok(trimmed)
}

fn main() -> Result<()> {
    // stdout carries command output only; logs go to stderr or a file.
    let log_mode = std::env::var("CLINIVAULT_LOG_MODE").unwrap_or_else(|_| "stderr".to_string());

    let (writer, _guard) = if log_mode == "file" {
        let log_file = std::env::var("CLINIVAULT_LOG_FILE")
            .unwrap_or_else(|_| "clinivault.log".to_string());

        if let Some(parent) = std::path::Path::new(&log_file).parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)?;
        tracing_appender::non_blocking(file)
    } else {
        tracing_appender::non_blocking(std::io::stderr())
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(SanitizingMakeWriter::new(writer)))
        .init();

    let command = parse_args(std::env::args().skip(1))?;
    let config = ClinicConfig::from_env().context("Failed to load configuration")?;
    let clinic = SqliteClinic::from_config(&config)?;

    match command {
        Command::Register { username, email, role } => {
            let password = read_secret_line("Password")?;
            let identity = clinic.accounts().register(&Registration {
                username,
                email,
                password,
                role,
            })?;
            match identity.linked_patient() {
                Some(patient) => {
                    println!("Registered user {} ({role}), patient {patient}", identity.id());
                }
                None => println!("Registered user {} ({role})", identity.id()),
            }
        }
        Command::Login { username } => {
            let password = read_secret_line("Password")?;
            let outcome = clinic.accounts().login(&username, &password)?;
            println!("{}", outcome.token.token);
            eprintln!("Token expires at {}", outcome.token.expires_at.to_rfc3339());
        }
        Command::WhoAmI => {
            let token = read_secret_line("Token")?;
            let identity = clinic.authenticate(&token)?;
            let account = clinic.accounts().account(&identity)?;
            println!(
                "{} (user {}, role {})",
                account.username,
                identity.id(),
                identity.role()
            );
        }
    }

    Ok(())
}
