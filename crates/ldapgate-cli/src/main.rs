//! Ldapgate - LDAP login checker
//!
//! Runs the same authentication and authorization path a host framework
//! would, for operators verifying their directory configuration.

use anyhow::Context;
use clap::{Parser, Subcommand};
use ldapgate_auth::LdapAuthenticator;
use ldapgate_core::config::LoggingConfig;
use ldapgate_core::LdapgateConfig;
use std::io::BufRead;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "ldapgate")]
#[command(version = ldapgate_core::VERSION)]
#[command(about = "Check logins against an LDAP directory", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true, env = "LDAPGATE_CONFIG")]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "LDAPGATE_LOG_LEVEL")]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate a user and report whether they are allowed
    Check {
        username: String,

        /// Password; read from the first line of stdin when omitted
        #[arg(long, env = "LDAPGATE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Validate the configuration and print the effective settings
    Config,

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("ldapgate {}", ldapgate_core::VERSION);
        return Ok(ExitCode::SUCCESS);
    }

    let config = match &cli.config {
        Some(path) => LdapgateConfig::from_file(path)?,
        None => LdapgateConfig::from_env()?,
    };

    init_logging(&config.logging, cli.log_level.as_deref());

    let settings = config
        .ldap
        .resolve()
        .context("LDAP configuration is invalid")?;

    match cli.command {
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&settings.summary())?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { username, password } => {
            let password = match password {
                Some(p) => p,
                None => read_password()?,
            };
            check(LdapAuthenticator::new(settings), &username, &password).await
        }
        Commands::Version => Ok(ExitCode::SUCCESS),
    }
}

fn init_logging(logging: &LoggingConfig, level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.unwrap_or(&logging.level)));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.format == "json" {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

fn read_password() -> anyhow::Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;

    Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string())
}

async fn check(
    auth: LdapAuthenticator,
    username: &str,
    password: &str,
) -> anyhow::Result<ExitCode> {
    info!(
        "Checking login for {} against {}",
        username,
        auth.settings().endpoint.url()
    );

    let Some(user) = auth.authenticate(username, password).await else {
        println!("rejected");
        return Ok(ExitCode::FAILURE);
    };

    let allowed = auth.check_allowed(&user.name, Some(&user.auth_state));
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "name": user.name,
            "dn": user.dn,
            "allowed": allowed,
            "auth_state": user.auth_state,
        }))?
    );

    Ok(if allowed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
