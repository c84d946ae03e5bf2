//! CLI module for the campus-requests command-line interface.
//!
//! Subcommands besides the server itself:
//! - `seed` - Insert demo users and courses
//! - `config check` - Validate configuration file
//! - `reset-status` - Put a request back to pending

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::db::{self, RequestKind};
use crate::requests::{reset_status, Request};

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "campus-requests")]
#[command(author, version, about = "Accommodation and absence request tracker", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "CAMPUS_REQUESTS_CONFIG", default_value = "campus-requests.toml")]
    pub config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Subcommand to run (if none, starts the server)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Whether this invocation runs the HTTP server
    pub fn starts_server(&self) -> bool {
        matches!(self.command, None | Some(Commands::Serve))
    }
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve,

    /// Insert demo users and courses, skipping rows that already exist
    Seed,

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Set a request back to pending
    ResetStatus {
        /// Which table the id belongs to: accommodation or absence
        #[arg(long, value_parser = parse_kind)]
        kind: RequestKind,
        /// Request id
        id: i64,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration file
    Check,
}

fn parse_kind(value: &str) -> Result<RequestKind, String> {
    value.to_lowercase().parse()
}

/// Run a non-server CLI command
pub async fn run_command(cli: &Cli, config: &Config) -> Result<()> {
    match &cli.command {
        Some(Commands::Seed) => cmd_seed(config).await,
        Some(Commands::Config(ConfigCommands::Check)) => cmd_config_check(cli),
        Some(Commands::ResetStatus { kind, id }) => cmd_reset_status(config, *kind, *id).await,
        // The server is started by main.rs
        Some(Commands::Serve) | None => Ok(()),
    }
}

async fn open_db(config: &Config) -> Result<db::DbPool> {
    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data directory {}",
            config.server.data_dir.display()
        )
    })?;
    db::init(&config.server.data_dir).await
}

async fn cmd_seed(config: &Config) -> Result<()> {
    let pool = open_db(config).await?;
    let report = db::seed_demo_data(&pool).await?;

    println!("[OK] Seeding finished");
    println!("  Users created:   {}", report.users_created);
    println!("  Courses created: {}", report.courses_created);
    Ok(())
}

async fn cmd_reset_status(config: &Config, kind: RequestKind, id: i64) -> Result<()> {
    let pool = open_db(config).await?;
    let request = reset_status(&pool, kind, id)
        .await
        .with_context(|| format!("Failed to reset {} {}", kind, id))?;

    let summary = match &request {
        Request::Accommodation(a) => format!("{} for course {}", a.request_type, a.course_id),
        Request::Absence(a) => format!("{} on {}", a.materia, a.fecha),
    };
    println!("[OK] {} {} is pending again ({})", kind, id, summary);
    Ok(())
}

fn cmd_config_check(cli: &Cli) -> Result<()> {
    let config_path = &cli.config;

    println!("Checking configuration file: {}", config_path.display());
    println!();

    if !config_path.exists() {
        println!(
            "[!!] Configuration file not found: {}",
            config_path.display()
        );
        println!();
        println!("A default configuration will be used when starting the server.");
        return Ok(());
    }

    let config = Config::load(config_path)?;
    let problems = config.validate();

    println!("Server:");
    println!("  Host:         {}", config.server.host);
    println!("  Port:         {}", config.server.port);
    println!("  Data Dir:     {}", config.server.data_dir.display());
    println!();
    println!("Auth:");
    println!(
        "  Bootstrap admin: {}",
        config.auth.admin_email.as_deref().unwrap_or("(none)")
    );
    println!("  Session TTL:     {}h", config.auth.session_ttl_hours);
    println!();
    println!("Logging:");
    println!("  Level:        {}", config.logging.level);
    println!();

    if problems.is_empty() {
        println!("[OK] Configuration file is valid!");
        return Ok(());
    }

    for problem in &problems {
        println!("[!!] {}", problem);
    }
    bail!("{} configuration problem(s) found", problems.len())
}
