use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use timely::config::{self, Config};
use timely::identity::LocalIdentityProvider;
use timely::store::SqliteDocumentStore;
use timely::suggest::HttpRecommendationService;
use timely::{App, Credentials, SessionMark, Subject};

/// Timely - class attendance tracker
/// Records present/absent sessions per subject and asks for attendance advice
#[derive(Parser)]
#[command(name = "timely")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Class attendance tracker with attendance suggestions", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory and a default configuration
    Init,

    /// Sign in (registers the address on first use)
    SignIn {
        /// Email address
        email: String,
    },

    /// Sign out
    SignOut,

    /// Show who is signed in
    Whoami,

    /// List subjects with attendance
    List,

    /// Add a subject
    Add {
        /// Subject name
        name: String,
    },

    /// Record a session you attended
    Present {
        /// Subject id or name
        subject: String,
    },

    /// Record a session you missed
    Absent {
        /// Subject id or name
        subject: String,
    },

    /// Remove a subject and its attendance
    Remove {
        /// Subject id or name
        subject: String,
    },

    /// Ask the recommendation service which classes to prioritise
    Suggest,

    /// Check the recommendation service is reachable
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // stdout is for command output
        .init();

    let data_dir = config::data_dir()?;
    debug!("Data directory: {:?}", data_dir);

    let created_config = config::init_data_dir(&data_dir)?;
    let config = Config::load(&data_dir)?;
    let db_path = config.db_path(&data_dir);

    let store = Arc::new(SqliteDocumentStore::open(&db_path)?);
    let identity = Arc::new(LocalIdentityProvider::open(&db_path)?);
    let service = Arc::new(HttpRecommendationService::new(
        &config.suggest.base_url,
        config.suggest.timeout(),
    )?);

    let mut app = App::new(identity, store, service.clone());
    app.start().await;

    match cli.command {
        Commands::Init => {
            info!("Initialized Timely at {:?}", data_dir);
            println!("✅ Timely initialized at {}", data_dir.display());
            if created_config {
                println!("   Config: {}", data_dir.join(config::CONFIG_FILE).display());
            }
            println!("   Database: {}", db_path.display());
        }
        Commands::Ping => match service.health().await {
            Ok(health) if health.is_ok() => println!("✅ {} is up", service.base_url()),
            Ok(health) => println!("⚠️  {} reports status '{}'", service.base_url(), health.status),
            Err(e) => println!("❌ {} unreachable: {}", service.base_url(), e),
        },
        Commands::SignIn { email } => {
            if let Some(identity) = app.sign_in(&Credentials::email(email)).await {
                println!("Signed in as {}", identity.display);
            }
        }
        Commands::SignOut => {
            app.sign_out().await;
            if app.user().is_none() {
                println!("Signed out");
            }
        }
        Commands::Whoami => match app.signed_in_as() {
            Some(display) => println!("Signed in as {}", display),
            None => println!("Not signed in"),
        },
        Commands::List => {
            if require_user(&app) && app.ledger().is_loaded() {
                print_subjects(app.subjects());
            }
        }
        Commands::Add { name } => {
            if require_user(&app) {
                match app.add_subject(&name).await {
                    Some(subject) => println!("Added {} ({})", subject.name(), subject.id()),
                    None if app.notice().is_none() => println!("Subject name is empty; nothing added"),
                    None => {}
                }
            }
        }
        Commands::Present { subject } => {
            if require_user(&app) {
                if let Some(subject) = app.mark(&subject, SessionMark::Present).await {
                    print_subject_line(&subject);
                }
            }
        }
        Commands::Absent { subject } => {
            if require_user(&app) {
                if let Some(subject) = app.mark(&subject, SessionMark::Absent).await {
                    print_subject_line(&subject);
                }
            }
        }
        Commands::Remove { subject } => {
            if require_user(&app) {
                if let Some(subject) = app.remove_subject(&subject).await {
                    println!("Removed {}", subject.name());
                }
            }
        }
        Commands::Suggest => {
            if require_user(&app) {
                println!("Thinking...");
                if let Some(text) = app.suggest().await {
                    println!();
                    println!("{}", text);
                }
            }
        }
    }

    if let Some(notice) = app.notice() {
        println!("❌ {}", notice);
    }

    Ok(())
}

fn require_user(app: &App) -> bool {
    if app.user().is_none() {
        println!("Not signed in. Run 'timely sign-in <email>' first.");
        return false;
    }
    true
}

fn print_subjects(subjects: &[Subject]) {
    if subjects.is_empty() {
        println!("No subjects yet. Add one with 'timely add <name>'.");
        return;
    }

    println!(
        "{:<24} {:>8} {:>6} {:>5} {:>7}  {}",
        "Subject", "Attended", "Total", "%", "Target", "Id"
    );
    println!("{}", "-".repeat(80));
    for subject in subjects {
        let flag = if subject.is_below_target() { " ⚠️" } else { "" };
        println!(
            "{:<24} {:>8} {:>6} {:>4}% {:>6}%  {}{}",
            subject.name(),
            subject.attended(),
            subject.total(),
            subject.percentage(),
            subject.target_attendance(),
            subject.id(),
            flag
        );
    }
}

fn print_subject_line(subject: &Subject) {
    let status = if subject.is_below_target() {
        "below target"
    } else {
        "on target"
    };
    println!(
        "{}: {}/{} ({}%, target {}%, {})",
        subject.name(),
        subject.attended(),
        subject.total(),
        subject.percentage(),
        subject.target_attendance(),
        status
    );
}
