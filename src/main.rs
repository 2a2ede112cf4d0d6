use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use pinlock::gate::validator::{pin_digest, PinValidator, VerifyOutcome};
use pinlock::gate::AttemptRecord;
use pinlock::store::{
    DurableStore, MemoryStore, SqliteStore, KEY_AUTH_TOKEN, KEY_PIN_ATTEMPTS, KEY_PIN_CACHE,
    KEY_PIN_ENABLED, KEY_REFRESH_TOKEN,
};
use pinlock::{
    AuthError, AuthResult, ErrorClassifier, GateConfig, LockGate, OfflinePolicy, RetryPolicy,
};
use secrecy::{ExposeSecret, SecretString};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "pinlock")]
#[command(about = "PIN re-authentication gate diagnostics")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Durable store path (SQLite)
    #[arg(long, global = true, env = "PINLOCK_DB")]
    db: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify an error message or HTTP status into its handling policy
    Classify {
        /// Raw error message (used alone, or as detail for --status)
        message: Option<String>,

        /// HTTP status code returned by the backend
        #[arg(short, long)]
        status: Option<u16>,

        /// Emit the classification as JSON
        #[arg(long)]
        json: bool,
    },

    /// Walk a gate through scripted PIN entries against an in-memory store
    Simulate {
        /// Comma-separated entries to submit (e.g. 111111,123456)
        entries: String,

        /// The PIN the simulated backend accepts
        #[arg(short, long, default_value = "123456")]
        pin: String,

        /// Make the simulated backend unreachable
        #[arg(long)]
        offline: bool,

        /// Pre-cache the accepted PIN's digest (exercises the offline fallback)
        #[arg(long)]
        seed_cache: bool,

        /// Stay locked when offline with no cached digest
        #[arg(long)]
        fail_closed: bool,
    },

    /// Show persisted gate state from the durable store
    Status,
}

/// Backend stand-in for `simulate`: accepts exactly one PIN, or refuses to
/// answer at all when offline.
struct SimulatedBackend {
    pin: String,
    offline: bool,
}

#[async_trait]
impl PinValidator for SimulatedBackend {
    async fn verify(&self, _user_id: &str, pin: &SecretString) -> AuthResult<VerifyOutcome> {
        if self.offline {
            return Err(AuthError::Network("simulated offline backend".to_string()));
        }
        Ok(if pin.expose_secret() == self.pin {
            VerifyOutcome::accepted()
        } else {
            VerifyOutcome::rejected("wrong PIN")
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug {
        "pinlock=debug"
    } else {
        "pinlock=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    match cli.command {
        Commands::Classify {
            message,
            status,
            json,
        } => classify(message, status, json),
        Commands::Simulate {
            entries,
            pin,
            offline,
            seed_cache,
            fail_closed,
        } => simulate(&entries, pin, offline, seed_cache, fail_closed).await,
        Commands::Status => status(cli.db).await,
    }
}

fn classify(message: Option<String>, status: Option<u16>, json: bool) -> Result<()> {
    let error = match (status, message) {
        (Some(code), message) => AuthError::Status {
            code,
            message: message.unwrap_or_default(),
        },
        (None, Some(message)) => AuthError::Unexpected(message),
        (None, None) => anyhow::bail!("provide a message, a status code, or both"),
    };

    let info = ErrorClassifier::new().classify(&error);

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("{:<14} {}", "Kind:", info.kind);
    println!("{:<14} {}", "Message:", info.user_message);
    println!("{:<14} {}", "Retry:", yes_no(info.should_retry));
    println!("{:<14} {}", "Logout:", yes_no(info.should_logout));
    println!("{:<14} {}", "Alert:", yes_no(info.should_alert));
    Ok(())
}

async fn simulate(
    entries: &str,
    pin: String,
    offline: bool,
    seed_cache: bool,
    fail_closed: bool,
) -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.set(KEY_PIN_ENABLED, "true").await?;
    store.set(KEY_AUTH_TOKEN, "simulated-session").await?;
    if seed_cache {
        let digest = pin_digest(&SecretString::from(pin.clone()));
        store.set(KEY_PIN_CACHE, &digest).await?;
    }

    let config = GateConfig {
        offline_policy: if fail_closed {
            OfflinePolicy::FailClosed
        } else {
            OfflinePolicy::FailOpen
        },
        // One attempt when offline so the walk is not dominated by backoff
        // sleeps.
        retry: if offline {
            RetryPolicy::new(1, Duration::from_millis(100))
        } else {
            RetryPolicy::default()
        },
        ..GateConfig::default()
    };

    let backend = Arc::new(SimulatedBackend { pin, offline });
    let gate = LockGate::new_at_launch(config, store, backend, "simulated-user").await?;
    let mut events = gate.subscribe();

    println!("Gate starts {}", gate.state());
    println!("{}", "-".repeat(50));

    for (round, entry) in entries.split(',').enumerate() {
        let entry = entry.trim();
        gate.activate();

        let mut result = Ok(gate.state());
        for digit in entry.chars() {
            result = gate.submit_digit(digit).await;
            if result.is_err() {
                break;
            }
        }

        match result {
            Ok(state) => println!("Entry {:<2} {:<10} -> {}", round + 1, mask(entry), state),
            Err(e) => println!(
                "Entry {:<2} {:<10} -> rejected: {}",
                round + 1,
                mask(entry),
                e
            ),
        }
        while let Ok(event) = events.try_recv() {
            println!("          event: {:?}", event);
        }
    }

    println!("{}", "-".repeat(50));
    let snapshot = gate.pin_state().await?;
    println!(
        "Final: {} ({} attempt(s) recorded{})",
        gate.state(),
        snapshot.attempts,
        if snapshot.locked_out {
            ", locked out"
        } else {
            ""
        }
    );
    Ok(())
}

async fn status(db: Option<PathBuf>) -> Result<()> {
    let store = SqliteStore::new(db.as_deref())?;

    let enabled = store.get(KEY_PIN_ENABLED).await?;
    println!(
        "{:<18} {}",
        "PIN enabled:",
        enabled.as_deref().unwrap_or("false")
    );

    match store.get(KEY_PIN_ATTEMPTS).await? {
        Some(raw) => match serde_json::from_str::<AttemptRecord>(&raw) {
            Ok(record) => {
                let age = (chrono::Utc::now() - record.updated_at)
                    .to_std()
                    .unwrap_or_default();
                let age = Duration::from_secs(age.as_secs());
                println!(
                    "{:<18} {} (locked out: {}, updated {} ago)",
                    "Attempts:",
                    record.attempts,
                    yes_no(record.locked_out),
                    humantime::format_duration(age)
                );
            }
            Err(_) => println!("{:<18} unreadable record", "Attempts:"),
        },
        None => println!("{:<18} 0", "Attempts:"),
    }

    match store.get(KEY_PIN_CACHE).await? {
        Some(digest) => {
            let short: String = digest.chars().take(12).collect();
            println!("{:<18} sha256 {}...", "Digest cached:", short);
        }
        None => println!("{:<18} none", "Digest cached:"),
    }

    println!(
        "{:<18} {}",
        "Session token:",
        present(store.get(KEY_AUTH_TOKEN).await?)
    );
    println!(
        "{:<18} {}",
        "Refresh token:",
        present(store.get(KEY_REFRESH_TOKEN).await?)
    );
    Ok(())
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn present(value: Option<String>) -> &'static str {
    if value.is_some() {
        "present"
    } else {
        "absent"
    }
}

fn mask(entry: &str) -> String {
    "*".repeat(entry.chars().count())
}
