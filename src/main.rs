//! handoff operator CLI.
//!
//! Parses arguments, installs logging (the default filter never emits codes,
//! passphrases or payloads), builds a relay from the config file and runs one
//! command against it.
//!
//! Each invocation is its own process, so commands that touch stored
//! handoffs need the sqlite backend. Without `--config` the CLI uses sqlite
//! at `handoff.db`; a config that selects the memory backend is refused.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use handoff::config::{ttl_from_secs, BackendKind};
use handoff::{CodeHasher, HandoffError, Relay, RelayConfig};

/// Encrypted one-time handoffs addressed by a short code.
#[derive(Parser, Debug)]
#[command(name = "handoff")]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(long, short, env = "HANDOFF_CONFIG")]
    config: Option<PathBuf>,

    /// Pepper for code hashes. Overrides the config file.
    #[arg(long, global = true, env = "HANDOFF_PEPPER", hide_env_values = true)]
    pepper: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check a passphrase read from stdin against the password policy.
    CheckPassword,

    /// Print the lookup hash of a code under the configured pepper.
    Hash {
        code: String,
    },

    /// Print a fresh handoff code.
    NewCode,

    /// Seal stdin under $HANDOFF_PASSPHRASE and store it under a code.
    Send {
        #[arg(long)]
        code: String,

        /// Lifetime in seconds; the configured default when omitted.
        #[arg(long)]
        ttl_secs: Option<u64>,

        #[arg(long, env = "HANDOFF_PASSPHRASE", hide_env_values = true)]
        passphrase: String,
    },

    /// Redeem a code and print the plaintext.
    Receive {
        #[arg(long)]
        code: String,

        #[arg(long, env = "HANDOFF_PASSPHRASE", hide_env_values = true)]
        passphrase: String,
    },

    /// Purge expired handoffs once, or keep purging with --watch.
    Reap {
        /// Sweep every `reap_interval_secs` until interrupted.
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("handoff=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = match &cli.config {
        Some(path) => RelayConfig::load(path)?,
        None => {
            let mut config = RelayConfig::default();
            config.store.backend = BackendKind::Sqlite;
            config
        }
    };
    if let Some(pepper) = cli.pepper {
        config.pepper = Some(pepper);
    }

    match cli.command {
        Commands::CheckPassword => {
            let password = read_stdin()?;
            let report = config.policy.validate(password.trim_end_matches(['\r', '\n']));
            if report.valid {
                println!("ok");
                return Ok(ExitCode::SUCCESS);
            }
            for error in &report.errors {
                println!("{error}");
            }
            Ok(ExitCode::FAILURE)
        }
        Commands::Hash { code } => {
            let pepper = config.resolve_pepper()?;
            println!("{}", CodeHasher::new(pepper.as_bytes()).hash_code(&code));
            Ok(ExitCode::SUCCESS)
        }
        Commands::NewCode => {
            println!("{}", handoff::generate_code(&handoff::RingProvider::default())?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Send {
            code,
            ttl_secs,
            passphrase,
        } => {
            let relay = persistent_relay(&config)?;
            let ttl = match ttl_secs {
                Some(secs) => ttl_from_secs(secs)?,
                None => config.default_ttl()?,
            };
            let plaintext = read_stdin()?;
            let backend = relay.send(&code, &passphrase, &plaintext, ttl).await?;
            eprintln!("stored ({backend}), expires in {}s", ttl.num_seconds());
            Ok(ExitCode::SUCCESS)
        }
        Commands::Receive { code, passphrase } => {
            let relay = persistent_relay(&config)?;
            match relay.receive(&code, &passphrase).await {
                Ok(plaintext) => {
                    print!("{plaintext}");
                    Ok(ExitCode::SUCCESS)
                }
                // Expired and unknown codes look the same to whoever typed them.
                Err(HandoffError::NotFound | HandoffError::Expired) => {
                    bail!("no handoff for this code")
                }
                Err(e) => Err(e.into()),
            }
        }
        Commands::Reap { watch: false } => {
            let relay = persistent_relay(&config)?;
            let cleanup = relay.cleanup_expired()?;
            println!("purged {} ({})", cleanup.purged, cleanup.backend);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Reap { watch: true } => {
            let relay = persistent_relay(&config)?;
            let every = config.reap_interval();
            if every.is_zero() {
                bail!("reap_interval_secs must be greater than zero");
            }
            tracing::info!(interval_secs = every.as_secs(), "reaper running, ctrl-c to stop");

            let reaper = relay.spawn_reaper(every);
            tokio::signal::ctrl_c()
                .await
                .context("waiting for ctrl-c")?;
            reaper.shutdown().await;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// A relay whose handoffs outlive this process.
fn persistent_relay(config: &RelayConfig) -> anyhow::Result<Relay> {
    if config.store.backend == BackendKind::Memory {
        bail!(
            "the memory backend does not survive between handoff commands; \
             set [store] backend = \"sqlite\" in the config file"
        );
    }
    Ok(Relay::from_config(config)?)
}

fn read_stdin() -> anyhow::Result<String> {
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("reading stdin")?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_send() {
        let cli = Cli::try_parse_from([
            "handoff",
            "send",
            "--code",
            "AbC123xYz890",
            "--ttl-secs",
            "60",
            "--passphrase",
            "Tr0ub4dor&3xyzxyzxyz",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Send { ttl_secs: Some(60), .. }
        ));
    }

    #[test]
    fn test_cli_parses_reap_watch() {
        let cli = Cli::try_parse_from(["handoff", "reap", "--watch"]).unwrap();
        assert!(matches!(cli.command, Commands::Reap { watch: true }));
    }

    #[test]
    fn test_memory_backend_refused_for_stored_handoffs() {
        let config = RelayConfig {
            pepper: Some("p".to_string()),
            ..RelayConfig::default()
        };
        assert_eq!(config.store.backend, BackendKind::Memory);
        let err = persistent_relay(&config).unwrap_err();
        assert!(err.to_string().contains("memory backend"));
    }

    #[test]
    fn test_policy_default_matches_library() {
        assert_eq!(RelayConfig::default().policy, handoff::PasswordPolicy::default());
    }
}
