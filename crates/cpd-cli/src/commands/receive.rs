//! Receive command implementation.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::watch;

use cpd_core::config::{self, Config};
use cpd_core::file::format_size;
use cpd_core::transfer::{ReceiveProgress, ReceiveSession, ReceiveState, TransferConfig};

use super::ReceiveArgs;

/// Run the receive command.
///
/// Connects to one sender, saves the file, and exits: 0 on success, 1 on
/// any failure.
pub async fn run(args: ReceiveArgs) -> Result<()> {
    let global_config = super::load_config();
    let config = TransferConfig::from(&global_config.transfer);

    let server = SocketAddr::new(args.address, args.port);
    let output_dir = resolve_output_dir(args.output, &global_config)?;

    if !args.quiet {
        println!();
        println!("cpd v{}", cpd_core::VERSION);
        println!("{}", "-".repeat(37));
        println!();
        println!("  Connecting to {server}...");
    }

    match receive(server, &args.file_name, output_dir, config, args.quiet).await {
        Ok(saved) => {
            if !args.quiet {
                println!("  Saved as {}", saved.display());
                println!();
            }
            Ok(())
        }
        Err(e) => {
            eprintln!();
            eprintln!("  Transfer failed: {e}");
            if let Some(suggestion) = e.suggestion() {
                eprintln!();
                eprintln!("{suggestion}");
            }
            eprintln!();
            Err(e.into())
        }
    }
}

/// Pick the save directory: `--output` beats the configured default,
/// which beats the invoking user's shared folder.
fn resolve_output_dir(
    flag: Option<PathBuf>,
    global_config: &Config,
) -> cpd_core::error::Result<PathBuf> {
    match flag.or_else(|| global_config.general.default_output.clone()) {
        Some(dir) => Ok(dir),
        None => config::shared_dir(&config::current_username()),
    }
}

async fn receive(
    server: SocketAddr,
    file_name: &str,
    output_dir: PathBuf,
    config: TransferConfig,
    quiet: bool,
) -> cpd_core::error::Result<PathBuf> {
    let session = ReceiveSession::connect(server, file_name, output_dir, config).await?;

    let progress_handle = if quiet {
        None
    } else {
        Some(tokio::spawn(display_progress(session.progress())))
    };

    let result = session.receive().await;

    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    result
}

async fn display_progress(mut rx: watch::Receiver<ReceiveProgress>) {
    let mut last_state = ReceiveState::AwaitingMetadata;
    let started = Instant::now();

    loop {
        let changed = tokio::time::timeout(Duration::from_secs(1), rx.changed()).await;

        let progress = rx.borrow().clone();

        if progress.state != last_state {
            last_state = progress.state;
            match progress.state {
                ReceiveState::Receiving => {
                    println!(
                        "  Receiving {} ...",
                        format_size(progress.expected_size)
                    );
                }
                ReceiveState::Completed => {
                    let elapsed = started.elapsed().as_secs_f64();
                    let rate = if elapsed > 0.0 {
                        progress.bytes_received as f64 / elapsed
                    } else {
                        0.0
                    };
                    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                    println!(
                        "  Received {} in {elapsed:.1}s ({}/s)",
                        format_size(progress.bytes_received),
                        format_size(rate as u64)
                    );
                    return;
                }
                ReceiveState::AwaitingMetadata => {}
            }
        }

        // Sender closed the channel without completing.
        if matches!(changed, Ok(Err(_))) {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_flag_beats_configured_default() {
        let mut global_config = Config::default();
        global_config.general.default_output = Some(PathBuf::from("/data/configured"));

        let dir = resolve_output_dir(Some(PathBuf::from("/data/flag")), &global_config).unwrap();
        assert_eq!(dir, PathBuf::from("/data/flag"));
    }

    #[test]
    fn test_configured_default_used_without_flag() {
        let mut global_config = Config::default();
        global_config.general.default_output = Some(PathBuf::from("/data/configured"));

        let dir = resolve_output_dir(None, &global_config).unwrap();
        assert_eq!(dir, PathBuf::from("/data/configured"));
    }

    #[test]
    fn test_defaults_to_own_shared_folder() {
        let mut global_config = Config::default();
        global_config.general.default_output = None;

        let dir = resolve_output_dir(None, &global_config).unwrap();
        let expected = config::shared_dir(&config::current_username()).unwrap();
        assert_eq!(dir, expected);
    }
}
