//! Send command implementation.

use anyhow::Result;
use tokio::sync::mpsc;

use cpd_core::file::format_size;
use cpd_core::qr;
use cpd_core::transfer::{PeerEvent, ShareSession, TransferConfig};

use super::SendArgs;

/// Run the send command.
///
/// Starts a share session for one file and serves it until the process is
/// killed; every receiver on the network can pull the file independently.
pub async fn run(args: SendArgs) -> Result<()> {
    let global_config = super::load_config();
    let config = TransferConfig::from(&global_config.transfer);

    let mut session = ShareSession::new(&args.file, config).await?;
    let events = session.take_events();

    if !args.quiet {
        print_session_info(&session, args.no_qr);
    }

    if let Some(events) = events {
        let quiet = args.quiet;
        tokio::spawn(print_events(events, quiet));
    }

    session.run().await?;
    Ok(())
}

fn print_session_info(session: &ShareSession, no_qr: bool) {
    let file = session.file();
    let primary = session.primary_address();
    let control_port = session.control_port();
    let info_port = session.info_port();

    println!();
    println!("cpd v{}", cpd_core::VERSION);
    println!("{}", "-".repeat(37));
    println!();
    println!("  Sharing: {} ({})", file.display_name, format_size(file.size));
    println!();
    println!("  On another machine, run:");
    println!();
    println!("    cpd receive {primary} {control_port} {}", file.display_name);
    println!();
    println!("  Or open in a browser:");
    println!();
    println!("    http://{primary}:{info_port}");
    println!();

    if !no_qr {
        let url = format!("http://{primary}:{info_port}");
        match qr::generate_ascii(&url) {
            Ok(code) => println!("{code}"),
            Err(e) => tracing::debug!("QR generation failed: {e}"),
        }
        println!();
    }

    let alternates = &session.addresses()[1..];
    if !alternates.is_empty() {
        println!("  If that address doesn't work, try:");
        for candidate in alternates {
            println!("    cpd receive {} {control_port} {}", candidate.address, file.display_name);
        }
        println!();
    }

    println!("  Waiting for receivers... (Ctrl+C to stop)");
    println!();
}

async fn print_events(mut events: mpsc::UnboundedReceiver<PeerEvent>, quiet: bool) {
    while let Some(event) = events.recv().await {
        if quiet {
            continue;
        }
        match event {
            PeerEvent::Connected { peer } => {
                println!("  Receiver connected from {peer}");
            }
            PeerEvent::TransferStarted { label, .. } => {
                println!("  Sending to {label}...");
            }
            PeerEvent::TransferComplete {
                label, save_path, ..
            } => {
                println!("  Sent to {label} (saved as {save_path})");
            }
            PeerEvent::Disconnected { peer } => {
                println!("  {peer} disconnected");
            }
        }
    }
}
