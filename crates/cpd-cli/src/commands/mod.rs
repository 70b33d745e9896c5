//! CLI command definitions and handlers.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Load configuration with graceful fallback to defaults.
///
/// If the config file doesn't exist or can't be parsed, defaults are used
/// so a broken config never blocks a transfer.
pub fn load_config() -> cpd_core::config::Config {
    cpd_core::config::Config::load().unwrap_or_default()
}

pub mod copy;
pub mod key;
pub mod list;
pub mod receive;
pub mod send;

/// cpd - share files across machines on the same network
#[derive(Parser)]
#[command(name = "cpd")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Share a file with other machines on the network
    Send(SendArgs),

    /// Receive a file from a sending machine
    Receive(ReceiveArgs),

    /// Generate a sharing key for the current user
    Key(KeyArgs),

    /// Copy a file into another local user's shared folder
    Copy(CopyArgs),

    /// List files in your shared folder
    List(ListArgs),
}

/// Arguments for the send command
#[derive(Parser)]
pub struct SendArgs {
    /// File to share
    pub file: PathBuf,

    /// Skip the QR code
    #[arg(long)]
    pub no_qr: bool,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the receive command
#[derive(Parser)]
pub struct ReceiveArgs {
    /// Address of the sending machine
    pub address: IpAddr,

    /// Control port printed by the sender
    pub port: u16,

    /// Name to save the file as
    pub file_name: String,

    /// Output directory for the received file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the key command
#[derive(Parser)]
pub struct KeyArgs {
    /// Print the existing key instead of generating a new one
    #[arg(long)]
    pub show: bool,
}

/// Arguments for the copy command
#[derive(Parser)]
pub struct CopyArgs {
    /// File to copy
    pub file: PathBuf,

    /// Target as `user:key`, or a bare key
    pub key: String,
}

/// Arguments for the list command
#[derive(Parser)]
pub struct ListArgs {
    /// List another user's shared folder instead of your own
    #[arg(long)]
    pub user: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_structure_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_receive_args_parse() {
        let cli = Cli::parse_from([
            "cpd",
            "receive",
            "192.168.1.10",
            "4100",
            "notes.txt",
            "-o",
            "/tmp/incoming",
        ]);
        let Command::Receive(args) = cli.command else {
            panic!("expected receive command");
        };
        assert_eq!(args.address.to_string(), "192.168.1.10");
        assert_eq!(args.port, 4100);
        assert_eq!(args.file_name, "notes.txt");
        assert_eq!(args.output, Some(PathBuf::from("/tmp/incoming")));
    }

    #[test]
    fn test_copy_args_parse() {
        let cli = Cli::parse_from(["cpd", "copy", "report.pdf", "alice:1a2b3c4d"]);
        let Command::Copy(args) = cli.command else {
            panic!("expected copy command");
        };
        assert_eq!(args.file, PathBuf::from("report.pdf"));
        assert_eq!(args.key, "alice:1a2b3c4d");
    }
}
