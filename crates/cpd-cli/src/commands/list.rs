//! List command implementation.

use anyhow::Result;

use cpd_core::config;
use cpd_core::file::format_size;

use super::ListArgs;

/// Run the list command.
///
/// Prints the contents of a shared folder with sizes, newest last.
pub fn run(args: &ListArgs) -> Result<()> {
    let username = args
        .user
        .clone()
        .unwrap_or_else(config::current_username);
    let dir = config::shared_dir(&username)?;

    let mut entries: Vec<(String, u64, std::time::SystemTime)> = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let modified = metadata.modified().unwrap_or(std::time::UNIX_EPOCH);
        entries.push((name, metadata.len(), modified));
    }

    if entries.is_empty() {
        println!("  Shared folder for {username} is empty ({})", dir.display());
        return Ok(());
    }

    entries.sort_by_key(|(_, _, modified)| *modified);

    println!();
    println!("  Shared folder for {username} ({}):", dir.display());
    println!();
    for (name, size, _) in &entries {
        println!("    {name}  ({})", format_size(*size));
    }
    println!();

    Ok(())
}
