//! Copy command implementation.

use anyhow::{bail, Result};

use cpd_core::config;
use cpd_core::file::{format_size, unique_target_path, SharedFile};
use cpd_core::keys::KeyStore;

use super::CopyArgs;

/// Run the copy command.
///
/// Validates the sharing key, then copies the file into the target user's
/// shared folder. Existing files there are never overwritten; the copy
/// gets a numeric suffix instead.
pub fn run(args: &CopyArgs) -> Result<()> {
    let store = KeyStore::load()?;
    let username = store.resolve(&args.key)?;

    let file = SharedFile::from_path(&args.file)?;

    let shared_dir = config::shared_dir(&username)?;
    let target = unique_target_path(&shared_dir, &file.display_name)?;

    std::fs::copy(&file.path, &target)?;

    let copied = std::fs::metadata(&target)?.len();
    if copied != file.size {
        let _ = std::fs::remove_file(&target);
        bail!("copy was truncated ({copied} of {} bytes)", file.size);
    }

    println!(
        "  Copied {} ({}) to {}'s shared folder",
        file.display_name,
        format_size(file.size),
        username
    );

    Ok(())
}
