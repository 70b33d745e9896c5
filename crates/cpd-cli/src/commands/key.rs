//! Key command implementation.

use anyhow::{bail, Result};

use cpd_core::config;
use cpd_core::keys::KeyStore;

use super::KeyArgs;

/// Run the key command.
///
/// Generates (or with `--show`, prints) the sharing key other local users
/// need to drop files into this user's shared folder with `cpd copy`.
pub fn run(args: &KeyArgs) -> Result<()> {
    let username = config::current_username();
    let mut store = KeyStore::load()?;

    if args.show {
        println!("{}", existing_key(&store, &username)?);
        return Ok(());
    }

    let key = store.generate(&username);
    store.save()?;

    println!();
    println!("  Sharing key for {username}:");
    println!();
    println!("    {username}:{key}");
    println!();
    println!("  Give this to other users on this machine so they can");
    println!("  'cpd copy <file> {username}:{key}' into your shared folder.");
    println!();

    Ok(())
}

/// Format the recorded key as `user:key`, or fail if none was generated
/// yet. Failures flow out of `main` like every other command error.
fn existing_key(store: &KeyStore, username: &str) -> Result<String> {
    let Some(key) = store.key_for(username) else {
        bail!("no key yet for {username}; run 'cpd key' to generate one");
    };
    Ok(format!("{username}:{key}"))
}
