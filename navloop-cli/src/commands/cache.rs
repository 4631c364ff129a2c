//! Cache management CLI commands.

use std::path::Path;

use clap::Subcommand;

use navloop::config::format_size;
use navloop::voice::{DiskResponseStore, ResponseStore};

use super::{load_config, runtime};
use crate::error::CliError;

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// List stored voice responses
    List,
    /// Delete every stored voice response
    Clear,
}

/// Strip the query string, which carries the access token.
fn display_url(url: &str) -> &str {
    url.split_once('?').map(|(path, _)| path).unwrap_or(url)
}

/// Run a cache subcommand.
pub fn run(action: CacheAction, config_path: Option<&Path>) -> Result<(), CliError> {
    let config = load_config(config_path)?;
    let voice = &config.voice;

    runtime()?.block_on(async {
        let store = DiskResponseStore::open(&voice.cache_dir, voice.max_size_bytes)
            .await
            .map_err(navloop::NavigationError::from)?;

        match action {
            CacheAction::List => {
                println!("Voice cache: {}", store.directory().display());
                let mut urls = store.urls();
                urls.sort();
                for url in &urls {
                    println!("  {}", display_url(url));
                }
                println!();
                println!("  Entries: {}", urls.len());
                println!(
                    "  Size:    {} of {}",
                    format_size(store.size_bytes()),
                    format_size(store.max_size_bytes())
                );
            }
            CacheAction::Clear => {
                println!("Clearing voice cache at: {}", store.directory().display());
                let removed = store
                    .clear()
                    .await
                    .map_err(navloop::NavigationError::from)?;
                println!("Deleted {} responses", removed);
            }
        }
        Ok(())
    })
}
