mod bulk;
mod config;
mod error;
mod expander;
mod expansion_store;
mod format;
mod keymap;
mod logging;
mod message;
mod pager;
mod provider;
mod row;
mod row_store;
mod search;
mod tui;
mod undo;

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::expansion_store::{ExpansionStore, FileExpansionStore, MemoryExpansionStore};
use crate::format::ColumnFormatter;
use crate::provider::{ListQuery, MemoryProvider};

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    logging::init()?;
    let config = config::Config::load()?;

    let mailbox = config
        .mailbox_path()
        .context("no mailbox configured; set `mailbox` in config.toml")?;
    let provider = Arc::new(MemoryProvider::load(&mailbox)?);

    let registry: Arc<dyn ExpansionStore> = if config.ephemeral_expansion {
        Arc::new(MemoryExpansionStore::new())
    } else {
        let path = config.expansion_state_path();
        Arc::new(
            FileExpansionStore::open(&path)
                .with_context(|| format!("opening thread state {}", path.display()))?,
        )
    };
    info!(mailbox = %mailbox.display(), "mailbox loaded");

    let (mut app, updates) = tui::App::new(config, provider, registry, Box::new(ColumnFormatter));
    if let Some(label) = args.get(1) {
        app.set_query(ListQuery::label(label.clone()));
    }
    tui::run(app, updates).await
}
