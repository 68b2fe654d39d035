//! Workspace command handlers.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use au_core::store::DirectoryStore;
use serde::Serialize;
use tokio::sync::watch;

use super::args::WorkspaceCommands;
use super::util::{confirm, print_output};
use super::CliContext;

/// Workspace metadata as rendered by list/get.
#[derive(Debug, Serialize)]
struct WorkspaceView {
    id: String,
    alias: String,
    created_at: chrono::DateTime<chrono::Utc>,
    size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_author: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    is_current: bool,
}

fn view(meta: au_core::model::WorkspaceMeta, current: Option<&str>) -> WorkspaceView {
    WorkspaceView {
        is_current: current == Some(meta.id.as_str()),
        id: meta.id,
        alias: meta.alias,
        created_at: meta.created_at,
        size_bytes: meta.size_bytes,
        current_author: meta.current_author,
    }
}

pub fn handle(ctx: &CliContext, command: WorkspaceCommands) -> Result<()> {
    match command {
        WorkspaceCommands::Init { alias } => {
            let meta = ctx.store.create_workspace(&alias)?;
            ctx.store.set_current_workspace(&meta.id)?;
            print_output(ctx.format, &view(meta, None))
        }
        WorkspaceCommands::List => {
            let current = ctx.workspace.as_deref();
            let mut listed = ctx.store.list_workspaces()?;
            listed.sort_by(|a, b| a.id.cmp(&b.id));
            let views: Vec<WorkspaceView> =
                listed.into_iter().map(|m| view(m, current)).collect();
            print_output(ctx.format, &views)
        }
        WorkspaceCommands::Get { id } => {
            let id = match id {
                Some(id) => id,
                None => ctx.require_workspace()?.to_string(),
            };
            let meta = ctx.store.get_workspace(&id)?;
            print_output(ctx.format, &view(meta, ctx.workspace.as_deref()))
        }
        WorkspaceCommands::Use { id } => {
            // refuse to point at a workspace that is not there
            ctx.store.get_workspace(&id)?;
            ctx.store.set_current_workspace(&id)?;
            Ok(())
        }
        WorkspaceCommands::Delete { id, yes } => {
            let id = match id {
                Some(id) => id,
                None => ctx.require_workspace()?.to_string(),
            };
            let meta = ctx.store.get_workspace(&id)?;
            if !confirm(
                &format!("Delete workspace '{}' ({})?", meta.alias, id),
                yes,
            )? {
                bail!("aborted");
            }
            ctx.store.delete_workspace(&id)?;
            // clear a now-dangling current pointer
            if ctx.store.get_current_workspace()?.as_deref() == Some(id.as_str()) {
                ctx.store.set_current_workspace("")?;
            }
            Ok(())
        }
        WorkspaceCommands::Serve { listen } => {
            let addr = listen
                .parse()
                .with_context(|| format!("invalid listen address '{listen}'"))?;
            let store = Arc::new(DirectoryStore::open(ctx.store.path())?);
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(async move {
                au_sync_server::serve(store, addr, async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await
            })?;
            Ok(())
        }
        WorkspaceCommands::Sync { address } => {
            let id = ctx.require_workspace()?.to_string();
            let mut handle = ctx.store.open_workspace(&id, true)?;
            let runtime = tokio::runtime::Runtime::new()?;
            let result = runtime.block_on(async {
                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                tokio::spawn(async move {
                    let _ = tokio::signal::ctrl_c().await;
                    let _ = shutdown_tx.send(true);
                });
                au_core::sync::connect_and_sync(&address, &id, handle.document(), true, shutdown_rx)
                    .await
            });
            result?;
            handle.flush()?;
            handle.close();
            println!("Synced workspace {id} with {address}.");
            Ok(())
        }
        WorkspaceCommands::SyncImport { id, address } => {
            let base = address.trim_end_matches('/');
            let url = format!("{base}/workspaces/{id}/download");
            let runtime = tokio::runtime::Runtime::new()?;
            let data = runtime.block_on(async {
                let response = reqwest::get(&url)
                    .await
                    .with_context(|| format!("failed to request {url}"))?;
                if !response.status().is_success() {
                    bail!("peer answered {} for {url}", response.status());
                }
                Ok(response.bytes().await?.to_vec())
            })?;
            let meta = ctx.store.import_workspace(&id, &data)?;
            print_output(ctx.format, &view(meta, ctx.workspace.as_deref()))
        }
        WorkspaceCommands::SetAuthor { author } => {
            ctx.store.set_current_author(&author)?;
            Ok(())
        }
        WorkspaceCommands::GetAuthor => {
            match ctx.store.get_current_author()? {
                Some(author) => println!("{author}"),
                None => bail!("no author configured"),
            }
            Ok(())
        }
    }
}
