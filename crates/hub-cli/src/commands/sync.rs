//! Realtime sync commands.

use super::{Context, SessionArgs};
use crate::output::{self, OutputFormat};
use anyhow::{anyhow, Result};
use backing_store::RealtimeClient;
use realtime_sync::{CollectionView, RealtimeStateSync};
use std::sync::Arc;
use tracing::info;

fn print_view<T>(name: &str, view: &CollectionView<T>, format: &OutputFormat) {
    match format {
        OutputFormat::Text => {
            let error = view.error.as_ref().map(|e| format!("  error: {}", e)).unwrap_or_default();
            println!("{:<16} {:>4} rows  rev {}{}", name, view.len(), view.revision, error);
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "collection": name,
                    "rows": view.len(),
                    "revision": view.revision,
                    "error": view.error.as_ref().map(|e| e.to_string()),
                })
            );
        }
    }
}

pub async fn sync_watch(ctx: &Context, session: &SessionArgs) -> Result<()> {
    let session = session
        .session()
        .ok_or_else(|| anyhow!("sync needs HUB_USER_ID and HUB_ACCESS_TOKEN"))?;

    let store = ctx.supabase(Some(&session));
    let realtime = Arc::new(RealtimeClient::new(
        ctx.config.realtime_url()?.to_string(),
        ctx.config.realtime.clone(),
    ));
    realtime.set_access_token(Some(session.access_secret.clone()));

    let sync = RealtimeStateSync::new(store, realtime.clone());
    let mut tasks = sync.tasks();
    let mut activities = sync.activities();
    let mut metrics = sync.metrics();
    let mut knowledge = sync.knowledge();

    sync.set_user(Some(session.user.id.clone())).await;
    info!(user_id = %session.user.id, "Watching realtime state");
    if let OutputFormat::Text = ctx.format {
        println!("Watching collections for {} (Ctrl-C to stop)", session.user.id);
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Ok(()) = tasks.changed() => print_view("tasks", &*tasks.borrow_and_update(), &ctx.format),
            Ok(()) = activities.changed() => print_view("activities", &*activities.borrow_and_update(), &ctx.format),
            Ok(()) = metrics.changed() => print_view("agent_metrics", &*metrics.borrow_and_update(), &ctx.format),
            Ok(()) = knowledge.changed() => print_view("knowledge_nodes", &*knowledge.borrow_and_update(), &ctx.format),
            else => break,
        }
    }

    sync.shutdown().await;
    realtime.disconnect();
    output::print_success("Stopped watching", &ctx.format);
    Ok(())
}
