//! Local-file watch driving the reconciler
//!
//! The companion agent rewrites `Store/RegistrationKey` when it rotates its
//! key. Every create or content change of that file triggers its own
//! backoff-wrapped sync. A failed sync is logged and the watch continues.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use connector_common::{Error, Result};
use connector_state::registration_key_path;

use crate::sync::Reconciler;

const EVENT_QUEUE_CAPACITY: usize = 16;

/// Whether `event` is a create or content change of `key_path`.
pub fn is_relevant(event: &Event, key_path: &Path) -> bool {
    let kind_matches = match event.kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        EventKind::Any | EventKind::Access(_) | EventKind::Remove(_) | EventKind::Other => false,
    };
    kind_matches && event.paths.iter().any(|p| p == key_path)
}

/// Watch the directory holding the registration key, forwarding relevant
/// events to `tx`.
///
/// The returned watcher must be kept alive for events to flow.
pub fn watch_registration_key(
    base_dir: &Path,
    tx: mpsc::Sender<Event>,
) -> Result<RecommendedWatcher> {
    let key_path = registration_key_path(base_dir);
    let watch_dir = key_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| base_dir.to_path_buf());

    let filter_path = key_path.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) if is_relevant(&event, &filter_path) => {
            // Runs on the watcher's own thread, outside the runtime
            if tx.blocking_send(event).is_err() {
                debug!("Event loop stopped, dropping file event");
            }
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "File watch error"),
    })
    .map_err(|e| {
        Error::internal_with_context("watch", format!("failed to create watcher: {}", e))
    })?;

    watcher
        .watch(&watch_dir, RecursiveMode::NonRecursive)
        .map_err(|e| {
            Error::internal_with_context(
                "watch",
                format!("failed to watch {}: {}", watch_dir.display(), e),
            )
        })?;

    info!(path = %key_path.display(), "Watching registration key");
    Ok(watcher)
}

/// Run one backoff-wrapped sync per event until `shutdown` resolves or the
/// event source closes.
///
/// A sync already running when `shutdown` resolves is finished first.
pub async fn run_event_loop<S>(
    reconciler: Arc<Reconciler>,
    mut events: mpsc::Receiver<Event>,
    shutdown: S,
) where
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let event = tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Stopping file watch");
                return;
            }
            event = events.recv() => match event {
                Some(event) => event,
                None => {
                    debug!("File event source closed");
                    return;
                }
            },
        };

        info!(kind = ?event.kind, "Registration key changed");
        sync_logged(&reconciler).await;
    }
}

async fn sync_logged(reconciler: &Reconciler) {
    match reconciler.sync_with_backoff().await {
        Ok(outcome) => debug!(?outcome, "Secret sync finished"),
        // The Secret stays stale until the next successful sync
        Err(e) => error!(error = %e, "Failed to sync Secret with local state"),
    }
}

/// Sync once at startup, then keep syncing on every registration key change
/// under `base_dir` until `shutdown` resolves.
pub async fn serve<S>(reconciler: Arc<Reconciler>, base_dir: PathBuf, shutdown: S) -> Result<()>
where
    S: Future<Output = ()>,
{
    sync_logged(&reconciler).await;

    let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
    let _watcher = watch_registration_key(&base_dir, tx)?;

    run_event_loop(reconciler, rx, shutdown).await;
    Ok(())
}
