//! Store actor. Owns the `DashboardState` and applies events sequentially.
//!
//! Events arrive on the connection manager's broadcast channel. The actor
//! applies whatever is queued (up to `MAX_BATCH` events), publishes one fresh
//! snapshot through `ArcSwap` so readers never block, then announces each
//! change on a second broadcast channel. Snapshot clones are cheap because
//! the per-chat and per-session lists are shared `Arc`s.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use wadash_protocol::ServerEvent;

use crate::state::{DashboardState, StoreChange};

const MAX_BATCH: usize = 128;
/// Holds several full batches so a briefly busy observer does not lag.
const CHANGE_CAPACITY: usize = 1024;

/// Handle to a running store actor (cheap to Clone).
#[derive(Clone)]
pub struct StoreHandle {
    snapshot: Arc<ArcSwap<DashboardState>>,
    changes: broadcast::Sender<StoreChange>,
}

impl StoreHandle {
    /// Spawn the actor on `events`. It runs until the event channel closes.
    pub fn spawn(
        events: broadcast::Receiver<ServerEvent>,
        log_capacity: usize,
    ) -> (StoreHandle, JoinHandle<()>) {
        let state = DashboardState::new(log_capacity);
        let snapshot = Arc::new(ArcSwap::from_pointee(state.clone()));
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);

        let handle = StoreHandle {
            snapshot: snapshot.clone(),
            changes: changes.clone(),
        };
        let task = tokio::spawn(store_loop(state, events, snapshot, changes));
        (handle, task)
    }

    /// Lock-free snapshot read.
    pub fn snapshot(&self) -> Arc<DashboardState> {
        self.snapshot.load_full()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

fn warn_lagged(skipped: u64) {
    // State may be stale until the backend's next full snapshot.
    warn!(
        component = "store",
        event = "store.lagged",
        skipped,
        "Store fell behind the event stream"
    );
}

async fn store_loop(
    mut state: DashboardState,
    mut events: broadcast::Receiver<ServerEvent>,
    snapshot: Arc<ArcSwap<DashboardState>>,
    changes: broadcast::Sender<StoreChange>,
) {
    let mut batch = Vec::with_capacity(MAX_BATCH);
    let mut pending = Vec::with_capacity(MAX_BATCH);

    loop {
        match events.recv().await {
            Ok(event) => batch.push(event),
            Err(RecvError::Lagged(skipped)) => {
                warn_lagged(skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        }
        while batch.len() < MAX_BATCH {
            match events.try_recv() {
                Ok(event) => batch.push(event),
                Err(TryRecvError::Lagged(skipped)) => warn_lagged(skipped),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        for event in batch.drain(..) {
            let name = event.name();
            let change = state.apply(event);
            if change == StoreChange::Unchanged {
                continue;
            }
            debug!(
                component = "store",
                event = "store.applied",
                name,
                revision = state.revision,
            );
            pending.push(change);
        }
        if pending.is_empty() {
            continue;
        }

        snapshot.store(Arc::new(state.clone()));
        for change in pending.drain(..) {
            let _ = changes.send(change);
        }
    }

    debug!(
        component = "store",
        event = "store.stopped",
        revision = state.revision,
        "Event stream closed, store stopped"
    );
}
