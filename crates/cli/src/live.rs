//! A short-lived Socket.IO session for one CLI command.
//!
//! Connects, mirrors backend state through the store actor, and lets the
//! command wait for the change it cares about. Every wait races Ctrl-C and
//! a deadline, so nothing is applied after the user has gone.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use wadash_client::sessions::DEFAULT_LOG_CAPACITY;
use wadash_client::{
    ConnectionConfig, ConnectionStatus, DashboardState, Emitter, Notification, SocketManager,
    StoreChange, StoreHandle,
};

use crate::Context;

pub struct Live {
    manager: SocketManager,
    store: StoreHandle,
    store_task: JoinHandle<()>,
    changes: broadcast::Receiver<StoreChange>,
    notes: broadcast::Receiver<Notification>,
    status: watch::Receiver<ConnectionStatus>,
    wait: Duration,
}

impl Live {
    pub async fn connect(ctx: &Context) -> anyhow::Result<Self> {
        let mut config = ConnectionConfig::new(ctx.backend_url.clone())
            .with_token(ctx.settings.active_token().map(str::to_string));
        config.handshake_timeout = ctx.timeout;

        let mut manager = SocketManager::new(config, ctx.notifier.clone());
        // Subscribe before connecting so the initial snapshot is not missed.
        let (store, store_task) = StoreHandle::spawn(manager.subscribe(), DEFAULT_LOG_CAPACITY);
        let changes = store.subscribe();
        let notes = manager.notifier().subscribe();
        let status = manager.status();

        tokio::select! {
            result = manager.connect() => {
                result.with_context(|| format!("could not connect to {}", ctx.backend_url))?;
            }
            _ = tokio::signal::ctrl_c() => bail!("interrupted"),
        }

        Ok(Self {
            manager,
            store,
            store_task,
            changes,
            notes,
            status,
            wait: ctx.timeout,
        })
    }

    pub fn emitter(&self) -> Emitter {
        self.manager.emitter()
    }

    /// Block until the backend's `initial-state` has been applied.
    pub async fn initial_state(&mut self) -> anyhow::Result<Arc<DashboardState>> {
        self.wait_for(|change, _| matches!(change, StoreChange::Sessions))
            .await
            .context("backend did not send its session list")
    }

    /// Wait for a store change accepted by `accept`, which also sees the
    /// snapshot taken right after that change.
    pub async fn wait_for<F>(&mut self, mut accept: F) -> anyhow::Result<Arc<DashboardState>>
    where
        F: FnMut(&StoreChange, &DashboardState) -> bool,
    {
        let deadline = tokio::time::sleep(self.wait);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => bail!("timed out after {}s", self.wait.as_secs()),
                _ = tokio::signal::ctrl_c() => bail!("interrupted"),
                changed = self.status.changed() => {
                    if changed.is_err() || *self.status.borrow_and_update() == ConnectionStatus::Disconnected {
                        bail!("connection to backend lost");
                    }
                }
                change = self.changes.recv() => match change {
                    Ok(change) => {
                        let snapshot = self.store.snapshot();
                        if accept(&change, &snapshot) {
                            return Ok(snapshot);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            component = "cli",
                            event = "cli.changes.lagged",
                            skipped,
                            "Missed store changes"
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => bail!("store stopped"),
                },
            }
        }
    }

    /// Next store change or notification, whichever comes first. `None` on Ctrl-C
    /// or when the connection is gone.
    pub async fn next_activity(&mut self) -> Option<Activity> {
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => return None,
                change = self.changes.recv() => match change {
                    Ok(change) => return Some(Activity::Change(change, self.store.snapshot())),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        return Some(Activity::Lagged(skipped));
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
                note = self.notes.recv() => match note {
                    Ok(note) => return Some(Activity::Notice(note)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                },
                changed = self.status.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                    let status = *self.status.borrow_and_update();
                    if status == ConnectionStatus::Disconnected {
                        return Some(Activity::Disconnected);
                    }
                }
            }
        }
    }

    /// Flush queued commands and close the socket.
    pub async fn close(mut self) {
        self.manager.disconnect().await;
        drop(self.manager);
        if tokio::time::timeout(Duration::from_secs(2), &mut self.store_task)
            .await
            .is_err()
        {
            self.store_task.abort();
        }
        debug!(component = "cli", event = "cli.live.closed", "Live session closed");
    }
}

pub enum Activity {
    Change(StoreChange, Arc<DashboardState>),
    Notice(Notification),
    Lagged(u64),
    Disconnected,
}
