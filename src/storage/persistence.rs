use std::sync::Arc;

use anyhow::{Context, Result};

use super::KeyValueStore;
use crate::model::{seed, Node, Note, Snapshot};

/// Bump the suffix on breaking schema changes. Older keys are simply ignored.
pub const NOTES_KEY: &str = "strata.notes.v2";
pub const FOREST_KEY: &str = "strata.forest.v2";

/// Loads and saves the note list and forest as two JSON documents.
#[derive(Clone)]
pub struct Persistence {
    store: Option<Arc<dyn KeyValueStore>>,
}

impl Persistence {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store: Some(store) }
    }

    /// An adapter with no backing store: loads seed data, drops every save.
    pub fn unavailable() -> Self {
        Self { store: None }
    }

    pub fn is_available(&self) -> bool {
        self.store.is_some()
    }

    /// Stored state, or the seed dataset when nothing usable is stored.
    pub fn load(&self) -> Snapshot {
        let Some(store) = &self.store else {
            tracing::info!("no local store available, starting from seed data");
            return seed::snapshot();
        };
        match read_snapshot(store.as_ref()) {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                tracing::info!("no saved state found, seeding initial notes");
                seed::snapshot()
            }
            Err(err) => {
                tracing::warn!(?err, "stored state unreadable, falling back to seed data");
                seed::snapshot()
            }
        }
    }

    /// Writes both documents. Failures are logged and reported as `false`.
    pub fn save(&self, snapshot: &Snapshot) -> bool {
        let Some(store) = &self.store else {
            return false;
        };
        match write_snapshot(store.as_ref(), snapshot) {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(?err, "failed to persist state");
                false
            }
        }
    }
}

fn read_snapshot(store: &dyn KeyValueStore) -> Result<Option<Snapshot>> {
    let (Some(raw_notes), Some(raw_forest)) = (store.get(NOTES_KEY)?, store.get(FOREST_KEY)?)
    else {
        return Ok(None);
    };
    let notes: Vec<Note> = serde_json::from_str(&raw_notes).context("parsing stored notes")?;
    let forest: Vec<Node> = serde_json::from_str(&raw_forest).context("parsing stored forest")?;
    Ok(Some(Snapshot::new(forest, notes)))
}

fn write_snapshot(store: &dyn KeyValueStore, snapshot: &Snapshot) -> Result<()> {
    let notes = serde_json::to_string(&snapshot.notes).context("serialising notes")?;
    let forest = serde_json::to_string(&snapshot.forest).context("serialising forest")?;
    store.set(NOTES_KEY, &notes)?;
    store.set(FOREST_KEY, &forest)?;
    Ok(())
}

/// Observer that saves every snapshot after the first one it sees.
///
/// The first snapshot is the one just loaded, so writing it back would be a
/// no-op. Snapshots pointer-equal to the last one seen are skipped as well.
pub struct WriteThrough {
    persistence: Persistence,
    last_seen: Option<Arc<Snapshot>>,
}

impl WriteThrough {
    pub fn new(persistence: Persistence) -> Self {
        Self {
            persistence,
            last_seen: None,
        }
    }

    /// Returns `true` when the snapshot was written.
    pub fn observe(&mut self, snapshot: &Arc<Snapshot>) -> bool {
        let Some(previous) = self.last_seen.replace(Arc::clone(snapshot)) else {
            return false;
        };
        if Arc::ptr_eq(&previous, snapshot) {
            return false;
        }
        self.persistence.save(snapshot)
    }
}
