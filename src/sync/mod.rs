//! One-way mirror of notes into a remote folder tree:
//! `<root>/Notes/<Area>/<Stack>/<Notebook>/<title>.md`.

mod auth;
mod drive;
mod error;
mod scheduler;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use time::OffsetDateTime;

pub use auth::{Authorizer, BearerAuthorizer, SharedToken};
pub use drive::{DriveApi, HttpDrive, FOLDER_MIME};
pub use error::SyncError;
pub use scheduler::AutoSync;

use crate::config::SyncConfig;
use crate::export::export_note;
use crate::model::tree::{find_notebook_containing, find_path_names};
use crate::model::{Note, Snapshot};

const NOTES_FOLDER: &str = "Notes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub is_connected: bool,
    pub last_sync: Option<OffsetDateTime>,
    pub is_syncing: bool,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Created(String),
    Updated(String),
    /// The note is not referenced by any notebook.
    Skipped,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

type FolderKey = (String, String);

pub struct SyncService {
    drive: Arc<dyn DriveApi>,
    authorizer: Arc<dyn Authorizer>,
    root_folder: String,
    state: RwLock<ConnectionState>,
    status: RwLock<SyncStatus>,
    folders: Mutex<HashMap<FolderKey, String>>,
}

/// Holds `is_syncing` for the duration of a publish-all; clears it on drop.
struct SyncingGuard<'a> {
    status: &'a RwLock<SyncStatus>,
}

impl<'a> SyncingGuard<'a> {
    fn acquire(status: &'a RwLock<SyncStatus>) -> Result<Self, SyncError> {
        let mut current = status.write();
        if current.is_syncing {
            return Err(SyncError::AlreadySyncing);
        }
        current.is_syncing = true;
        Ok(Self { status })
    }
}

impl Drop for SyncingGuard<'_> {
    fn drop(&mut self) {
        self.status.write().is_syncing = false;
    }
}

impl SyncService {
    pub fn new(drive: Arc<dyn DriveApi>, authorizer: Arc<dyn Authorizer>, root_folder: impl Into<String>) -> Self {
        Self {
            drive,
            authorizer,
            root_folder: root_folder.into(),
            state: RwLock::new(ConnectionState::Disconnected),
            status: RwLock::new(SyncStatus::default()),
            folders: Mutex::new(HashMap::new()),
        }
    }

    /// Wires the HTTP drive client and bearer authorizer from configuration.
    pub fn from_config(config: &SyncConfig) -> Result<Self, SyncError> {
        if !config.is_configured() {
            return Err(SyncError::NotConfigured);
        }
        let api_key = config.api_key.clone().unwrap_or_default();
        let http = reqwest::Client::builder()
            .user_agent(concat!("strata/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let authorizer = BearerAuthorizer::new(http.clone(), api_key.clone(), config.access_token.clone());
        let drive = HttpDrive::new(http, api_key, authorizer.token_handle());
        Ok(Self::new(Arc::new(drive), Arc::new(authorizer), config.root_folder.clone()))
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.read().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub async fn connect(&self) -> Result<(), SyncError> {
        *self.state.write() = ConnectionState::Connecting;
        match self.authorizer.authorize().await {
            Ok(()) => {
                *self.state.write() = ConnectionState::Connected;
                let mut status = self.status.write();
                status.is_connected = true;
                status.last_error = None;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "remote storage connection failed");
                *self.state.write() = ConnectionState::Error;
                let mut status = self.status.write();
                status.is_connected = false;
                status.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Revokes the credential and forgets every cached folder id.
    pub async fn disconnect(&self) {
        if let Err(err) = self.authorizer.revoke().await {
            tracing::warn!(error = %err, "credential revocation failed");
        }
        self.folders.lock().clear();
        *self.state.write() = ConnectionState::Disconnected;
        self.status.write().is_connected = false;
    }

    /// Id of the folder `name` under `parent` (root when `None`), created on demand.
    pub async fn resolve_folder(&self, name: &str, parent: Option<&str>) -> Result<String, SyncError> {
        let key = (parent.unwrap_or("root").to_string(), name.to_string());
        if let Some(id) = self.folders.lock().get(&key).cloned() {
            return Ok(id);
        }

        let id = match self.drive.find_folder(name, parent).await? {
            Some(id) => id,
            None => self.drive.create_folder(name, parent).await?,
        };
        self.folders.lock().insert(key, id.clone());
        Ok(id)
    }

    async fn resolve_chain(&self, names: &[String]) -> Result<String, SyncError> {
        let mut parent = self.resolve_folder(&self.root_folder, None).await?;
        parent = self.resolve_folder(NOTES_FOLDER, Some(&parent)).await?;
        for name in names {
            parent = self.resolve_folder(name, Some(&parent)).await?;
        }
        Ok(parent)
    }

    /// Publishes one note and records the attempt in the status.
    pub async fn publish_note(&self, snapshot: &Snapshot, note: &Note) -> Result<PublishOutcome, SyncError> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        let result = self.publish_one(snapshot, note).await;
        match &result {
            Ok(PublishOutcome::Skipped) => {}
            Ok(_) => self.record_success(),
            Err(err) => self.record_failure(err),
        }
        result
    }

    /// Uploads one note without touching the status.
    async fn publish_one(&self, snapshot: &Snapshot, note: &Note) -> Result<PublishOutcome, SyncError> {
        let Some(path) = find_notebook_containing(&snapshot.forest, &note.id)
            .and_then(|notebook| find_path_names(&snapshot.forest, &notebook.id))
        else {
            tracing::warn!(note_id = %note.id, "note has no notebook, skipping");
            return Ok(PublishOutcome::Skipped);
        };
        self.upload(note, &path).await
    }

    async fn upload(&self, note: &Note, path: &[String]) -> Result<PublishOutcome, SyncError> {
        let folder_id = self.resolve_chain(path).await?;
        let exported = export_note(note, path);
        match self.drive.find_file(&exported.filename, &folder_id).await? {
            Some(file_id) => {
                self.drive.update_file(&file_id, &exported.body).await?;
                tracing::debug!(note_id = %note.id, file = %exported.filename, "remote file updated");
                Ok(PublishOutcome::Updated(file_id))
            }
            None => {
                let file_id = self
                    .drive
                    .create_file(&exported.filename, &folder_id, &exported.body)
                    .await?;
                tracing::debug!(note_id = %note.id, file = %exported.filename, "remote file created");
                Ok(PublishOutcome::Created(file_id))
            }
        }
    }

    /// Publishes every note in collection order, stopping at the first failure.
    /// The status is updated once for the whole run, so a failed run keeps
    /// the previous `last_sync`.
    pub async fn publish_all(&self, snapshot: &Snapshot) -> Result<SyncReport, SyncError> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }
        let _guard = SyncingGuard::acquire(&self.status)?;

        let mut report = SyncReport::default();
        for note in &snapshot.notes {
            match self.publish_one(snapshot, note).await {
                Ok(PublishOutcome::Created(_)) => report.created += 1,
                Ok(PublishOutcome::Updated(_)) => report.updated += 1,
                Ok(PublishOutcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    tracing::error!(note_id = %note.id, error = %err, "sync aborted");
                    self.record_failure(&err);
                    if err.is_auth() {
                        self.mark_session_lost();
                    }
                    return Err(err);
                }
            }
        }
        self.record_success();
        tracing::info!(
            created = report.created,
            updated = report.updated,
            skipped = report.skipped,
            "sync finished"
        );
        Ok(report)
    }

    fn record_success(&self) {
        let mut status = self.status.write();
        status.last_sync = Some(OffsetDateTime::now_utc());
        status.last_error = None;
    }

    fn record_failure(&self, err: &SyncError) {
        self.status.write().last_error = Some(err.to_string());
    }

    fn mark_session_lost(&self) {
        *self.state.write() = ConnectionState::Error;
        self.status.write().is_connected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::note_filename;
    use crate::model::seed;
    use crate::model::tree::add_note;
    use crate::model::NoteDraft;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct FakeDrive {
        folders: Mutex<Vec<(String, Option<String>, String)>>,
        files: Mutex<HashMap<(String, String), (String, String)>>,
        folder_calls: Mutex<HashMap<(Option<String>, String), usize>>,
        fail_uploads_for: Mutex<Option<String>>,
        next_id: Mutex<usize>,
    }

    impl FakeDrive {
        fn id(&self, prefix: &str) -> String {
            let mut next = self.next_id.lock();
            *next += 1;
            format!("{prefix}-{next}")
        }

        fn count(&self, name: &str, parent: Option<&str>) {
            *self
                .folder_calls
                .lock()
                .entry((parent.map(str::to_string), name.to_string()))
                .or_default() += 1;
        }

        fn total_folder_calls(&self) -> usize {
            self.folder_calls.lock().values().sum()
        }

        fn body_of(&self, name: &str) -> Option<String> {
            self.files
                .lock()
                .iter()
                .find(|((_, file), _)| file == name)
                .map(|(_, (_, body))| body.clone())
        }
    }

    #[async_trait]
    impl DriveApi for FakeDrive {
        async fn find_folder(&self, name: &str, parent: Option<&str>) -> Result<Option<String>, SyncError> {
            self.count(name, parent);
            Ok(self
                .folders
                .lock()
                .iter()
                .find(|(n, p, _)| n == name && p.as_deref() == parent)
                .map(|(_, _, id)| id.clone()))
        }

        async fn create_folder(&self, name: &str, parent: Option<&str>) -> Result<String, SyncError> {
            self.count(name, parent);
            let id = self.id("folder");
            self.folders
                .lock()
                .push((name.to_string(), parent.map(str::to_string), id.clone()));
            Ok(id)
        }

        async fn find_file(&self, name: &str, folder_id: &str) -> Result<Option<String>, SyncError> {
            Ok(self
                .files
                .lock()
                .get(&(folder_id.to_string(), name.to_string()))
                .map(|(id, _)| id.clone()))
        }

        async fn create_file(&self, name: &str, folder_id: &str, body: &str) -> Result<String, SyncError> {
            if self.fail_uploads_for.lock().as_deref() == Some(name) {
                return Err(SyncError::Api {
                    status: 500,
                    message: "backend error".into(),
                });
            }
            let id = self.id("file");
            self.files.lock().insert(
                (folder_id.to_string(), name.to_string()),
                (id.clone(), body.to_string()),
            );
            Ok(id)
        }

        async fn update_file(&self, file_id: &str, body: &str) -> Result<(), SyncError> {
            let mut files = self.files.lock();
            let entry = files
                .values_mut()
                .find(|(id, _)| id == file_id)
                .ok_or_else(|| SyncError::Api {
                    status: 404,
                    message: "file not found".into(),
                })?;
            entry.1 = body.to_string();
            Ok(())
        }
    }

    struct ScriptedAuthorizer {
        allow: bool,
        revoked: AtomicBool,
    }

    impl ScriptedAuthorizer {
        fn new(allow: bool) -> Self {
            Self {
                allow,
                revoked: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl Authorizer for ScriptedAuthorizer {
        async fn authorize(&self) -> Result<(), SyncError> {
            if self.allow {
                Ok(())
            } else {
                Err(SyncError::Unauthorized("access denied".into()))
            }
        }

        async fn revoke(&self) -> Result<(), SyncError> {
            self.revoked.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn service(drive: &Arc<FakeDrive>, allow: bool) -> (SyncService, Arc<ScriptedAuthorizer>) {
        let authorizer = Arc::new(ScriptedAuthorizer::new(allow));
        let service = SyncService::new(
            Arc::clone(drive) as Arc<dyn DriveApi>,
            Arc::clone(&authorizer) as Arc<dyn Authorizer>,
            "Strata",
        );
        (service, authorizer)
    }

    #[tokio::test]
    async fn connect_transitions_and_records_denial() {
        let drive = Arc::new(FakeDrive::default());
        let (ok, _) = service(&drive, true);
        assert_eq!(ok.connection_state(), ConnectionState::Disconnected);
        ok.connect().await.expect("connect");
        assert_eq!(ok.connection_state(), ConnectionState::Connected);
        assert!(ok.status().is_connected);

        let (denied, _) = service(&drive, false);
        assert_matches!(denied.connect().await, Err(SyncError::Unauthorized(_)));
        assert_eq!(denied.connection_state(), ConnectionState::Error);
        let status = denied.status();
        assert!(!status.is_connected);
        assert_eq!(status.last_error.as_deref(), Some("authorization rejected: access denied"));
    }

    #[tokio::test]
    async fn publishing_requires_connection() {
        let drive = Arc::new(FakeDrive::default());
        let (service, _) = service(&drive, true);
        let snapshot = seed::snapshot();
        assert_matches!(service.publish_all(&snapshot).await, Err(SyncError::NotConnected));
        assert_eq!(drive.total_folder_calls(), 0);
    }

    #[tokio::test]
    async fn folder_pairs_hit_the_remote_once_per_session() {
        let drive = Arc::new(FakeDrive::default());
        let (service, _) = service(&drive, true);
        service.connect().await.expect("connect");

        let snapshot = seed::snapshot();
        let heart = snapshot.note("heart-failure").expect("note");
        let skeletal = snapshot.note("skeletal-system").expect("note");

        service.publish_note(&snapshot, heart).await.expect("publish");
        let after_first = drive.total_folder_calls();
        // root, Notes, Medicine, Anatomy, Basic Anatomy: search + create each.
        assert_eq!(after_first, 10);

        service.publish_note(&snapshot, skeletal).await.expect("publish");
        assert_eq!(drive.total_folder_calls(), after_first);
        let calls = drive.folder_calls.lock();
        assert!(calls.values().all(|count| *count == 2));
    }

    #[tokio::test]
    async fn existing_remote_folder_is_reused() {
        let drive = Arc::new(FakeDrive::default());
        drive
            .folders
            .lock()
            .push(("Strata".into(), None, "existing-root".into()));
        let (service, _) = service(&drive, true);
        service.connect().await.expect("connect");

        assert_eq!(service.resolve_folder("Strata", None).await.expect("resolve"), "existing-root");
        assert_eq!(service.resolve_folder("Strata", None).await.expect("resolve"), "existing-root");
        assert_eq!(drive.folder_calls.lock()[&(None, "Strata".to_string())], 1);
    }

    #[tokio::test]
    async fn republish_updates_in_place() {
        let drive = Arc::new(FakeDrive::default());
        let (service, _) = service(&drive, true);
        service.connect().await.expect("connect");
        let mut snapshot = seed::snapshot();

        let first = service.publish_all(&snapshot).await.expect("sync");
        assert_eq!(first, SyncReport { created: 4, updated: 0, skipped: 0 });

        snapshot.notes[0].content = "<p>revised</p>".into();
        let second = service.publish_all(&snapshot).await.expect("sync");
        assert_eq!(second, SyncReport { created: 0, updated: 4, skipped: 0 });
        assert_eq!(drive.files.lock().len(), 4);

        let body = drive.body_of("Heart-Failure.md").expect("file");
        assert!(body.starts_with("---\ntitle: \"Heart Failure\""));
        assert!(body.contains("tags: [\"Medicine\", \"Anatomy\", \"Basic Anatomy\"]"));
        assert!(body.ends_with("revised\n"));

        let status = service.status();
        assert!(status.last_sync.is_some());
        assert!(!status.is_syncing);
        assert_eq!(status.last_error, None);
    }

    #[tokio::test]
    async fn orphan_note_is_skipped_without_aborting() {
        let drive = Arc::new(FakeDrive::default());
        let (service, _) = service(&drive, true);
        service.connect().await.expect("connect");

        let mut snapshot = seed::snapshot();
        let orphan = Note::from_draft(NoteDraft::new("Orphan", "<p>lost</p>"));
        snapshot.notes.insert(0, orphan);

        let report = service.publish_all(&snapshot).await.expect("sync");
        assert_eq!(report.skipped, 1);
        assert_eq!(report.created, 4);
    }

    #[tokio::test]
    async fn failure_aborts_remaining_notes_and_keeps_timestamp() {
        let drive = Arc::new(FakeDrive::default());
        let (service, _) = service(&drive, true);
        service.connect().await.expect("connect");

        let snapshot = seed::snapshot();
        service.publish_all(&snapshot).await.expect("first sync");
        let stamped = service.status().last_sync;

        let (notes, forest) = add_note(
            &snapshot.notes,
            &snapshot.forest,
            "ideas",
            Note::from_draft(NoteDraft::new("Broken", "<p>x</p>")),
        );
        let grown = Snapshot::new(forest, notes);
        *drive.fail_uploads_for.lock() = Some("Broken.md".into());

        assert_matches!(
            service.publish_all(&grown).await,
            Err(SyncError::Api { status: 500, .. })
        );
        let status = service.status();
        assert_eq!(status.last_sync, stamped);
        assert!(!status.is_syncing);
        assert_eq!(
            status.last_error.as_deref(),
            Some("remote storage returned 500: backend error")
        );
        // The failing note comes first, so nothing after it was touched.
        assert_eq!(drive.files.lock().len(), 4);
    }

    #[tokio::test]
    async fn failure_on_last_note_leaves_timestamp_unset() {
        let drive = Arc::new(FakeDrive::default());
        let (service, _) = service(&drive, true);
        service.connect().await.expect("connect");

        let snapshot = seed::snapshot();
        let last = snapshot.notes.last().expect("seed note");
        *drive.fail_uploads_for.lock() = Some(note_filename(&last.title));

        assert_matches!(
            service.publish_all(&snapshot).await,
            Err(SyncError::Api { status: 500, .. })
        );
        let status = service.status();
        assert_eq!(status.last_sync, None);
        assert!(status.last_error.is_some());
        assert_eq!(drive.files.lock().len(), snapshot.notes.len() - 1);
    }

    #[tokio::test]
    async fn single_publish_stamps_its_own_outcome() {
        let drive = Arc::new(FakeDrive::default());
        let (service, _) = service(&drive, true);
        service.connect().await.expect("connect");
        let snapshot = seed::snapshot();

        let orphan = Note::from_draft(NoteDraft::new("Orphan", "<p>lost</p>"));
        assert_eq!(
            service.publish_note(&snapshot, &orphan).await.expect("skip"),
            PublishOutcome::Skipped
        );
        assert_eq!(service.status().last_sync, None);

        let heart = snapshot.note("heart-failure").expect("note");
        assert_matches!(service.publish_note(&snapshot, heart).await, Ok(PublishOutcome::Created(_)));
        assert!(service.status().last_sync.is_some());
    }

    #[tokio::test]
    async fn disconnect_revokes_and_clears_folder_cache() {
        let drive = Arc::new(FakeDrive::default());
        let (service, authorizer) = service(&drive, true);
        service.connect().await.expect("connect");
        service.resolve_folder("Strata", None).await.expect("resolve");

        service.disconnect().await;
        assert!(authorizer.revoked.load(Ordering::SeqCst));
        assert_eq!(service.connection_state(), ConnectionState::Disconnected);
        assert!(service.folders.lock().is_empty());

        service.connect().await.expect("reconnect");
        service.resolve_folder("Strata", None).await.expect("resolve");
        // Search and create, then one search after the cache was cleared.
        assert_eq!(drive.folder_calls.lock()[&(None, "Strata".to_string())], 3);
    }

    #[tokio::test]
    async fn concurrent_publish_all_is_rejected() {
        let drive = Arc::new(FakeDrive::default());
        let (service, _) = service(&drive, true);
        service.connect().await.expect("connect");

        let guard = SyncingGuard::acquire(&service.status).expect("guard");
        assert_matches!(
            service.publish_all(&seed::snapshot()).await,
            Err(SyncError::AlreadySyncing)
        );
        drop(guard);
        assert!(!service.status().is_syncing);
    }

    #[test]
    fn unconfigured_sync_is_disabled() {
        let config = SyncConfig::default();
        assert!(matches!(SyncService::from_config(&config), Err(SyncError::NotConfigured)));
    }
}
