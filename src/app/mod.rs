//! Application state: the workspace plus every service that reacts to it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::Receiver;

use crate::ai::ChatClient;
use crate::config::{AppConfig, ConfigPaths};
use crate::diagram::{DiagramComposer, DiagramKind, DiagramRenderer, RenderState};
use crate::editor::{BufferHost, EditingSurface, TitleInput};
use crate::export::{export_note, sanitize_filename, write_export};
use crate::model::Snapshot;
use crate::storage::{Persistence, WriteThrough};
use crate::sync::{AutoSync, SyncError, SyncReport, SyncService};
use crate::workspace::Workspace;

pub mod boundary;

pub use boundary::{ErrorBoundary, FallbackAction, FallbackScreen, Outcome};

pub struct App {
    pub config: Arc<AppConfig>,
    paths: ConfigPaths,
    persistence: Persistence,
    workspace: Workspace,
    changes: Receiver<Arc<Snapshot>>,
    last_seen: Option<Arc<Snapshot>>,
    write_through: WriteThrough,
    sync: Option<SyncService>,
    auto_sync: AutoSync,
    chat: ChatClient,
}

impl App {
    pub fn new(config: Arc<AppConfig>, paths: ConfigPaths, persistence: Persistence) -> Self {
        let sync = match SyncService::from_config(&config.sync) {
            Ok(service) => Some(service),
            Err(SyncError::NotConfigured) => None,
            Err(err) => {
                tracing::warn!(error = %err, "remote sync unavailable");
                None
            }
        };
        let chat = ChatClient::from_config(&config.ai, reqwest::Client::new());
        Self::with_services(config, paths, persistence, sync, chat)
    }

    /// Builds the app around explicitly supplied services.
    pub fn with_services(
        config: Arc<AppConfig>,
        paths: ConfigPaths,
        persistence: Persistence,
        sync: Option<SyncService>,
        chat: ChatClient,
    ) -> Self {
        let mut workspace = Workspace::new(persistence.load());
        let changes = workspace.subscribe();
        let auto_sync = if sync.is_some() {
            AutoSync::new(config.sync.auto_sync_delay)
        } else {
            AutoSync::disabled()
        };
        let mut app = Self {
            write_through: WriteThrough::new(persistence.clone()),
            config,
            paths,
            persistence,
            workspace,
            changes,
            last_seen: None,
            sync,
            auto_sync,
            chat,
        };
        app.flush(Instant::now());
        app
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn workspace_mut(&mut self) -> &mut Workspace {
        &mut self.workspace
    }

    pub fn chat(&self) -> &ChatClient {
        &self.chat
    }

    pub fn sync_service(&self) -> Option<&SyncService> {
        self.sync.as_ref()
    }

    /// Delivers pending snapshots to persistence and the auto-sync timer.
    /// Returns how many were written.
    pub fn flush(&mut self, now: Instant) -> usize {
        let mut saved = 0;
        for snapshot in self.changes.try_iter() {
            let changed = self
                .last_seen
                .replace(Arc::clone(&snapshot))
                .is_some_and(|previous| !Arc::ptr_eq(&previous, &snapshot));
            if self.write_through.observe(&snapshot) {
                saved += 1;
            }
            if changed {
                self.auto_sync.on_change(snapshot, now);
            }
        }
        saved
    }

    fn replace_workspace(&mut self, snapshot: Snapshot, now: Instant) {
        let mut workspace = Workspace::new(snapshot);
        self.changes = workspace.subscribe();
        self.workspace = workspace;
        self.last_seen = None;
        self.write_through = WriteThrough::new(self.persistence.clone());
        self.flush(now);
    }

    /// Replaces the workspace with whatever storage holds now.
    pub fn reload(&mut self) {
        self.auto_sync.cancel();
        self.replace_workspace(self.persistence.load(), Instant::now());
    }

    /// Runs a body edit through the editing surface.
    pub fn edit_note_content(&mut self, note_id: &str, content: &str) -> Result<bool> {
        let mut host = BufferHost::new();
        let mut surface = self.bind_surface(note_id, &mut host)?;
        host.type_content(content);
        Ok(surface
            .on_input(&host)
            .map(|event| self.workspace.apply(event))
            .unwrap_or(false))
    }

    /// Commits a new title the way the inline title editor would.
    pub fn retitle_note(&mut self, note_id: &str, title: &str) -> Result<bool> {
        let mut host = BufferHost::new();
        let mut surface = self.bind_surface(note_id, &mut host)?;
        surface.begin_title_edit();
        surface.set_title_draft(title);
        Ok(surface
            .title_input(TitleInput::Enter)
            .map(|event| self.workspace.apply(event))
            .unwrap_or(false))
    }

    /// Renders a diagram and inserts it at the end of the note.
    pub async fn insert_diagram(
        &mut self,
        note_id: &str,
        kind: DiagramKind,
        source: Option<String>,
        renderer: Arc<dyn DiagramRenderer>,
    ) -> Result<bool> {
        let now = Instant::now();
        let mut composer = DiagramComposer::new(renderer, self.config.diagram.render_debounce, now);
        composer.select_kind(kind, now);
        if let Some(source) = source {
            composer.edit(source, now);
        }
        composer.render_now().await;
        let fragment = match (composer.insert_fragment(), composer.state()) {
            (Some(fragment), _) => fragment,
            (None, RenderState::Failed(message)) => {
                return Err(anyhow!("diagram did not render: {message}"))
            }
            (None, _) => return Err(anyhow!("diagram source is empty")),
        };
        composer.close();

        let mut host = BufferHost::new();
        let mut surface = self.bind_surface(note_id, &mut host)?;
        Ok(surface
            .insert_html(&fragment, &mut host)
            .map(|event| self.workspace.apply(event))
            .unwrap_or(false))
    }

    fn bind_surface(&self, note_id: &str, host: &mut BufferHost) -> Result<EditingSurface> {
        let note = self
            .workspace
            .note(note_id)
            .with_context(|| format!("note {note_id} not found"))?;
        let breadcrumb = self.workspace.breadcrumb(note_id).unwrap_or_default();
        let mut surface = EditingSurface::new();
        surface.bind(Some(note), breadcrumb, host);
        Ok(surface)
    }

    /// Writes the note as Markdown into `dir` (the configured export dir by default).
    pub fn export_note(&self, note_id: &str, dir: Option<&Path>) -> Result<PathBuf> {
        let note = self
            .workspace
            .note(note_id)
            .with_context(|| format!("note {note_id} not found"))?;
        let tags = self.workspace.breadcrumb(note_id).unwrap_or_default();
        let exported = export_note(note, &tags);
        write_export(dir.unwrap_or(&self.paths.export_dir), &exported)
    }

    /// Like [`App::export_note`], but files the note under
    /// `<dir>/<Area>/<Stack>/<Notebook>/` so equal titles in different
    /// notebooks do not overwrite each other.
    pub fn export_note_nested(&self, note_id: &str, dir: Option<&Path>) -> Result<PathBuf> {
        let mut target = dir.unwrap_or(&self.paths.export_dir).to_path_buf();
        for segment in self.workspace.breadcrumb(note_id).unwrap_or_default() {
            let name = sanitize_filename(&segment);
            if name.is_empty() {
                target.push("untitled");
            } else {
                target.push(name);
            }
        }
        self.export_note(note_id, Some(&target))
    }

    /// Connects when necessary and publishes every note.
    pub async fn sync_now(&self) -> Result<SyncReport, SyncError> {
        let service = self.sync.as_ref().ok_or(SyncError::NotConfigured)?;
        if !service.is_connected() {
            service.connect().await?;
        }
        service.publish_all(&self.workspace.snapshot()).await
    }

    /// Revokes the remote credential and drops cached folder ids. Works from
    /// any connection state, including after a rejected connect.
    pub async fn disconnect_sync(&mut self) -> Result<(), SyncError> {
        let service = self.sync.as_ref().ok_or(SyncError::NotConfigured)?;
        service.disconnect().await;
        self.auto_sync.cancel();
        Ok(())
    }

    /// Publishes once the workspace has been quiet long enough.
    pub async fn tick(&mut self, now: Instant) -> Option<Result<SyncReport, SyncError>> {
        let snapshot = self.auto_sync.poll(now)?;
        let service = self.sync.as_ref()?;
        if !service.is_connected() {
            if let Err(err) = service.connect().await {
                return Some(Err(err));
            }
        }
        Some(service.publish_all(&snapshot).await)
    }

    /// Time until the pending auto-sync fires, if one is scheduled.
    pub fn next_auto_sync(&self, now: Instant) -> Option<Duration> {
        self.auto_sync
            .next_deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Picks up changes written by other processes since the last load.
    pub fn refresh_from_storage(&mut self, now: Instant) -> bool {
        let stored = self.persistence.load();
        if stored == *self.workspace.snapshot() {
            return false;
        }
        self.replace_workspace(stored, now);
        // Already on disk; only the remote copy is behind.
        self.auto_sync.on_change(self.workspace.snapshot(), now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagram::DiagramError;
    use crate::model::NoteDraft;
    use crate::storage::MemoryStore;
    use crate::sync::{Authorizer, ConnectionState, DriveApi};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    struct FixedRenderer;

    #[async_trait]
    impl DiagramRenderer for FixedRenderer {
        async fn render(&self, _kind: DiagramKind, source: &str) -> Result<String, DiagramError> {
            if source.contains("oops") {
                Err(DiagramError::Syntax("bad arrow".into()))
            } else {
                Ok("<svg></svg>".into())
            }
        }
    }

    fn app_with(store: Arc<MemoryStore>) -> (TempDir, App) {
        let temp = TempDir::new().expect("tempdir");
        let paths = ConfigPaths::under(temp.path());
        let app = App::with_services(
            Arc::new(AppConfig::default()),
            paths,
            Persistence::new(store),
            None,
            ChatClient::new(),
        );
        (temp, app)
    }

    #[test]
    fn mutations_are_written_through_and_survive_reload() {
        let store = Arc::new(MemoryStore::new());
        let (_temp, mut app) = app_with(Arc::clone(&store));
        assert_eq!(app.flush(Instant::now()), 0);

        let id = app
            .workspace_mut()
            .add_note("ideas", NoteDraft::new("Spaced repetition", "<p>cards</p>"))
            .expect("note");
        assert_eq!(app.flush(Instant::now()), 1);

        let (_temp2, reopened) = app_with(store);
        assert_eq!(reopened.workspace().note(&id).expect("persisted").title, "Spaced repetition");
    }

    #[test]
    fn editor_flows_update_the_workspace() {
        let (_temp, mut app) = app_with(Arc::new(MemoryStore::new()));
        assert!(app.edit_note_content("beta-blockers", "<p>new body</p>").expect("edit"));
        assert!(!app.edit_note_content("beta-blockers", "<p>new body</p>").expect("edit"));
        assert!(app.retitle_note("beta-blockers", "  Beta Antagonists ").expect("title"));
        assert!(!app.retitle_note("beta-blockers", "   ").expect("title"));

        let note = app.workspace().note("beta-blockers").expect("note");
        assert_eq!(note.title, "Beta Antagonists");
        assert_eq!(note.content, "<p>new body</p>");
        assert!(app.edit_note_content("missing", "x").is_err());
    }

    #[tokio::test]
    async fn diagrams_are_inserted_only_after_a_good_render() {
        let (_temp, mut app) = app_with(Arc::new(MemoryStore::new()));
        let renderer: Arc<dyn DiagramRenderer> = Arc::new(FixedRenderer);

        let inserted = app
            .insert_diagram("ideas-missing", DiagramKind::Flowchart, None, Arc::clone(&renderer))
            .await;
        assert!(inserted.is_err());

        let err = app
            .insert_diagram("heart-failure", DiagramKind::Flowchart, Some("oops".into()), Arc::clone(&renderer))
            .await
            .expect_err("render failure");
        assert!(err.to_string().contains("bad arrow"));

        assert!(app
            .insert_diagram("heart-failure", DiagramKind::Sequence, None, renderer)
            .await
            .expect("insert"));
        let content = &app.workspace().note("heart-failure").expect("note").content;
        assert!(content.contains("data-diagram=\"sequence\""));
    }

    #[test]
    fn export_writes_markdown_under_export_dir() {
        let (_temp, app) = app_with(Arc::new(MemoryStore::new()));
        let path = app.export_note("cranial-nerves", None).expect("export");
        assert!(path.starts_with(&app.paths().export_dir));
        let body = std::fs::read_to_string(path).expect("read");
        assert!(body.contains("tags: [\"Medicine\", \"Anatomy\", \"Neuroanatomy\"]"));
        assert!(body.contains("1. Olfactory"));
    }

    #[test]
    fn nested_export_mirrors_the_notebook_path() {
        let (temp, app) = app_with(Arc::new(MemoryStore::new()));
        let path = app
            .export_note_nested("beta-blockers", Some(temp.path()))
            .expect("export");
        assert_eq!(
            path,
            temp.path()
                .join("Medicine")
                .join("Pharmacology")
                .join("Cardiovascular-Drugs")
                .join("Beta-Blockers.md")
        );
        assert!(path.is_file());
    }

    #[tokio::test]
    async fn sync_without_credentials_is_disabled() {
        let (_temp, mut app) = app_with(Arc::new(MemoryStore::new()));
        assert!(matches!(app.sync_now().await, Err(SyncError::NotConfigured)));
        app.workspace_mut().add_area("Research");
        app.flush(Instant::now());
        assert_eq!(app.next_auto_sync(Instant::now()), None);
        assert!(app.tick(Instant::now() + Duration::from_secs(60)).await.is_none());
    }

    struct OfflineDrive;

    #[async_trait]
    impl DriveApi for OfflineDrive {
        async fn find_folder(&self, _name: &str, _parent: Option<&str>) -> Result<Option<String>, SyncError> {
            Err(SyncError::NotConnected)
        }

        async fn create_folder(&self, _name: &str, _parent: Option<&str>) -> Result<String, SyncError> {
            Err(SyncError::NotConnected)
        }

        async fn find_file(&self, _name: &str, _folder_id: &str) -> Result<Option<String>, SyncError> {
            Err(SyncError::NotConnected)
        }

        async fn create_file(&self, _name: &str, _folder_id: &str, _body: &str) -> Result<String, SyncError> {
            Err(SyncError::NotConnected)
        }

        async fn update_file(&self, _file_id: &str, _body: &str) -> Result<(), SyncError> {
            Err(SyncError::NotConnected)
        }
    }

    #[derive(Default)]
    struct ExpiredAuthorizer {
        revoked: AtomicBool,
    }

    #[async_trait]
    impl Authorizer for ExpiredAuthorizer {
        async fn authorize(&self) -> Result<(), SyncError> {
            Err(SyncError::Unauthorized("expired".into()))
        }

        async fn revoke(&self) -> Result<(), SyncError> {
            self.revoked.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn disconnect_after_rejected_credential() {
        let temp = TempDir::new().expect("tempdir");
        let authorizer = Arc::new(ExpiredAuthorizer::default());
        let service = SyncService::new(
            Arc::new(OfflineDrive),
            Arc::clone(&authorizer) as Arc<dyn Authorizer>,
            "Strata",
        );
        let mut app = App::with_services(
            Arc::new(AppConfig::default()),
            ConfigPaths::under(temp.path()),
            Persistence::new(Arc::new(MemoryStore::new())),
            Some(service),
            ChatClient::new(),
        );

        assert!(matches!(app.sync_now().await, Err(SyncError::Unauthorized(_))));
        let state = |app: &App| app.sync_service().map(SyncService::connection_state);
        assert_eq!(state(&app), Some(ConnectionState::Error));

        let now = Instant::now();
        app.workspace_mut().add_area("Pending");
        app.flush(now);
        assert!(app.next_auto_sync(now).is_some());

        app.disconnect_sync().await.expect("disconnect");
        assert!(authorizer.revoked.load(Ordering::SeqCst));
        assert_eq!(state(&app), Some(ConnectionState::Disconnected));
        assert_eq!(app.next_auto_sync(now), None);
    }

    #[test]
    fn reload_after_fallback_rebuilds_from_storage() {
        let temp = TempDir::new().expect("tempdir");
        let mut app = App::with_services(
            Arc::new(AppConfig::default()),
            ConfigPaths::under(temp.path()),
            Persistence::unavailable(),
            None,
            ChatClient::new(),
        );
        app.workspace_mut().add_area("Scratch");
        assert_eq!(app.flush(Instant::now()), 0);

        let mut boundary = ErrorBoundary::new(false);
        let _ = boundary.render::<()>(|| Err(anyhow!("tree view broke")));
        if boundary.handle(FallbackAction::Reload) {
            app.reload();
        }
        assert!(app.workspace().snapshot().forest.iter().all(|area| area.name != "Scratch"));
        assert_eq!(boundary.render(|| Ok(())), Outcome::Rendered(()));
    }

    #[test]
    fn external_writes_are_picked_up() {
        let store = Arc::new(MemoryStore::new());
        let (_temp, mut app) = app_with(Arc::clone(&store));
        let (_temp2, mut other) = app_with(Arc::clone(&store));

        other.workspace_mut().add_area("Elsewhere");
        other.flush(Instant::now());

        assert!(app.refresh_from_storage(Instant::now()));
        assert!(app.workspace().snapshot().forest.iter().any(|area| area.name == "Elsewhere"));
        assert!(!app.refresh_from_storage(Instant::now()));
    }
}
