//! Owner of the canonical snapshot.
//!
//! Every change goes through the pure operations in [`crate::model`]; the
//! resulting snapshot replaces the current `Arc` only when it differs, and
//! subscribers are told about each replacement over a channel.

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::editor::EditorEvent;
use crate::model::{self, Node, NodeKind, Note, NoteDraft, Snapshot};

pub struct Workspace {
    current: Arc<Snapshot>,
    subscribers: Vec<Sender<Arc<Snapshot>>>,
}

impl Workspace {
    pub fn new(snapshot: Snapshot) -> Self {
        Self {
            current: Arc::new(snapshot),
            subscribers: Vec::new(),
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current)
    }

    /// New receiver, primed with the current snapshot.
    pub fn subscribe(&mut self) -> Receiver<Arc<Snapshot>> {
        let (tx, rx) = unbounded();
        let _ = tx.send(self.snapshot());
        self.subscribers.push(tx);
        rx
    }

    fn commit(&mut self, next: Snapshot) -> bool {
        if next == *self.current {
            return false;
        }
        self.current = Arc::new(next);
        let current = &self.current;
        self.subscribers
            .retain(|tx| tx.send(Arc::clone(current)).is_ok());
        true
    }

    fn commit_forest(&mut self, forest: Vec<Node>) -> bool {
        let notes = self.current.notes.clone();
        self.commit(Snapshot::new(forest, notes))
    }

    pub fn note(&self, note_id: &str) -> Option<&Note> {
        self.current.note(note_id)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        model::find_by_id(&self.current.forest, id)
    }

    pub fn notebook_for_note(&self, note_id: &str) -> Option<&Node> {
        model::find_notebook_containing(&self.current.forest, note_id)
    }

    /// Breadcrumb for a note: area, stack and notebook names.
    pub fn breadcrumb(&self, note_id: &str) -> Option<Vec<String>> {
        let notebook = self.notebook_for_note(note_id)?;
        model::find_path_names(&self.current.forest, &notebook.id)
    }

    pub fn notes_in_notebook(&self, notebook_id: &str) -> Vec<&Note> {
        model::notes_in_notebook(&self.current.forest, &self.current.notes, notebook_id)
    }

    /// Returns the id of the new area.
    pub fn add_area(&mut self, name: &str) -> Option<String> {
        let forest = model::add_area(&self.current.forest, name);
        let id = forest.last().map(|area| area.id.clone());
        self.commit_forest(forest).then_some(id).flatten()
    }

    pub fn add_stack(&mut self, area_id: &str, name: &str) -> Option<String> {
        let forest = model::add_stack(&self.current.forest, area_id, name);
        self.commit_child(forest, area_id)
    }

    pub fn add_notebook(&mut self, stack_id: &str, name: &str) -> Option<String> {
        let forest = model::add_notebook(&self.current.forest, stack_id, name);
        self.commit_child(forest, stack_id)
    }

    fn commit_child(&mut self, forest: Vec<Node>, parent_id: &str) -> Option<String> {
        let id = model::find_by_id(&forest, parent_id)
            .and_then(|parent| parent.children.last())
            .map(|child| child.id.clone());
        self.commit_forest(forest).then_some(id).flatten()
    }

    /// Creates a note in the notebook and returns its id.
    pub fn add_note(&mut self, notebook_id: &str, draft: NoteDraft) -> Option<String> {
        let note = Note::from_draft(draft);
        let note_id = note.id.clone();
        let (notes, forest) =
            model::add_note(&self.current.notes, &self.current.forest, notebook_id, note);
        self.commit(Snapshot::new(forest, notes)).then_some(note_id)
    }

    pub fn remove_area(&mut self, area_id: &str) -> bool {
        let (forest, notes) = model::remove_area(&self.current.forest, &self.current.notes, area_id);
        self.commit(Snapshot::new(forest, notes))
    }

    pub fn remove_stack(&mut self, area_id: &str, stack_id: &str) -> bool {
        let (forest, notes) =
            model::remove_stack(&self.current.forest, &self.current.notes, area_id, stack_id);
        self.commit(Snapshot::new(forest, notes))
    }

    pub fn remove_notebook(&mut self, stack_id: &str, notebook_id: &str) -> bool {
        let (forest, notes) = model::remove_notebook(
            &self.current.forest,
            &self.current.notes,
            stack_id,
            notebook_id,
        );
        self.commit(Snapshot::new(forest, notes))
    }

    pub fn remove_note(&mut self, notebook_id: &str, note_id: &str) -> bool {
        let (forest, notes) =
            model::remove_note(&self.current.forest, &self.current.notes, notebook_id, note_id);
        self.commit(Snapshot::new(forest, notes))
    }

    /// Removes a structural node of any kind by locating its parent.
    pub fn remove_node(&mut self, id: &str) -> bool {
        let Some(path) = model::path_to(&self.current.forest, id) else {
            return false;
        };
        let target = path[path.len() - 1];
        let parent_id = (path.len() > 1).then(|| path[path.len() - 2].id.clone());
        match (target.kind, parent_id) {
            (NodeKind::Area, _) => self.remove_area(id),
            (NodeKind::Stack, Some(area_id)) => self.remove_stack(&area_id, id),
            (NodeKind::Notebook, Some(stack_id)) => self.remove_notebook(&stack_id, id),
            _ => false,
        }
    }

    pub fn rename_node(&mut self, id: &str, name: &str) -> bool {
        let forest = model::rename_node(&self.current.forest, id, name);
        self.commit_forest(forest)
    }

    pub fn update_note_content(&mut self, note_id: &str, content: &str) -> bool {
        let notes = model::update_note_content(&self.current.notes, note_id, content);
        let forest = self.current.forest.clone();
        self.commit(Snapshot::new(forest, notes))
    }

    pub fn update_note_title(&mut self, note_id: &str, title: &str) -> bool {
        let notes = model::update_note_title(&self.current.notes, note_id, title);
        let forest = self.current.forest.clone();
        self.commit(Snapshot::new(forest, notes))
    }

    pub fn apply(&mut self, event: EditorEvent) -> bool {
        match event {
            EditorEvent::ContentChanged { note_id, content } => {
                self.update_note_content(&note_id, &content)
            }
            EditorEvent::TitleChanged { note_id, title } => self.update_note_title(&note_id, &title),
        }
    }
}
