//! In-memory tree of areas, stacks and notebooks plus the flat note list.
//!
//! Everything in here is plain data. Mutations live in [`tree`] and always
//! hand back fresh collections so observers can detect change by identity.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

pub mod seed;
pub mod tree;

pub use tree::{
    add_area, add_note, add_notebook, add_stack, collect, find, find_by_id,
    find_notebook_containing, find_path_names, notes_in_notebook, path_to, remove_area,
    remove_note, remove_notebook, remove_stack, rename_node, replace_at_id, update_note_content,
    update_note_title,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub content: String,
}

impl Note {
    /// Builds a note with a fresh id and today's date.
    pub fn from_draft(draft: NoteDraft) -> Self {
        Self {
            id: generate_id("note"),
            title: draft.title,
            description: draft.description,
            date: today(),
            image_url: draft.image_url,
            content: draft.content,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NoteDraft {
    pub title: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub content: String,
}

impl NoteDraft {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            ..Self::default()
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NodeKind {
    Area,
    Stack,
    Notebook,
}

impl NodeKind {
    /// The kind a child of this node must have, if any.
    pub fn child_kind(self) -> Option<NodeKind> {
        match self {
            NodeKind::Area => Some(NodeKind::Stack),
            NodeKind::Stack => Some(NodeKind::Notebook),
            NodeKind::Notebook => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub note_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Node {
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            id: generate_id(&kind.to_string()),
            name: name.into(),
            kind,
            children: Vec::new(),
            note_ids: Vec::new(),
            description: None,
        }
    }

    pub fn is_notebook(&self) -> bool {
        self.kind == NodeKind::Notebook
    }
}

/// The whole application state: the structural forest and the flat note list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub forest: Vec<Node>,
    pub notes: Vec<Note>,
}

impl Snapshot {
    pub fn new(forest: Vec<Node>, notes: Vec<Note>) -> Self {
        Self { forest, notes }
    }

    pub fn note(&self, note_id: &str) -> Option<&Note> {
        self.notes.iter().find(|note| note.id == note_id)
    }
}

/// Timestamp-derived identifier: `<prefix>-<unix millis>-<8 hex>`.
///
/// The random suffix keeps ids unique when several are minted in the same
/// millisecond.
pub fn generate_id(prefix: &str) -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{prefix}-{millis}-{}", &suffix[..8])
}

/// Today's UTC date as `YYYY-MM-DD`.
pub fn today() -> String {
    OffsetDateTime::now_utc().date().to_string()
}
