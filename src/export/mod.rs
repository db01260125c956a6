//! Markdown export for single notes.

mod filename;
mod markdown;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub use filename::{note_filename, sanitize_filename, MAX_FILENAME_LEN};
pub use markdown::{to_markdown, try_to_markdown, ConversionError};

use crate::model::Note;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedNote {
    pub filename: String,
    pub body: String,
}

/// YAML front matter: title, date and tags, followed by a blank line.
pub fn build_header(title: &str, date: &str, tags: &[String]) -> String {
    let tags = tags
        .iter()
        .map(|tag| yaml_quote(tag))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "---\ntitle: {}\ndate: {date}\ntags: [{tags}]\n---\n\n",
        yaml_quote(title)
    )
}

fn yaml_quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

pub fn export_note(note: &Note, tags: &[String]) -> ExportedNote {
    let mut body = build_header(&note.title, &note.date, tags);
    body.push_str(&to_markdown(&note.content));
    body.push('\n');
    ExportedNote {
        filename: note_filename(&note.title),
        body,
    }
}

/// Writes an export into `dir`, creating the directory when needed.
pub fn write_export(dir: &Path, exported: &ExportedNote) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create export directory {}", dir.display()))?;
    let path = dir.join(&exported.filename);
    fs::write(&path, &exported.body)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), "note exported");
    Ok(path)
}
