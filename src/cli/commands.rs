use std::collections::HashSet;
use std::fmt::Write as _;
use std::io::{self, Read};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Subcommand};
use indexmap::IndexSet;
use strum::IntoEnumIterator;

use crate::ai::{ChatClient, ChatError, ChatMessage, ChatOptions};
use crate::app::{App, ErrorBoundary, Outcome};
use crate::diagram::{DiagramKind, DiagramRenderer, MermaidCli};
use crate::export::to_markdown;
use crate::model::{Node, NodeKind, NoteDraft, Snapshot};
use crate::sync::SyncReport;

const WATCH_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Args, Debug, Clone)]
pub struct AreaArgs {
    #[command(subcommand)]
    pub command: AreaCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AreaCommand {
    /// Create a top-level area
    Add {
        /// Display name
        name: String,
    },
    /// Delete an area with its stacks, notebooks and their notes
    Rm {
        /// Area identifier
        id: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct StackArgs {
    #[command(subcommand)]
    pub command: StackCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum StackCommand {
    /// Create a stack inside an area
    Add {
        /// Parent area identifier
        area_id: String,
        /// Display name
        name: String,
    },
    /// Delete a stack with its notebooks and their notes
    Rm {
        /// Stack identifier
        id: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct NotebookArgs {
    #[command(subcommand)]
    pub command: NotebookCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum NotebookCommand {
    /// Create a notebook inside a stack
    Add {
        /// Parent stack identifier
        stack_id: String,
        /// Display name
        name: String,
    },
    /// Delete a notebook and the notes only it references
    Rm {
        /// Notebook identifier
        id: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct NoteArgs {
    #[command(subcommand)]
    pub command: NoteCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum NoteCommand {
    /// Create a note in a notebook
    Add(NoteAddArgs),
    /// Print a note
    Show(NoteShowArgs),
    /// Replace a note's rich-text body. Reads stdin when --body is omitted.
    Edit {
        /// Note identifier
        id: String,
        /// New body (HTML)
        #[arg(long)]
        body: Option<String>,
    },
    /// Change a note's title
    Title {
        /// Note identifier
        id: String,
        /// New title (whitespace trimmed, blank keeps the old one)
        title: String,
    },
    /// Delete a note
    Rm {
        /// Note identifier
        id: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct NoteAddArgs {
    /// Notebook identifier
    pub notebook_id: String,
    /// Title for the note
    pub title: String,
    /// Body (HTML). If omitted, reads from stdin.
    #[arg(long)]
    pub body: Option<String>,
    /// Short description shown under the title
    #[arg(long)]
    pub description: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct NoteShowArgs {
    /// Note identifier
    pub id: String,
    /// Print the stored rich text instead of Markdown
    #[arg(long)]
    pub html: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RenameArgs {
    /// Area, stack or notebook identifier
    pub id: String,
    /// New display name
    pub name: String,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Notes to export
    pub note_ids: Vec<String>,
    /// Export every note that belongs to a notebook, in Area/Stack/Notebook subfolders
    #[arg(long, conflicts_with = "note_ids")]
    pub all: bool,
    /// Target directory (defaults to the configured export directory)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Keep running and publish whenever the workspace changes
    #[arg(long, conflicts_with = "revoke")]
    pub watch: bool,
    /// Revoke the configured access token instead of publishing
    #[arg(long)]
    pub revoke: bool,
}

#[derive(Args, Debug, Clone)]
pub struct DiagramArgs {
    #[command(subcommand)]
    pub command: DiagramCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum DiagramCommand {
    /// List the supported diagram kinds
    Kinds,
    /// Print the starter template for a kind
    Template {
        /// Diagram kind (flowchart, mindmap, sequence, class, state, er, gantt)
        kind: String,
    },
    /// Render a diagram and append it to a note
    Insert(DiagramInsertArgs),
}

#[derive(Args, Debug, Clone)]
pub struct DiagramInsertArgs {
    /// Note identifier
    pub note_id: String,
    /// Diagram kind
    #[arg(long, default_value = "flowchart")]
    pub kind: String,
    /// Mermaid source. Reads stdin when omitted, falling back to the template.
    #[arg(long)]
    pub source: Option<String>,
    /// Mermaid CLI executable
    #[arg(long, default_value = "mmdc")]
    pub mmdc: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ChatArgs {
    /// Message to send
    #[arg(required = true)]
    pub message: Vec<String>,
    /// Provider id from the config (defaults to ai.default_provider)
    #[arg(long)]
    pub provider: Option<String>,
    /// Include a note as context
    #[arg(long)]
    pub note: Option<String>,
    /// Let the provider search the web
    #[arg(long)]
    pub web_search: bool,
    /// Ask for extended reasoning
    #[arg(long)]
    pub reasoning: bool,
}

pub fn print_tree(app: &App, boundary: &mut ErrorBoundary) -> Result<()> {
    let snapshot = app.workspace().snapshot();
    show(boundary, || render_tree(&snapshot))
}

fn show(boundary: &mut ErrorBoundary, view: impl FnOnce() -> Result<String>) -> Result<()> {
    match boundary.render(view) {
        Outcome::Rendered(text) => {
            print!("{text}");
            Ok(())
        }
        Outcome::Fallback(screen) => {
            eprintln!("{screen}");
            Err(anyhow!("{}", screen.detail))
        }
    }
}

fn render_tree(snapshot: &Snapshot) -> Result<String> {
    if snapshot.forest.is_empty() {
        return Ok("(empty workspace)\n".to_string());
    }
    let mut out = String::new();
    for area in &snapshot.forest {
        render_node(&mut out, snapshot, area, 0)?;
    }
    Ok(out)
}

fn render_node(out: &mut String, snapshot: &Snapshot, node: &Node, depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);
    writeln!(out, "{indent}{}  [{} {}]", node.name, node.kind, node.id)?;
    for child in &node.children {
        render_node(out, snapshot, child, depth + 1)?;
    }
    for note_id in &node.note_ids {
        match snapshot.note(note_id) {
            Some(note) => writeln!(out, "{indent}  - {}  ({})", note.title, note.id)?,
            None => writeln!(out, "{indent}  - <missing note {note_id}>")?,
        }
    }
    Ok(())
}

pub fn handle_area_command(app: &mut App, args: AreaArgs) -> Result<()> {
    match args.command {
        AreaCommand::Add { name } => {
            let name = required_name(&name)?;
            let id = app
                .workspace_mut()
                .add_area(name)
                .context("area was not created")?;
            persist(app);
            println!("Created area {name} ({id})");
            Ok(())
        }
        AreaCommand::Rm { id } => remove_structural(app, &id, NodeKind::Area),
    }
}

pub fn handle_stack_command(app: &mut App, args: StackArgs) -> Result<()> {
    match args.command {
        StackCommand::Add { area_id, name } => {
            let name = required_name(&name)?;
            ensure_kind(app, &area_id, NodeKind::Area)?;
            let id = app
                .workspace_mut()
                .add_stack(&area_id, name)
                .with_context(|| format!("stack was not added to {area_id}"))?;
            persist(app);
            println!("Created stack {name} ({id})");
            Ok(())
        }
        StackCommand::Rm { id } => remove_structural(app, &id, NodeKind::Stack),
    }
}

pub fn handle_notebook_command(app: &mut App, args: NotebookArgs) -> Result<()> {
    match args.command {
        NotebookCommand::Add { stack_id, name } => {
            let name = required_name(&name)?;
            ensure_kind(app, &stack_id, NodeKind::Stack)?;
            let id = app
                .workspace_mut()
                .add_notebook(&stack_id, name)
                .with_context(|| format!("notebook was not added to {stack_id}"))?;
            persist(app);
            println!("Created notebook {name} ({id})");
            Ok(())
        }
        NotebookCommand::Rm { id } => remove_structural(app, &id, NodeKind::Notebook),
    }
}

pub fn handle_note_command(app: &mut App, boundary: &mut ErrorBoundary, args: NoteArgs) -> Result<()> {
    match args.command {
        NoteCommand::Add(args) => add_note(app, args),
        NoteCommand::Show(args) => {
            let workspace = app.workspace();
            show(boundary, || render_note(workspace.snapshot().as_ref(), &args))
        }
        NoteCommand::Edit { id, body } => {
            let body = match body {
                Some(body) => body,
                None => read_stdin()?.context("no body given: pass --body or pipe it on stdin")?,
            };
            if app.edit_note_content(&id, &body)? {
                persist(app);
                println!("Updated note {id}");
            } else {
                println!("Note {id} unchanged");
            }
            Ok(())
        }
        NoteCommand::Title { id, title } => {
            if app.retitle_note(&id, &title)? {
                persist(app);
                println!("Renamed note {id} to {}", title.trim());
            } else {
                println!("Note {id} keeps its title");
            }
            Ok(())
        }
        NoteCommand::Rm { id } => {
            let notebook_id = app
                .workspace()
                .notebook_for_note(&id)
                .map(|notebook| notebook.id.clone())
                .with_context(|| format!("note {id} is not in any notebook"))?;
            if !app.workspace_mut().remove_note(&notebook_id, &id) {
                bail!("note {id} not found");
            }
            persist(app);
            println!("Deleted note {id}");
            Ok(())
        }
    }
}

fn add_note(app: &mut App, args: NoteAddArgs) -> Result<()> {
    let title = args.title.trim();
    if title.is_empty() {
        bail!("note title cannot be empty");
    }
    ensure_kind(app, &args.notebook_id, NodeKind::Notebook)?;
    let content = match args.body {
        Some(body) => body,
        None => read_stdin()?.unwrap_or_default(),
    };
    let mut draft = NoteDraft::new(title, content);
    draft.description = args.description.filter(|text| !text.trim().is_empty());
    let id = app
        .workspace_mut()
        .add_note(&args.notebook_id, draft)
        .with_context(|| format!("note was not added to {}", args.notebook_id))?;
    persist(app);
    println!("Created note {title} ({id})");
    Ok(())
}

fn render_note(snapshot: &Snapshot, args: &NoteShowArgs) -> Result<String> {
    let note = snapshot
        .note(&args.id)
        .with_context(|| format!("note {} not found", args.id))?;
    let mut out = String::new();
    writeln!(out, "# {}", note.title)?;
    if let Some(path) = crate::model::find_notebook_containing(&snapshot.forest, &note.id)
        .and_then(|notebook| crate::model::find_path_names(&snapshot.forest, &notebook.id))
    {
        writeln!(out, "{}", path.join(" / "))?;
    }
    writeln!(out, "{}", note.date)?;
    if let Some(description) = &note.description {
        writeln!(out, "{description}")?;
    }
    out.push('\n');
    if args.html {
        writeln!(out, "{}", note.content)?;
    } else {
        writeln!(out, "{}", to_markdown(&note.content))?;
    }
    Ok(out)
}

pub fn rename(app: &mut App, args: RenameArgs) -> Result<()> {
    let name = required_name(&args.name)?;
    if app.workspace().node(&args.id).is_none() {
        bail!("no area, stack or notebook with id {}", args.id);
    }
    if app.workspace_mut().rename_node(&args.id, name) {
        persist(app);
        println!("Renamed {} to {name}", args.id);
    } else {
        println!("{} already named {name}", args.id);
    }
    Ok(())
}

pub fn export_notes(app: &App, args: ExportArgs) -> Result<()> {
    let note_ids: Vec<String> = if args.all {
        let snapshot = app.workspace().snapshot();
        crate::model::collect(&snapshot.forest, Node::is_notebook)
            .into_iter()
            .flat_map(|notebook| notebook.note_ids.iter().cloned())
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    } else {
        args.note_ids
    };
    if note_ids.is_empty() {
        bail!("nothing to export: name notes or pass --all");
    }
    let mut written = HashSet::new();
    for id in &note_ids {
        let path = if args.all {
            app.export_note_nested(id, args.out.as_deref())
        } else {
            app.export_note(id, args.out.as_deref())
        }
        .with_context(|| format!("exporting note {id}"))?;
        if !written.insert(path.clone()) {
            tracing::warn!(note_id = %id, path = %path.display(), "export overwrote a note written earlier in this run");
        }
        println!("{}", path.display());
    }
    Ok(())
}

pub async fn sync(app: &mut App, args: SyncArgs) -> Result<()> {
    if args.revoke {
        app.disconnect_sync().await.context("revoking remote access")?;
        println!("Remote access revoked");
        return Ok(());
    }
    let report = app.sync_now().await.context("publishing notes")?;
    println!("{}", format_report(&report));
    if !args.watch {
        return Ok(());
    }

    println!("Watching for changes, press Ctrl-C to stop");
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut interval = tokio::time::interval(WATCH_INTERVAL);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = interval.tick() => {
                let now = Instant::now();
                if app.refresh_from_storage(now) {
                    tracing::debug!("workspace changed on disk");
                }
                match app.tick(now).await {
                    Some(Ok(report)) => println!("{}", format_report(&report)),
                    Some(Err(err)) => tracing::warn!(error = %err, "auto-sync failed"),
                    None => {}
                }
            }
        }
    }
    Ok(())
}

fn format_report(report: &SyncReport) -> String {
    let total = report.created + report.updated;
    format!(
        "Published {total} note{} ({} created, {} updated, {} skipped)",
        if total == 1 { "" } else { "s" },
        report.created,
        report.updated,
        report.skipped
    )
}

pub async fn handle_diagram_command(app: &mut App, args: DiagramArgs) -> Result<()> {
    match args.command {
        DiagramCommand::Kinds => {
            print!("{}", format_kinds());
            Ok(())
        }
        DiagramCommand::Template { kind } => {
            println!("{}", parse_kind(&kind)?.template());
            Ok(())
        }
        DiagramCommand::Insert(args) => {
            let kind = parse_kind(&args.kind)?;
            let source = match args.source {
                Some(source) => Some(source),
                None => read_stdin()?.filter(|text| !text.trim().is_empty()),
            };
            let renderer: Arc<dyn DiagramRenderer> = Arc::new(MermaidCli::new(args.mmdc));
            if app.insert_diagram(&args.note_id, kind, source, renderer).await? {
                persist(app);
                println!("Inserted {} into note {}", kind.label(), args.note_id);
            } else {
                println!("Note {} unchanged", args.note_id);
            }
            Ok(())
        }
    }
}

fn format_kinds() -> String {
    DiagramKind::iter()
        .map(|kind| format!("{kind:<10} {}\n", kind.label()))
        .collect()
}

fn parse_kind(raw: &str) -> Result<DiagramKind> {
    DiagramKind::from_str(&raw.trim().to_ascii_lowercase())
        .map_err(|_| anyhow!("unknown diagram kind '{raw}'"))
}

pub async fn chat(app: &App, args: ChatArgs) -> Result<()> {
    let history = build_history(app, &args)?;
    let mut options = ChatOptions::from_config(&app.config.ai);
    options.web_search |= args.web_search;
    options.extended_reasoning |= args.reasoning;

    let reply = match app.chat().send(&history, args.provider.as_deref(), &options).await {
        Ok(reply) => reply,
        Err(err @ (ChatError::NoProvider | ChatError::UnknownProvider(_))) => {
            bail!("{err} (configured: {})", provider_list(app.chat()))
        }
        Err(err) => return Err(anyhow::Error::new(err).context("chat request")),
    };
    if let Some(reasoning) = &reply.reasoning {
        eprintln!("{reasoning}\n");
    }
    println!("{}", reply.text);
    if let Some(usage) = reply.usage {
        tracing::debug!(
            input = usage.input_tokens,
            output = usage.output_tokens,
            "chat usage"
        );
    }
    Ok(())
}

fn provider_list(client: &ChatClient) -> String {
    let ids: Vec<&str> = client.provider_ids().collect();
    if ids.is_empty() {
        "none".to_string()
    } else {
        ids.join(", ")
    }
}

fn build_history(app: &App, args: &ChatArgs) -> Result<Vec<ChatMessage>> {
    let message = args.message.join(" ");
    if message.trim().is_empty() {
        bail!("chat message cannot be empty");
    }
    let mut history = Vec::new();
    if let Some(id) = &args.note {
        let note = app
            .workspace()
            .note(id)
            .with_context(|| format!("note {id} not found"))?;
        history.push(ChatMessage::system(format!(
            "The user is working on the note \"{}\":\n\n{}",
            note.title,
            to_markdown(&note.content)
        )));
    }
    history.push(ChatMessage::user(message));
    Ok(history)
}

fn required_name(raw: &str) -> Result<&str> {
    let name = raw.trim();
    if name.is_empty() {
        bail!("name cannot be empty");
    }
    Ok(name)
}

fn ensure_kind(app: &App, id: &str, kind: NodeKind) -> Result<()> {
    match app.workspace().node(id) {
        Some(node) if node.kind == kind => Ok(()),
        Some(node) => bail!("{id} is a {}, expected a {kind}", node.kind),
        None => bail!("{kind} {id} not found"),
    }
}

fn remove_structural(app: &mut App, id: &str, kind: NodeKind) -> Result<()> {
    ensure_kind(app, id, kind)?;
    if !app.workspace_mut().remove_node(id) {
        bail!("{kind} {id} could not be removed");
    }
    persist(app);
    println!("Deleted {kind} {id}");
    Ok(())
}

fn persist(app: &mut App) {
    if app.flush(Instant::now()) == 0 {
        tracing::warn!("change was not saved");
    }
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}
