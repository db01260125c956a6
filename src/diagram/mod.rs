//! Diagram composer: pick a kind, edit its source, preview, insert.
//!
//! Rendering itself is delegated to a [`DiagramRenderer`]; the composer
//! debounces it and keeps the last outcome so the insert action can be
//! gated on a successful render.

mod render;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use strum::{Display, EnumIter, EnumString};
use thiserror::Error;

pub use render::MermaidCli;

use crate::debounce::Debouncer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum DiagramKind {
    Flowchart,
    Mindmap,
    Sequence,
    Class,
    State,
    Er,
    Gantt,
}

impl DiagramKind {
    pub fn label(self) -> &'static str {
        match self {
            DiagramKind::Flowchart => "Flow diagram",
            DiagramKind::Mindmap => "Mind map",
            DiagramKind::Sequence => "Sequence diagram",
            DiagramKind::Class => "Class diagram",
            DiagramKind::State => "State diagram",
            DiagramKind::Er => "Entity relationship",
            DiagramKind::Gantt => "Timeline / Gantt",
        }
    }

    pub fn template(self) -> &'static str {
        match self {
            DiagramKind::Flowchart => {
                "graph TD\n    A[Start] --> B{Decision}\n    B -->|Yes| C[Do it]\n    B -->|No| D[Skip]"
            }
            DiagramKind::Mindmap => {
                "mindmap\n  root((Topic))\n    Idea A\n      Detail\n    Idea B"
            }
            DiagramKind::Sequence => {
                "sequenceDiagram\n    Alice->>Bob: Hello Bob\n    Bob-->>Alice: Hi Alice"
            }
            DiagramKind::Class => {
                "classDiagram\n    Animal <|-- Dog\n    Animal : +String name\n    Dog : +bark()"
            }
            DiagramKind::State => {
                "stateDiagram-v2\n    [*] --> Draft\n    Draft --> Published\n    Published --> [*]"
            }
            DiagramKind::Er => {
                "erDiagram\n    AREA ||--o{ STACK : contains\n    STACK ||--o{ NOTEBOOK : contains"
            }
            DiagramKind::Gantt => {
                "gantt\n    title Plan\n    dateFormat YYYY-MM-DD\n    section Work\n    Draft :a1, 2024-01-01, 7d\n    Review :after a1, 3d"
            }
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiagramError {
    #[error("diagram source is empty")]
    Empty,
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("renderer unavailable: {0}")]
    Unavailable(String),
}

/// Turns diagram source into SVG markup.
#[async_trait]
pub trait DiagramRenderer: Send + Sync {
    async fn render(&self, kind: DiagramKind, source: &str) -> Result<String, DiagramError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    Rendered(String),
    Failed(String),
}

pub struct DiagramComposer {
    renderer: Arc<dyn DiagramRenderer>,
    kind: DiagramKind,
    buffer: String,
    debouncer: Debouncer,
    state: RenderState,
    open: bool,
}

impl DiagramComposer {
    /// Opens on the flowchart template with a render already scheduled.
    pub fn new(renderer: Arc<dyn DiagramRenderer>, delay: Duration, now: Instant) -> Self {
        let mut composer = Self {
            renderer,
            kind: DiagramKind::Flowchart,
            buffer: String::new(),
            debouncer: Debouncer::new(delay),
            state: RenderState::Idle,
            open: true,
        };
        composer.select_kind(DiagramKind::Flowchart, now);
        composer
    }

    pub fn kind(&self) -> DiagramKind {
        self.kind
    }

    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn next_render(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Loads the kind's template. Any earlier render outcome is dropped.
    pub fn select_kind(&mut self, kind: DiagramKind, now: Instant) {
        self.kind = kind;
        self.buffer = kind.template().to_string();
        self.state = RenderState::Idle;
        self.debouncer.schedule(now);
    }

    /// Replaces the source. A changed buffer must be rendered again before
    /// it can be inserted.
    pub fn edit(&mut self, source: impl Into<String>, now: Instant) {
        if !self.open {
            return;
        }
        let source = source.into();
        if source != self.buffer {
            self.buffer = source;
            self.state = RenderState::Idle;
        }
        self.debouncer.schedule(now);
    }

    /// Renders if the buffer has been stable for the debounce delay.
    /// Returns `true` when a render was attempted.
    pub async fn poll(&mut self, now: Instant) -> bool {
        if !self.open || !self.debouncer.poll(now) {
            return false;
        }
        self.render_now().await;
        true
    }

    /// Renders the current buffer immediately, dropping any pending render.
    pub async fn render_now(&mut self) {
        self.debouncer.cancel();
        if self.buffer.trim().is_empty() {
            self.state = RenderState::Idle;
            return;
        }
        self.state = match self.renderer.render(self.kind, &self.buffer).await {
            Ok(svg) => RenderState::Rendered(svg),
            Err(err) => {
                tracing::warn!(kind = %self.kind, error = %err, "diagram render failed");
                RenderState::Failed(err.to_string())
            }
        };
    }

    pub fn can_insert(&self) -> bool {
        !self.buffer.trim().is_empty() && matches!(self.state, RenderState::Rendered(_))
    }

    /// Fragment for the editor: the rendered SVG plus the source in a
    /// `pre.mermaid` block so exports keep the diagram as code.
    pub fn insert_fragment(&self) -> Option<String> {
        let RenderState::Rendered(svg) = &self.state else {
            return None;
        };
        if !self.can_insert() {
            return None;
        }
        Some(format!(
            "<figure class=\"diagram\" data-kind=\"{kind}\"><div class=\"diagram-preview\">{svg}</div>\
             <pre class=\"mermaid\" data-diagram=\"{kind}\">{source}</pre></figure><p><br></p>",
            kind = self.kind,
            source = escape_html(&self.buffer),
        ))
    }

    /// Closing cancels any pending render.
    pub fn close(&mut self) {
        self.debouncer.cancel();
        self.open = false;
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
