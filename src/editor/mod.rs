//! Editing surface for a single note.
//!
//! The actual content-editable element lives in the host (see
//! [`RichTextHost`]). This module owns what surrounds it: which note is
//! bound, when the host buffer may be overwritten, change reporting, the
//! toolbar state and the title editor.

mod title;
mod toolbar;

pub use title::{TitleEditor, TitleState};
pub use toolbar::{
    table_html, Alignment, BlockFormat, FormatCommand, FormatFlags, MenuKind, ToolbarState,
};

use crate::model::Note;

/// The host environment's rich-text primitives.
pub trait RichTextHost {
    /// Replaces the editable buffer wholesale.
    fn load(&mut self, content: &str);
    fn serialize(&self) -> String;
    fn exec_command(&mut self, command: &str, value: Option<&str>) -> bool;
    fn query_state(&self, command: &str) -> bool;
    fn query_value(&self, command: &str) -> Option<String>;
}

/// Change reports sent up to the state owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditorEvent {
    ContentChanged { note_id: String, content: String },
    TitleChanged { note_id: String, title: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TitleInput {
    Enter,
    Escape,
    Blur,
}

#[derive(Debug)]
struct Binding {
    note_id: String,
    /// Last content known to be stored for the bound note.
    stored: String,
}

#[derive(Debug, Default)]
pub struct EditingSurface {
    binding: Option<Binding>,
    displayed: String,
    breadcrumb: Vec<String>,
    title: Option<TitleEditor>,
    toolbar: ToolbarState,
    open_menu: Option<MenuKind>,
}

impl EditingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn note_id(&self) -> Option<&str> {
        self.binding.as_ref().map(|binding| binding.note_id.as_str())
    }

    pub fn is_read_only(&self) -> bool {
        self.binding.is_none()
    }

    pub fn breadcrumb(&self) -> &[String] {
        &self.breadcrumb
    }

    pub fn displayed(&self) -> &str {
        &self.displayed
    }

    pub fn title(&self) -> Option<&TitleEditor> {
        self.title.as_ref()
    }

    pub fn toolbar(&self) -> &ToolbarState {
        &self.toolbar
    }

    pub fn open_menu(&self) -> Option<MenuKind> {
        self.open_menu
    }

    /// Binds a note (or nothing). Returns `true` when the host buffer was reloaded.
    ///
    /// The host buffer is only overwritten when the stored content differs
    /// from what is on screen, so re-binding an equal note keeps the caret.
    pub fn bind(
        &mut self,
        note: Option<&Note>,
        breadcrumb: Vec<String>,
        host: &mut dyn RichTextHost,
    ) -> bool {
        self.breadcrumb = breadcrumb;
        let Some(note) = note else {
            self.binding = None;
            self.title = None;
            self.open_menu = None;
            if self.displayed.is_empty() {
                return false;
            }
            self.displayed.clear();
            host.load("");
            return true;
        };

        let same_note = self.note_id() == Some(note.id.as_str());
        match self.title.as_mut().filter(|_| same_note) {
            Some(title) => title.sync(&note.title),
            None => self.title = Some(TitleEditor::new(note.title.clone())),
        }
        self.binding = Some(Binding {
            note_id: note.id.clone(),
            stored: note.content.clone(),
        });

        if note.content == self.displayed {
            return false;
        }
        self.displayed = note.content.clone();
        host.load(&note.content);
        true
    }

    /// Called after any content-mutating interaction.
    pub fn on_input(&mut self, host: &dyn RichTextHost) -> Option<EditorEvent> {
        let binding = self.binding.as_mut()?;
        let serialized = host.serialize();
        self.displayed = serialized.clone();
        if serialized == binding.stored {
            return None;
        }
        binding.stored = serialized.clone();
        Some(EditorEvent::ContentChanged {
            note_id: binding.note_id.clone(),
            content: serialized,
        })
    }

    /// Runs a formatting command through the host and reports any change.
    pub fn exec(
        &mut self,
        command: &FormatCommand,
        host: &mut dyn RichTextHost,
    ) -> Option<EditorEvent> {
        if self.is_read_only() {
            return None;
        }
        let (name, value) = command.to_host_command();
        if !host.exec_command(name, value.as_deref()) {
            tracing::debug!(command = name, "host rejected formatting command");
        }
        self.open_menu = None;
        self.refresh_toolbar(&*host);
        self.on_input(&*host)
    }

    /// Inserts an HTML fragment at the caret, e.g. a rendered diagram.
    pub fn insert_html(&mut self, html: &str, host: &mut dyn RichTextHost) -> Option<EditorEvent> {
        self.exec(&FormatCommand::InsertHtml(html.to_string()), host)
    }

    /// Selection changed: re-read formatting state for the toolbar.
    pub fn refresh_toolbar(&mut self, host: &dyn RichTextHost) {
        self.toolbar = if self.is_read_only() {
            ToolbarState::default()
        } else {
            ToolbarState::query(host)
        };
    }

    pub fn toggle_menu(&mut self, menu: MenuKind) {
        self.open_menu = match self.open_menu {
            Some(open) if open == menu => None,
            _ => Some(menu),
        };
    }

    /// Pointer pressed somewhere. `inside` names the menu under the pointer.
    pub fn pointer_down(&mut self, inside: Option<MenuKind>) {
        if self.open_menu.is_some() && self.open_menu != inside {
            self.open_menu = None;
        }
    }

    pub fn begin_title_edit(&mut self) {
        if let Some(title) = self.title.as_mut() {
            title.begin_edit();
        }
    }

    pub fn set_title_draft(&mut self, text: &str) {
        if let Some(title) = self.title.as_mut() {
            title.set_draft(text);
        }
    }

    pub fn title_input(&mut self, input: TitleInput) -> Option<EditorEvent> {
        let note_id = self.note_id()?.to_string();
        let title = self.title.as_mut()?;
        match input {
            TitleInput::Escape => {
                title.cancel();
                None
            }
            TitleInput::Enter | TitleInput::Blur => title
                .commit()
                .map(|title| EditorEvent::TitleChanged { note_id, title }),
        }
    }
}

/// Headless host backed by a plain string.
///
/// Supports whole-buffer loads and HTML insertion at the end of the buffer;
/// every other command is reported as unsupported.
#[derive(Debug, Default, Clone)]
pub struct BufferHost {
    content: String,
}

impl BufferHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the buffer as if the user had typed it.
    pub fn type_content(&mut self, content: &str) {
        self.content = content.to_string();
    }
}

impl RichTextHost for BufferHost {
    fn load(&mut self, content: &str) {
        self.content = content.to_string();
    }

    fn serialize(&self) -> String {
        self.content.clone()
    }

    fn exec_command(&mut self, command: &str, value: Option<&str>) -> bool {
        match (command, value) {
            ("insertHTML", Some(html)) => {
                self.content.push_str(html);
                true
            }
            _ => false,
        }
    }

    fn query_state(&self, _command: &str) -> bool {
        false
    }

    fn query_value(&self, _command: &str) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::seed;
    use std::collections::HashSet;

    #[derive(Default)]
    struct ScriptedHost {
        content: String,
        loads: usize,
        active: HashSet<String>,
        executed: Vec<String>,
    }

    impl RichTextHost for ScriptedHost {
        fn load(&mut self, content: &str) {
            self.loads += 1;
            self.content = content.to_string();
        }
        fn serialize(&self) -> String {
            self.content.clone()
        }
        fn exec_command(&mut self, command: &str, value: Option<&str>) -> bool {
            self.executed.push(command.to_string());
            match command {
                "bold" => {
                    self.content = format!("<b>{}</b>", self.content);
                    self.active.insert("bold".into());
                }
                "insertHTML" => self.content.push_str(value.unwrap_or_default()),
                _ => {}
            }
            true
        }
        fn query_state(&self, command: &str) -> bool {
            self.active.contains(command)
        }
        fn query_value(&self, command: &str) -> Option<String> {
            (command == "fontName").then(|| "Georgia".to_string())
        }
    }

    fn heart_failure() -> Note {
        seed::snapshot().note("heart-failure").cloned().expect("seed note")
    }

    #[test]
    fn unbound_surface_is_read_only() {
        let mut surface = EditingSurface::new();
        let mut host = ScriptedHost::default();
        surface.bind(None, Vec::new(), &mut host);
        assert!(surface.is_read_only());
        assert_eq!(surface.exec(&FormatCommand::Bold, &mut host), None);
        assert!(host.executed.is_empty());
        assert_eq!(surface.on_input(&host), None);
    }

    #[test]
    fn rebinding_equal_content_keeps_buffer() {
        let mut surface = EditingSurface::new();
        let mut host = ScriptedHost::default();
        let note = heart_failure();
        assert!(surface.bind(Some(&note), vec!["Medicine".into()], &mut host));
        let copy = note.clone();
        assert!(!surface.bind(Some(&copy), vec!["Medicine".into()], &mut host));
        assert_eq!(host.loads, 1);
    }

    #[test]
    fn input_reports_only_genuine_changes() {
        let mut surface = EditingSurface::new();
        let mut host = ScriptedHost::default();
        let note = heart_failure();
        surface.bind(Some(&note), Vec::new(), &mut host);

        assert_eq!(surface.on_input(&host), None);

        host.content.push_str("<p>more</p>");
        let event = surface.on_input(&host).expect("change");
        assert_eq!(
            event,
            EditorEvent::ContentChanged {
                note_id: "heart-failure".into(),
                content: format!("{}<p>more</p>", note.content),
            }
        );
        assert_eq!(surface.on_input(&host), None);
    }

    #[test]
    fn stored_update_matching_screen_does_not_reload() {
        let mut surface = EditingSurface::new();
        let mut host = ScriptedHost::default();
        let mut note = heart_failure();
        surface.bind(Some(&note), Vec::new(), &mut host);
        host.content.push_str("<p>typed</p>");
        surface.on_input(&host);

        note.content = host.content.clone();
        assert!(!surface.bind(Some(&note), Vec::new(), &mut host));
        assert_eq!(host.loads, 1);

        note.content = "<p>replaced elsewhere</p>".into();
        assert!(surface.bind(Some(&note), Vec::new(), &mut host));
        assert_eq!(host.content, "<p>replaced elsewhere</p>");
    }

    #[test]
    fn exec_refreshes_toolbar_and_reports_change() {
        let mut surface = EditingSurface::new();
        let mut host = ScriptedHost::default();
        surface.bind(Some(&heart_failure()), Vec::new(), &mut host);
        surface.toggle_menu(MenuKind::Font);

        let event = surface.exec(&FormatCommand::Bold, &mut host);
        assert!(matches!(event, Some(EditorEvent::ContentChanged { .. })));
        assert!(surface.toolbar().is_active(FormatFlags::BOLD));
        assert!(!surface.toolbar().is_active(FormatFlags::ITALIC));
        assert_eq!(surface.toolbar().font_name.as_deref(), Some("Georgia"));
        assert_eq!(surface.open_menu(), None);
    }

    #[test]
    fn outside_click_closes_menu() {
        let mut surface = EditingSurface::new();
        surface.toggle_menu(MenuKind::Color);
        surface.pointer_down(Some(MenuKind::Color));
        assert_eq!(surface.open_menu(), Some(MenuKind::Color));
        surface.pointer_down(None);
        assert_eq!(surface.open_menu(), None);
        surface.toggle_menu(MenuKind::Table);
        surface.toggle_menu(MenuKind::Table);
        assert_eq!(surface.open_menu(), None);
    }

    #[test]
    fn title_flow_emits_trimmed_title() {
        let mut surface = EditingSurface::new();
        let mut host = ScriptedHost::default();
        surface.bind(Some(&heart_failure()), Vec::new(), &mut host);

        surface.begin_title_edit();
        surface.set_title_draft("  Cardiac Failure ");
        assert_eq!(
            surface.title_input(TitleInput::Blur),
            Some(EditorEvent::TitleChanged {
                note_id: "heart-failure".into(),
                title: "Cardiac Failure".into(),
            })
        );

        surface.begin_title_edit();
        surface.set_title_draft("Discarded");
        assert_eq!(surface.title_input(TitleInput::Escape), None);
        assert_eq!(surface.title().unwrap().current(), "Cardiac Failure");
    }

    #[test]
    fn insert_html_appends_fragment_in_buffer_host() {
        let mut surface = EditingSurface::new();
        let mut host = BufferHost::new();
        surface.bind(Some(&heart_failure()), Vec::new(), &mut host);
        let event = surface.insert_html("<hr>", &mut host).expect("change");
        match event {
            EditorEvent::ContentChanged { content, .. } => assert!(content.ends_with("<hr>")),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
