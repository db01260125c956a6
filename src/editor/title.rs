#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleState {
    Display,
    Editing { draft: String },
}

/// Inline title editing: `Display` until the user asks to edit, then
/// `Editing` until Enter/blur commits or Escape discards.
#[derive(Debug, Clone)]
pub struct TitleEditor {
    state: TitleState,
    current: String,
}

impl TitleEditor {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            state: TitleState::Display,
            current: title.into(),
        }
    }

    pub fn state(&self) -> &TitleState {
        &self.state
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.state, TitleState::Editing { .. })
    }

    /// The title shown in display state.
    pub fn current(&self) -> &str {
        &self.current
    }

    /// Adopts a title from the bound note. Ignored while editing.
    pub fn sync(&mut self, title: &str) {
        if !self.is_editing() {
            self.current = title.to_string();
        }
    }

    pub fn begin_edit(&mut self) {
        if !self.is_editing() {
            self.state = TitleState::Editing {
                draft: self.current.clone(),
            };
        }
    }

    pub fn set_draft(&mut self, text: &str) {
        if let TitleState::Editing { draft } = &mut self.state {
            draft.clear();
            draft.push_str(text);
        }
    }

    /// Enter or blur. Returns the new title when it actually changed.
    ///
    /// A blank draft reverts to the previous title.
    pub fn commit(&mut self) -> Option<String> {
        let TitleState::Editing { draft } = std::mem::replace(&mut self.state, TitleState::Display)
        else {
            return None;
        };
        let trimmed = draft.trim();
        if trimmed.is_empty() || trimmed == self.current {
            return None;
        }
        self.current = trimmed.to_string();
        Some(self.current.clone())
    }

    /// Escape: drop the draft.
    pub fn cancel(&mut self) {
        self.state = TitleState::Display;
    }
}
