use bitflags::bitflags;

use super::RichTextHost;

bitflags! {
    /// Formatting active at the caret or across the selection.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FormatFlags: u16 {
        const BOLD = 1 << 0;
        const ITALIC = 1 << 1;
        const UNDERLINE = 1 << 2;
        const STRIKETHROUGH = 1 << 3;
        const SUBSCRIPT = 1 << 4;
        const SUPERSCRIPT = 1 << 5;
        const ORDERED_LIST = 1 << 6;
        const UNORDERED_LIST = 1 << 7;
        const ALIGN_LEFT = 1 << 8;
        const ALIGN_CENTER = 1 << 9;
        const ALIGN_RIGHT = 1 << 10;
        const ALIGN_JUSTIFY = 1 << 11;
    }
}

const STATE_COMMANDS: [(FormatFlags, &str); 12] = [
    (FormatFlags::BOLD, "bold"),
    (FormatFlags::ITALIC, "italic"),
    (FormatFlags::UNDERLINE, "underline"),
    (FormatFlags::STRIKETHROUGH, "strikeThrough"),
    (FormatFlags::SUBSCRIPT, "subscript"),
    (FormatFlags::SUPERSCRIPT, "superscript"),
    (FormatFlags::ORDERED_LIST, "insertOrderedList"),
    (FormatFlags::UNORDERED_LIST, "insertUnorderedList"),
    (FormatFlags::ALIGN_LEFT, "justifyLeft"),
    (FormatFlags::ALIGN_CENTER, "justifyCenter"),
    (FormatFlags::ALIGN_RIGHT, "justifyRight"),
    (FormatFlags::ALIGN_JUSTIFY, "justifyFull"),
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolbarState {
    pub flags: FormatFlags,
    pub font_name: Option<String>,
    pub font_size: Option<String>,
    pub color: Option<String>,
    pub block: Option<String>,
}

impl ToolbarState {
    /// Reads the host's current selection state.
    pub fn query(host: &dyn RichTextHost) -> Self {
        let flags = STATE_COMMANDS
            .iter()
            .filter(|(_, command)| host.query_state(command))
            .fold(FormatFlags::empty(), |acc, (flag, _)| acc | *flag);
        Self {
            flags,
            font_name: host.query_value("fontName"),
            font_size: host.query_value("fontSize"),
            color: host.query_value("foreColor"),
            block: host.query_value("formatBlock"),
        }
    }

    pub fn is_active(&self, flag: FormatFlags) -> bool {
        self.flags.contains(flag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuKind {
    Font,
    Size,
    Color,
    Heading,
    Table,
    Link,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
    Right,
    Justify,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockFormat {
    Paragraph,
    Heading(u8),
    Blockquote,
    Preformatted,
}

impl BlockFormat {
    fn tag(self) -> String {
        match self {
            BlockFormat::Paragraph => "<p>".to_string(),
            BlockFormat::Heading(level) => format!("<h{}>", level.clamp(1, 6)),
            BlockFormat::Blockquote => "<blockquote>".to_string(),
            BlockFormat::Preformatted => "<pre>".to_string(),
        }
    }
}

/// Every formatting action the toolbar offers. Execution is left to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatCommand {
    Bold,
    Italic,
    Underline,
    Strikethrough,
    Subscript,
    Superscript,
    OrderedList,
    UnorderedList,
    Align(Alignment),
    FontName(String),
    /// Legacy 1..=7 size scale used by content-editing hosts.
    FontSize(u8),
    ForeColor(String),
    Highlight(String),
    Block(BlockFormat),
    Link(String),
    Unlink,
    Image(String),
    HorizontalRule,
    Table { rows: usize, columns: usize },
    InlineCode,
    InsertHtml(String),
    ClearFormatting,
    Undo,
    Redo,
}

impl FormatCommand {
    /// Host command name plus its optional argument.
    pub fn to_host_command(&self) -> (&'static str, Option<String>) {
        match self {
            FormatCommand::Bold => ("bold", None),
            FormatCommand::Italic => ("italic", None),
            FormatCommand::Underline => ("underline", None),
            FormatCommand::Strikethrough => ("strikeThrough", None),
            FormatCommand::Subscript => ("subscript", None),
            FormatCommand::Superscript => ("superscript", None),
            FormatCommand::OrderedList => ("insertOrderedList", None),
            FormatCommand::UnorderedList => ("insertUnorderedList", None),
            FormatCommand::Align(Alignment::Left) => ("justifyLeft", None),
            FormatCommand::Align(Alignment::Center) => ("justifyCenter", None),
            FormatCommand::Align(Alignment::Right) => ("justifyRight", None),
            FormatCommand::Align(Alignment::Justify) => ("justifyFull", None),
            FormatCommand::FontName(name) => ("fontName", Some(name.clone())),
            FormatCommand::FontSize(size) => ("fontSize", Some((*size).clamp(1, 7).to_string())),
            FormatCommand::ForeColor(color) => ("foreColor", Some(color.clone())),
            FormatCommand::Highlight(color) => ("hiliteColor", Some(color.clone())),
            FormatCommand::Block(block) => ("formatBlock", Some(block.tag())),
            FormatCommand::Link(url) => ("createLink", Some(url.clone())),
            FormatCommand::Unlink => ("unlink", None),
            FormatCommand::Image(url) => ("insertImage", Some(url.clone())),
            FormatCommand::HorizontalRule => ("insertHorizontalRule", None),
            FormatCommand::Table { rows, columns } => {
                ("insertHTML", Some(table_html(*rows, *columns)))
            }
            FormatCommand::InlineCode => ("insertHTML", Some("<code>&#8203;</code>".to_string())),
            FormatCommand::InsertHtml(html) => ("insertHTML", Some(html.clone())),
            FormatCommand::ClearFormatting => ("removeFormat", None),
            FormatCommand::Undo => ("undo", None),
            FormatCommand::Redo => ("redo", None),
        }
    }
}

/// Empty table with a header row followed by `rows` body rows.
pub fn table_html(rows: usize, columns: usize) -> String {
    let columns = columns.max(1);
    let mut html = String::from("<table><thead><tr>");
    for column in 1..=columns {
        html.push_str(&format!("<th>Column {column}</th>"));
    }
    html.push_str("</tr></thead><tbody>");
    for _ in 0..rows.max(1) {
        html.push_str("<tr>");
        for _ in 0..columns {
            html.push_str("<td><br></td>");
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table><p><br></p>");
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_html_has_header_and_body_rows() {
        let html = table_html(2, 3);
        assert_eq!(html.matches("<th>").count(), 3);
        assert_eq!(html.matches("<td>").count(), 6);
    }

    #[test]
    fn font_size_is_clamped_to_host_scale() {
        assert_eq!(
            FormatCommand::FontSize(12).to_host_command(),
            ("fontSize", Some("7".to_string()))
        );
        assert_eq!(
            FormatCommand::Block(BlockFormat::Heading(9)).to_host_command(),
            ("formatBlock", Some("<h6>".to_string()))
        );
    }
}
