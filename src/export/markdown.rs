//! Rich-text (HTML) to Markdown.
//!
//! The editor stores a small, predictable subset of HTML, so a forgiving
//! tree builder plus a renderer is enough: unknown tags are unwrapped,
//! stray closing tags are ignored and anything left open at the end is
//! closed implicitly. Only truncated markup (a tag or comment that never
//! ends) is treated as a failure.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));
static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid blank line regex"));
static INLINE_MARKUP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\\`*_\[\]~]|<[A-Za-z/!?]").expect("valid inline markup regex"));
static BLOCK_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\s*)(#{1,6}|[-+>]|\d{1,9}[.)])(\s|$)").expect("valid block marker regex")
});

const VOID_TAGS: [&str; 10] = [
    "br", "hr", "img", "input", "meta", "link", "wbr", "col", "source", "area",
];
const RAW_TEXT_TAGS: [&str; 2] = ["script", "style"];
const DROPPED_TAGS: [&str; 6] = ["svg", "script", "style", "head", "title", "template"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("unterminated tag at byte {0}")]
    UnterminatedTag(usize),
    #[error("unterminated comment at byte {0}")]
    UnterminatedComment(usize),
}

/// Converts stored rich content to Markdown, or returns it unchanged when
/// the markup cannot be read.
pub fn to_markdown(rich: &str) -> String {
    match try_to_markdown(rich) {
        Ok(markdown) => markdown,
        Err(err) => {
            tracing::warn!(error = %err, "markdown conversion failed; exporting raw content");
            rich.to_string()
        }
    }
}

pub fn try_to_markdown(rich: &str) -> Result<String, ConversionError> {
    let nodes = parse(rich)?;
    Ok(normalize(&render_children(&nodes)))
}

#[derive(Debug, Clone, PartialEq)]
enum Html {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Element {
    tag: String,
    attrs: Vec<(String, String)>,
    children: Vec<Html>,
}

impl Element {
    fn new(tag: String, attrs: Vec<(String, String)>) -> Self {
        Self {
            tag,
            attrs,
            children: Vec::new(),
        }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|child| match child {
            Html::Element(element) => Some(element),
            Html::Text(_) => None,
        })
    }
}

struct TreeBuilder {
    stack: Vec<Element>,
    text: String,
}

impl TreeBuilder {
    fn new() -> Self {
        Self {
            stack: vec![Element::new(String::new(), Vec::new())],
            text: String::new(),
        }
    }

    fn top(&mut self) -> &mut Element {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn flush_text(&mut self) {
        if !self.text.is_empty() {
            let text = decode_entities(&std::mem::take(&mut self.text));
            self.top().children.push(Html::Text(text));
        }
    }

    fn pop(&mut self) {
        if self.stack.len() > 1 {
            if let Some(element) = self.stack.pop() {
                self.top().children.push(Html::Element(element));
            }
        }
    }

    fn open(&mut self, element: Element) {
        self.flush_text();
        let implicitly_closed = matches!(element.tag.as_str(), "li" | "p" | "tr" | "td" | "th");
        if implicitly_closed && self.stack.len() > 1 && self.top().tag == element.tag {
            self.pop();
        }
        if VOID_TAGS.contains(&element.tag.as_str()) {
            self.top().children.push(Html::Element(element));
        } else {
            self.stack.push(element);
        }
    }

    fn close(&mut self, tag: &str) {
        self.flush_text();
        let Some(depth) = self.stack.iter().skip(1).rposition(|open| open.tag == tag) else {
            return;
        };
        while self.stack.len() > depth + 1 {
            self.pop();
        }
    }

    fn finish(mut self) -> Vec<Html> {
        self.flush_text();
        while self.stack.len() > 1 {
            self.pop();
        }
        self.stack.pop().map(|root| root.children).unwrap_or_default()
    }
}

fn parse(input: &str) -> Result<Vec<Html>, ConversionError> {
    let bytes = input.as_bytes();
    let mut builder = TreeBuilder::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            let next = input[i..].find('<').map_or(input.len(), |pos| pos + i);
            builder.text.push_str(&input[i..next]);
            i = next;
            continue;
        }

        let rest = &input[i..];
        if rest.starts_with("<!--") {
            let end = rest[4..]
                .find("-->")
                .ok_or(ConversionError::UnterminatedComment(i))?;
            i += 4 + end + 3;
            continue;
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            let end = rest.find('>').ok_or(ConversionError::UnterminatedTag(i))?;
            i += end + 1;
            continue;
        }

        let closing = rest.starts_with("</");
        let name_start = if closing { i + 2 } else { i + 1 };
        if !bytes.get(name_start).is_some_and(u8::is_ascii_alphabetic) {
            builder.text.push('<');
            i += 1;
            continue;
        }

        let end = tag_end(input, name_start).ok_or(ConversionError::UnterminatedTag(i))?;
        let inner = input[name_start..end].trim_end_matches('/');
        let name_len = inner
            .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '-'))
            .unwrap_or(inner.len());
        let tag = inner[..name_len].to_ascii_lowercase();
        i = end + 1;

        if closing {
            builder.close(&tag);
            continue;
        }

        let element = Element::new(tag, parse_attrs(&inner[name_len..]));
        if RAW_TEXT_TAGS.contains(&element.tag.as_str()) {
            let needle = format!("</{}", element.tag);
            let lowered = input[i..].to_ascii_lowercase();
            i = match lowered.find(&needle) {
                Some(pos) => {
                    let close_start = i + pos;
                    tag_end(input, close_start).map_or(input.len(), |close| close + 1)
                }
                None => input.len(),
            };
            continue;
        }
        builder.open(element);
    }

    Ok(builder.finish())
}

/// Index of the `>` ending a tag, skipping quoted attribute values.
fn tag_end(input: &str, from: usize) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (offset, &byte) in input.as_bytes()[from..].iter().enumerate() {
        match quote {
            Some(open) if byte == open => quote = None,
            Some(_) => {}
            None if byte == b'"' || byte == b'\'' => quote = Some(byte),
            None if byte == b'>' => return Some(from + offset),
            None => {}
        }
    }
    None
}

fn parse_attrs(raw: &str) -> Vec<(String, String)> {
    let bytes = raw.as_bytes();
    let n = bytes.len();
    let mut attrs = Vec::new();
    let mut i = 0;

    loop {
        while i < n && bytes[i].is_ascii_whitespace() {
            i += 1;
        }
        if i >= n {
            break;
        }
        let start = i;
        while i < n && !bytes[i].is_ascii_whitespace() && bytes[i] != b'=' {
            i += 1;
        }
        let name = raw[start..i].to_ascii_lowercase();
        while i < n && bytes[i].is_ascii_whitespace() {
            i += 1;
        }

        let mut value = String::new();
        if i < n && bytes[i] == b'=' {
            i += 1;
            while i < n && bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            if i < n && (bytes[i] == b'"' || bytes[i] == b'\'') {
                let quote = bytes[i];
                i += 1;
                let value_start = i;
                while i < n && bytes[i] != quote {
                    i += 1;
                }
                value = decode_entities(&raw[value_start..i]);
                if i < n {
                    i += 1;
                }
            } else {
                let value_start = i;
                while i < n && !bytes[i].is_ascii_whitespace() {
                    i += 1;
                }
                value = decode_entities(&raw[value_start..i]);
            }
        }

        if !name.is_empty() {
            attrs.push((name, value));
        }
    }
    attrs
}

fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let decoded = tail
            .find(';')
            .filter(|&semi| semi <= 10)
            .and_then(|semi| decode_entity(&tail[1..semi]).map(|ch| (ch, semi)));
        match decoded {
            Some((ch, semi)) => {
                out.push(ch);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = name.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}

fn render_children(children: &[Html]) -> String {
    children.iter().map(render_node).collect()
}

fn render_node(node: &Html) -> String {
    match node {
        Html::Text(text) => escape_text(&WHITESPACE_RUN.replace_all(text, " ")),
        Html::Element(element) => render_element(element),
    }
}

/// Backslash-escapes characters that Markdown would read as markup. A text
/// node may open a line, so a leading heading, quote, bullet or ordinal
/// marker is escaped too.
fn escape_text(text: &str) -> String {
    let inline = INLINE_MARKUP.replace_all(text, |caps: &regex::Captures| format!("\\{}", &caps[0]));
    BLOCK_MARKER
        .replace(&inline, |caps: &regex::Captures| {
            let marker = &caps[2];
            let escaped = match marker.strip_suffix(['.', ')']) {
                Some(digits) => format!("{digits}\\{}", &marker[digits.len()..]),
                None => format!("\\{marker}"),
            };
            format!("{}{escaped}{}", &caps[1], &caps[3])
        })
        .into_owned()
}

fn render_element(element: &Element) -> String {
    let tag = element.tag.as_str();
    match tag {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = usize::from(tag.as_bytes()[1] - b'0');
            let text = single_line(&render_children(&element.children));
            block(format!("{} {}", "#".repeat(level), text))
        }
        "p" | "div" | "section" | "article" | "header" | "footer" | "main" | "figure"
        | "figcaption" | "body" | "html" => {
            block(render_children(&element.children).trim().to_string())
        }
        "br" => "\n".to_string(),
        "hr" => block("---".to_string()),
        "strong" | "b" => wrap_inline("**", element),
        "em" | "i" => wrap_inline("_", element),
        "s" | "strike" | "del" => wrap_inline("~~", element),
        "u" | "ins" => format!("<u>{}</u>", render_children(&element.children)),
        "code" => inline_code(&text_content(element)),
        "a" => {
            let label = render_children(&element.children);
            match element.attr("href").filter(|href| !href.is_empty()) {
                Some(href) => format!("[{}]({href})", label.trim()),
                None => label,
            }
        }
        "img" => format!(
            "![{}]({})",
            element.attr("alt").unwrap_or_default(),
            element.attr("src").unwrap_or_default()
        ),
        "pre" => block(render_pre(element)),
        "blockquote" => block(render_blockquote(element)),
        "ul" | "ol" => block(render_list(element)),
        "li" => block(format!("- {}", tighten(&render_children(&element.children)))),
        "table" => block(render_table(element)),
        _ if DROPPED_TAGS.contains(&tag) => String::new(),
        _ => render_children(&element.children),
    }
}

fn block(content: String) -> String {
    if content.trim().is_empty() {
        String::new()
    } else {
        format!("\n\n{content}\n\n")
    }
}

fn single_line(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text.trim(), " ").into_owned()
}

/// Emphasis markers hug the text; surrounding spaces move outside them.
fn wrap_inline(marker: &str, element: &Element) -> String {
    let inner = render_children(&element.children);
    let core = inner.trim();
    if core.is_empty() {
        return inner;
    }
    let lead = &inner[..inner.len() - inner.trim_start().len()];
    let trail = &inner[inner.trim_end().len()..];
    format!("{lead}{marker}{core}{marker}{trail}")
}

fn inline_code(text: &str) -> String {
    let text = text.trim_matches('\u{200b}');
    if text.is_empty() {
        String::new()
    } else if text.contains('`') {
        format!("`` {text} ``")
    } else {
        format!("`{text}`")
    }
}

fn text_content(element: &Element) -> String {
    let mut out = String::new();
    collect_text(element, &mut out);
    out
}

fn collect_text(element: &Element, out: &mut String) {
    for child in &element.children {
        match child {
            Html::Text(text) => out.push_str(text),
            Html::Element(inner) if inner.tag == "br" => out.push('\n'),
            Html::Element(inner) => collect_text(inner, out),
        }
    }
}

fn is_diagram_source(pre: &Element) -> bool {
    pre.has_class("mermaid") || pre.attr("data-diagram").is_some()
}

fn render_pre(pre: &Element) -> String {
    let source = text_content(pre);
    let source = source.trim_matches('\n');
    let language = if is_diagram_source(pre) {
        "mermaid"
    } else {
        pre.child_elements()
            .filter(|child| child.tag == "code")
            .find_map(|code| {
                code.attr("class")?
                    .split_whitespace()
                    .find_map(|class| class.strip_prefix("language-"))
            })
            .unwrap_or_default()
    };
    format!("```{language}\n{source}\n```")
}

fn render_blockquote(quote: &Element) -> String {
    let inner = normalize(&render_children(&quote.children));
    inner
        .lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapses blank lines so a list item's body stays one tight block.
fn tighten(text: &str) -> String {
    text.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn render_list(list: &Element) -> String {
    let ordered = list.tag == "ol";
    let mut number = list
        .attr("start")
        .and_then(|start| start.trim().parse::<usize>().ok())
        .unwrap_or(1);
    let mut lines = Vec::new();

    for item in list.child_elements() {
        if matches!(item.tag.as_str(), "ul" | "ol") {
            for line in render_list(item).lines() {
                lines.push(format!("  {line}"));
            }
            continue;
        }
        let marker = if ordered {
            let marker = format!("{number}. ");
            number += 1;
            marker
        } else {
            "- ".to_string()
        };
        let indent = " ".repeat(marker.len());
        let body = tighten(&render_children(&item.children));
        let mut body_lines = body.lines();
        lines.push(format!("{marker}{}", body_lines.next().unwrap_or_default()).trim_end().to_string());
        lines.extend(body_lines.map(|line| format!("{indent}{line}")));
    }
    lines.join("\n")
}

fn render_table(table: &Element) -> String {
    let mut rows: Vec<Vec<String>> = Vec::new();
    collect_rows(table, &mut rows);
    let Some(columns) = rows.iter().map(Vec::len).max().filter(|&n| n > 0) else {
        return String::new();
    };

    let format_row = |cells: &[String]| {
        let padded: Vec<&str> = (0..columns)
            .map(|index| cells.get(index).map_or("", String::as_str))
            .collect();
        format!("| {} |", padded.join(" | "))
    };

    let mut lines = vec![
        format_row(rows[0].as_slice()),
        format!("| {} |", vec!["---"; columns].join(" | ")),
    ];
    lines.extend(rows[1..].iter().map(|row| format_row(row.as_slice())));
    lines.join("\n")
}

fn collect_rows(element: &Element, rows: &mut Vec<Vec<String>>) {
    for child in element.child_elements() {
        match child.tag.as_str() {
            "tr" => rows.push(
                child
                    .child_elements()
                    .filter(|cell| matches!(cell.tag.as_str(), "td" | "th"))
                    .map(|cell| single_line(&render_children(&cell.children)).replace('|', "\\|"))
                    .collect(),
            ),
            "thead" | "tbody" | "tfoot" => collect_rows(child, rows),
            _ => {}
        }
    }
}

fn normalize(markdown: &str) -> String {
    let trimmed: Vec<&str> = markdown.lines().map(str::trim_end).collect();
    BLANK_RUN
        .replace_all(&trimmed.join("\n"), "\n\n")
        .trim_matches('\n')
        .to_string()
}
