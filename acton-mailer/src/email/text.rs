//! Plain-text extraction from rendered HTML
//!
//! Every composed message carries a plain-text alternative derived from its
//! HTML body. Extraction never fails: markup that cannot be understood is
//! passed through as literal text.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Elements whose content never reaches the text output
const SKIPPED_ELEMENTS: &[&str] = &["head", "script", "style", "template"];

/// Width of the rule emitted for `<hr>`
const RULE_WIDTH: usize = 40;

static ATTRIBUTE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)([a-z][a-z0-9_:-]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("Invalid regex")
});

/// Formatting options for text extraction
///
/// The defaults disable word-wrapping so lines stay as authored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextOptions {
    /// Wrap lines at this many characters (`None` disables wrapping)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wordwrap: Option<usize>,

    /// Render heading text in upper case
    pub uppercase_headings: bool,

    /// Drop link targets instead of appending them as `[href]`
    pub ignore_href: bool,

    /// Drop image alt text
    pub ignore_image: bool,
}

impl Default for TextOptions {
    fn default() -> Self {
        Self {
            wordwrap: None,
            uppercase_headings: true,
            ignore_href: false,
            ignore_image: false,
        }
    }
}

impl TextOptions {
    /// Enable word-wrapping at `width` characters
    #[must_use]
    pub const fn with_wordwrap(mut self, width: usize) -> Self {
        self.wordwrap = Some(width);
        self
    }
}

/// Convert an HTML string into readable plain text
///
/// # Examples
///
/// ```rust
/// use acton_mailer::email::{extract_text, TextOptions};
///
/// let text = extract_text("<p>Hi <b>Ana</b></p><p>Welcome aboard.</p>", &TextOptions::default());
/// assert_eq!(text, "Hi Ana\n\nWelcome aboard.");
/// ```
#[must_use]
pub fn extract_text(html: &str, options: &TextOptions) -> String {
    let mut writer = TextWriter::new(options);
    let mut rest = html;

    while let Some(start) = rest.find('<') {
        writer.push_text(&rest[..start]);
        let tail = &rest[start..];

        if let Some(comment) = tail.strip_prefix("<!--") {
            rest = comment.find("-->").map_or("", |end| &comment[end + 3..]);
            continue;
        }

        let Some(end) = tail.find('>') else {
            // Unterminated tag: keep it as literal text
            writer.push_text(tail);
            rest = "";
            break;
        };

        let Some(tag) = Tag::parse(&tail[1..end]) else {
            writer.push_text("<");
            rest = &tail[1..];
            continue;
        };
        rest = &tail[end + 1..];

        if !tag.closing && !tag.self_closing && SKIPPED_ELEMENTS.contains(&tag.name.as_str()) {
            rest = skip_element(rest, &tag.name);
            continue;
        }

        writer.handle_tag(&tag);
    }

    writer.push_text(rest);
    writer.finish()
}

/// Skip past the closing tag of `name`, or to the end of input
fn skip_element<'a>(rest: &'a str, name: &str) -> &'a str {
    let lower = rest.to_ascii_lowercase();
    let closing = format!("</{name}");
    lower.find(&closing).map_or("", |pos| {
        rest[pos..].find('>').map_or("", |end| &rest[pos + end + 1..])
    })
}

#[derive(Debug)]
struct Tag {
    name: String,
    closing: bool,
    self_closing: bool,
    attributes: String,
}

impl Tag {
    /// Parse the inside of `<...>`; `None` means it is not markup
    fn parse(inner: &str) -> Option<Self> {
        if inner.starts_with('!') || inner.starts_with('?') {
            // Doctype or processing instruction
            return Some(Self {
                name: String::new(),
                closing: false,
                self_closing: true,
                attributes: String::new(),
            });
        }

        let (closing, body) = inner
            .strip_prefix('/')
            .map_or((false, inner), |body| (true, body));

        if !body.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return None;
        }

        let name_end = body
            .find(|c: char| !c.is_ascii_alphanumeric() && c != '-')
            .unwrap_or(body.len());

        Some(Self {
            name: body[..name_end].to_ascii_lowercase(),
            closing,
            self_closing: body.trim_end().ends_with('/'),
            attributes: body[name_end..].to_string(),
        })
    }

    fn attribute(&self, wanted: &str) -> Option<String> {
        ATTRIBUTE.captures_iter(&self.attributes).find_map(|caps| {
            let name = caps.get(1)?.as_str();
            if !name.eq_ignore_ascii_case(wanted) {
                return None;
            }
            let value = caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4))?;
            Some(decode_entities(value.as_str()).into_owned())
        })
    }

    fn heading(&self) -> bool {
        matches!(self.name.as_str(), "h1" | "h2" | "h3" | "h4" | "h5" | "h6")
    }
}

#[derive(Debug)]
struct Link {
    href: Option<String>,
    /// Offset of the first character written inside the link
    text_start: Option<usize>,
}

/// Accumulates text and the pending separators between pieces of it
struct TextWriter<'a> {
    options: &'a TextOptions,
    out: String,
    pending_breaks: usize,
    pending_space: bool,
    pending_prefix: Option<String>,
    heading_depth: usize,
    pre_depth: usize,
    lists: Vec<Option<usize>>,
    links: Vec<Link>,
}

impl<'a> TextWriter<'a> {
    const fn new(options: &'a TextOptions) -> Self {
        Self {
            options,
            out: String::new(),
            pending_breaks: 0,
            pending_space: false,
            pending_prefix: None,
            heading_depth: 0,
            pre_depth: 0,
            lists: Vec::new(),
            links: Vec::new(),
        }
    }

    fn handle_tag(&mut self, tag: &Tag) {
        match tag.name.as_str() {
            "br" => self.line_break(),
            "hr" => {
                self.block(2);
                self.push_raw(&"-".repeat(RULE_WIDTH));
                self.block(2);
            }
            "p" | "table" | "blockquote" => self.block(2),
            "div" | "tr" | "section" | "article" | "header" | "footer" | "main" | "nav"
            | "aside" | "address" | "figure" | "figcaption" | "dl" | "dt" | "dd" | "form"
            | "fieldset" => self.block(1),
            "td" | "th" => self.pending_space = true,
            "ul" | "ol" => {
                if tag.closing {
                    self.lists.pop();
                } else if !tag.self_closing {
                    self.lists.push((tag.name == "ol").then_some(0));
                }
                self.block(if self.lists.is_empty() { 2 } else { 1 });
            }
            "li" => {
                self.block(1);
                if !tag.closing {
                    self.pending_prefix = Some(self.list_prefix());
                }
            }
            "pre" => {
                self.block(2);
                if tag.closing {
                    self.pre_depth = self.pre_depth.saturating_sub(1);
                } else if !tag.self_closing {
                    self.pre_depth += 1;
                }
            }
            "a" => self.handle_link(tag),
            "img" => {
                if !self.options.ignore_image {
                    if let Some(alt) = tag.attribute("alt").filter(|alt| !alt.trim().is_empty()) {
                        self.pending_space = true;
                        self.push_text(&alt);
                        self.pending_space = true;
                    }
                }
            }
            _ if tag.heading() => {
                self.block(2);
                if tag.closing {
                    self.heading_depth = self.heading_depth.saturating_sub(1);
                } else if !tag.self_closing {
                    self.heading_depth += 1;
                }
            }
            _ => {}
        }
    }

    fn handle_link(&mut self, tag: &Tag) {
        if !tag.closing {
            if !tag.self_closing {
                self.links.push(Link {
                    href: tag.attribute("href"),
                    text_start: None,
                });
            }
            return;
        }

        let Some(link) = self.links.pop() else {
            return;
        };
        let Some(href) = link.href.filter(|href| !href.is_empty() && !href.starts_with('#'))
        else {
            return;
        };
        if self.options.ignore_href {
            return;
        }

        let text = link
            .text_start
            .and_then(|start| self.out.get(start..))
            .unwrap_or_default()
            .trim();
        let bare = href.strip_prefix("mailto:").unwrap_or(&href);
        let uppercased = self.heading_depth > 0 && self.options.uppercase_headings;
        let same = |candidate: &str| {
            if uppercased {
                text == candidate.to_uppercase()
            } else {
                text == candidate
            }
        };
        if same(&href) || same(bare) {
            return;
        }

        let rendered = if text.is_empty() {
            href
        } else {
            format!("[{href}]")
        };
        self.pending_space = true;
        self.push_raw(&rendered);
    }

    fn list_prefix(&mut self) -> String {
        match self.lists.last_mut() {
            Some(Some(counter)) => {
                *counter += 1;
                format!(" {counter}. ")
            }
            _ => " * ".to_string(),
        }
    }

    fn block(&mut self, breaks: usize) {
        if breaks > self.pending_breaks {
            self.pending_breaks = breaks;
        }
    }

    fn line_break(&mut self) {
        if self.out.is_empty() {
            return;
        }
        self.flush_breaks();
        self.trim_trailing_spaces();
        self.out.push('\n');
        self.pending_space = false;
    }

    fn push_text(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        let decoded = decode_entities(raw);

        if self.pre_depth > 0 {
            let preformatted = decoded.replace('\r', "");
            if !preformatted.is_empty() {
                self.flush_separator();
                self.out.push_str(&preformatted);
            }
            return;
        }

        if decoded.starts_with(char::is_whitespace) {
            self.pending_space = true;
        }
        for (index, word) in decoded.split_whitespace().enumerate() {
            if index > 0 {
                self.pending_space = true;
            }
            self.push_word(word);
        }
        if decoded.ends_with(char::is_whitespace) {
            self.pending_space = true;
        }
    }

    fn push_word(&mut self, word: &str) {
        if self.heading_depth > 0 && self.options.uppercase_headings {
            self.push_raw(&word.to_uppercase());
        } else {
            self.push_raw(word);
        }
    }

    fn push_raw(&mut self, text: &str) {
        self.flush_separator();
        self.out.push_str(text);
    }

    fn flush_separator(&mut self) {
        if !self.out.is_empty() {
            if self.pending_breaks > 0 {
                self.flush_breaks();
            } else if self.pending_space && !self.out.ends_with([' ', '\n']) {
                self.out.push(' ');
            }
        }
        self.pending_breaks = 0;
        self.pending_space = false;

        if let Some(prefix) = self.pending_prefix.take() {
            self.out.push_str(&prefix);
        }

        let start = self.out.len();
        for link in self.links.iter_mut().filter(|link| link.text_start.is_none()) {
            link.text_start = Some(start);
        }
    }

    fn flush_breaks(&mut self) {
        if self.pending_breaks == 0 {
            return;
        }
        self.trim_trailing_spaces();
        let existing = self.out.chars().rev().take_while(|c| *c == '\n').count();
        for _ in existing..self.pending_breaks {
            self.out.push('\n');
        }
        self.pending_breaks = 0;
        self.pending_space = false;
    }

    fn trim_trailing_spaces(&mut self) {
        let trimmed = self.out.trim_end_matches([' ', '\t']).len();
        self.out.truncate(trimmed);
    }

    fn finish(self) -> String {
        let lines: Vec<&str> = self.out.lines().map(str::trim_end).collect();
        let text = lines.join("\n");
        let text = text.trim_matches('\n');

        match self.options.wordwrap {
            Some(width) if width > 0 => text
                .lines()
                .flat_map(|line| wrap_line(line, width))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => text.to_string(),
        }
    }
}

/// Greedy wrap at spaces; words longer than `width` are never split
fn wrap_line(line: &str, width: usize) -> Vec<String> {
    if line.chars().count() <= width {
        return vec![line.to_string()];
    }

    let mut wrapped = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in line.split(' ').filter(|word| !word.is_empty()) {
        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len > width {
            wrapped.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        wrapped.push(current);
    }
    wrapped
}

/// Decode HTML character references; unknown references are left as-is
fn decode_entities(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }

    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];

        let decoded = tail[1..]
            .find(';')
            .filter(|len| *len > 0 && *len <= 10)
            .and_then(|len| decode_entity(&tail[1..=len]).map(|ch| (ch, len)));

        if let Some((ch, len)) = decoded {
            out.push(ch);
            rest = &tail[len + 2..];
        } else {
            out.push('&');
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    Cow::Owned(out)
}

fn decode_entity(entity: &str) -> Option<char> {
    if let Some(number) = entity.strip_prefix('#') {
        let code = match number.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => number.parse().ok()?,
        };
        return char::from_u32(code);
    }

    let ch = match entity {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => ' ',
        "copy" => '\u{a9}',
        "reg" => '\u{ae}',
        "trade" => '\u{2122}',
        "hellip" => '\u{2026}',
        "mdash" => '\u{2014}',
        "ndash" => '\u{2013}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "euro" => '\u{20ac}',
        "pound" => '\u{a3}',
        _ => return None,
    };
    Some(ch)
}
