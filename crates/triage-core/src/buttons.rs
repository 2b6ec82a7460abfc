//! Button marker parsing.
//!
//! The heavy model may end its answer with a `<buttons>` block of suggested
//! quick actions. [`extract_buttons`] is the only place that block is
//! parsed and removed; [`MarkerFilter`] withholds it from streamed deltas.
//!
//! # Format
//!
//! ```xml
//! <buttons>
//!   <button label="Open billing settings" value="open_billing" />
//!   <button label="Talk to a human" value="handoff" />
//! </buttons>
//! ```

use triage_types::cascade::ButtonSuggestion;

const OPEN_TAG: &str = "<buttons";
const CLOSE_TAG: &str = "</buttons>";
const BUTTON_TAG: &str = "<button";

/// Split `text` into its visible part and the suggested buttons.
///
/// Every terminated `<buttons>` block is removed and its buttons are
/// collected in document order. Visible segments around removed blocks are
/// trimmed and joined by a blank line. An unterminated block is left in
/// place along with everything after it.
pub fn extract_buttons(text: &str) -> (String, Vec<ButtonSuggestion>) {
    let mut buttons = Vec::new();
    let mut segments: Vec<&str> = Vec::new();
    let mut pos = 0;

    while let Some(start) = find_open_tag(text, pos) {
        let Some(close_rel) = text[start..].find(CLOSE_TAG) else {
            break;
        };
        let end = start + close_rel + CLOSE_TAG.len();
        buttons.extend(parse_block(&text[start..end]));
        segments.push(&text[pos..start]);
        pos = end;
    }
    segments.push(&text[pos..]);

    let visible = segments
        .iter()
        .map(|segment| segment.trim())
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");

    (visible, buttons)
}

/// Whether `text` contains the start of a button marker block.
pub fn contains_marker(text: &str) -> bool {
    find_open_tag(text, 0).is_some()
}

/// Byte offset of the first `<buttons` tag at or after `from` that is not
/// a prefix of a longer tag name (e.g. `<buttonset`).
fn find_open_tag(text: &str, from: usize) -> Option<usize> {
    let mut search_from = from;
    while let Some(rel) = text[search_from..].find(OPEN_TAG) {
        let idx = search_from + rel;
        let next = text[idx + OPEN_TAG.len()..].chars().next();
        if matches!(next, Some('>') | Some('/')) || next.is_some_and(char::is_whitespace) {
            return Some(idx);
        }
        search_from = idx + OPEN_TAG.len();
    }
    None
}

fn parse_block(block: &str) -> Vec<ButtonSuggestion> {
    let mut buttons = Vec::new();
    // Skip past the opening `<buttons ...>` tag itself.
    let Some(body_start) = block.find('>') else {
        return buttons;
    };
    let mut rest = &block[body_start + 1..];

    while let Some(pos) = rest.find(BUTTON_TAG) {
        let after_tag = &rest[pos + BUTTON_TAG.len()..];
        // `<buttons` inside the body is not a button element.
        if !after_tag.starts_with(char::is_whitespace) {
            rest = after_tag;
            continue;
        }
        let (attrs, consumed) = parse_attributes(after_tag);
        rest = &after_tag[consumed..];

        let label = attrs
            .iter()
            .find(|(k, _)| k == "label")
            .map(|(_, v)| v.trim().to_string())
            .unwrap_or_default();
        if label.is_empty() {
            continue;
        }
        let value = attrs
            .iter()
            .find(|(k, _)| k == "value")
            .map(|(_, v)| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| label.clone());

        buttons.push(ButtonSuggestion { label, value });
    }

    buttons
}

/// Parse `name="value"` pairs until the end of the element (`/>` or `>`).
///
/// Returns the attributes and the number of bytes consumed.
fn parse_attributes(s: &str) -> (Vec<(String, String)>, usize) {
    let mut attrs = Vec::new();
    let mut pos = 0;

    loop {
        let remaining = &s[pos..];
        let trimmed = remaining.trim_start();
        pos += remaining.len() - trimmed.len();

        if trimmed.is_empty() {
            return (attrs, pos);
        }
        if trimmed.starts_with("/>") {
            return (attrs, pos + 2);
        }
        if trimmed.starts_with('>') {
            return (attrs, pos + 1);
        }

        let Some(eq) = trimmed.find('=') else {
            return (attrs, s.len());
        };
        let name = trimmed[..eq].trim().to_string();
        let after_eq = trimmed[eq + 1..].trim_start();
        let Some(value_body) = after_eq.strip_prefix('"') else {
            return (attrs, s.len());
        };
        let Some(close) = find_closing_quote(value_body) else {
            return (attrs, s.len());
        };

        attrs.push((name, unescape(&value_body[..close])));

        let value_start = s.len() - value_body.len();
        pos = value_start + close + 1;
    }
}

/// Find the position of the next unescaped double quote in a string.
///
/// Handles escaped quotes (`\"`) by skipping them.
fn find_closing_quote(s: &str) -> Option<usize> {
    let mut chars = s.char_indices();
    while let Some((idx, ch)) = chars.next() {
        if ch == '\\' {
            let _ = chars.next();
            continue;
        }
        if ch == '"' {
            return Some(idx);
        }
    }
    None
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out.replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Incremental filter that keeps the button marker out of streamed text.
///
/// Text that might be the beginning of the marker is held back until it
/// can be decided. Everything from `<buttons` up to `</buttons>` is dropped.
#[derive(Debug, Default)]
pub struct MarkerFilter {
    pending: String,
    in_marker: bool,
}

impl MarkerFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one delta; returns the text that is safe to show now.
    pub fn push(&mut self, delta: &str) -> String {
        self.pending.push_str(delta);
        let mut out = String::new();

        loop {
            if self.in_marker {
                match self.pending.find(CLOSE_TAG) {
                    Some(idx) => {
                        self.pending.drain(..idx + CLOSE_TAG.len());
                        self.in_marker = false;
                    }
                    None => return out,
                }
            } else {
                match self.pending.find(OPEN_TAG) {
                    Some(idx) => {
                        let next = self.pending[idx + OPEN_TAG.len()..].chars().next();
                        match next {
                            // Can't tell yet whether this is the marker.
                            None => {
                                out.push_str(&self.pending[..idx]);
                                self.pending.drain(..idx);
                                return out;
                            }
                            Some(c) if c == '>' || c == '/' || c.is_whitespace() => {
                                out.push_str(&self.pending[..idx]);
                                self.pending.drain(..idx);
                                self.in_marker = true;
                            }
                            Some(_) => {
                                let split = idx + OPEN_TAG.len();
                                out.push_str(&self.pending[..split]);
                                self.pending.drain(..split);
                            }
                        }
                    }
                    None => {
                        let hold = partial_tag_suffix(&self.pending);
                        let emit = self.pending.len() - hold;
                        out.push_str(&self.pending[..emit]);
                        self.pending.drain(..emit);
                        return out;
                    }
                }
            }
        }
    }

    /// Flush held-back text at the end of the stream.
    ///
    /// An unterminated marker is released, matching [`extract_buttons`],
    /// which leaves unterminated blocks in the visible text.
    pub fn finish(&mut self) -> String {
        self.in_marker = false;
        std::mem::take(&mut self.pending)
    }
}

/// Length of the longest suffix of `s` that is a proper prefix of `<buttons`.
fn partial_tag_suffix(s: &str) -> usize {
    (1..OPEN_TAG.len())
        .rev()
        .find(|&k| s.ends_with(&OPEN_TAG[..k]))
        .unwrap_or(0)
}
