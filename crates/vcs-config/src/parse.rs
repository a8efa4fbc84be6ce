//! Line-oriented parser that keeps every line's raw text, so a file that is
//! read, edited with [`Config::set`](crate::Config::set), and written back
//! only changes where it was edited.

use crate::key::is_name;
use crate::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Section {
        raw: String,
        section: String,
        subsection: Option<String>,
    },
    Entry {
        raw: String,
        name: String,
        /// `None` for a bare key, which reads as `true`.
        value: Option<String>,
    },
    /// Blank lines and comments.
    Other(String),
}

impl Event {
    pub(crate) fn raw(&self) -> &str {
        match self {
            Event::Section { raw, .. } | Event::Entry { raw, .. } | Event::Other(raw) => raw,
        }
    }
}

pub(crate) fn parse(text: &str) -> Result<Vec<Event>, ConfigError> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut events = Vec::new();
    for (i, raw) in text.split_inclusive('\n').enumerate() {
        let err = |reason: &str| ConfigError::Parse {
            line: i + 1,
            reason: reason.to_owned(),
        };
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            events.push(Event::Other(raw.to_owned()));
        } else if let Some(rest) = line.strip_prefix('[') {
            let (section, subsection) = parse_header(rest).map_err(err)?;
            events.push(Event::Section {
                raw: raw.to_owned(),
                section,
                subsection,
            });
        } else {
            let (name, value) = match line.split_once('=') {
                Some((name, value)) => (name.trim(), Some(parse_value(value).map_err(err)?)),
                None => (line, None),
            };
            if !is_name(name) {
                return Err(err("invalid key name"));
            }
            events.push(Event::Entry {
                raw: raw.to_owned(),
                name: name.to_ascii_lowercase(),
                value,
            });
        }
    }
    Ok(events)
}

fn parse_header(rest: &str) -> Result<(String, Option<String>), &'static str> {
    let close = rest.rfind(']').ok_or("unterminated section header")?;
    let trailing = rest[close + 1..].trim();
    if !(trailing.is_empty() || trailing.starts_with('#') || trailing.starts_with(';')) {
        return Err("content after section header");
    }
    let inner = rest[..close].trim();
    match inner.split_once(char::is_whitespace) {
        Some((name, quoted)) => {
            let quoted = quoted.trim();
            let body = quoted
                .strip_prefix('"')
                .and_then(|q| q.strip_suffix('"'))
                .ok_or("subsection must be quoted")?;
            if !is_name(name) {
                return Err("invalid section name");
            }
            let mut sub = String::with_capacity(body.len());
            let mut chars = body.chars();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => sub.push(chars.next().ok_or("dangling escape")?),
                    '"' => return Err("unescaped quote in subsection"),
                    c => sub.push(c),
                }
            }
            Ok((name.to_ascii_lowercase(), Some(sub)))
        }
        None => {
            // `[section.sub]` is the deprecated spelling of `[section "sub"]`.
            let (name, sub) = match inner.split_once('.') {
                Some((name, sub)) => (name, Some(sub.to_ascii_lowercase())),
                None => (inner, None),
            };
            if !is_name(name) {
                return Err("invalid section name");
            }
            Ok((name.to_ascii_lowercase(), sub))
        }
    }
}

/// Unquote a value: strips inline comments and surrounding whitespace,
/// honours `"..."` and the escapes `\\ \" \n \t \b`.
fn parse_value(raw: &str) -> Result<String, &'static str> {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = String::new();
    let mut quoted = false;
    let mut chars = raw.trim_end_matches(['\n', '\r']).chars();
    while let Some(c) = chars.next() {
        match c {
            ' ' | '\t' if !quoted => {
                if !out.is_empty() {
                    pending_space.push(c);
                }
                continue;
            }
            '#' | ';' if !quoted => break,
            _ => {}
        }
        out.push_str(&pending_space);
        pending_space.clear();
        match c {
            '"' => quoted = !quoted,
            '\\' => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('b') => {
                    out.pop();
                }
                Some(c @ ('\\' | '"')) => out.push(c),
                _ => return Err("invalid escape in value"),
            },
            c => out.push(c),
        }
    }
    if quoted {
        return Err("unterminated quote");
    }
    Ok(out)
}

/// Render a value so that [`parse_value`] reads it back unchanged.
pub(crate) fn quote_value(value: &str) -> String {
    let needs_quotes = value.starts_with(char::is_whitespace)
        || value.ends_with(char::is_whitespace)
        || value.contains(['#', ';']);
    let mut out = String::with_capacity(value.len() + 2);
    if needs_quotes {
        out.push('"');
    }
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    if needs_quotes {
        out.push('"');
    }
    out
}

pub(crate) fn quote_subsection(sub: &str) -> String {
    sub.replace('\\', "\\\\").replace('"', "\\\"")
}
