//! Reading unified patches back into hunks.

use bstr::{BString, ByteSlice};
use vcs_object::FileMode;

use crate::{DiffError, DiffLine, FileStatus, Hunk, Result};

/// A parsed patch: one section per file, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Patch {
    pub files: Vec<FilePatch>,
}

impl Patch {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// One file's section of a patch. Abbreviated ids from the `index` line
/// are not kept; application works from context alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    pub status: FileStatus,
    pub old_path: BString,
    pub new_path: BString,
    pub old_mode: Option<FileMode>,
    pub new_mode: Option<FileMode>,
    pub hunks: Vec<Hunk>,
    pub is_binary: bool,
    pub similarity: Option<u8>,
}

impl FilePatch {
    fn new(old_path: BString, new_path: BString) -> Self {
        Self {
            status: FileStatus::Modified,
            old_path,
            new_path,
            old_mode: None,
            new_mode: None,
            hunks: Vec::new(),
            is_binary: false,
            similarity: None,
        }
    }
}

struct Parser<'a> {
    lines: Vec<&'a [u8]>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a [u8]> {
        self.lines.get(self.pos).copied()
    }

    fn next(&mut self) -> Option<&'a [u8]> {
        let line = self.peek()?;
        self.pos += 1;
        Some(line)
    }

    fn error(&self, reason: impl Into<String>) -> DiffError {
        DiffError::MalformedPatch {
            line: self.pos,
            reason: reason.into(),
        }
    }
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn parse_mode(p: &Parser<'_>, text: &[u8]) -> Result<FileMode> {
    std::str::from_utf8(text)
        .ok()
        .and_then(|s| u32::from_str_radix(s.trim(), 8).ok())
        .and_then(FileMode::from_raw)
        .ok_or_else(|| p.error(format!("bad mode '{}'", text.as_bstr())))
}

/// `a/foo b/foo` from a `diff --git` line. Paths with spaces are split at
/// the last ` b/`.
fn git_header_paths(rest: &[u8]) -> Option<(BString, BString)> {
    let split = rest.rfind(" b/")?;
    let old = rest[..split].strip_prefix(b"a/")?;
    let new = &rest[split + 3..];
    Some((old.into(), new.into()))
}

/// Path from a `---`/`+++` line: `None` for `/dev/null`.
fn marker_path(text: &[u8], prefix: &[u8]) -> Option<BString> {
    // A tab separates an optional timestamp.
    let text = text.split_str("\t").next().unwrap_or(text);
    if text == b"/dev/null" {
        return None;
    }
    Some(text.strip_prefix(prefix).unwrap_or(text).into())
}

fn parse_range(p: &Parser<'_>, text: &[u8]) -> Result<(u32, u32)> {
    let text = std::str::from_utf8(text).map_err(|_| p.error("non-ASCII hunk range"))?;
    let num = |s: &str| s.parse::<u32>().map_err(|_| p.error(format!("bad hunk range '{text}'")));
    match text.split_once(',') {
        Some((start, count)) => Ok((num(start)?, num(count)?)),
        None => Ok((num(text)?, 1)),
    }
}

fn parse_hunk_header(p: &Parser<'_>, line: &[u8]) -> Result<Hunk> {
    let body = line
        .strip_prefix(b"@@ -")
        .ok_or_else(|| p.error("expected hunk header"))?;
    let end = body.find(b" @@").ok_or_else(|| p.error("unterminated hunk header"))?;
    let mut ranges = body[..end].splitn_str(2, " +");
    let old = ranges.next().ok_or_else(|| p.error("missing old range"))?;
    let new = ranges.next().ok_or_else(|| p.error("missing new range"))?;
    let (old_start, old_count) = parse_range(p, old)?;
    let (new_start, new_count) = parse_range(p, new)?;
    Ok(Hunk {
        old_start,
        old_count,
        new_start,
        new_count,
        lines: Vec::new(),
    })
}

fn parse_hunk_body(p: &mut Parser<'_>, hunk: &mut Hunk) -> Result<()> {
    let (mut old_left, mut new_left) = (hunk.old_count, hunk.new_count);
    while old_left > 0 || new_left > 0 {
        let Some(raw) = p.next() else {
            return Err(p.error("hunk ends early"));
        };
        // Some tools drop the space on empty context lines.
        let (tag, text) = match raw.split_first() {
            Some((&b'\n', _)) => (b' ', &b"\n"[..]),
            Some((&tag, text)) => (tag, text),
            None => return Err(p.error("empty line in hunk")),
        };
        let text = BString::from(text);
        match tag {
            b' ' if old_left > 0 && new_left > 0 => {
                old_left -= 1;
                new_left -= 1;
                hunk.lines.push(DiffLine::Context(text));
            }
            b'-' if old_left > 0 => {
                old_left -= 1;
                hunk.lines.push(DiffLine::Deletion(text));
            }
            b'+' if new_left > 0 => {
                new_left -= 1;
                hunk.lines.push(DiffLine::Addition(text));
            }
            b'\\' => strip_last_newline(p, hunk)?,
            _ => return Err(p.error("line does not fit the hunk's counts")),
        }
    }
    if p.peek().is_some_and(|l| l.starts_with(b"\\")) {
        p.next();
        strip_last_newline(p, hunk)?;
    }
    Ok(())
}

fn strip_last_newline(p: &Parser<'_>, hunk: &mut Hunk) -> Result<()> {
    let last = match hunk.lines.last_mut() {
        Some(DiffLine::Context(t) | DiffLine::Addition(t) | DiffLine::Deletion(t)) => t,
        None => return Err(p.error("no-newline marker before any line")),
    };
    if last.ends_with(b"\n") {
        last.pop();
    }
    Ok(())
}

/// Parse `diff --git` output (and plain `---`/`+++` unified diffs).
/// An omitted range count means 1.
pub fn parse_patch(data: impl AsRef<[u8]>) -> Result<Patch> {
    let mut p = Parser {
        lines: data.as_ref().split_inclusive(|&b| b == b'\n').collect(),
        pos: 0,
    };
    let mut files: Vec<FilePatch> = Vec::new();
    // Whether the current file still accepts extended headers.
    let mut in_header = false;

    while let Some(raw) = p.next() {
        let line = trim_eol(raw);
        if let Some(rest) = line.strip_prefix(b"diff --git ") {
            let (old, new) = git_header_paths(rest).ok_or_else(|| p.error("bad diff header"))?;
            files.push(FilePatch::new(old, new));
            in_header = true;
            continue;
        }
        if let Some(rest) = line.strip_prefix(b"--- ") {
            let Some(plus) = p.next().map(trim_eol) else {
                return Err(p.error("'---' without '+++'"));
            };
            let plus = plus
                .strip_prefix(b"+++ ")
                .ok_or_else(|| p.error("'---' without '+++'"))?;
            let old = marker_path(rest, b"a/");
            let new = marker_path(plus, b"b/");
            if !in_header {
                let name = new.clone().or_else(|| old.clone()).unwrap_or_default();
                files.push(FilePatch::new(
                    old.clone().unwrap_or_else(|| name.clone()),
                    new.clone().unwrap_or(name),
                ));
            }
            if let Some(file) = files.last_mut() {
                if old.is_none() {
                    file.status = FileStatus::Added;
                } else if new.is_none() {
                    file.status = FileStatus::Deleted;
                }
            }
            in_header = false;
            continue;
        }
        if line.starts_with(b"@@ ") {
            let mut hunk = parse_hunk_header(&p, line)?;
            parse_hunk_body(&mut p, &mut hunk)?;
            let file = files.last_mut().ok_or_else(|| p.error("hunk outside a file"))?;
            file.hunks.push(hunk);
            in_header = false;
            continue;
        }
        if !in_header {
            // Commentary between files.
            continue;
        }
        let Some(file) = files.last_mut() else { continue };
        if let Some(m) = line.strip_prefix(b"new file mode ") {
            file.status = FileStatus::Added;
            file.new_mode = Some(parse_mode(&p, m)?);
        } else if let Some(m) = line.strip_prefix(b"deleted file mode ") {
            file.status = FileStatus::Deleted;
            file.old_mode = Some(parse_mode(&p, m)?);
        } else if let Some(m) = line.strip_prefix(b"old mode ") {
            file.old_mode = Some(parse_mode(&p, m)?);
        } else if let Some(m) = line.strip_prefix(b"new mode ") {
            file.new_mode = Some(parse_mode(&p, m)?);
        } else if let Some(pct) = line.strip_prefix(b"similarity index ") {
            let pct = pct.strip_suffix(b"%").unwrap_or(pct);
            file.similarity = pct.to_str().ok().and_then(|s| s.parse().ok());
        } else if let Some(path) = line.strip_prefix(b"rename from ") {
            file.status = FileStatus::Renamed;
            file.old_path = path.into();
        } else if let Some(path) = line.strip_prefix(b"rename to ") {
            file.new_path = path.into();
        } else if let Some(path) = line.strip_prefix(b"copy from ") {
            file.status = FileStatus::Copied;
            file.old_path = path.into();
        } else if let Some(path) = line.strip_prefix(b"copy to ") {
            file.new_path = path.into();
        } else if let Some(rest) = line.strip_prefix(b"index ") {
            if let Some(m) = rest.split_str(" ").nth(1) {
                let m = parse_mode(&p, m)?;
                file.old_mode.get_or_insert(m);
                file.new_mode.get_or_insert(m);
            }
        } else if line.starts_with(b"Binary files ") {
            file.is_binary = true;
            in_header = false;
        }
    }

    for file in &mut files {
        if file.status == FileStatus::Modified {
            if let (Some(o), Some(n)) = (file.old_mode, file.new_mode) {
                if (o == FileMode::Symlink) != (n == FileMode::Symlink) {
                    file.status = FileStatus::TypeChanged;
                }
            }
        }
    }
    Ok(Patch { files })
}
