//! Three-way merge of one file's content.
//!
//! Both sides are diffed against the base. Changed base regions that
//! overlap or touch are grouped into one chunk. A chunk changed by one side
//! takes that side; a chunk changed identically by both is taken once;
//! anything else becomes a marked conflict.

use vcs_diff::algorithm::split_lines;
use vcs_diff::{diff_edits, Edit, EditOp};
use vcs_object::is_binary;

use crate::{ConflictStyle, MergeOptions};

/// Names printed after the conflict markers.
#[derive(Debug, Clone, Copy)]
pub struct MergeLabels<'a> {
    pub base: &'a str,
    pub ours: &'a str,
    pub theirs: &'a str,
}

impl Default for MergeLabels<'_> {
    fn default() -> Self {
        Self {
            base: "base",
            ours: "ours",
            theirs: "theirs",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentMerge {
    Clean(Vec<u8>),
    /// `content` carries conflict markers around each of the `conflicts`
    /// regions. For binary input it is our version unchanged.
    Conflicted { content: Vec<u8>, conflicts: usize },
}

impl ContentMerge {
    pub fn is_clean(&self) -> bool {
        matches!(self, ContentMerge::Clean(_))
    }

    pub fn content(&self) -> &[u8] {
        match self {
            ContentMerge::Clean(data) | ContentMerge::Conflicted { content: data, .. } => data,
        }
    }

    pub fn into_content(self) -> Vec<u8> {
        match self {
            ContentMerge::Clean(data) | ContentMerge::Conflicted { content: data, .. } => data,
        }
    }
}

/// A run of changed base lines `[base_start, base_end)` replaced by
/// `[side_start, side_end)` of one side.
#[derive(Debug, Clone, Copy)]
struct Region {
    base_start: usize,
    base_end: usize,
    side_start: usize,
    side_end: usize,
}

fn regions(edits: &[Edit]) -> Vec<Region> {
    let mut out = Vec::new();
    // Positions just past the last equal line seen.
    let (mut base_pos, mut side_pos) = (0, 0);
    let mut open: Option<Region> = None;
    for edit in edits {
        match edit.op {
            EditOp::Equal => {
                out.extend(open.take());
                base_pos = edit.old_index + 1;
                side_pos = edit.new_index + 1;
            }
            EditOp::Delete | EditOp::Insert => {
                let region = open.get_or_insert(Region {
                    base_start: base_pos,
                    base_end: base_pos,
                    side_start: side_pos,
                    side_end: side_pos,
                });
                if edit.op == EditOp::Delete {
                    region.base_end = edit.old_index + 1;
                } else {
                    region.side_end = edit.new_index + 1;
                }
            }
        }
    }
    out.extend(open);
    out
}

fn squeeze(text: &[u8]) -> Vec<u8> {
    text.iter().copied().filter(|c| !c.is_ascii_whitespace()).collect()
}

/// Merge `ours` and `theirs`, both descended from `base`.
pub fn merge_content(
    base: &[u8],
    ours: &[u8],
    theirs: &[u8],
    opts: &MergeOptions,
    labels: &MergeLabels<'_>,
) -> ContentMerge {
    if ours == theirs || base == theirs {
        return ContentMerge::Clean(ours.to_vec());
    }
    if base == ours {
        return ContentMerge::Clean(theirs.to_vec());
    }
    if is_binary(base) || is_binary(ours) || is_binary(theirs) {
        return ContentMerge::Conflicted {
            content: ours.to_vec(),
            conflicts: 1,
        };
    }

    let base_lines = split_lines(base);
    let our_lines = split_lines(ours);
    let their_lines = split_lines(theirs);
    let ours_changed = regions(&diff_edits(&base_lines, &our_lines, false));
    let theirs_changed = regions(&diff_edits(&base_lines, &their_lines, false));

    let mut out = Vec::with_capacity(ours.len().max(theirs.len()));
    let mut conflicts = 0;
    let mut base_pos = 0;
    let (mut oi, mut ti) = (0, 0);

    while oi < ours_changed.len() || ti < theirs_changed.len() {
        // Seed the chunk with whichever region starts first.
        let take_ours = match (ours_changed.get(oi), theirs_changed.get(ti)) {
            (Some(o), Some(t)) => o.base_start <= t.base_start,
            (Some(_), None) => true,
            _ => false,
        };
        let seed = if take_ours { ours_changed[oi] } else { theirs_changed[ti] };
        let (chunk_start, mut chunk_end) = (seed.base_start, seed.base_end);
        let (o_first, t_first) = (oi, ti);

        // Grow it while a region from either side overlaps or touches it.
        loop {
            if let Some(o) = ours_changed.get(oi).filter(|o| o.base_start <= chunk_end) {
                chunk_end = chunk_end.max(o.base_end);
                oi += 1;
            } else if let Some(t) = theirs_changed.get(ti).filter(|t| t.base_start <= chunk_end) {
                chunk_end = chunk_end.max(t.base_end);
                ti += 1;
            } else {
                break;
            }
        }

        for line in &base_lines[base_pos..chunk_start] {
            out.extend_from_slice(line);
        }
        base_pos = chunk_end;

        let side = |changed: &[Region], lines: &[&[u8]]| -> Vec<u8> {
            let (first, last) = (changed[0], changed[changed.len() - 1]);
            let start = first.side_start - (first.base_start - chunk_start);
            let end = last.side_end + (chunk_end - last.base_end);
            lines[start..end].concat()
        };
        let base_text = base_lines[chunk_start..chunk_end].concat();
        let our_text = (oi > o_first).then(|| side(&ours_changed[o_first..oi], &our_lines));
        let their_text = (ti > t_first).then(|| side(&theirs_changed[t_first..ti], &their_lines));

        match (our_text, their_text) {
            (Some(text), None) | (None, Some(text)) => out.extend_from_slice(&text),
            (Some(o), Some(t)) => {
                let same = o == t || (opts.ignore_whitespace && squeeze(&o) == squeeze(&t));
                if same {
                    out.extend_from_slice(&o);
                } else {
                    conflicts += 1;
                    write_conflict(&mut out, &o, &base_text, &t, opts.conflict_style, labels);
                }
            }
            (None, None) => {}
        }
    }
    for line in &base_lines[base_pos..] {
        out.extend_from_slice(line);
    }

    if conflicts == 0 {
        ContentMerge::Clean(out)
    } else {
        ContentMerge::Conflicted {
            content: out,
            conflicts,
        }
    }
}

fn marker(out: &mut Vec<u8>, sign: &[u8], label: &str) {
    out.extend_from_slice(sign);
    if !label.is_empty() {
        out.push(b' ');
        out.extend_from_slice(label.as_bytes());
    }
    out.push(b'\n');
}

/// Append `text`, terminating its last line so a marker can follow.
fn body(out: &mut Vec<u8>, text: &[u8]) {
    out.extend_from_slice(text);
    if !text.is_empty() && !text.ends_with(b"\n") {
        out.push(b'\n');
    }
}

fn write_conflict(
    out: &mut Vec<u8>,
    ours: &[u8],
    base: &[u8],
    theirs: &[u8],
    style: ConflictStyle,
    labels: &MergeLabels<'_>,
) {
    if !out.is_empty() && !out.ends_with(b"\n") {
        out.push(b'\n');
    }
    marker(out, b"<<<<<<<", labels.ours);
    body(out, ours);
    if style == ConflictStyle::Diff3 {
        marker(out, b"|||||||", labels.base);
        body(out, base);
    }
    out.extend_from_slice(b"=======\n");
    body(out, theirs);
    marker(out, b">>>>>>>", labels.theirs);
}
