//! Line-level diff.
//!
//! Lines are interned to small integers first so the inner loops compare
//! `u32`s. The common prefix and suffix are peeled off, and the remainder
//! goes through the linear-space variant of Myers' algorithm: find the
//! middle snake of the shortest edit path, then recurse on both halves.

use std::borrow::Cow;
use std::collections::HashMap;
use std::ops::{Index, IndexMut, Range};

use bstr::BString;

use crate::{DiffLine, DiffOptions, Hunk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOp {
    Equal,
    Insert,
    Delete,
}

/// One step of an edit script. For an insertion `old_index` is the number
/// of old lines consumed so far; for a deletion `new_index` likewise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edit {
    pub op: EditOp,
    pub old_index: usize,
    pub new_index: usize,
}

/// Split into lines, keeping each line's `\n`. A final line without one is
/// kept as is.
pub fn split_lines(data: &[u8]) -> Vec<&[u8]> {
    data.split_inclusive(|&b| b == b'\n').collect()
}

fn squeeze(line: &[u8]) -> Cow<'_, [u8]> {
    if line.iter().any(u8::is_ascii_whitespace) {
        Cow::Owned(line.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect())
    } else {
        Cow::Borrowed(line)
    }
}

/// Map equal lines (or, ignoring whitespace, equivalent lines) to equal ids.
fn intern<'a>(old: &[&'a [u8]], new: &[&'a [u8]], ignore_whitespace: bool) -> (Vec<u32>, Vec<u32>) {
    let mut ids: HashMap<Cow<'a, [u8]>, u32> = HashMap::new();
    let mut id_of = |line: &'a [u8]| {
        let key = if ignore_whitespace {
            squeeze(line)
        } else {
            Cow::Borrowed(line)
        };
        let next = ids.len() as u32;
        *ids.entry(key).or_insert(next)
    };
    let a = old.iter().map(|l| id_of(l)).collect();
    let b = new.iter().map(|l| id_of(l)).collect();
    (a, b)
}

/// Shortest edit script from `old` to `new`.
pub fn diff_edits(old: &[&[u8]], new: &[&[u8]], ignore_whitespace: bool) -> Vec<Edit> {
    let (a, b) = intern(old, new, ignore_whitespace);
    let mut out = Vec::with_capacity(a.len().max(b.len()));
    let mut vf = Diagonals::new(a.len() + b.len());
    let mut vb = Diagonals::new(a.len() + b.len());
    conquer(&a, 0..a.len(), &b, 0..b.len(), &mut vf, &mut vb, &mut out);
    out
}

/// Furthest-reaching x per diagonal, indexed by signed diagonal number.
struct Diagonals {
    data: Vec<usize>,
    offset: isize,
}

impl Diagonals {
    fn new(max: usize) -> Self {
        let offset = (max / 2 + 2) as isize;
        Self {
            data: vec![0; 2 * offset as usize + 1],
            offset,
        }
    }
}

impl Index<isize> for Diagonals {
    type Output = usize;

    fn index(&self, k: isize) -> &usize {
        &self.data[(k + self.offset) as usize]
    }
}

impl IndexMut<isize> for Diagonals {
    fn index_mut(&mut self, k: isize) -> &mut usize {
        &mut self.data[(k + self.offset) as usize]
    }
}

fn common_prefix(a: &[u32], b: &[u32]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn common_suffix(a: &[u32], b: &[u32]) -> usize {
    a.iter().rev().zip(b.iter().rev()).take_while(|(x, y)| x == y).count()
}

/// A point on some shortest edit path through the two ranges, splitting the
/// problem in two. Ranges must be non-empty with no common prefix or suffix.
fn middle_snake(
    a: &[u32],
    ar: Range<usize>,
    b: &[u32],
    br: Range<usize>,
    vf: &mut Diagonals,
    vb: &mut Diagonals,
) -> (usize, usize) {
    let n = ar.len();
    let m = br.len();
    let delta = n as isize - m as isize;
    let odd = delta & 1 == 1;
    vf[1] = 0;
    vb[1] = 0;
    let d_max = ((n + m + 1) / 2) as isize;

    for d in 0..=d_max {
        let mut k = -d;
        while k <= d {
            let mut x = if k == -d || (k != d && vf[k - 1] < vf[k + 1]) {
                vf[k + 1]
            } else {
                vf[k - 1] + 1
            };
            let y = (x as isize - k) as usize;
            let (x0, y0) = (x, y);
            if x < n && y < m {
                x += common_prefix(&a[ar.start + x..ar.end], &b[br.start + y..br.end]);
            }
            vf[k] = x;
            if odd && (k - delta).abs() < d && vf[k] + vb[delta - k] >= n {
                return (ar.start + x0, br.start + y0);
            }
            k += 2;
        }

        let mut k = -d;
        while k <= d {
            let mut x = if k == -d || (k != d && vb[k - 1] < vb[k + 1]) {
                vb[k + 1]
            } else {
                vb[k - 1] + 1
            };
            let mut y = (x as isize - k) as usize;
            if x < n && y < m {
                let run = common_suffix(&a[ar.start..ar.end - x], &b[br.start..br.end - y]);
                x += run;
                y += run;
            }
            vb[k] = x;
            if !odd && (k - delta).abs() <= d && vb[k] + vf[delta - k] >= n {
                return (ar.end - x, br.end - y);
            }
            k += 2;
        }
    }
    // The forward and backward searches always meet by `d_max`.
    (ar.end, br.start)
}

fn conquer(
    a: &[u32],
    mut ar: Range<usize>,
    b: &[u32],
    mut br: Range<usize>,
    vf: &mut Diagonals,
    vb: &mut Diagonals,
    out: &mut Vec<Edit>,
) {
    let prefix = common_prefix(&a[ar.clone()], &b[br.clone()]);
    for i in 0..prefix {
        out.push(Edit {
            op: EditOp::Equal,
            old_index: ar.start + i,
            new_index: br.start + i,
        });
    }
    ar.start += prefix;
    br.start += prefix;

    let suffix = common_suffix(&a[ar.clone()], &b[br.clone()]);
    ar.end -= suffix;
    br.end -= suffix;

    if ar.is_empty() {
        out.extend(br.clone().map(|j| Edit {
            op: EditOp::Insert,
            old_index: ar.start,
            new_index: j,
        }));
    } else if br.is_empty() {
        out.extend(ar.clone().map(|i| Edit {
            op: EditOp::Delete,
            old_index: i,
            new_index: br.start,
        }));
    } else {
        let (x, y) = middle_snake(a, ar.clone(), b, br.clone(), vf, vb);
        conquer(a, ar.start..x, b, br.start..y, vf, vb, out);
        conquer(a, x..ar.end, b, y..br.end, vf, vb, out);
    }

    for i in 0..suffix {
        out.push(Edit {
            op: EditOp::Equal,
            old_index: ar.end + i,
            new_index: br.end + i,
        });
    }
}

/// Group an edit script into hunks with `context` lines around each change.
/// Changes separated by at most `2 * context` unchanged lines share a hunk.
pub fn make_hunks(edits: &[Edit], old: &[&[u8]], new: &[&[u8]], context: u32) -> Vec<Hunk> {
    let ctx = context as usize;
    let mut changes: Vec<(usize, usize)> = Vec::new();
    let mut i = 0;
    while i < edits.len() {
        if edits[i].op == EditOp::Equal {
            i += 1;
            continue;
        }
        let start = i;
        while i < edits.len() && edits[i].op != EditOp::Equal {
            i += 1;
        }
        match changes.last_mut() {
            Some(last) if start - last.1 <= 2 * ctx => last.1 = i,
            _ => changes.push((start, i)),
        }
    }

    changes
        .into_iter()
        .map(|(start, end)| {
            let from = start.saturating_sub(ctx);
            let to = (end + ctx).min(edits.len());
            build_hunk(&edits[from..to], old, new)
        })
        .collect()
}

fn build_hunk(edits: &[Edit], old: &[&[u8]], new: &[&[u8]]) -> Hunk {
    let first = edits[0];
    let mut lines = Vec::with_capacity(edits.len());
    let (mut old_count, mut new_count) = (0u32, 0u32);
    for edit in edits {
        match edit.op {
            EditOp::Equal => {
                lines.push(DiffLine::Context(BString::from(old[edit.old_index])));
                old_count += 1;
                new_count += 1;
            }
            EditOp::Delete => {
                lines.push(DiffLine::Deletion(BString::from(old[edit.old_index])));
                old_count += 1;
            }
            EditOp::Insert => {
                lines.push(DiffLine::Addition(BString::from(new[edit.new_index])));
                new_count += 1;
            }
        }
    }
    // A non-empty range names its first line; an empty one the line before.
    let start = |index: usize, count: u32| (index + usize::from(count > 0)) as u32;
    Hunk {
        old_start: start(first.old_index, old_count),
        old_count,
        new_start: start(first.new_index, new_count),
        new_count,
        lines,
    }
}

/// Hunks turning `old` into `new`.
pub fn diff_lines(old: &[u8], new: &[u8], opts: &DiffOptions) -> Vec<Hunk> {
    let old_lines = split_lines(old);
    let new_lines = split_lines(new);
    let edits = diff_edits(&old_lines, &new_lines, opts.ignore_whitespace);
    make_hunks(&edits, &old_lines, &new_lines, opts.context_lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops(old: &[u8], new: &[u8]) -> String {
        let (a, b) = (split_lines(old), split_lines(new));
        diff_edits(&a, &b, false)
            .iter()
            .map(|e| match e.op {
                EditOp::Equal => '=',
                EditOp::Insert => '+',
                EditOp::Delete => '-',
            })
            .collect()
    }

    /// Replaying an edit script must reproduce `new`.
    fn replay(old: &[u8], new: &[u8]) -> Vec<u8> {
        let (a, b) = (split_lines(old), split_lines(new));
        let mut out = Vec::new();
        for e in diff_edits(&a, &b, false) {
            match e.op {
                EditOp::Equal => out.extend_from_slice(a[e.old_index]),
                EditOp::Insert => out.extend_from_slice(b[e.new_index]),
                EditOp::Delete => {}
            }
        }
        out
    }

    #[test]
    fn split_keeps_terminators() {
        assert!(split_lines(b"").is_empty());
        assert_eq!(split_lines(b"a\nb"), vec![&b"a\n"[..], b"b"]);
        assert_eq!(split_lines(b"a\n\n"), vec![&b"a\n"[..], b"\n"]);
    }

    #[test]
    fn simple_scripts() {
        assert_eq!(ops(b"a\nb\nc\n", b"a\nb\nc\n"), "===");
        assert_eq!(ops(b"", b"a\nb\n"), "++");
        assert_eq!(ops(b"a\nb\n", b""), "--");
        assert_eq!(ops(b"a\nb\nc\n", b"a\nc\n"), "=-=");
        assert_eq!(ops(b"a\nb\n", b"a\nb\nc\n"), "==+");
    }

    #[test]
    fn script_is_minimal() {
        // Classic example from Myers' paper: ABCABBA -> CBABAC, D = 5.
        let old = b"A\nB\nC\nA\nB\nB\nA\n";
        let new = b"C\nB\nA\nB\nA\nC\n";
        let script = ops(old, new);
        assert_eq!(script.chars().filter(|&c| c != '=').count(), 5);
        assert_eq!(replay(old, new), new);
    }

    #[test]
    fn replay_reproduces_target() {
        let cases: [(&[u8], &[u8]); 4] = [
            (b"x\ny\nz\n", b"y\nz\nx\n"),
            (b"1\n2\n3\n4\n5\n", b"0\n2\n3\n5\n6\n"),
            (b"same\nno newline", b"same\nno newline\n"),
            (b"a\na\na\n", b"a\nb\na\n"),
        ];
        for (old, new) in cases {
            assert_eq!(replay(old, new), new);
        }
    }

    #[test]
    fn whitespace_can_be_ignored() {
        let (a, b) = (split_lines(b"f(x, y)\n"), split_lines(b"f(x,y)  \n"));
        assert!(diff_edits(&a, &b, true).iter().all(|e| e.op == EditOp::Equal));
        assert!(diff_edits(&a, &b, false).iter().any(|e| e.op != EditOp::Equal));
    }

    #[test]
    fn appended_line_is_one_hunk() {
        let hunks = diff_lines(b"line1\nline2\n", b"line1\nline2\nline3\n", &DiffOptions::default());
        assert_eq!(hunks.len(), 1);
        let h = &hunks[0];
        assert_eq!((h.old_start, h.old_count, h.new_start, h.new_count), (1, 2, 1, 3));
        assert_eq!(h.lines.last(), Some(&DiffLine::Addition("line3\n".into())));
    }

    #[test]
    fn empty_ranges_start_at_preceding_line() {
        let hunks = diff_lines(b"", b"a\n", &DiffOptions::default());
        assert_eq!((hunks[0].old_start, hunks[0].old_count), (0, 0));
        assert_eq!((hunks[0].new_start, hunks[0].new_count), (1, 1));

        let hunks = diff_lines(b"a\nb\n", b"a\n", &DiffOptions { context_lines: 0, ..Default::default() });
        assert_eq!((hunks[0].old_start, hunks[0].old_count), (2, 1));
        assert_eq!((hunks[0].new_start, hunks[0].new_count), (1, 0));
    }

    #[test]
    fn distant_changes_split_into_hunks() {
        let text = |changed: &[usize]| -> Vec<u8> {
            (0..20)
                .flat_map(|i| {
                    let line = if changed.contains(&i) { format!("changed {i}\n") } else { format!("{i}\n") };
                    line.into_bytes()
                })
                .collect()
        };
        let (old, new) = (text(&[]), text(&[1, 18]));
        let hunks = diff_lines(&old, &new, &DiffOptions::default());
        assert_eq!(hunks.len(), 2);
        assert_eq!((hunks[0].old_start, hunks[0].old_count), (1, 5));
        let near = diff_lines(&old, &new, &DiffOptions { context_lines: 9, ..Default::default() });
        assert_eq!(near.len(), 1);
    }
}
