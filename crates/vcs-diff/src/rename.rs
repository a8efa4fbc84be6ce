//! Rename and copy detection.
//!
//! Deleted and added paths are paired, exact id matches first. The rest
//! are scored by content similarity and paired greedily, best score first,
//! each side used at most once. Copies may reuse a source any number of
//! times and never remove it from the diff.

use std::collections::HashMap;

use bstr::BString;
use tracing::debug;
use vcs_hash::ObjectId;
use vcs_index::TreeItem;
use vcs_object::FileMode;
use vcs_odb::ObjectDatabase;
use vcs_repository::PathMap;

use crate::algorithm::split_lines;
use crate::tree::{map_changes, Change};
use crate::{DiffOptions, FileStatus, Result};

/// How much of two contents is shared, 0..=100.
///
/// Lines are counted as a multiset weighted by their byte length, so a
/// shared long line counts for more than a shared blank one.
pub fn similarity(a: &[u8], b: &[u8]) -> u8 {
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 100;
    }
    let mut weights: HashMap<&[u8], usize> = HashMap::new();
    for line in split_lines(a) {
        *weights.entry(line).or_default() += line.len();
    }
    let mut shared = 0;
    for line in split_lines(b) {
        if let Some(left) = weights.get_mut(line) {
            let take = line.len().min(*left);
            *left -= take;
            shared += take;
        }
    }
    (shared * 100 / longest) as u8
}

fn candidate(mode: FileMode) -> bool {
    mode.is_blob()
}

struct Loaded {
    oid: ObjectId,
    data: Vec<u8>,
}

fn load(odb: &ObjectDatabase, cache: &mut HashMap<ObjectId, Vec<u8>>, item: &TreeItem) -> Result<Loaded> {
    if let Some(data) = cache.get(&item.oid) {
        return Ok(Loaded {
            oid: item.oid,
            data: data.clone(),
        });
    }
    let data = odb.read_blob(&item.oid)?.data;
    cache.insert(item.oid, data.clone());
    Ok(Loaded {
        oid: item.oid,
        data,
    })
}

/// Indices of `status` changes whose relevant side is a blob.
fn candidates(changes: &[Change], status: FileStatus) -> Vec<usize> {
    changes
        .iter()
        .enumerate()
        .filter(|(_, c)| c.status == status)
        .filter(|(_, c)| {
            let side = if status == FileStatus::Added { &c.new } else { &c.old };
            side.as_ref().is_some_and(|(_, i)| candidate(i.mode))
        })
        .map(|(i, _)| i)
        .collect()
}

/// Turn matching deletion/addition pairs into renames (and, when enabled,
/// additions that resemble an existing file into copies).
pub(crate) fn detect_renames(
    odb: &ObjectDatabase,
    changes: Vec<Change>,
    opts: &DiffOptions,
) -> Result<Vec<Change>> {
    let deleted = candidates(&changes, FileStatus::Deleted);
    let mut added = candidates(&changes, FileStatus::Added);
    if added.is_empty() || (deleted.is_empty() && !opts.detect_copies) {
        return Ok(changes);
    }
    added.sort_by(|&a, &b| changes[a].path().cmp(changes[b].path()));

    // (source change, destination change, score)
    let mut pairs: Vec<(usize, usize, u8)> = Vec::new();
    let mut src_used = vec![false; changes.len()];
    let mut dst_used = vec![false; changes.len()];

    let mut by_oid: HashMap<ObjectId, Vec<usize>> = HashMap::new();
    for &d in &deleted {
        if let Some((_, item)) = &changes[d].old {
            by_oid.entry(item.oid).or_default().push(d);
        }
    }
    for &a in &added {
        let Some((_, item)) = &changes[a].new else { continue };
        let Some(sources) = by_oid.get(&item.oid) else { continue };
        if let Some(&d) = sources.iter().find(|&&d| !src_used[d]) {
            src_used[d] = true;
            dst_used[a] = true;
            pairs.push((d, a, 100));
        }
    }

    let mut cache = HashMap::new();
    let threshold = opts.rename_threshold;
    let mut scored = Vec::new();
    for &d in deleted.iter().filter(|&&d| !src_used[d]) {
        let Some((_, src)) = &changes[d].old else { continue };
        let src = load(odb, &mut cache, src)?;
        for &a in added.iter().filter(|&&a| !dst_used[a]) {
            let Some((_, dst)) = &changes[a].new else { continue };
            let dst = load(odb, &mut cache, dst)?;
            let score = similarity(&src.data, &dst.data);
            if score >= threshold {
                scored.push((d, a, score));
            }
        }
    }
    scored.sort_by(|x, y| {
        y.2.cmp(&x.2)
            .then_with(|| changes[x.1].path().cmp(changes[y.1].path()))
            .then_with(|| changes[x.0].path().cmp(changes[y.0].path()))
    });
    for (d, a, score) in scored {
        if !src_used[d] && !dst_used[a] {
            src_used[d] = true;
            dst_used[a] = true;
            pairs.push((d, a, score));
        }
    }
    let renames = pairs.len();

    let mut copies = Vec::new();
    if opts.detect_copies {
        let sources: Vec<usize> = changes
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                matches!(c.status, FileStatus::Modified | FileStatus::Deleted)
                    && c.old.as_ref().is_some_and(|(_, i)| candidate(i.mode))
            })
            .map(|(i, _)| i)
            .collect();
        for &a in &added {
            if dst_used[a] {
                continue;
            }
            let Some((_, dst)) = &changes[a].new else { continue };
            let dst = load(odb, &mut cache, dst)?;
            let mut best: Option<(usize, u8)> = None;
            for &s in &sources {
                let Some((_, src)) = &changes[s].old else { continue };
                let src = load(odb, &mut cache, src)?;
                let score = if src.oid == dst.oid {
                    100
                } else {
                    similarity(&src.data, &dst.data)
                };
                if score >= threshold && best.map_or(true, |(_, b)| score > b) {
                    best = Some((s, score));
                }
            }
            if let Some((s, score)) = best {
                dst_used[a] = true;
                copies.push((changes[s].old.clone(), a, score));
            }
        }
    }
    debug!(renames, copies = copies.len(), "paired changed paths");

    let mut out: Vec<Option<Change>> = changes.into_iter().map(Some).collect();
    let mut merged = Vec::with_capacity(pairs.len() + copies.len());
    for (s, a, score) in pairs {
        let old = out[s].take().and_then(|c| c.old);
        if let Some(dst) = out[a].take() {
            merged.push(Change {
                status: FileStatus::Renamed,
                old,
                new: dst.new,
                similarity: Some(score),
            });
        }
    }
    for (old, a, score) in copies {
        if let Some(dst) = out[a].take() {
            merged.push(Change {
                status: FileStatus::Copied,
                old,
                new: dst.new,
                similarity: Some(score),
            });
        }
    }
    Ok(out.into_iter().flatten().chain(merged).collect())
}

/// A path that moved between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    pub from: BString,
    pub to: BString,
    pub similarity: u8,
}

/// Renames between two flattened snapshots, without computing any hunks.
/// Copies are not reported.
pub fn find_renames(
    odb: &ObjectDatabase,
    old: &PathMap,
    new: &PathMap,
    opts: &DiffOptions,
) -> Result<Vec<Rename>> {
    let opts = DiffOptions {
        detect_copies: false,
        ..opts.clone()
    };
    let changes = detect_renames(odb, map_changes(old, new), &opts)?;
    Ok(changes
        .into_iter()
        .filter(|c| c.status == FileStatus::Renamed)
        .filter_map(|c| {
            let (from, _) = c.old?;
            let (to, _) = c.new?;
            Some(Rename {
                from,
                to,
                similarity: c.similarity.unwrap_or(100),
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_bounds() {
        assert_eq!(similarity(b"", b""), 100);
        assert_eq!(similarity(b"a\nb\n", b"a\nb\n"), 100);
        assert_eq!(similarity(b"a\n", b"b\n"), 0);
    }

    #[test]
    fn similarity_weights_by_bytes() {
        let long = b"a fairly long line of text\nx\n";
        let edited = b"a fairly long line of text\ny\n";
        assert!(similarity(long, edited) > 90);
        let short = b"x\na fairly long line of text\n";
        let other = b"x\nsomething else entirely here\n";
        assert!(similarity(short, other) < 10);
    }

    #[test]
    fn repeated_lines_count_once_per_occurrence() {
        assert_eq!(similarity(b"x\nx\nx\nx\n", b"x\n"), 25);
    }
}
