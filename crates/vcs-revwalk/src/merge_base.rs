//! Common ancestors by painting.
//!
//! Both commits are walked newest-first at the same time. Commits reachable
//! from `a` get PARENT1, from `b` PARENT2. A commit carrying both is a
//! common ancestor; its own ancestors are then painted STALE, since they
//! can only be worse answers. The walk stops once every queued commit is
//! stale.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};

use bitflags::bitflags;
use tracing::debug;
use vcs_hash::ObjectId;
use vcs_odb::ObjectDatabase;
use vcs_repository::Repository;

use crate::Result;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    struct Paint: u8 {
        const PARENT1 = 1 << 0;
        const PARENT2 = 1 << 1;
        const STALE = 1 << 2;
        const RESULT = 1 << 3;
    }
}

struct Entry {
    oid: ObjectId,
    date: i64,
    seq: u64,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.date.cmp(&other.date).then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Painter<'a> {
    odb: &'a ObjectDatabase,
    paint: HashMap<ObjectId, Paint>,
    queue: BinaryHeap<Entry>,
    seq: u64,
}

impl<'a> Painter<'a> {
    fn new(odb: &'a ObjectDatabase) -> Self {
        Self {
            odb,
            paint: HashMap::new(),
            queue: BinaryHeap::new(),
            seq: 0,
        }
    }

    fn flags(&self, oid: &ObjectId) -> Paint {
        self.paint.get(oid).copied().unwrap_or_default()
    }

    fn push(&mut self, oid: ObjectId, flags: Paint) -> Result<()> {
        let date = self.odb.read_commit(&oid)?.committer.time.seconds;
        *self.paint.entry(oid).or_default() |= flags;
        self.seq += 1;
        self.queue.push(Entry {
            oid,
            date,
            seq: self.seq,
        });
        Ok(())
    }

    fn has_nonstale(&self) -> bool {
        self.queue
            .iter()
            .any(|e| !self.flags(&e.oid).contains(Paint::STALE))
    }

    fn paint_down_to_common(mut self, a: ObjectId, b: ObjectId) -> Result<Vec<ObjectId>> {
        self.push(a, Paint::PARENT1)?;
        self.push(b, Paint::PARENT2)?;
        let mut results = Vec::new();

        while self.has_nonstale() {
            let Some(entry) = self.queue.pop() else {
                break;
            };
            let mut flags = self.flags(&entry.oid) & (Paint::PARENT1 | Paint::PARENT2 | Paint::STALE);
            if flags == Paint::PARENT1 | Paint::PARENT2 {
                if !self.flags(&entry.oid).contains(Paint::RESULT) {
                    *self.paint.entry(entry.oid).or_default() |= Paint::RESULT;
                    results.push(entry.oid);
                }
                flags |= Paint::STALE;
            }
            for parent in self.odb.read_commit(&entry.oid)?.parents {
                if self.flags(&parent).contains(flags) {
                    continue;
                }
                self.push(parent, flags)?;
            }
        }

        results.retain(|oid| !self.flags(oid).contains(Paint::STALE));
        Ok(results)
    }
}

/// Whether `ancestor` is reachable from `descendant` (a commit is its own
/// ancestor).
pub fn is_ancestor(repo: &Repository, ancestor: &ObjectId, descendant: &ObjectId) -> Result<bool> {
    reaches(repo.odb(), descendant, ancestor)
}

fn reaches(odb: &ObjectDatabase, from: &ObjectId, target: &ObjectId) -> Result<bool> {
    let mut seen = HashSet::new();
    let mut stack = vec![*from];
    while let Some(oid) = stack.pop() {
        if oid == *target {
            return Ok(true);
        }
        if seen.insert(oid) {
            stack.extend(odb.read_commit(&oid)?.parents);
        }
    }
    Ok(false)
}

/// All best common ancestors of `a` and `b`, newest first. None of the
/// returned commits is an ancestor of another.
pub fn merge_bases(repo: &Repository, a: &ObjectId, b: &ObjectId) -> Result<Vec<ObjectId>> {
    let odb = repo.odb();
    let (a, _) = odb.peel_to_commit(a)?;
    let (b, _) = odb.peel_to_commit(b)?;
    if a == b {
        return Ok(vec![a]);
    }
    let candidates = Painter::new(odb).paint_down_to_common(a, b)?;

    let mut bases = Vec::with_capacity(candidates.len());
    for (i, x) in candidates.iter().enumerate() {
        let mut redundant = false;
        for (j, y) in candidates.iter().enumerate() {
            if i != j && reaches(odb, y, x)? {
                redundant = true;
                break;
            }
        }
        if !redundant {
            bases.push(*x);
        }
    }
    debug!(%a, %b, count = bases.len(), "computed merge bases");
    Ok(bases)
}

/// The best common ancestor, or `None` for unrelated histories.
pub fn merge_base(repo: &Repository, a: &ObjectId, b: &ObjectId) -> Result<Option<ObjectId>> {
    Ok(merge_bases(repo, a, b)?.into_iter().next())
}
