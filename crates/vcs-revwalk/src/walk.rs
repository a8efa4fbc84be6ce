//! Date-ordered history traversal.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use vcs_hash::ObjectId;
use vcs_object::Commit;
use vcs_odb::ObjectDatabase;
use vcs_repository::Repository;

use crate::Result;

#[derive(Debug, Clone, Copy, Default)]
pub struct LogOptions {
    /// Follow only the first parent of merges.
    pub first_parent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub oid: ObjectId,
    pub commit: Commit,
}

struct Queued {
    oid: ObjectId,
    commit: Commit,
    date: i64,
    seq: u64,
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Newest committer date first; on equal dates, whichever was queued first.
impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.date
            .cmp(&other.date)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Iterator over commits reachable from the pushed tips and not from the
/// hidden ones, newest first. Each commit is yielded once.
pub struct RevWalk<'a> {
    odb: &'a ObjectDatabase,
    queue: BinaryHeap<Queued>,
    seen: HashSet<ObjectId>,
    hidden: HashSet<ObjectId>,
    first_parent: bool,
    seq: u64,
}

impl<'a> RevWalk<'a> {
    pub fn new(odb: &'a ObjectDatabase) -> Self {
        Self {
            odb,
            queue: BinaryHeap::new(),
            seen: HashSet::new(),
            hidden: HashSet::new(),
            first_parent: false,
            seq: 0,
        }
    }

    pub fn first_parent(mut self, yes: bool) -> Self {
        self.first_parent = yes;
        self
    }

    /// Start from `oid` (tags are peeled).
    pub fn push(&mut self, oid: ObjectId) -> Result<()> {
        let (oid, commit) = self.odb.peel_to_commit(&oid)?;
        self.enqueue(oid, commit);
        Ok(())
    }

    /// Exclude `oid` and everything reachable from it.
    pub fn hide(&mut self, oid: ObjectId) -> Result<()> {
        let (oid, _) = self.odb.peel_to_commit(&oid)?;
        let mut stack = vec![oid];
        while let Some(current) = stack.pop() {
            if !self.hidden.insert(current) {
                continue;
            }
            let commit = self.odb.read_commit(&current)?;
            stack.extend(commit.parents.iter().filter(|p| !self.hidden.contains(*p)));
        }
        Ok(())
    }

    fn enqueue(&mut self, oid: ObjectId, commit: Commit) {
        if !self.seen.insert(oid) {
            return;
        }
        self.seq += 1;
        self.queue.push(Queued {
            oid,
            date: commit.committer.time.seconds,
            commit,
            seq: self.seq,
        });
    }

    fn next_entry(&mut self) -> Result<Option<LogEntry>> {
        while let Some(Queued { oid, commit, .. }) = self.queue.pop() {
            if self.hidden.contains(&oid) {
                continue;
            }
            let parents = if self.first_parent {
                &commit.parents[..commit.parents.len().min(1)]
            } else {
                &commit.parents[..]
            };
            for parent in parents {
                if self.seen.contains(parent) || self.hidden.contains(parent) {
                    continue;
                }
                let parent_commit = self.odb.read_commit(parent)?;
                self.enqueue(*parent, parent_commit);
            }
            return Ok(Some(LogEntry { oid, commit }));
        }
        Ok(None)
    }
}

impl Iterator for RevWalk<'_> {
    type Item = Result<LogEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

/// Up to `limit` commits reachable from `from`, newest first.
pub fn log(
    repo: &Repository,
    from: ObjectId,
    limit: Option<usize>,
    opts: &LogOptions,
) -> Result<Vec<LogEntry>> {
    let mut walk = RevWalk::new(repo.odb()).first_parent(opts.first_parent);
    walk.push(from)?;
    walk.take(limit.unwrap_or(usize::MAX)).collect()
}

/// Commits reachable from `head` but not from `base`, oldest first.
pub fn commits_between(repo: &Repository, base: ObjectId, head: ObjectId) -> Result<Vec<LogEntry>> {
    let mut walk = RevWalk::new(repo.odb());
    walk.push(head)?;
    walk.hide(base)?;
    let mut out: Vec<LogEntry> = walk.collect::<Result<_>>()?;
    out.reverse();
    Ok(out)
}
