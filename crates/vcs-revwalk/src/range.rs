//! Revision expressions: `<name>`, `<hex>`, with any mix of `~N` and `^N`
//! suffixes.

use vcs_hash::ObjectId;
use vcs_ref::RefName;
use vcs_repository::Repository;

use crate::{Result, RevWalkError};

const MIN_PREFIX: usize = 4;

enum Step {
    /// `~N`: N first-parent hops.
    Ancestor(usize),
    /// `^N`: the Nth parent; `^0` is the commit itself.
    Parent(usize),
}

fn split_suffixes(spec: &str) -> Result<(&str, Vec<Step>)> {
    let invalid = || RevWalkError::InvalidRevision(spec.to_owned());
    let Some(start) = spec.find(['~', '^']) else {
        return Ok((spec, Vec::new()));
    };
    let (base, mut rest) = spec.split_at(start);
    if base.is_empty() {
        return Err(invalid());
    }

    let mut steps = Vec::new();
    while let Some(op) = rest.chars().next() {
        rest = &rest[1..];
        let digits = rest.len() - rest.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        let n = if digits == 0 {
            1
        } else {
            rest[..digits].parse().map_err(|_| invalid())?
        };
        rest = &rest[digits..];
        steps.push(match op {
            '~' => Step::Ancestor(n),
            '^' => Step::Parent(n),
            _ => return Err(invalid()),
        });
    }
    Ok((base, steps))
}

fn resolve_base(repo: &Repository, name: &str) -> Result<ObjectId> {
    let candidates = [
        name.to_owned(),
        format!("refs/{name}"),
        format!("refs/tags/{name}"),
        format!("refs/heads/{name}"),
    ];
    for candidate in &candidates {
        let Ok(refname) = RefName::new(candidate.as_str()) else {
            continue;
        };
        if let Some(oid) = repo.refs().resolve(&refname)? {
            return Ok(oid);
        }
    }

    let algo = repo.hash_algo();
    if name.len() >= MIN_PREFIX
        && name.len() <= algo.hex_len()
        && name.bytes().all(|b| b.is_ascii_hexdigit())
    {
        if let Ok(oid) = repo.odb().resolve_prefix(name) {
            return Ok(oid);
        }
    }
    Err(RevWalkError::UnknownRevision(name.to_owned()))
}

/// Resolve a revision expression to a commit id. Tags are peeled before
/// any parent step is taken.
pub fn resolve_revision(repo: &Repository, spec: &str) -> Result<ObjectId> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(RevWalkError::InvalidRevision(spec.to_owned()));
    }
    let (base, steps) = split_suffixes(spec)?;
    let mut oid = resolve_base(repo, base)?;
    if steps.is_empty() {
        return Ok(oid);
    }

    let odb = repo.odb();
    for step in steps {
        let (current, commit) = odb.peel_to_commit(&oid)?;
        oid = match step {
            Step::Parent(0) => current,
            Step::Parent(n) => *commit
                .parents
                .get(n - 1)
                .ok_or(RevWalkError::NoSuchParent(current, n))?,
            Step::Ancestor(n) => {
                let mut at = current;
                let mut parents = commit.parents;
                for _ in 0..n {
                    let Some(first) = parents.first().copied() else {
                        return Err(RevWalkError::NoSuchParent(at, 1));
                    };
                    at = first;
                    parents = odb.read_commit(&at)?.parents;
                }
                at
            }
        };
    }
    Ok(oid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_parsing() {
        let (base, steps) = split_suffixes("main~2^2^").unwrap();
        assert_eq!(base, "main");
        let shape: Vec<_> = steps
            .iter()
            .map(|s| match s {
                Step::Ancestor(n) => ('~', *n),
                Step::Parent(n) => ('^', *n),
            })
            .collect();
        assert_eq!(shape, vec![('~', 2), ('^', 2), ('^', 1)]);
    }

    #[test]
    fn bare_suffix_is_invalid() {
        assert!(matches!(
            split_suffixes("~1"),
            Err(RevWalkError::InvalidRevision(_))
        ));
    }

    #[test]
    fn plain_name_has_no_steps() {
        let (base, steps) = split_suffixes("v1.0").unwrap();
        assert_eq!(base, "v1.0");
        assert!(steps.is_empty());
    }
}
