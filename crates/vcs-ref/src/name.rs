use std::fmt;

use crate::RefError;

const FORBIDDEN: &[u8] = b" ~^:?*[\\";

/// Top-level names that are valid without a `refs/` prefix.
const PSEUDO_REFS: &[&str] = &["HEAD", "ORIG_HEAD", "MERGE_HEAD"];

/// A validated reference name such as `refs/heads/main` or `HEAD`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RefName(String);

impl RefName {
    pub fn new(name: impl Into<String>) -> Result<Self, RefError> {
        let name = name.into();
        if let Err(reason) = check(&name) {
            return Err(RefError::InvalidName { name, reason });
        }
        Ok(Self(name))
    }

    pub fn head() -> Self {
        Self("HEAD".to_owned())
    }

    /// `refs/heads/<short>`.
    pub fn branch(short: &str) -> Result<Self, RefError> {
        Self::new(format!("refs/heads/{short}"))
    }

    /// `refs/tags/<short>`.
    pub fn tag(short: &str) -> Result<Self, RefError> {
        Self::new(format!("refs/tags/{short}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_branch(&self) -> bool {
        self.0.starts_with("refs/heads/")
    }

    pub fn is_tag(&self) -> bool {
        self.0.starts_with("refs/tags/")
    }

    pub fn is_pseudo(&self) -> bool {
        PSEUDO_REFS.contains(&self.0.as_str())
    }

    /// `main` for `refs/heads/main`, the full name otherwise.
    pub fn short_name(&self) -> &str {
        self.0
            .strip_prefix("refs/heads/")
            .or_else(|| self.0.strip_prefix("refs/tags/"))
            .unwrap_or(&self.0)
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn check(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("empty");
    }
    if PSEUDO_REFS.contains(&name) {
        return Ok(());
    }
    if !name.starts_with("refs/") {
        return Err("must start with refs/");
    }
    if name.bytes().any(|b| b < 0x20 || b == 0x7f || FORBIDDEN.contains(&b)) {
        return Err("contains a forbidden character");
    }
    if name.contains("..") {
        return Err("contains '..'");
    }
    if name.contains("@{") {
        return Err("contains '@{'");
    }
    if name.ends_with('/') || name.ends_with('.') {
        return Err("ends with '/' or '.'");
    }
    for component in name.split('/') {
        if component.is_empty() {
            return Err("empty path component");
        }
        if component.starts_with('.') {
            return Err("component starts with '.'");
        }
        if component.ends_with(".lock") {
            return Err("component ends with '.lock'");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_names() {
        for ok in ["HEAD", "refs/heads/main", "refs/heads/feature/x-1", "refs/tags/v1.0"] {
            assert!(RefName::new(ok).is_ok(), "{ok}");
        }
    }

    #[test]
    fn rejects_malformed_names() {
        for bad in [
            "",
            "main",
            "refs/heads/",
            "refs/heads//x",
            "refs/heads/a..b",
            "refs/heads/.hidden",
            "refs/heads/x.lock",
            "refs/heads/x.",
            "refs/heads/a b",
            "refs/heads/a~1",
            "refs/heads/a^",
            "refs/heads/a:b",
            "refs/heads/a?",
            "refs/heads/a*",
            "refs/heads/a[",
            "refs/heads/a\\b",
            "refs/heads/a@{1}",
            "refs/heads/tab\there",
        ] {
            assert!(RefName::new(bad).is_err(), "{bad:?}");
        }
    }

    #[test]
    fn short_names() {
        assert_eq!(RefName::branch("dev").unwrap().short_name(), "dev");
        assert_eq!(RefName::tag("v1").unwrap().short_name(), "v1");
        assert_eq!(RefName::head().short_name(), "HEAD");
    }
}
