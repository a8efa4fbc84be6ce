use std::fmt;

use crate::ConfigError;

/// `section.name` or `section.subsection.name`.
///
/// Section and name compare case-insensitively and are stored lowercased.
/// The subsection keeps its case and may itself contain dots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConfigKey {
    pub section: String,
    pub subsection: Option<String>,
    pub name: String,
}

impl ConfigKey {
    pub fn parse(key: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidKey(key.to_owned());
        let (section, rest) = key.trim().split_once('.').ok_or_else(invalid)?;
        let (subsection, name) = match rest.rsplit_once('.') {
            Some((sub, name)) => (Some(sub.to_owned()), name),
            None => (None, rest),
        };
        if !is_name(section) || !is_name(name) {
            return Err(invalid());
        }
        Ok(Self {
            section: section.to_ascii_lowercase(),
            subsection,
            name: name.to_ascii_lowercase(),
        })
    }

    pub(crate) fn in_section(&self, section: &str, subsection: Option<&str>) -> bool {
        self.section == section && self.subsection.as_deref() == subsection
    }
}

/// Alphanumerics and `-`, starting with a letter.
pub(crate) fn is_name(s: &str) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subsection {
            Some(sub) => write!(f, "{}.{}.{}", self.section, sub, self.name),
            None => write!(f, "{}.{}", self.section, self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_rules() {
        let key = ConfigKey::parse("Diff.RenameThreshold").unwrap();
        assert_eq!(key.to_string(), "diff.renamethreshold");
        let key = ConfigKey::parse("branch.Feature.x.merge").unwrap();
        assert_eq!(key.subsection.as_deref(), Some("Feature.x"));
        assert_eq!(key.name, "merge");
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "nodot", "core.", ".name", "core.1abc", "co re.x"] {
            assert!(ConfigKey::parse(bad).is_err(), "{bad:?}");
        }
    }
}
