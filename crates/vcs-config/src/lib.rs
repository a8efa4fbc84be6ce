//! Repository configuration (`.vcs/config`).
//!
//! An INI dialect:
//!
//! ```text
//! [core]
//!     compression = 6
//! [merge]
//!     conflictStyle = diff3   ; inline comment
//! [branch "main"]
//!     bare-key-means-true
//! ```
//!
//! Section and key names are case-insensitive; subsections are not. When a
//! key appears more than once the last occurrence wins.

mod error;
mod key;
mod parse;
pub mod types;

pub use error::ConfigError;
pub use key::ConfigKey;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use parse::Event;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Clone, Default)]
pub struct Config {
    events: Vec<Event>,
    path: Option<PathBuf>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(Self {
            events: parse::parse(text)?,
            path: None,
        })
    }

    /// Read a config file. A missing file is an empty config that will be
    /// created by [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = match fs::read(path) {
            Ok(bytes) => String::from_utf8(bytes).map_err(|_| ConfigError::Parse {
                line: 0,
                reason: "file is not UTF-8".into(),
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        let mut config = Self::parse(&text)?;
        config.path = Some(path.to_path_buf());
        Ok(config)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Matching entries in file order, paired with their event index.
    fn entries(&self, key: ConfigKey) -> impl Iterator<Item = (usize, Option<&str>)> + '_ {
        let mut in_section = false;
        self.events.iter().enumerate().filter_map(move |(i, event)| match event {
            Event::Section {
                section,
                subsection,
                ..
            } => {
                in_section = key.in_section(section, subsection.as_deref());
                None
            }
            Event::Entry { name, value, .. } if in_section && *name == key.name => {
                Some((i, value.as_deref()))
            }
            _ => None,
        })
    }

    /// Last value of `key`. Bare keys read as `"true"`.
    pub fn get(&self, key: &str) -> Option<&str> {
        let key = ConfigKey::parse(key).ok()?;
        self.entries(key)
            .last()
            .map(|(_, value)| value.unwrap_or("true"))
    }

    /// Every value of a multi-valued key, in file order.
    pub fn get_all(&self, key: &str) -> Vec<&str> {
        let Ok(key) = ConfigKey::parse(key) else {
            return Vec::new();
        };
        self.entries(key).map(|(_, v)| v.unwrap_or("true")).collect()
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_owned)
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        self.get(key)
            .map(|v| {
                types::parse_bool(v).ok_or_else(|| ConfigError::InvalidBool {
                    key: key.to_owned(),
                    value: v.to_owned(),
                })
            })
            .transpose()
    }

    pub fn get_int(&self, key: &str) -> Result<Option<i64>> {
        self.get(key)
            .map(|v| {
                types::parse_int(v).ok_or_else(|| ConfigError::InvalidInt {
                    key: key.to_owned(),
                    value: v.to_owned(),
                })
            })
            .transpose()
    }

    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        Ok(self.get_bool(key)?.unwrap_or(default))
    }

    pub fn int_or(&self, key: &str, default: i64) -> Result<i64> {
        Ok(self.get_int(key)?.unwrap_or(default))
    }

    /// An integer that must fall in `range`.
    pub fn int_in(&self, key: &str, range: std::ops::RangeInclusive<i64>, default: i64) -> Result<i64> {
        let value = self.int_or(key, default)?;
        if !range.contains(&value) {
            return Err(ConfigError::InvalidValue {
                key: key.to_owned(),
                value: value.to_string(),
                expected: "a value in range",
            });
        }
        Ok(value)
    }

    /// One of a fixed set of case-insensitive words.
    pub fn choice<'a>(&self, key: &str, allowed: &[&'a str], default: &'a str) -> Result<&'a str> {
        let Some(value) = self.get(key) else {
            return Ok(default);
        };
        allowed
            .iter()
            .find(|a| a.eq_ignore_ascii_case(value))
            .copied()
            .ok_or_else(|| ConfigError::InvalidValue {
                key: key.to_owned(),
                value: value.to_owned(),
                expected: "one of the documented words",
            })
    }

    /// Replace the last occurrence of `key`, or add it to the end of its
    /// section, creating the section if needed.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let parsed = ConfigKey::parse(key)?;
        let entry = Event::Entry {
            raw: format!("\t{} = {}\n", parsed.name, parse::quote_value(value)),
            name: parsed.name.clone(),
            value: Some(value.to_owned()),
        };

        let existing = self.entries(parsed.clone()).last().map(|(i, _)| i);
        if let Some(i) = existing {
            self.events[i] = entry;
            return Ok(());
        }

        let mut insert_at = None;
        let mut in_section = false;
        for (i, event) in self.events.iter().enumerate() {
            if let Event::Section {
                section,
                subsection,
                ..
            } = event
            {
                in_section = parsed.in_section(section, subsection.as_deref());
            }
            if in_section {
                insert_at = Some(i + 1);
            }
        }

        match insert_at {
            Some(i) => self.events.insert(i, entry),
            None => {
                if self.events.last().is_some_and(|e| !e.raw().ends_with('\n')) {
                    self.events.push(Event::Other("\n".into()));
                }
                let raw = match &parsed.subsection {
                    Some(sub) => format!("[{} \"{}\"]\n", parsed.section, parse::quote_subsection(sub)),
                    None => format!("[{}]\n", parsed.section),
                };
                self.events.push(Event::Section {
                    raw,
                    section: parsed.section.clone(),
                    subsection: parsed.subsection.clone(),
                });
                self.events.push(entry);
            }
        }
        debug!(key, value, "config set");
        Ok(())
    }

    /// Remove every occurrence of `key`. Returns whether anything was removed.
    pub fn unset(&mut self, key: &str) -> Result<bool> {
        let parsed = ConfigKey::parse(key)?;
        let doomed: Vec<usize> = self.entries(parsed).map(|(i, _)| i).collect();
        for &i in doomed.iter().rev() {
            self.events.remove(i);
        }
        Ok(!doomed.is_empty())
    }

    /// Serialized form. Untouched lines are reproduced byte for byte.
    pub fn to_text(&self) -> String {
        self.events.iter().map(Event::raw).collect()
    }

    /// Write atomically under `<path>.lock`.
    pub fn write_to(&self, path: impl AsRef<Path>) -> Result<()> {
        vcs_utils::lockfile::write_locked(path, self.to_text().as_bytes())?;
        Ok(())
    }

    /// Write back to the file this config was loaded from.
    pub fn save(&self) -> Result<()> {
        let path = self.path.as_ref().ok_or_else(|| {
            ConfigError::Io(io::Error::new(io::ErrorKind::NotFound, "config has no backing file"))
        })?;
        self.write_to(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# repository settings\n[core]\n\tcompression = 6\n\tHashAlgorithm = sha1\n[diff]\n\trenames\n\tcontext = 5 ; wider\n[branch \"Main\"]\n\tnote = x\n";

    #[test]
    fn typed_getters() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.get_int("core.compression").unwrap(), Some(6));
        assert_eq!(config.get("CORE.hashalgorithm"), Some("sha1"));
        assert_eq!(config.get_bool("diff.renames").unwrap(), Some(true));
        assert_eq!(config.int_or("diff.context", 3).unwrap(), 5);
        assert_eq!(config.int_or("diff.renameThreshold", 50).unwrap(), 50);
        assert_eq!(config.get("branch.Main.note"), Some("x"));
        assert_eq!(config.get("branch.main.note"), None);
    }

    #[test]
    fn bad_values_are_invalid() {
        let config = Config::parse("[core]\n\tcompression = lots\n[merge]\n\tconflictStyle = zigzag\n").unwrap();
        assert!(config.get_int("core.compression").is_err());
        assert!(config.choice("merge.conflictStyle", &["merge", "diff3"], "merge").is_err());
        assert_eq!(
            Config::new().choice("merge.conflictStyle", &["merge", "diff3"], "merge").unwrap(),
            "merge"
        );
        assert!(Config::parse("[core]\n\tcompression = 12\n")
            .unwrap()
            .int_in("core.compression", -1..=9, -1)
            .is_err());
    }

    #[test]
    fn last_value_wins() {
        let config = Config::parse("[a]\n\tk = 1\n[b]\n\tk = 2\n[a]\n\tk = 3\n").unwrap();
        assert_eq!(config.get("a.k"), Some("3"));
        assert_eq!(config.get_all("a.k"), ["1", "3"]);
    }

    #[test]
    fn values_outlive_the_key_text() {
        let config = Config::parse("[Core]\n\tCompression = 5\n\tflag\n").unwrap();
        let (one, all) = {
            let key = String::from("core.compression");
            (config.get(&key), config.get_all(&key))
        };
        assert_eq!(one, Some("5"));
        assert_eq!(all, ["5"]);
        assert_eq!(config.get(&"core.flag".to_owned()), Some("true"));
    }

    #[test]
    fn set_preserves_layout() {
        let mut config = Config::parse(SAMPLE).unwrap();
        config.set("core.compression", "9").unwrap();
        config.set("user.name", "A U Thor").unwrap();
        config.set("diff.renameThreshold", "60").unwrap();
        let text = config.to_text();
        assert!(text.starts_with("# repository settings\n[core]\n\tcompression = 9\n"));
        assert!(text.contains("\tcontext = 5 ; wider\n\trenamethreshold = 60\n"));
        assert!(text.ends_with("[user]\n\tname = A U Thor\n"));

        let back = Config::parse(&text).unwrap();
        assert_eq!(back.get("user.name"), Some("A U Thor"));
        assert_eq!(back.get_int("diff.renamethreshold").unwrap(), Some(60));
    }

    #[test]
    fn unset_removes_all() {
        let mut config = Config::parse("[a]\n\tk = 1\n\tk = 2\n").unwrap();
        assert!(config.unset("a.k").unwrap());
        assert_eq!(config.get("a.k"), None);
        assert!(!config.unset("a.k").unwrap());
    }

    #[test]
    fn malformed_lines_report_line_numbers() {
        match Config::parse("[core]\n\t= value\n") {
            Err(ConfigError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected {other:?}"),
        }
    }
}
