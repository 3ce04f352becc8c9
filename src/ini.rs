//! Parser for the INI-like shared credentials and config files.
//!
//! Syntax errors are collected with their location and parsing continues
//! with the next line, so one malformed section never hides the rest of the
//! file.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Key/value settings of one section. Keys are lower-cased.
pub type Section = BTreeMap<String, String>;

/// A syntax error at a specific line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// File the error was found in
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// What was wrong
    pub message: String,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}: {}", self.path.display(), self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Sections parsed from one file plus the errors met along the way.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFile {
    /// Sections by name, in name order
    pub sections: BTreeMap<String, Section>,
    /// Syntax errors, in line order
    pub errors: Vec<ParseError>,
}

/// Parses `contents`, attributing errors to `path`.
///
/// - `#` and `;` start comment lines.
/// - `[name]` opens a section; repeating a name merges into it.
/// - `key = value` assigns within the current section; later keys win.
/// - An indented line continues the previous value (nested settings).
///
/// Lines following a malformed section header are skipped until the next
/// valid header.
///
/// ```
/// use credmux::ini;
/// use std::path::Path;
///
/// let parsed = ini::parse(Path::new("credentials"), "[default]\naws_access_key_id = AKID\n[broken\n");
/// assert_eq!(parsed.sections["default"]["aws_access_key_id"], "AKID");
/// assert_eq!(parsed.errors.len(), 1);
/// assert_eq!(parsed.errors[0].line, 3);
/// ```
pub fn parse(path: &Path, contents: &str) -> ParsedFile {
    let mut parsed = ParsedFile::default();
    let mut current: Option<String> = None;
    let mut last_key: Option<String> = None;
    let mut skipping = false;

    for (index, raw) in contents.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = raw.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        let error_at = |message: String| ParseError {
            path: path.to_path_buf(),
            line: line_no,
            message,
        };

        if trimmed.starts_with('[') {
            last_key = None;
            match parse_header(trimmed) {
                Ok(name) => {
                    parsed.sections.entry(name.clone()).or_default();
                    current = Some(name);
                    skipping = false;
                }
                Err(message) => {
                    parsed.errors.push(error_at(message));
                    current = None;
                    skipping = true;
                }
            }
            continue;
        }

        if skipping {
            continue;
        }

        let Some(section_name) = current.as_ref() else {
            parsed
                .errors
                .push(error_at("property outside of any section".to_string()));
            continue;
        };

        let indented = raw.starts_with(char::is_whitespace);
        if indented {
            if let Some(key) = last_key.as_ref() {
                if let Some(value) = parsed
                    .sections
                    .get_mut(section_name)
                    .and_then(|section| section.get_mut(key))
                {
                    if !value.is_empty() {
                        value.push('\n');
                    }
                    value.push_str(trimmed);
                    continue;
                }
            }
        }

        match trimmed.split_once('=') {
            Some((key, value)) => {
                let key = key.trim().to_ascii_lowercase();
                if key.is_empty() {
                    parsed.errors.push(error_at("empty property name".to_string()));
                    continue;
                }
                parsed
                    .sections
                    .entry(section_name.clone())
                    .or_default()
                    .insert(key.clone(), value.trim().to_string());
                last_key = Some(key);
            }
            None => parsed.errors.push(error_at(format!(
                "expected 'key = value', found '{}'",
                trimmed
            ))),
        }
    }

    parsed
}

fn parse_header(line: &str) -> std::result::Result<String, String> {
    let inner = line
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| format!("section header is missing ']': '{}'", line))?;

    let name = inner.trim();
    if name.is_empty() {
        return Err("empty section name".to_string());
    }

    Ok(name.split_whitespace().collect::<Vec<_>>().join(" "))
}
