//! INI-file parser.
//!
//! Ported line-for-line in spirit from `original_source/src/inifile.c`:
//! BOM stripping, a hard 1024-byte line cap (`spec.md` §9 preserves this as
//! an intentional limitation, not something to silently lift), three value
//! forms tried in order (`"quoted"`, `'quoted'`, bare-up-to-comment),
//! later-key-wins replacement within a section, and empty sections dropped
//! rather than kept.
//!
//! Parsing is lazy: [`IniFile::new`] only remembers the path; nothing is
//! read until [`IniFile::parse`], which is idempotent -- a second call is a
//! no-op that returns `Ok(())` again, mirroring `is_parsed` in the original.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, IoKind, Result};
use crate::list::List;

/// Hard cap on a single physical line's length, preserved from the
/// original's `U_INI_FILE_MAX_LINE`: the C parser used `sscanf("%[^=]")`
/// patterns that silently drop anything past this length, and `spec.md` §9
/// says to keep that behavior rather than quietly support longer lines.
const MAX_LINE: usize = 1024;

/// One `key = value` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub value: String,
}

/// A `[section]` and its parameters, in file order.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    keys: Vec<Parameter>,
}

impl Section {
    fn find(&self, key: &str) -> Option<&str> {
        self.keys.iter().rev().find(|p| p.name == key).map(|p| p.value.as_str())
    }

    fn set(&mut self, name: &str, value: &str) {
        if let Some(existing) = self.keys.iter_mut().find(|p| p.name == name) {
            existing.value = value.to_string();
        } else {
            self.keys.push(Parameter { name: name.to_string(), value: value.to_string() });
        }
    }
}

/// A parsed (or not-yet-parsed) INI document.
pub struct IniFile {
    path: PathBuf,
    parsed: bool,
    sections: Vec<Section>,
}

impl IniFile {
    /// Remembers `path`; nothing is read until [`IniFile::parse`].
    pub fn new(path: impl AsRef<Path>) -> Self {
        IniFile { path: path.as_ref().to_path_buf(), parsed: false, sections: Vec::new() }
    }

    pub fn is_parsed(&self) -> bool {
        self.parsed
    }

    /// Reads and parses the file. A no-op returning `Ok(())` if already
    /// parsed.
    pub fn parse(&mut self) -> Result<()> {
        if self.parsed {
            return Ok(());
        }
        let contents = fs::read(&self.path)
            .map_err(|e| Error::io(IoKind::NotExists, e.raw_os_error().unwrap_or(0), "failed to open file for reading"))?;
        let text = strip_bom(&contents);
        let text = String::from_utf8_lossy(text);

        let mut sections = Vec::new();
        let mut current: Option<Section> = None;

        for raw_line in text.lines() {
            let mut line = raw_line;
            if line.len() > MAX_LINE {
                line = &line[..MAX_LINE];
            }
            let line = strip_trailing_comment(line).trim();
            if line.is_empty() {
                continue;
            }

            if line.starts_with('[') && line.ends_with(']') {
                if let Some(section) = current.take() {
                    if !section.keys.is_empty() {
                        sections.push(section);
                    }
                }
                let name = line[1..line.len() - 1].trim().to_string();
                current = Some(Section { name, keys: Vec::new() });
                continue;
            }

            if let Some((key, value)) = parse_keyvalue(line) {
                if let Some(section) = current.as_mut() {
                    section.set(&key, &value);
                }
            }
        }
        if let Some(section) = current.take() {
            if !section.keys.is_empty() {
                sections.push(section);
            }
        }

        self.sections = sections;
        self.parsed = true;
        Ok(())
    }

    /// Section names, in file order. Empty until [`IniFile::parse`] runs.
    pub fn sections(&self) -> List<String> {
        self.sections.iter().map(|s| s.name.clone()).collect()
    }

    /// Key names within `section`, in file order (last-wins already
    /// applied). `None` if the section doesn't exist or the file hasn't
    /// been parsed.
    pub fn keys(&self, section: &str) -> Option<List<String>> {
        if !self.parsed {
            return None;
        }
        self.find_section(section).map(|s| s.keys.iter().map(|p| p.name.clone()).collect())
    }

    pub fn is_key_exists(&self, section: &str, key: &str) -> bool {
        self.parsed && self.find_section(section).is_some_and(|s| s.find(key).is_some())
    }

    fn find_section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    fn find(&self, section: &str, key: &str) -> Option<&str> {
        if !self.parsed {
            return None;
        }
        self.find_section(section).and_then(|s| s.find(key))
    }

    pub fn parameter_string(&self, section: &str, key: &str, default_val: &str) -> String {
        self.find(section, key).unwrap_or(default_val).to_string()
    }

    pub fn parameter_int(&self, section: &str, key: &str, default_val: i64) -> i64 {
        self.find(section, key).and_then(|v| v.trim().parse::<i64>().ok()).unwrap_or(default_val)
    }

    /// Locale-independent: the decimal separator is always `.`, mirroring
    /// `u_strtod` rather than the libc `strtod` this crate runs under,
    /// which on some hosts honors the process locale.
    pub fn parameter_double(&self, section: &str, key: &str, default_val: f64) -> f64 {
        self.find(section, key).and_then(|v| parse_locale_independent_double(v.trim())).unwrap_or(default_val)
    }

    /// Accepts the case-insensitive tokens `true`/`false`, or any positive
    /// integer as true; everything else (including a non-numeric,
    /// non-boolean string) is false. `spec.md` §9 notes the original's
    /// `strcasecmp`-shaped dead-branch bug here; this implements the
    /// documented intended behavior, not the bug.
    pub fn parameter_bool(&self, section: &str, key: &str, default_val: bool) -> bool {
        match self.find(section, key) {
            None => default_val,
            Some(v) => {
                if v.eq_ignore_ascii_case("true") {
                    true
                } else if v.eq_ignore_ascii_case("false") {
                    false
                } else {
                    v.trim().parse::<i64>().map(|n| n > 0).unwrap_or(false)
                }
            }
        }
    }

    /// Parses a `{ tok1 tok2 ... }` value into its whitespace-separated
    /// tokens. `None` if the key is missing or its value isn't a `{...}`
    /// list.
    pub fn parameter_list(&self, section: &str, key: &str) -> Option<Vec<String>> {
        let val = self.find(section, key)?;
        let trimmed = val.trim();
        if trimmed.len() < 2 || !trimmed.starts_with('{') || !trimmed.ends_with('}') {
            return None;
        }
        let inner = &trimmed[1..trimmed.len() - 1];
        Some(inner.split_whitespace().map(|s| s.to_string()).collect())
    }
}

fn strip_bom(bytes: &[u8]) -> &[u8] {
    if bytes.starts_with(&[0xEF, 0xBB, 0xBF]) {
        &bytes[3..]
    } else if bytes.starts_with(&[0x00, 0x00, 0xFE, 0xFF]) || bytes.starts_with(&[0xFF, 0xFE, 0x00, 0x00]) {
        &bytes[4..]
    } else if bytes.starts_with(&[0xFE, 0xFF]) || bytes.starts_with(&[0xFF, 0xFE]) {
        &bytes[2..]
    } else {
        bytes
    }
}

/// Strips a trailing `;` or `#` comment, unless it appears inside a quoted
/// value.
fn strip_trailing_comment(line: &str) -> &str {
    let mut in_single = false;
    let mut in_double = false;
    for (i, c) in line.char_indices() {
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            ';' | '#' if !in_single && !in_double => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Tries, in order: `key = "..."`, `key = '...'`, `key = bare`.
fn parse_keyvalue(line: &str) -> Option<(String, String)> {
    let eq = line.find('=')?;
    let key = line[..eq].trim();
    if key.is_empty() {
        return None;
    }
    let rest = line[eq + 1..].trim();

    let value = if rest.len() >= 2 && rest.starts_with('"') && rest.ends_with('"') {
        &rest[1..rest.len() - 1]
    } else if rest.len() >= 2 && rest.starts_with('\'') && rest.ends_with('\'') {
        &rest[1..rest.len() - 1]
    } else {
        rest
    };

    let value = if value == "\"\"" || value == "''" { "" } else { value };
    Some((key.to_string(), value.trim().to_string()))
}

/// Hand-rolled decimal parser so the `.` separator is never swapped for a
/// locale's `,`, with the exponent clamped at 308 the way `u_strtod` clamps
/// overflowing exponents to `DBL_MAX_10_EXP`.
fn parse_locale_independent_double(s: &str) -> Option<f64> {
    if let Some(exp_pos) = s.to_ascii_lowercase().find('e') {
        let mantissa = &s[..exp_pos];
        let exponent: i32 = s[exp_pos + 1..].parse().ok()?;
        let clamped = exponent.clamp(-308, 308);
        let value: f64 = mantissa.parse().ok()?;
        Some(value * 10f64.powi(clamped))
    } else {
        s.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_test_ini() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "[empty_section]\n\
             [numeric_section]\n\
             int_parameter_1 = 4\n\
             float_parameter_1 = 3.24\n\
             [string_section]\n\
             string_parameter_1 = \"Test string\"\n\
             string_parameter_2 = \"Test string with #'\"\n\
             [boolean_section]\n\
             boolean_parameter_1 = true\n\
             boolean_parameter_2 = false\n\
             [list_section]\n\
             list_parameter_1 = {1 2 6 9}\n"
        )
        .unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn ini_round_trip_scenario() {
        let file = write_test_ini();
        let mut ini = IniFile::new(file.path());
        ini.parse().unwrap();
        ini.parse().unwrap(); // idempotent

        let names: Vec<String> = ini.sections().iter().cloned().collect();
        assert_eq!(names.len(), 4);
        assert!(!names.contains(&"empty_section".to_string()));

        assert_eq!(ini.parameter_int("numeric_section", "int_parameter_1", -1), 4);
        assert_eq!(ini.parameter_double("numeric_section", "float_parameter_1", -1.0), 3.24);
        assert_eq!(ini.parameter_string("string_section", "string_parameter_2", "default"), "Test string with #'");
        assert_eq!(ini.parameter_bool("boolean_section", "boolean_parameter_2", true), false);

        let list = ini.parameter_list("list_section", "list_parameter_1").unwrap();
        assert_eq!(list.len(), 4);
        let sum: i64 = list.iter().map(|s| s.parse::<i64>().unwrap()).sum();
        assert_eq!(sum, 18);
    }

    #[test]
    fn missing_key_returns_default() {
        let file = write_test_ini();
        let mut ini = IniFile::new(file.path());
        ini.parse().unwrap();
        assert_eq!(ini.parameter_string("numeric_section", "does_not_exist", "fallback"), "fallback");
        assert_eq!(ini.parameter_int("numeric_section", "does_not_exist", 77), 77);
    }

    #[test]
    fn later_value_replaces_earlier_one() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[s]\nkey = first\nkey = second\n").unwrap();
        file.flush().unwrap();
        let mut ini = IniFile::new(file.path());
        ini.parse().unwrap();
        assert_eq!(ini.parameter_string("s", "key", ""), "second");
    }

    #[test]
    fn bool_accepts_positive_integers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[s]\nflag = 3\nother = 0\n").unwrap();
        file.flush().unwrap();
        let mut ini = IniFile::new(file.path());
        ini.parse().unwrap();
        assert!(ini.parameter_bool("s", "flag", false));
        assert!(!ini.parameter_bool("s", "other", true));
    }

    #[test]
    fn comment_is_stripped_outside_quotes_but_kept_inside() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[s]\nkey = value ; trailing comment\nquoted = \"has # inside\"\n").unwrap();
        file.flush().unwrap();
        let mut ini = IniFile::new(file.path());
        ini.parse().unwrap();
        assert_eq!(ini.parameter_string("s", "key", ""), "value");
        assert_eq!(ini.parameter_string("s", "quoted", ""), "has # inside");
    }

    #[test]
    fn unparsed_file_accessors_return_defaults() {
        let ini = IniFile::new("/nonexistent/path.ini");
        assert!(!ini.is_parsed());
        assert_eq!(ini.parameter_string("s", "k", "fallback"), "fallback");
        assert!(!ini.is_key_exists("s", "k"));
    }

    #[test]
    fn parsing_a_missing_file_fails() {
        let mut ini = IniFile::new("/nonexistent/path.ini");
        assert!(ini.parse().is_err());
    }
}
