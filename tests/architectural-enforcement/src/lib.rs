//! Architectural Enforcement
//!
//! Source scanners shared by the policy tests in `tests/`. The scanners are
//! line based: they find calls by substring and decide whether the enclosing
//! function is test code, async, or sync by scanning backwards for the
//! nearest function header. Closures and `async` blocks are attributed to the
//! function that contains them.

use std::fs;
use std::path::{Path, PathBuf};

/// Production source trees checked by the policy tests, relative to the
/// workspace root
pub const PRODUCTION_DIRS: &[&str] = &["palette/core/src", "palette/cli/src"];

/// Workspace root, resolved from this crate's manifest directory
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../..")
}

/// Every `.rs` file below `dir`; a missing directory yields nothing
#[must_use]
pub fn rust_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        return Vec::new();
    }
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .map(walkdir::DirEntry::into_path)
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("rs"))
        .collect();
    files.sort();
    files
}

/// A single offending line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File the line is in
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// Trimmed source text
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} - {}", self.path.display(), self.line, self.text)
    }
}

/// Kind of function a line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Enclosing {
    /// `#[test]`, `#[tokio::test]`, or anything inside a `#[cfg(test)]` module
    Test,
    /// An `async fn`
    Async,
    /// A plain `fn`
    Sync,
    /// Not inside any function
    Module,
}

/// Code portion of a line, with any trailing `//` comment removed
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Whether a trimmed line opens a function, with or without `pub`/`async`
#[must_use]
pub fn is_fn_header(trimmed: &str) -> bool {
    if trimmed.starts_with("//") {
        return false;
    }
    let rest = trimmed
        .strip_prefix("pub(crate) ")
        .or_else(|| trimmed.strip_prefix("pub(super) "))
        .or_else(|| trimmed.strip_prefix("pub "))
        .unwrap_or(trimmed);
    let rest = rest.strip_prefix("const ").unwrap_or(rest);
    let rest = rest.strip_prefix("async ").unwrap_or(rest);
    rest.starts_with("fn ")
}

fn is_test_attribute(trimmed: &str) -> bool {
    trimmed.starts_with("#[test]") || trimmed.starts_with("#[tokio::test")
}

/// Classify the function enclosing `lines[idx]`
#[must_use]
pub fn enclosing(lines: &[&str], idx: usize) -> Enclosing {
    let in_test_module = lines[..idx].windows(2).any(|pair| {
        pair[0].trim_start().starts_with("#[cfg(test)]") && pair[1].trim_start().starts_with("mod ")
    });
    if in_test_module {
        return Enclosing::Test;
    }

    for i in (0..=idx).rev() {
        let trimmed = lines[i].trim_start();
        if !is_fn_header(trimmed) {
            continue;
        }
        let attributed_test = lines[..i]
            .iter()
            .rev()
            .map(|l| l.trim_start())
            .take_while(|l| l.starts_with("#[") || l.starts_with("///"))
            .any(is_test_attribute);
        if attributed_test {
            return Enclosing::Test;
        }
        return if trimmed.contains("async fn ") {
            Enclosing::Async
        } else {
            Enclosing::Sync
        };
    }
    Enclosing::Module
}

/// Scan every production file with `check`, which sees the file's lines and
/// the index of the line under test
#[must_use]
pub fn scan_production<F>(check: F) -> Vec<Violation>
where
    F: Fn(&[&str], usize) -> bool,
{
    let root = workspace_root();
    let mut violations = Vec::new();
    for dir in PRODUCTION_DIRS {
        for path in rust_files(&root.join(dir)) {
            let Ok(content) = fs::read_to_string(&path) else {
                continue;
            };
            violations.extend(scan_source(&path, &content, &check));
        }
    }
    violations
}

/// Scan one file's content
pub fn scan_source<F>(path: &Path, content: &str, check: F) -> Vec<Violation>
where
    F: Fn(&[&str], usize) -> bool,
{
    let lines: Vec<&str> = content.lines().collect();
    (0..lines.len())
        .filter(|&idx| check(&lines, idx))
        .map(|idx| Violation {
            path: path.to_path_buf(),
            line: idx + 1,
            text: lines[idx].trim().to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_header_variants() {
        assert!(is_fn_header("fn load() {"));
        assert!(is_fn_header("pub fn load() {"));
        assert!(is_fn_header("pub async fn drive(self) {"));
        assert!(is_fn_header("pub(crate) fn fresh() -> Self {"));
        assert!(is_fn_header("async fn run() {"));
        assert!(!is_fn_header("// fn commented()"));
        assert!(!is_fn_header("let f = |x| x;"));
    }

    #[test]
    fn test_enclosing_kinds() {
        let source = [
            "pub fn load() {",
            "    std::fs::read_to_string(p);",
            "}",
            "pub async fn fetch() {",
            "    let x = 1;",
            "}",
            "#[tokio::test]",
            "async fn test_fetch() {",
            "    let y = 2;",
            "}",
        ];
        assert_eq!(enclosing(&source, 1), Enclosing::Sync);
        assert_eq!(enclosing(&source, 4), Enclosing::Async);
        assert_eq!(enclosing(&source, 8), Enclosing::Test);
    }

    #[test]
    fn test_cfg_test_module_is_test_code() {
        let source = [
            "fn helper() {}",
            "#[cfg(test)]",
            "mod tests {",
            "    fn make() {",
            "        std::thread::sleep(d);",
            "    }",
            "}",
        ];
        assert_eq!(enclosing(&source, 0), Enclosing::Sync);
        assert_eq!(enclosing(&source, 4), Enclosing::Test);
    }

    #[test]
    fn test_cfg_test_item_does_not_cover_later_code() {
        let source = [
            "#[cfg(test)]",
            "pub fn get_ref(&self) -> &W { &self.out }",
            "async fn resync(&mut self) {",
            "    std::fs::read(p);",
            "}",
        ];
        assert_eq!(enclosing(&source, 3), Enclosing::Async);
    }

    #[test]
    fn test_scan_source_reports_line_numbers() {
        let source = "fn a() {}\nfn b() { bad(); }\n";
        let found = scan_source(Path::new("x.rs"), source, |lines, idx| {
            code_part(lines[idx]).contains("bad(")
        });
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].line, 2);
        assert_eq!(found[0].to_string(), "x.rs:2 - fn b() { bad(); }");
    }

    #[test]
    fn test_production_dirs_exist() {
        let root = workspace_root();
        for dir in PRODUCTION_DIRS {
            assert!(
                !rust_files(&root.join(dir)).is_empty(),
                "no sources under {dir}"
            );
        }
    }
}
