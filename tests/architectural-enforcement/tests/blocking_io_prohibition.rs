//! Blocking I/O Prohibition
//!
//! Async functions must not block the runtime: no `std::fs`, no `std::net`,
//! no synchronous stdio and no nested `block_on`. Sync functions may use
//! them (configuration is read before the runtime starts).

use architectural_enforcement::{code_part, enclosing, scan_production, Enclosing};

const BLOCKING_CALLS: &[&str] = &[
    "std::fs::",
    "std::net::",
    "std::io::stdin()",
    "std::io::stdout()",
    "std::thread::spawn(",
    ".read_line(",
    "block_on(",
];

fn is_blocking_in_async(lines: &[&str], idx: usize) -> bool {
    let code = code_part(lines[idx]);
    BLOCKING_CALLS.iter().any(|call| code.contains(call))
        && enclosing(lines, idx) == Enclosing::Async
}

#[test]
fn test_no_blocking_io_in_async_code() {
    let violations = scan_production(is_blocking_in_async);

    if !violations.is_empty() {
        eprintln!("\nBlocking calls found inside async functions:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nUse tokio::fs, tokio::io or spawn_blocking instead.");
        panic!("Found {} blocking call(s) in async code", violations.len());
    }
}

#[test]
fn test_detector_flags_async_fs() {
    let source = [
        "pub async fn save(path: &Path) {",
        "    std::fs::write(path, b\"x\").unwrap();",
        "}",
    ];
    assert!(is_blocking_in_async(&source, 1));
}

#[test]
fn test_detector_allows_sync_fs() {
    let source = [
        "pub fn load_config_from_path(path: &Path) -> Result<String> {",
        "    std::fs::read_to_string(path)",
        "}",
    ];
    assert!(!is_blocking_in_async(&source, 1));
}
