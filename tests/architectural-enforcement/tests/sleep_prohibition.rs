//! Sleep Prohibition
//!
//! Production code waits on I/O, channels or cancellation, never on a timer
//! standing in for an event. Periodic work goes through
//! `tokio::time::interval`. Test code may sleep.

use architectural_enforcement::{code_part, enclosing, scan_production, Enclosing};

fn uses_interval(lines: &[&str], idx: usize) -> bool {
    let start = idx.saturating_sub(20);
    let end = (idx + 5).min(lines.len());
    lines[start..end]
        .iter()
        .any(|l| l.contains("interval.tick()") || l.contains("tokio::time::interval"))
}

fn is_forbidden_sleep(lines: &[&str], idx: usize) -> bool {
    let code = code_part(lines[idx]);
    if !(code.contains("::sleep(") || code.contains(".sleep(")) {
        return false;
    }
    enclosing(lines, idx) != Enclosing::Test && !uses_interval(lines, idx)
}

#[test]
fn test_no_sleep_in_production_code() {
    let violations = scan_production(is_forbidden_sleep);

    if !violations.is_empty() {
        eprintln!("\nSleep calls found in production code:\n");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nWait on the stream, a channel or a CancellationToken instead.");
        panic!("Found {} sleep call(s) in production code", violations.len());
    }
}

#[test]
fn test_detector_flags_polling_sleep() {
    let source = [
        "async fn wait_for_reply(&self) {",
        "    loop {",
        "        tokio::time::sleep(Duration::from_millis(10)).await;",
        "    }",
        "}",
    ];
    assert!(is_forbidden_sleep(&source, 2));
}

#[test]
fn test_detector_allows_test_sleep() {
    let source = [
        "#[tokio::test]",
        "async fn test_cancel() {",
        "    tokio::time::sleep(Duration::from_millis(10)).await;",
        "}",
    ];
    assert!(!is_forbidden_sleep(&source, 2));
}

#[test]
fn test_detector_allows_interval() {
    let source = [
        "async fn heartbeat() {",
        "    let mut interval = tokio::time::interval(period);",
        "    loop {",
        "        interval.tick().await;",
        "        tokio::time::sleep(jitter).await;",
        "    }",
        "}",
    ];
    assert!(!is_forbidden_sleep(&source, 4));
}
