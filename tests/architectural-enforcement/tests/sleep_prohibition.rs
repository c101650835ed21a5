//! Integration Test: Sleep Prohibition
//!
//! **Policy**: Production code in the gateway MUST NOT call sleep methods.
//! Executors signal completion over the aggregator channel and the engine
//! waits on it; timing out is the HTTP client's job.
//! **Exceptions**: test code (`#[cfg(test)]` modules)

use std::fs;
use std::path::Path;

use architectural_enforcement::production_dirs;

#[test]
fn test_no_sleep_in_production_code() {
    let mut violations = Vec::new();
    let mut scanned = 0;

    for dir in production_dirs() {
        assert!(dir.exists(), "missing source directory {}", dir.display());
        for entry in walkdir::WalkDir::new(&dir)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if entry.path().extension().and_then(|s| s.to_str()) == Some("rs") {
                scanned += 1;
                check_file(entry.path(), &mut violations);
            }
        }
    }

    assert!(scanned > 0, "no source files scanned");

    if !violations.is_empty() {
        eprintln!("\nSleep calls found in production code:");
        for violation in &violations {
            eprintln!("  {violation}");
        }
        eprintln!("\nWait on a channel, a Notify or the I/O itself instead.");
        panic!("Found {} sleep violation(s)", violations.len());
    }
}

fn check_file(path: &Path, violations: &mut Vec<String>) {
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };
    let lines: Vec<&str> = content.lines().collect();
    violations.extend(
        sleep_calls(&lines)
            .into_iter()
            .map(|idx| format!("{}:{} - {}", path.display(), idx + 1, lines[idx].trim())),
    );
}

/// Line indexes of sleep calls outside comments and test modules
fn sleep_calls(lines: &[&str]) -> Vec<usize> {
    let mut found = Vec::new();
    let mut in_tests = false;

    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.starts_with("#[cfg(test)]") {
            in_tests = true;
        }
        if in_tests {
            continue;
        }

        // Skip comments
        let code_part = line.split("//").next().unwrap_or(line);
        if code_part.contains("::sleep(") || code_part.contains(".sleep(") {
            found.push(idx);
        }
    }
    found
}

#[test]
fn test_detects_sleep_in_production_function() {
    let code = [
        "async fn wait_for_executors() {",
        "    tokio::time::sleep(Duration::from_millis(10)).await;",
        "}",
    ];
    assert_eq!(sleep_calls(&code), vec![1]);
}

#[test]
fn test_ignores_comments_and_test_modules() {
    let code = [
        "// tokio::time::sleep(d) would poll",
        "fn run() {}",
        "#[cfg(test)]",
        "mod tests {",
        "    async fn slow() { tokio::time::sleep(d).await; }",
        "}",
    ];
    assert!(sleep_calls(&code).is_empty());
}
