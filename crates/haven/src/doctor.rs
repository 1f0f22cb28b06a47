// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `haven doctor` command implementation.
//!
//! Reports the health of the memory store and the embedding provider.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use haven_core::types::HealthStatus;

use crate::app::App;

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl From<&HealthStatus> for CheckStatus {
    fn from(status: &HealthStatus) -> Self {
        match status {
            HealthStatus::Healthy => CheckStatus::Pass,
            HealthStatus::Degraded(_) => CheckStatus::Warn,
            HealthStatus::Unhealthy(_) => CheckStatus::Fail,
        }
    }
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

/// Runs the adapter health checks and returns one result per adapter.
pub async fn run_checks(app: &App) -> Vec<CheckResult> {
    let start = Instant::now();
    let report = app.health().await;
    let duration = start.elapsed();
    report
        .into_iter()
        .map(|(name, status)| CheckResult {
            status: CheckStatus::from(&status),
            message: match status {
                HealthStatus::Healthy => "ok".to_string(),
                HealthStatus::Degraded(m) | HealthStatus::Unhealthy(m) => m,
            },
            name,
            duration,
        })
        .collect()
}

/// Formats one result line, colored when `use_color` is set.
pub fn format_line(result: &CheckResult, use_color: bool) -> String {
    let duration_ms = result.duration.as_millis();
    if use_color {
        use colored::Colorize;
        let (symbol, message) = match result.status {
            CheckStatus::Pass => ("✓".green().to_string(), result.message.normal().to_string()),
            CheckStatus::Warn => ("!".yellow().to_string(), result.message.yellow().to_string()),
            CheckStatus::Fail => ("✗".red().to_string(), result.message.red().to_string()),
        };
        format!("    {symbol} {:<22} {message} ({duration_ms}ms)", result.name)
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        format!("    {tag} {:<22} {} ({duration_ms}ms)", result.name, result.message)
    }
}

/// Run the `haven doctor` command. Returns `false` when any check failed.
pub async fn run_doctor(app: &App, plain: bool) -> bool {
    let use_color = !plain && std::io::stdout().is_terminal();
    let results = run_checks(app).await;

    println!();
    println!("  haven doctor");
    println!("  {}", "-".repeat(50));
    for result in &results {
        println!("{}", format_line(result, use_color));
    }
    println!();

    let issues = results
        .iter()
        .filter(|r| r.status != CheckStatus::Pass)
        .count();
    if issues == 0 {
        println!("  All checks passed.");
    } else {
        let word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {word} found.");
    }
    println!();

    results.iter().all(|r| r.status != CheckStatus::Fail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: CheckStatus) -> CheckResult {
        CheckResult {
            name: "sqlite-memory-store".into(),
            status,
            message: "ok".into(),
            duration: Duration::from_millis(3),
        }
    }

    #[test]
    fn plain_lines_carry_status_tags() {
        assert!(format_line(&result(CheckStatus::Pass), false).contains("[OK]"));
        assert!(format_line(&result(CheckStatus::Warn), false).contains("[WARN]"));
        let fail = format_line(&result(CheckStatus::Fail), false);
        assert!(fail.contains("[FAIL]") && fail.contains("sqlite-memory-store") && fail.ends_with("(3ms)"));
    }

    #[test]
    fn health_maps_to_check_status() {
        assert_eq!(CheckStatus::from(&HealthStatus::Healthy), CheckStatus::Pass);
        assert_eq!(CheckStatus::from(&HealthStatus::Degraded("x".into())), CheckStatus::Warn);
        assert_eq!(CheckStatus::from(&HealthStatus::Unhealthy("x".into())), CheckStatus::Fail);
    }
}
