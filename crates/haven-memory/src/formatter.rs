// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Renders ranked memories into the context block injected into prompts.
//!
//! An empty result means "omit the block"; callers never inject a bare
//! header.

use std::fmt::Write;

use crate::types::{ConversationSummary, Insight, Memory, MemoryType};

pub const CONTEXT_HEADER: &str = "=== WHAT YOU REMEMBER ABOUT THE USER ===";
pub const CONTEXT_FOOTER: &str = "=== END OF MEMORIES ===";
pub const RECORD_DELIMITER: &str = "---";

/// Importance given to a pinned insight rendered as a memory.
const INSIGHT_IMPORTANCE: i64 = 8;

/// Formats memories plus an optional pinned insight.
pub fn format_context(memories: &[Memory], pinned_insight: Option<&Insight>) -> String {
    format_with_summary(memories, pinned_insight, None)
}

/// [`format_context`] with the latest conversation summary as a leading line.
pub fn format_with_summary(
    memories: &[Memory],
    pinned_insight: Option<&Insight>,
    summary: Option<&ConversationSummary>,
) -> String {
    let synthetic = pinned_insight
        .filter(|insight| !memories.iter().any(|m| m.content.contains(&insight.content)))
        .map(insight_memory);

    let records: Vec<&Memory> = synthetic.iter().chain(memories.iter()).collect();
    if records.is_empty() && summary.is_none() {
        return String::new();
    }

    let mut out = String::new();
    out.push_str(CONTEXT_HEADER);
    out.push('\n');

    if let Some(summary) = summary {
        let _ = writeln!(
            out,
            "Recent conversation ({}): {}",
            summary.date.format("%b %-d, %Y"),
            summary.summary
        );
        out.push_str(RECORD_DELIMITER);
        out.push('\n');
    }

    for (n, memory) in records.iter().enumerate() {
        write_record(&mut out, n + 1, memory);
    }

    out.push_str(CONTEXT_FOOTER);
    out
}

fn write_record(out: &mut String, n: usize, memory: &Memory) {
    let _ = writeln!(
        out,
        "[{n}] {} | {}",
        memory.memory_type.label(),
        memory.date.format("%b %-d, %Y")
    );
    let _ = writeln!(out, "{}", memory.content.trim());
    if !memory.tags.is_empty() {
        let tags: Vec<&str> = memory.tags.iter().map(String::as_str).collect();
        let _ = writeln!(out, "Tags: {}", tags.join(", "));
    }
    out.push_str(RECORD_DELIMITER);
    out.push('\n');
}

/// Pinned insight rendered as a synthetic breakthrough memory.
fn insight_memory(insight: &Insight) -> Memory {
    let mut memory = Memory::new(insight.content.clone(), MemoryType::Breakthrough, INSIGHT_IMPORTANCE)
        .with_date(insight.date)
        .with_tags(["insight", "ai"]);
    memory.id = insight.id.clone();
    memory
}
