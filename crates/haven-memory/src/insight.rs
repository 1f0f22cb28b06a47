// SPDX-FileCopyrightText: 2026 Haven Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Splits `<INSIGHT>...</INSIGHT>` spans out of completion text.

use std::sync::LazyLock;

use regex::Regex;

// An unclosed marker swallows the rest of the reply.
static INSIGHT_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<INSIGHT>(.*?)(?:</INSIGHT>|\z)").expect("valid regex"));

static EXTRA_BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

static EXTRA_SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid regex"));

/// A completion with insight spans removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    /// Text to show the user.
    pub visible: String,
    /// Trimmed, non-empty insight bodies in order of appearance.
    pub insights: Vec<String>,
}

pub fn split_insights(reply: &str) -> ParsedReply {
    let insights = INSIGHT_SPAN
        .captures_iter(reply)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    let stripped = INSIGHT_SPAN.replace_all(reply, "");
    let collapsed = EXTRA_SPACES.replace_all(&stripped, " ");
    let visible = EXTRA_BLANK_LINES
        .replace_all(&collapsed, "\n\n")
        .trim()
        .to_string();

    ParsedReply { visible, insights }
}
