//! Terminal rendering of summaries and usage.

use crate::summary::{SummaryKey, SummaryResult};
use crate::usage::UsageAggregate;
use colored::Colorize;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::fmt::Write;

lazy_static! {
    static ref BOLD: Regex = Regex::new(r"\*\*(.*?)\*\*").unwrap();
    static ref ITALIC: Regex = Regex::new(r"\*(.*?)\*").unwrap();
    static ref BULLET: Regex = Regex::new(r"^[-•]\s+(.+)").unwrap();
    static ref SECTION_REF: Regex = Regex::new(r"(?i)\[Sec(?:tion)?:\s*([^\]]+)\]").unwrap();
}

fn card_icon(key: SummaryKey) -> &'static str {
    match key {
        SummaryKey::Problem => "🎯",
        SummaryKey::Method => "🔧",
        SummaryKey::Results => "📊",
        SummaryKey::Limitations => "🔮",
    }
}

/// Header block for a paper.
pub fn paper_header(title: &str, authors: &str) -> String {
    let title = if title.is_empty() { "Untitled Paper" } else { title };
    let authors = if authors.is_empty() {
        "Unknown Authors"
    } else {
        authors
    };
    format!("{}\n{}\n", title.bold(), authors.dimmed())
}

/// The four summary cards, skipping empty fields.
pub fn summary_cards(summary: &SummaryResult) -> String {
    let mut out = String::new();
    for key in SummaryKey::ALL {
        let content = summary.get(key);
        if content.is_empty() {
            continue;
        }
        let _ = writeln!(out, "{} {}", card_icon(key), key.heading().bold().cyan());
        out.push_str(&format_content(content));
        out.push('\n');
    }
    out
}

/// Turn the model's markdown-ish bullets into styled terminal lines.
pub fn format_content(text: &str) -> String {
    let mut out = String::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let styled = style_inline(line);
        match BULLET.captures(&styled) {
            Some(caps) => {
                let _ = writeln!(out, "  • {}", &caps[1]);
            }
            None => {
                let _ = writeln!(out, "  {}", styled);
            }
        }
    }
    if out.is_empty() {
        out.push_str("  No information available.\n");
    }
    out
}

fn style_inline(line: &str) -> String {
    let line = SECTION_REF.replace_all(line, |caps: &Captures| {
        format!("[{}]", caps[1].trim()).magenta().to_string()
    });
    let line = BOLD.replace_all(&line, |caps: &Captures| caps[1].bold().to_string());
    ITALIC
        .replace_all(&line, |caps: &Captures| caps[1].italic().to_string())
        .into_owned()
}

/// Compact counts: `950`, `1.2k`, `3.4M`.
pub fn format_number(n: u64) -> String {
    if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1_000_000.0)
    } else if n >= 1_000 {
        format!("{:.1}k", n as f64 / 1_000.0)
    } else {
        n.to_string()
    }
}

pub fn usage_report(usage: &UsageAggregate) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {}   {} {}   {} {}",
        "Requests:".bold(),
        usage.request_count,
        "Tokens:".bold(),
        format_number(usage.token_count),
        "Papers:".bold(),
        usage.unique_document_ids.len()
    );
    out.push('\n');

    if usage.history.is_empty() {
        out.push_str("No requests yet.\n");
        return out;
    }
    for entry in &usage.history {
        let _ = writeln!(
            out,
            "{:<80}  {:>6} tok  {}",
            entry.title,
            entry.tokens,
            entry.date.format("%b %-d").to_string().dimmed()
        );
    }
    out
}
