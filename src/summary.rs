//! Summary struct and the parser that fills it from model output.
//!
//! Parsing is a pure function of the accumulated text, so it can be re-run on
//! every partial stream update and on the final response alike.

use crate::prompt::{LIMITATIONS_HEADING, METHOD_HEADING, PROBLEM_HEADING, RESULTS_HEADING};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Shown when the model returned nothing at all.
pub const EMPTY_RESPONSE_PLACEHOLDER: &str = "Could not generate summary. Please retry.";

/// Below this many characters in every field, the headings are treated as missing.
const MIN_SECTION_CHARS: usize = 10;

/// One of the four fixed summary fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SummaryKey {
    Problem,
    Method,
    Results,
    Limitations,
}

impl SummaryKey {
    pub const ALL: [SummaryKey; 4] = [
        SummaryKey::Problem,
        SummaryKey::Method,
        SummaryKey::Results,
        SummaryKey::Limitations,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SummaryKey::Problem => "problem",
            SummaryKey::Method => "method",
            SummaryKey::Results => "results",
            SummaryKey::Limitations => "limitations",
        }
    }

    /// The response heading this field is read from.
    pub fn heading(self) -> &'static str {
        match self {
            SummaryKey::Problem => PROBLEM_HEADING,
            SummaryKey::Method => METHOD_HEADING,
            SummaryKey::Results => RESULTS_HEADING,
            SummaryKey::Limitations => LIMITATIONS_HEADING,
        }
    }
}

/// Structured four-part paper summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResult {
    /// The problem, gap or challenge addressed
    pub problem: String,
    /// The proposed method or approach
    pub method: String,
    /// Concrete findings
    pub results: String,
    /// Weaknesses and future work
    pub limitations: String,
}

impl SummaryResult {
    pub fn get(&self, key: SummaryKey) -> &str {
        match key {
            SummaryKey::Problem => &self.problem,
            SummaryKey::Method => &self.method,
            SummaryKey::Results => &self.results,
            SummaryKey::Limitations => &self.limitations,
        }
    }

    fn get_mut(&mut self, key: SummaryKey) -> &mut String {
        match key {
            SummaryKey::Problem => &mut self.problem,
            SummaryKey::Method => &mut self.method,
            SummaryKey::Results => &mut self.results,
            SummaryKey::Limitations => &mut self.limitations,
        }
    }

    /// Check if the summary has any content
    pub fn is_empty(&self) -> bool {
        SummaryKey::ALL.iter().all(|&k| self.get(k).is_empty())
    }

    /// Total characters across all four fields.
    pub fn char_count(&self) -> usize {
        SummaryKey::ALL
            .iter()
            .map(|&k| self.get(k).chars().count())
            .sum()
    }
}

/// How the parser arrived at its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// At least one field was read from its heading
    Sectioned,
    /// No usable headings; the whole text went into `problem`
    Fallback,
}

struct Rule {
    key: SummaryKey,
    heading: Regex,
    /// Start of the next field's heading, if any
    terminator: Option<Regex>,
}

fn heading_pattern(heading: &str) -> String {
    format!(r"(?i)\*?\*?{}:?\*?\*?\s*", regex::escape(heading))
}

lazy_static! {
    static ref RULES: [Rule; 4] = [
        Rule {
            key: SummaryKey::Problem,
            heading: Regex::new(&heading_pattern(PROBLEM_HEADING)).unwrap(),
            terminator: Some(Regex::new(r"(?i)\*?\*?How It Solved").unwrap()),
        },
        Rule {
            key: SummaryKey::Method,
            heading: Regex::new(&heading_pattern(METHOD_HEADING)).unwrap(),
            terminator: Some(Regex::new(r"(?i)\*?\*?Key Results").unwrap()),
        },
        Rule {
            key: SummaryKey::Results,
            heading: Regex::new(&heading_pattern(RESULTS_HEADING)).unwrap(),
            terminator: Some(Regex::new(r"(?i)\*?\*?Limitations").unwrap()),
        },
        Rule {
            key: SummaryKey::Limitations,
            heading: Regex::new(r"(?i)\*?\*?Limitations\s*(?:&|and)?\s*Future Work:?\*?\*?\s*")
                .unwrap(),
            terminator: None,
        },
    ];
}

impl Rule {
    fn extract<'t>(&self, text: &'t str) -> &'t str {
        let Some(heading) = self.heading.find(text) else {
            return "";
        };
        let body = &text[heading.end()..];
        let end = self
            .terminator
            .as_ref()
            .and_then(|t| t.find(body))
            .map_or(body.len(), |m| m.start());
        body[..end].trim()
    }
}

/// Split model output into the four summary fields.
pub fn parse_summary(text: &str) -> SummaryResult {
    parse_summary_with_outcome(text).0
}

/// Like [`parse_summary`], also reporting whether the fallback was used.
pub fn parse_summary_with_outcome(text: &str) -> (SummaryResult, ParseOutcome) {
    let mut summary = SummaryResult::default();
    for rule in RULES.iter() {
        *summary.get_mut(rule.key) = rule.extract(text).to_string();
    }

    let has_content = SummaryKey::ALL
        .iter()
        .any(|&k| summary.get(k).chars().count() >= MIN_SECTION_CHARS);
    if has_content {
        return (summary, ParseOutcome::Sectioned);
    }

    let trimmed = text.trim();
    let problem = if trimmed.is_empty() {
        EMPTY_RESPONSE_PLACEHOLDER.to_string()
    } else {
        trimmed.to_string()
    };
    (
        SummaryResult {
            problem,
            ..SummaryResult::default()
        },
        ParseOutcome::Fallback,
    )
}
