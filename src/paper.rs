//! Paper data model and arXiv identifier recognition.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Section titles containing any of these (lowercased) are never kept.
pub const EXCLUDED_SECTION_MARKERS: [&str; 4] =
    ["reference", "bibliograph", "appendix", "acknowledgment"];

lazy_static! {
    static ref ARXIV_PATTERNS: [Regex; 2] = [
        Regex::new(r"^https://arxiv\.org/abs/(.+?)(?:\?|#|$)").unwrap(),
        Regex::new(r"^https://arxiv\.org/pdf/(.+?)(?:\.pdf)?(?:\?|#|$)").unwrap(),
    ];
}

/// A body section of a paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    pub text: String,
}

impl Section {
    /// Whether a section with this title belongs to the back matter.
    pub fn is_excluded_title(title: &str) -> bool {
        let lower = title.to_lowercase();
        EXCLUDED_SECTION_MARKERS
            .iter()
            .any(|marker| lower.contains(marker))
    }
}

/// A paper extracted from its rendered HTML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub title: String,
    pub authors: String,
    pub r#abstract: String,
    /// Body sections in document order
    pub sections: Vec<Section>,
    /// Serialized, size-bounded text sent to the model
    pub full_text: String,
}

impl Document {
    /// Non-empty section titles, in document order.
    pub fn section_titles(&self) -> Vec<String> {
        self.sections
            .iter()
            .filter(|s| !s.title.is_empty())
            .map(|s| s.title.clone())
            .collect()
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            title: self.title.clone(),
            authors: self.authors.clone(),
            r#abstract: self.r#abstract.clone(),
            section_titles: self.section_titles(),
        }
    }
}

/// The parts of a [`Document`] worth persisting alongside its summary.
///
/// The full text is left out to keep cache entries small.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub title: String,
    pub authors: String,
    pub r#abstract: String,
    pub section_titles: Vec<String>,
}

/// Extract the arXiv identifier from an abstract or PDF page URL.
///
/// Returns `None` for anything that is not an arXiv paper page.
pub fn paper_id_from_url(url: &str) -> Option<String> {
    ARXIV_PATTERNS
        .iter()
        .find_map(|pattern| pattern.captures(url))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Accept either a bare identifier or an arXiv URL.
pub fn resolve_paper_id(input: &str) -> Option<String> {
    let input = input.trim();
    if input.starts_with("http://") || input.starts_with("https://") {
        return paper_id_from_url(input);
    }
    if input.is_empty() || input.contains(char::is_whitespace) {
        return None;
    }
    Some(input.to_string())
}
