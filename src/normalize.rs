//! Serialization of a [`Document`] into bounded model input.
//!
//! Long papers keep their head (motivation, approach) and their tail
//! (results, conclusion); the middle is replaced by [`TRUNCATION_MARKER`].

use crate::paper::Document;

/// Upper bound on the serialized text, in characters, excluding the marker.
pub const MAX_FULL_TEXT_CHARS: usize = 12_000;

/// Share of the budget kept from the start of the text, in tenths.
const HEAD_TENTHS: usize = 7;

/// Characters of slack taken out of the tail allowance.
const TAIL_SLACK: usize = 50;

pub const TRUNCATION_MARKER: &str = "\n\n[... content truncated for brevity ...]\n\n";

/// Lay out the document fields as plain text, in reading order.
pub fn serialize_document(doc: &Document) -> String {
    let mut text = format!(
        "Title: {}\n\nAuthors: {}\n\nAbstract:\n{}\n\n",
        doc.title, doc.authors, doc.r#abstract
    );
    for section in &doc.sections {
        text.push_str("## ");
        text.push_str(&section.title);
        text.push('\n');
        text.push_str(&section.text);
        text.push_str("\n\n");
    }
    text
}

/// Keep the head and tail of `text` when it exceeds `budget` characters.
///
/// The result never exceeds `budget + TRUNCATION_MARKER.chars().count()`.
pub fn truncate_middle(text: &str, budget: usize) -> String {
    let total = text.chars().count();
    if total <= budget {
        return text.to_string();
    }

    let head_len = budget * HEAD_TENTHS / 10;
    let tail_len = budget.saturating_sub(head_len + TAIL_SLACK);

    let head: String = text.chars().take(head_len).collect();
    let tail: String = text.chars().skip(total - tail_len).collect();

    let mut out = String::with_capacity(head.len() + TRUNCATION_MARKER.len() + tail.len());
    out.push_str(&head);
    out.push_str(TRUNCATION_MARKER);
    out.push_str(&tail);
    out
}

/// Serialize and bound the document, the form sent to the model.
pub fn bounded_full_text(doc: &Document) -> String {
    truncate_middle(&serialize_document(doc), MAX_FULL_TEXT_CHARS)
}
