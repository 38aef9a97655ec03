//! Paper fetching and HTML extraction.
//!
//! Uses reqwest for fetching the ar5iv rendering and scraper for parsing it.
//! Every selector miss falls back to a default value instead of failing.

use crate::normalize;
use crate::paper::{Document, Section};
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// User-Agent string identifying this client
const USER_AGENT: &str = concat!("quickxiv/", env!("CARGO_PKG_VERSION"));

/// Default timeout for HTTP requests
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const DEFAULT_TITLE: &str = "Unknown Title";

lazy_static! {
    /// Title candidates, most specific first
    static ref TITLE_SELECTORS: Vec<Selector> = [".ltx_title.ltx_title_document", "h1", "title"]
        .iter()
        .map(|s| Selector::parse(s).unwrap())
        .collect();
    static ref AUTHOR_SELECTOR: Selector = Selector::parse(".ltx_personname").unwrap();
    static ref ABSTRACT_SELECTOR: Selector = Selector::parse(".ltx_abstract").unwrap();
    static ref SECTION_SELECTOR: Selector =
        Selector::parse("section.ltx_section, .ltx_section, section.ltx_chapter").unwrap();
    static ref HEADING_SELECTOR: Selector =
        Selector::parse("h2, h3, h4, .ltx_title.ltx_title_section").unwrap();
    static ref PARAGRAPH_SELECTOR: Selector = Selector::parse("p, .ltx_para").unwrap();
    static ref ABSTRACT_LABEL: Regex = Regex::new(r"(?i)^\s*abstract\s*").unwrap();
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s{2,}").unwrap();
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to fetch paper HTML: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Failed to fetch paper HTML (status {0})")]
    Status(u16),
}

/// Supplies raw paper HTML for an identifier.
pub trait PaperSource {
    fn fetch_html(&self, paper_id: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Fetches the HTML rendering of arXiv papers from ar5iv.
#[derive(Debug, Clone)]
pub struct Ar5ivSource {
    client: Client,
    base_url: String,
}

impl Ar5ivSource {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    fn paper_url(&self, paper_id: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), paper_id)
    }
}

impl PaperSource for Ar5ivSource {
    async fn fetch_html(&self, paper_id: &str) -> Result<String, FetchError> {
        let url = self.paper_url(paper_id);
        debug!(%url, "fetching paper html");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

/// Extract a paper and fill in its bounded full text.
pub fn parse_paper(paper_id: &str, html: &str) -> Document {
    let mut doc = extract_document(paper_id, html);
    doc.full_text = normalize::bounded_full_text(&doc);
    doc
}

/// Extract title, authors, abstract and body sections from ar5iv HTML.
///
/// The returned document has an empty `full_text`.
pub fn extract_document(paper_id: &str, html: &str) -> Document {
    let document = Html::parse_document(html);

    Document {
        id: paper_id.to_string(),
        title: clean_latex(&extract_title(&document)),
        authors: extract_authors(&document),
        r#abstract: clean_latex(&extract_abstract(&document)),
        sections: extract_sections(&document),
        full_text: String::new(),
    }
}

/// Repair LaTeX-to-HTML conversion artifacts.
///
/// A 1 to 4 digit group repeated three or more times in a row collapses to a
/// single copy (`181818` becomes `18`), whitespace runs collapse to one space
/// and the result is trimmed.
pub fn clean_latex(text: &str) -> String {
    let collapsed = collapse_repeated_digit_groups(text);
    WHITESPACE_RUN
        .replace_all(&collapsed, " ")
        .trim()
        .to_string()
}

fn collapse_repeated_digit_groups(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        match repeated_group_at(&chars, i) {
            Some((group_len, run_len)) => {
                out.extend(&chars[i..i + group_len]);
                i += run_len;
            }
            None => {
                out.push(chars[i]);
                i += 1;
            }
        }
    }
    out
}

/// Longest digit group starting at `start` that is followed by at least two
/// copies of itself. Returns the group length and the length of the whole run.
fn repeated_group_at(chars: &[char], start: usize) -> Option<(usize, usize)> {
    let digits = chars[start..]
        .iter()
        .take(4)
        .take_while(|c| c.is_ascii_digit())
        .count();

    (1..=digits).rev().find_map(|len| {
        let group = &chars[start..start + len];
        let mut end = start + len;
        let mut copies = 0;
        while end + len <= chars.len() && &chars[end..end + len] == group {
            copies += 1;
            end += len;
        }
        (copies >= 2).then_some((len, end - start))
    })
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

fn extract_title(document: &Html) -> String {
    match TITLE_SELECTORS
        .iter()
        .find_map(|selector| document.select(selector).next())
    {
        Some(element) => element_text(&element),
        None => {
            debug!("no title element found, using default");
            DEFAULT_TITLE.to_string()
        }
    }
}

fn extract_authors(document: &Html) -> String {
    document
        .select(&AUTHOR_SELECTOR)
        .map(|el| element_text(&el))
        .collect::<Vec<_>>()
        .join(", ")
}

fn extract_abstract(document: &Html) -> String {
    match document.select(&ABSTRACT_SELECTOR).next() {
        Some(element) => {
            let text: String = element.text().collect();
            ABSTRACT_LABEL.replace(&text, "").trim().to_string()
        }
        None => {
            debug!("no abstract element found");
            String::new()
        }
    }
}

fn extract_sections(document: &Html) -> Vec<Section> {
    let mut sections = Vec::new();

    for element in document.select(&SECTION_SELECTOR) {
        let title = element
            .select(&HEADING_SELECTOR)
            .next()
            .map(|heading| element_text(&heading))
            .unwrap_or_default();

        if Section::is_excluded_title(&title) {
            debug!(%title, "skipping back-matter section");
            continue;
        }

        let text = element
            .select(&PARAGRAPH_SELECTOR)
            .map(|p| element_text(&p))
            .collect::<Vec<_>>()
            .join("\n");
        let text = clean_latex(&text);
        if text.is_empty() {
            continue;
        }

        sections.push(Section {
            title: clean_latex(&title),
            text,
        });
    }

    sections
}
