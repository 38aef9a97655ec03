//! The summarization pipeline: detect a paper, summarize it, remember it.
//!
//! Per-session state lives in an explicit [`Session`] owned by the caller.
//! [`Summarizer::summarize`] borrows it mutably, so one session can never have
//! two summarizations in flight; callers sharing a session across tasks wrap it
//! in a `tokio::sync::Mutex`.

use crate::agent::{ApiError, Generator};
use crate::cache::{CacheEntry, SummaryCache};
use crate::extract::{self, FetchError, PaperSource};
use crate::paper::Document;
use crate::prompt::{self, ModelParams};
use crate::storage::StorageError;
use crate::summary::{parse_summary, SummaryResult};
use crate::usage::UsageTracker;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("no arXiv paper detected")]
    NoPaper,
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// State of one viewer: the active paper and its extracted document.
#[derive(Debug, Default)]
pub struct Session {
    paper_id: Option<String>,
    document: Option<Document>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paper_id(&self) -> Option<&str> {
        self.paper_id.as_deref()
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }
}

/// Result of looking at the active paper.
#[derive(Debug)]
pub enum Detection<'s> {
    /// Nothing to summarize
    NoPaper,
    /// A summary younger than the cache expiry already exists
    Cached(CacheEntry),
    /// The paper was extracted and is ready to summarize
    Ready(&'s Document),
}

pub struct Summarizer<S, G> {
    source: S,
    generator: G,
    cache: SummaryCache,
    usage: UsageTracker,
    params: ModelParams,
}

impl<S: PaperSource, G: Generator> Summarizer<S, G> {
    pub fn new(
        source: S,
        generator: G,
        cache: SummaryCache,
        usage: UsageTracker,
        params: ModelParams,
    ) -> Self {
        Self {
            source,
            generator,
            cache,
            usage,
            params,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn cache(&self) -> &SummaryCache {
        &self.cache
    }

    pub fn usage(&self) -> &UsageTracker {
        &self.usage
    }

    /// Make `paper_id` the session's active paper.
    ///
    /// Returns the cached summary when there is one, otherwise fetches and
    /// extracts the paper. Detecting the already loaded paper again is free.
    pub async fn detect<'s>(
        &self,
        session: &'s mut Session,
        paper_id: Option<&str>,
    ) -> Result<Detection<'s>, SessionError> {
        let Some(paper_id) = paper_id else {
            return Ok(Detection::NoPaper);
        };

        let already_loaded =
            session.paper_id.as_deref() == Some(paper_id) && session.document.is_some();
        if !already_loaded {
            session.paper_id = Some(paper_id.to_string());
            session.document = None;

            if let Some(entry) = self.cache.get(paper_id)? {
                info!(paper_id, "loaded summary from cache");
                return Ok(Detection::Cached(entry));
            }
            self.load_document(session).await?;
        }

        match session.document.as_ref() {
            Some(doc) => Ok(Detection::Ready(doc)),
            None => Err(SessionError::NoPaper),
        }
    }

    /// Summarize the session's active paper, streaming partial results.
    ///
    /// On success the summary is cached and usage is recorded; a usage
    /// write failure is logged and does not fail the call. On failure nothing
    /// persisted is touched.
    pub async fn summarize<F>(
        &self,
        session: &mut Session,
        mut on_partial: F,
    ) -> Result<SummaryResult, SessionError>
    where
        F: FnMut(&SummaryResult),
    {
        if session.document.is_none() {
            self.load_document(session).await?;
        }
        let doc = session.document.as_ref().ok_or(SessionError::NoPaper)?;

        let request = prompt::build_request(doc, self.params.clone());
        let summary = self
            .generator
            .stream_summary(&request, |text| on_partial(&parse_summary(text)))
            .await?;

        self.cache.set(&doc.id, doc, &summary)?;
        if let Err(e) = self.usage.record(
            &doc.id,
            &doc.title,
            doc.full_text.chars().count(),
            summary.char_count(),
        ) {
            warn!(paper_id = %doc.id, error = %e, "failed to record usage");
        }
        Ok(summary)
    }

    async fn load_document(&self, session: &mut Session) -> Result<(), SessionError> {
        let paper_id = session.paper_id.clone().ok_or(SessionError::NoPaper)?;
        let html = self.source.fetch_html(&paper_id).await?;
        let doc = extract::parse_paper(&paper_id, &html);
        info!(
            paper_id = %paper_id,
            sections = doc.sections.len(),
            full_text_chars = doc.full_text.chars().count(),
            "paper extracted"
        );
        session.document = Some(doc);
        Ok(())
    }
}
