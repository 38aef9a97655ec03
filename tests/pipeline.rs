use chrono::{Duration, Utc};
use futures::stream;
use quickxiv::agent::{accumulate_stream, ApiError, Generator, RenderGate};
use quickxiv::clock::ManualClock;
use quickxiv::extract::{FetchError, PaperSource};
use quickxiv::prompt::{ModelParams, PromptRequest};
use quickxiv::summary::parse_summary;
use quickxiv::usage::estimate_tokens;
use quickxiv::{
    Detection, Session, SessionError, Storage, SummaryCache, SummaryResult, Summarizer,
    UsageTracker,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const PAPER_HTML: &str = r#"
<html><body>
  <h1 class="ltx_title ltx_title_document">Sparse Attention at Scale</h1>
  <span class="ltx_personname">Ada Lovelace</span>
  <span class="ltx_personname">Alan Turing</span>
  <div class="ltx_abstract"><h6>Abstract</h6><p>We make attention sparse.</p></div>
  <section class="ltx_section">
    <h2 class="ltx_title ltx_title_section">1 Introduction</h2>
    <p>Dense attention is quadratic.</p>
  </section>
  <section class="ltx_section">
    <h2 class="ltx_title ltx_title_section">2 Experiments</h2>
    <p>We are 3x faster on long inputs.</p>
  </section>
  <section class="ltx_section">
    <h2 class="ltx_title ltx_title_section">References</h2>
    <p>[1] A. Vaswani. Attention is all you need.</p>
  </section>
</body></html>
"#;

const RESPONSE: &str = "**What It Solved:**\n- Dense attention is quadratic [Sec: 1 Introduction]\n\n\
**How It Solved It:**\n- Block-sparse attention patterns\n\n\
**Key Results:**\n- 3x faster on long inputs [Sec: 2 Experiments]\n\n\
**Limitations & Future Work:**\n- Only tested on text";

struct FakeSource {
    fetches: AtomicUsize,
}

impl FakeSource {
    fn new() -> Self {
        Self {
            fetches: AtomicUsize::new(0),
        }
    }
}

impl PaperSource for FakeSource {
    async fn fetch_html(&self, _paper_id: &str) -> Result<String, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(PAPER_HTML.to_string())
    }
}

/// Replays `RESPONSE` as an event stream, a few characters per event.
struct ReplayGenerator {
    requests: Mutex<Vec<PromptRequest>>,
}

impl ReplayGenerator {
    fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl Generator for ReplayGenerator {
    async fn stream_summary<F>(
        &self,
        request: &PromptRequest,
        on_partial: F,
    ) -> Result<SummaryResult, ApiError>
    where
        F: FnMut(&str),
    {
        self.requests.lock().unwrap().push(request.clone());

        let chars: Vec<char> = RESPONSE.chars().collect();
        let mut events: Vec<Result<Vec<u8>, ApiError>> = chars
            .chunks(7)
            .map(|piece| {
                let content: String = piece.iter().collect();
                let event = serde_json::json!({"choices": [{"delta": {"content": content}}]});
                Ok(format!("data: {}\n\n", event).into_bytes())
            })
            .collect();
        events.push(Ok(b"data: [DONE]\n\n".to_vec()));

        let clock = ManualClock::new(Utc::now());
        let text = accumulate_stream(
            stream::iter(events),
            &clock,
            RenderGate::new(Duration::zero()),
            on_partial,
        )
        .await?;
        Ok(parse_summary(&text))
    }
}

struct RejectingGenerator;

impl Generator for RejectingGenerator {
    async fn stream_summary<F>(
        &self,
        _request: &PromptRequest,
        _on_partial: F,
    ) -> Result<SummaryResult, ApiError>
    where
        F: FnMut(&str),
    {
        Err(ApiError::from_status(401, "unauthorized".into()))
    }
}

fn summarizer<G: Generator>(
    storage: &Storage,
    generator: G,
) -> (Summarizer<FakeSource, G>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let summarizer = Summarizer::new(
        FakeSource::new(),
        generator,
        SummaryCache::with_clock(storage.clone(), clock.clone()),
        UsageTracker::with_clock(storage.clone(), clock.clone()),
        ModelParams::default(),
    );
    (summarizer, clock)
}

#[tokio::test]
async fn detect_then_summarize_caches_and_records_usage() {
    let storage = Storage::temporary().unwrap();
    let (summarizer, _clock) = summarizer(&storage, ReplayGenerator::new());
    let mut session = Session::new();

    match summarizer.detect(&mut session, Some("2301.00001")).await.unwrap() {
        Detection::Ready(doc) => {
            assert_eq!(doc.title, "Sparse Attention at Scale");
            assert_eq!(doc.authors, "Ada Lovelace, Alan Turing");
            assert_eq!(doc.section_titles(), vec!["1 Introduction", "2 Experiments"]);
        }
        other => panic!("expected a freshly extracted paper, got {other:?}"),
    }

    let mut partials: Vec<SummaryResult> = Vec::new();
    let summary = summarizer
        .summarize(&mut session, |partial| partials.push(partial.clone()))
        .await
        .unwrap();

    assert_eq!(
        summary.problem,
        "- Dense attention is quadratic [Sec: 1 Introduction]"
    );
    assert_eq!(summary.method, "- Block-sparse attention patterns");
    assert_eq!(summary.results, "- 3x faster on long inputs [Sec: 2 Experiments]");
    assert_eq!(summary.limitations, "- Only tested on text");

    assert!(partials.len() > 2);
    assert_eq!(partials.last(), Some(&summary));
    assert!(partials.iter().all(|p| !p.problem.is_empty()));

    let doc = session.document().unwrap();
    let cached = summarizer.cache().get("2301.00001").unwrap().unwrap();
    assert_eq!(cached.summary, summary);
    assert_eq!(cached.document, doc.snapshot());

    let usage = summarizer.usage().load().unwrap();
    assert_eq!(usage.request_count, 1);
    assert_eq!(
        usage.token_count,
        estimate_tokens(doc.full_text.chars().count()) + estimate_tokens(summary.char_count())
    );
    assert_eq!(usage.history[0].title, "Sparse Attention at Scale");
}

#[tokio::test]
async fn request_carries_section_list_and_excludes_references() {
    let storage = Storage::temporary().unwrap();
    let (summarizer, _clock) = summarizer(&storage, ReplayGenerator::new());
    let mut session = Session::new();

    summarizer.detect(&mut session, Some("2301.00001")).await.unwrap();
    summarizer.summarize(&mut session, |_| {}).await.unwrap();

    let requests = summarizer.generator().requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    let user = &requests[0].user_content;
    assert!(user.contains("The paper has these sections: 1 Introduction, 2 Experiments."));
    assert!(user.contains("## 2 Experiments\nWe are 3x faster on long inputs."));
    assert!(!user.contains("Vaswani"));
    assert!(requests[0].system_instructions.contains("**Limitations & Future Work:**"));
}

#[tokio::test]
async fn second_session_is_served_from_cache() {
    let storage = Storage::temporary().unwrap();
    let (summarizer, clock) = summarizer(&storage, ReplayGenerator::new());

    let mut first = Session::new();
    summarizer.detect(&mut first, Some("2301.00001")).await.unwrap();
    let summary = summarizer.summarize(&mut first, |_| {}).await.unwrap();

    let mut second = Session::new();
    match summarizer.detect(&mut second, Some("2301.00001")).await.unwrap() {
        Detection::Cached(entry) => assert_eq!(entry.summary, summary),
        other => panic!("expected a cache hit, got {other:?}"),
    }
    assert_eq!(summarizer.source().fetches.load(Ordering::SeqCst), 1);

    clock.advance(Duration::days(8));
    let mut third = Session::new();
    assert!(matches!(
        summarizer.detect(&mut third, Some("2301.00001")).await.unwrap(),
        Detection::Ready(_)
    ));
    assert_eq!(summarizer.source().fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn redetecting_loaded_paper_does_not_refetch() {
    let storage = Storage::temporary().unwrap();
    let (summarizer, _clock) = summarizer(&storage, ReplayGenerator::new());
    let mut session = Session::new();

    summarizer.detect(&mut session, Some("2301.00001")).await.unwrap();
    summarizer.detect(&mut session, Some("2301.00001")).await.unwrap();
    assert_eq!(summarizer.source().fetches.load(Ordering::SeqCst), 1);
    assert_eq!(session.paper_id(), Some("2301.00001"));
}

#[tokio::test]
async fn no_active_paper_is_reported() {
    let storage = Storage::temporary().unwrap();
    let (summarizer, _clock) = summarizer(&storage, ReplayGenerator::new());
    let mut session = Session::new();

    assert!(matches!(
        summarizer.detect(&mut session, None).await.unwrap(),
        Detection::NoPaper
    ));
    assert!(matches!(
        summarizer.summarize(&mut session, |_| {}).await,
        Err(SessionError::NoPaper)
    ));
}

#[tokio::test]
async fn rejected_request_leaves_state_untouched() {
    let storage = Storage::temporary().unwrap();
    let (summarizer, _clock) = summarizer(&storage, RejectingGenerator);
    let mut session = Session::new();

    summarizer.detect(&mut session, Some("2301.00001")).await.unwrap();
    let err = summarizer.summarize(&mut session, |_| {}).await.unwrap_err();

    assert!(matches!(err, SessionError::Api(ApiError::Auth { status: 401 })));
    assert_eq!(
        err.to_string(),
        "Invalid API key. Please update it in settings."
    );
    assert!(summarizer.cache().get("2301.00001").unwrap().is_none());
    assert_eq!(summarizer.usage().load().unwrap().request_count, 0);
}

#[tokio::test]
async fn unreadable_cache_entry_falls_through_to_fetch() {
    let storage = Storage::temporary().unwrap();
    storage.put("summary_2301.00001", &"not an entry").unwrap();
    let (summarizer, _clock) = summarizer(&storage, ReplayGenerator::new());
    let mut session = Session::new();

    assert!(matches!(
        summarizer.detect(&mut session, Some("2301.00001")).await.unwrap(),
        Detection::Ready(_)
    ));
    assert_eq!(summarizer.source().fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn usage_write_failure_keeps_the_summary() {
    let storage = Storage::temporary().unwrap();
    storage.put("usage", &"not an aggregate").unwrap();
    let (summarizer, _clock) = summarizer(&storage, ReplayGenerator::new());
    let mut session = Session::new();

    summarizer.detect(&mut session, Some("2301.00001")).await.unwrap();
    let summary = summarizer.summarize(&mut session, |_| {}).await.unwrap();

    assert_eq!(summary.method, "- Block-sparse attention patterns");
    let cached = summarizer.cache().get("2301.00001").unwrap().unwrap();
    assert_eq!(cached.summary, summary);
}
