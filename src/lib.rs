//! # QuickXiv
//!
//! Streaming structured summaries of arXiv papers.
//!
//! ## Features
//!
//! - **Paper extraction**: title, authors, abstract and body sections from the ar5iv HTML rendering
//! - **Live streaming**: partial summaries re-parsed as tokens arrive from the generation endpoint
//! - **Four-part summaries**: problem, method, results, limitations
//! - **Local state**: sled-backed summary cache with a seven day expiry, plus usage statistics

pub mod agent;
pub mod cache;
pub mod clock;
pub mod config;
pub mod extract;
pub mod normalize;
pub mod paper;
pub mod prompt;
pub mod render;
pub mod session;
pub mod storage;
pub mod summary;
pub mod usage;

pub use agent::{ApiError, Generator, SummaryClient};
pub use cache::{CacheEntry, SummaryCache};
pub use config::Config;
pub use paper::{Document, Section};
pub use session::{Detection, Session, SessionError, Summarizer};
pub use storage::Storage;
pub use summary::SummaryResult;
pub use usage::{UsageAggregate, UsageTracker};
