//! QuickXiv CLI - streaming arXiv paper summaries
//!
//! The application logic is contained in lib.rs, and this file is responsible
//! for parsing arguments and handling top-level errors.

use anyhow::{anyhow, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use quickxiv::config::validate_api_key;
use quickxiv::extract::{self, Ar5ivSource, PaperSource};
use quickxiv::paper::resolve_paper_id;
use quickxiv::prompt::ModelParams;
use quickxiv::{
    render, CacheEntry, Config, Detection, Session, Storage, SummaryCache, SummaryClient, Summarizer,
    UsageTracker,
};
use std::io::Write;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "quickxiv")]
#[command(author, version, about = "Streaming structured summaries of arXiv papers", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarise a paper by arXiv id or URL
    Summarise {
        /// arXiv id (e.g. 2301.00001) or abs/pdf URL
        paper: String,
        /// Show the extracted model input instead of a summary
        #[arg(long)]
        raw: bool,
        /// Ignore any cached summary
        #[arg(long)]
        refresh: bool,
    },
    /// Show usage statistics
    Usage {
        /// Clear all usage statistics
        #[arg(long)]
        reset: bool,
    },
    /// Save the Hugging Face API key
    Key {
        /// The key; prompted for when omitted
        key: Option<String>,
    },
    /// Inspect or drop cached summaries
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Print the cached summary for a paper
    Show { paper: String },
    /// Delete the cached summary for a paper
    Clear { paper: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let storage = Storage::open(&config.storage.path)?;

    match cli.command {
        Commands::Summarise {
            paper,
            raw,
            refresh,
        } => {
            let paper_id = parse_paper_arg(&paper)?;
            let source = Ar5ivSource::new(&config.source.base_url)?;

            if raw {
                let html = source.fetch_html(&paper_id).await?;
                let doc = extract::parse_paper(&paper_id, &html);
                println!("{}", doc.full_text);
                println!(
                    "\n--- {} sections, {} characters ---",
                    doc.sections.len(),
                    doc.full_text.chars().count()
                );
                return Ok(());
            }

            let stored_key = storage.api_key()?;
            let api_key = config.api_key(stored_key.as_deref())?;
            let client = SummaryClient::new(&config.agent, api_key)?;
            let summarizer = Summarizer::new(
                source,
                client,
                SummaryCache::new(storage.clone()),
                UsageTracker::new(storage.clone()),
                ModelParams::from(&config.agent),
            );

            if refresh {
                summarizer.cache().remove(&paper_id)?;
            }

            let mut session = Session::new();
            println!("Fetching: {}", paper_id);
            match summarizer.detect(&mut session, Some(paper_id.as_str())).await? {
                Detection::Cached(entry) => {
                    print_cached(&entry);
                    println!("{}", "use --refresh to regenerate".dimmed());
                    return Ok(());
                }
                Detection::Ready(doc) => {
                    println!("{}", render::paper_header(&doc.title, &doc.authors));
                }
                Detection::NoPaper => bail!("no paper to summarise"),
            }

            let summary = summarizer
                .summarize(&mut session, |partial| {
                    eprint!("\rGenerating summary... {} characters", partial.char_count());
                    let _ = std::io::stderr().flush();
                })
                .await?;
            eprintln!();

            print!("{}", render::summary_cards(&summary));
        }
        Commands::Usage { reset } => {
            let tracker = UsageTracker::new(storage);
            if reset {
                tracker.reset()?;
                println!("{}", "Usage statistics cleared.".green());
            } else {
                print!("{}", render::usage_report(&tracker.load()?));
            }
        }
        Commands::Key { key } => {
            let key = match key {
                Some(key) => key,
                None => dialoguer::Password::new()
                    .with_prompt("Hugging Face API key")
                    .interact()?,
            };
            validate_api_key(&key)?;
            storage.set_api_key(&key)?;
            println!("{}", "API key saved.".green());
        }
        Commands::Cache { action } => {
            let cache = SummaryCache::new(storage);
            match action {
                CacheAction::Show { paper } => {
                    let paper_id = parse_paper_arg(&paper)?;
                    match cache.get(&paper_id)? {
                        Some(entry) => print_cached(&entry),
                        None => println!("No cached summary for {}", paper_id),
                    }
                }
                CacheAction::Clear { paper } => {
                    let paper_id = parse_paper_arg(&paper)?;
                    if cache.remove(&paper_id)? {
                        println!("Removed cached summary for {}", paper_id);
                    } else {
                        println!("No cached summary for {}", paper_id);
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_cached(entry: &CacheEntry) {
    println!(
        "{}",
        render::paper_header(&entry.document.title, &entry.document.authors)
    );
    print!("{}", render::summary_cards(&entry.summary));
    println!(
        "{}",
        format!("cached {}", entry.created_at.format("%Y-%m-%d %H:%M")).dimmed()
    );
}

fn parse_paper_arg(input: &str) -> anyhow::Result<String> {
    resolve_paper_id(input).ok_or_else(|| anyhow!("not an arXiv id or paper URL: {}", input))
}
