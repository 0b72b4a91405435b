use anyhow::{Context, Result};
use clap::Parser;
use std::fs::File;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use storycrawl::{
    Cli, CrawlControls, Crawler, JsonSink, PageRecordSink, RunOutcome, RunReport, Session,
    StoryNode, TreeSession, WebDriverSession,
};
use tokio::runtime::Builder;
use tracing_subscriber::EnvFilter;

const EXIT_FAILURE: u8 = 1;
const EXIT_TRUNCATED: u8 = 2;
const EXIT_CANCELLED: u8 = 130;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(report) => match report.outcome {
            RunOutcome::Completed => ExitCode::SUCCESS,
            RunOutcome::Truncated(_) => ExitCode::from(EXIT_TRUNCATED),
            RunOutcome::Cancelled => ExitCode::from(EXIT_CANCELLED),
        },
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn run(cli: Cli) -> Result<RunReport> {
    let rt = Builder::new_current_thread().enable_all().build()?;
    rt.block_on(download_story(cli))
}

async fn download_story(cli: Cli) -> Result<RunReport> {
    let stop_requested = Arc::new(AtomicBool::new(false));
    {
        let stop_requested = Arc::clone(&stop_requested);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, finishing the current page");
                stop_requested.store(true, Ordering::Release);
            }
        });
    }

    let controls = cli.build_controls();

    if let Some(story_file) = &cli.story_file {
        tracing::info!(
            story = %story_file.display(),
            pages_file = %cli.pages_file.display(),
            "crawling offline story"
        );
        let root = StoryNode::from_json_file(story_file)?;
        let sink = open_sink(&cli)?;
        return drive(TreeSession::new(root), sink, controls, stop_requested).await;
    }

    let url = cli.url.clone().context("missing story URL")?;
    tracing::info!(%url, pages_file = %cli.pages_file.display(), "downloading story");
    let mut session = WebDriverSession::connect(cli.webdriver_config(url))
        .await
        .with_context(|| format!("failed to start a browser session via {}", cli.webdriver))?;
    let result = match open_sink(&cli) {
        Ok(sink) => drive(&mut session, sink, controls, stop_requested).await,
        Err(err) => Err(err),
    };
    if let Err(err) = session.close().await {
        tracing::warn!("failed to close webdriver session: {err}");
    }
    result
}

/// Truncates the pages file only once a session is ready to fill it.
fn open_sink(cli: &Cli) -> Result<JsonSink<File>> {
    JsonSink::create(&cli.pages_file, cli.format)
        .with_context(|| format!("failed to open {} for writing", cli.pages_file.display()))
}

async fn drive<S: Session, K: PageRecordSink>(
    session: S,
    sink: K,
    controls: CrawlControls,
    stop_requested: Arc<AtomicBool>,
) -> Result<RunReport> {
    let mut crawler = Crawler::new(session, sink, controls).with_stop_flag(stop_requested);
    crawler.run().await.with_context(|| {
        format!(
            "crawl aborted after {} archived pages; rerun from scratch once fixed",
            crawler.pages_emitted()
        )
    })
}
