//! Breadth-first crawl driver: replays paths through a session and archives every page.

use crate::controls::CrawlControls;
use crate::frontier::{Frontier, FrontierError};
use crate::path::ChoicePath;
use crate::record::{PageRecord, SessionView};
use crate::session::{Session, SessionError};
use crate::sink::{PageRecordSink, SinkError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Fatal crawl failures. Every variant names the path being processed.
#[derive(Debug, Error)]
pub enum CrawlError {
    /// A choice seen on an earlier visit is no longer offered during replay.
    #[error("inconsistent replay at {path}: choice {index} missing, page offers {available}")]
    InconsistentReplay {
        /// Path being navigated to.
        path: ChoicePath,
        /// Choice index the session rejected.
        index: usize,
        /// Choices the page offered instead.
        available: usize,
    },
    /// The session transport kept failing after every allowed replay.
    #[error("transport failure at {path}: {cause}")]
    TransportFailure {
        /// Path being navigated to.
        path: ChoicePath,
        /// Message from the last failed attempt.
        cause: String,
    },
    /// The sink could not persist the record for `path`.
    #[error("persistence failure at {path}: {source}")]
    Persistence {
        /// Path whose record was being written.
        path: ChoicePath,
        /// Underlying sink error.
        #[source]
        source: SinkError,
    },
}

impl CrawlError {
    /// Path the crawl was processing when it failed.
    pub fn path(&self) -> &ChoicePath {
        match self {
            Self::InconsistentReplay { path, .. }
            | Self::TransportFailure { path, .. }
            | Self::Persistence { path, .. } => path,
        }
    }
}

/// Why a crawl stopped before exhausting the story.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationReason {
    /// Pages below the depth ceiling were not visited.
    DepthLimit,
    /// The page budget ran out with work still queued.
    PageLimit,
}

/// Non-error ways a crawl can end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every reachable page was archived.
    Completed,
    /// A configured ceiling stopped the crawl.
    Truncated(TruncationReason),
    /// The stop flag was raised between pages.
    Cancelled,
}

/// Summary of a finished crawl.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    /// How the crawl ended.
    pub outcome: RunOutcome,
    /// Records emitted.
    pub pages: usize,
    /// Deepest path visited.
    pub max_depth: usize,
    /// Choices clicked, replays included.
    pub choices_made: usize,
    /// Resets issued to the session.
    pub resets: usize,
    /// Whole-path replays caused by transport failures.
    pub retries: usize,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

#[derive(Debug, Default, Clone)]
struct Metrics {
    pages: usize,
    max_depth: usize,
    choices_made: usize,
    resets: usize,
    retries: usize,
}

impl Metrics {
    fn record_page(&mut self, path: &ChoicePath) {
        self.pages += 1;
        self.max_depth = self.max_depth.max(path.depth());
    }

    fn report(&self, outcome: RunOutcome, elapsed: Duration) -> RunReport {
        let secs = elapsed.as_secs_f32().max(f32::EPSILON);
        tracing::info!(
            ?outcome,
            pages = self.pages,
            max_depth = self.max_depth,
            choices = self.choices_made,
            resets = self.resets,
            retries = self.retries,
            pages_per_sec = format_args!("{:.2}", self.pages as f32 / secs),
            "crawl finished in {secs:.2}s"
        );
        RunReport {
            outcome,
            pages: self.pages,
            max_depth: self.max_depth,
            choices_made: self.choices_made,
            resets: self.resets,
            retries: self.retries,
            elapsed,
        }
    }
}

/// Owns one crawl: the session, the sink, and the work queue built during [`Crawler::run`].
pub struct Crawler<S, K> {
    session: S,
    sink: K,
    controls: CrawlControls,
    stop_requested: Arc<AtomicBool>,
    metrics: Metrics,
}

impl<S: Session, K: PageRecordSink> Crawler<S, K> {
    /// Builds a crawler with its own stop flag.
    pub fn new(session: S, sink: K, controls: CrawlControls) -> Self {
        Self {
            session,
            sink,
            controls,
            stop_requested: Arc::new(AtomicBool::new(false)),
            metrics: Metrics::default(),
        }
    }

    /// Shares an externally owned stop flag.
    pub fn with_stop_flag(mut self, stop_requested: Arc<AtomicBool>) -> Self {
        self.stop_requested = stop_requested;
        self
    }

    /// Handle that cancels the crawl between pages once set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_requested)
    }

    /// Records emitted by the current or last run.
    pub fn pages_emitted(&self) -> usize {
        self.metrics.pages
    }

    /// Explores the story breadth-first until the queue drains, a ceiling is hit, the
    /// stop flag is raised, or a fatal error occurs.
    pub async fn run(&mut self) -> Result<RunReport, CrawlError> {
        let start = Instant::now();
        self.metrics = Metrics::default();
        let mut frontier = Frontier::new(self.controls.max_depth());
        let mut depth_limited = false;

        while !frontier.is_empty() {
            // Sessions that never await would otherwise starve the signal task.
            tokio::task::yield_now().await;
            if self.stop_requested.load(Ordering::Acquire) {
                tracing::warn!(
                    pending = frontier.pending(),
                    "stop requested, abandoning queued pages"
                );
                return Ok(self.metrics.report(RunOutcome::Cancelled, start.elapsed()));
            }
            if self
                .controls
                .max_pages()
                .is_some_and(|limit| self.metrics.pages >= limit)
            {
                tracing::warn!(pending = frontier.pending(), "page limit reached");
                let outcome = RunOutcome::Truncated(TruncationReason::PageLimit);
                return Ok(self.metrics.report(outcome, start.elapsed()));
            }
            let Some(path) = frontier.next_path() else {
                break;
            };

            let view = self.visit(&path).await?;
            let record = PageRecord::from_view(path, view);
            self.sink
                .emit(&record)
                .map_err(|source| CrawlError::Persistence {
                    path: record.path.clone(),
                    source,
                })?;
            self.metrics.record_page(&record.path);
            tracing::info!(
                path = %record.path,
                choices = record.choices.len(),
                "{}",
                record.article_preview(self.controls.preview_chars())
            );

            for child in record.child_paths() {
                if let Err(FrontierError::BeyondDepth { path, max_depth }) = frontier.push(child) {
                    tracing::debug!(%path, max_depth, "skipping page below depth ceiling");
                    depth_limited = true;
                }
            }
        }

        let outcome = if depth_limited {
            RunOutcome::Truncated(TruncationReason::DepthLimit)
        } else {
            RunOutcome::Completed
        };
        Ok(self.metrics.report(outcome, start.elapsed()))
    }

    /// Reaches `path` and reads it, replaying from the root again after transport failures.
    async fn visit(&mut self, path: &ChoicePath) -> Result<SessionView, CrawlError> {
        let mut attempt = 0;
        loop {
            match self.replay(path).await {
                Ok(view) => return Ok(view),
                Err(SessionError::ChoiceOutOfRange { index, available }) => {
                    return Err(CrawlError::InconsistentReplay {
                        path: path.clone(),
                        index,
                        available,
                    });
                }
                Err(SessionError::Navigation(cause)) => {
                    if attempt >= self.controls.navigation_retries() {
                        return Err(CrawlError::TransportFailure {
                            path: path.clone(),
                            cause,
                        });
                    }
                    attempt += 1;
                    self.metrics.retries += 1;
                    tracing::warn!(%path, attempt, %cause, "navigation failed, replaying from root");
                }
            }
        }
    }

    async fn replay(&mut self, path: &ChoicePath) -> Result<SessionView, SessionError> {
        self.session.reset_to_root().await?;
        self.metrics.resets += 1;
        for &index in path.indices() {
            self.session.choose(index).await?;
            self.metrics.choices_made += 1;
        }
        self.session.current_view().await
    }
}

/// Runs a single crawl to completion.
pub async fn crawl<S: Session, K: PageRecordSink>(
    session: S,
    sink: K,
    controls: CrawlControls,
    stop_requested: Arc<AtomicBool>,
) -> Result<RunReport, CrawlError> {
    Crawler::new(session, sink, controls)
        .with_stop_flag(stop_requested)
        .run()
        .await
}
