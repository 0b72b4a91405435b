use async_trait::async_trait;
use pretty_assertions::assert_eq;
use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use storycrawl::{
    crawl, ChoicePath, CrawlControls, CrawlError, Crawler, PageRecord, PageRecordSink,
    RunOutcome, Session, SessionError, SessionView, SinkError, StoryNode, TreeSession,
};

fn fork_story() -> StoryNode {
    StoryNode::leaf("Root", "<p>root</p>")
        .with_choice("A", StoryNode::leaf("A", "<p>a</p>"))
        .with_choice(
            "B",
            StoryNode::leaf("B", "<p>b</p>").with_choice("C", StoryNode::leaf("C", "<p>c</p>")),
        )
}

fn paths(records: &[PageRecord]) -> Vec<ChoicePath> {
    records.iter().map(|record| record.path.clone()).collect()
}

fn no_stop() -> Arc<AtomicBool> {
    Arc::new(AtomicBool::new(false))
}

/// Fails every attempt to reach `target` with a transport error until `failures` runs out.
struct FlakySession {
    inner: TreeSession,
    target: ChoicePath,
    failures: usize,
}

#[async_trait]
impl Session for FlakySession {
    async fn current_view(&mut self) -> Result<SessionView, SessionError> {
        if self.inner.position() == self.target.indices() && self.failures > 0 {
            self.failures -= 1;
            return Err(SessionError::Navigation("element detached".into()));
        }
        self.inner.current_view().await
    }

    async fn choose(&mut self, index: usize) -> Result<(), SessionError> {
        self.inner.choose(index).await
    }

    async fn reset_to_root(&mut self) -> Result<(), SessionError> {
        self.inner.reset_to_root().await
    }
}

/// Logs every session call and fails the click that would land on `target`.
struct ClickFailingSession {
    inner: TreeSession,
    target: ChoicePath,
    failures: usize,
    calls: Vec<String>,
}

#[async_trait]
impl Session for ClickFailingSession {
    async fn current_view(&mut self) -> Result<SessionView, SessionError> {
        self.calls.push("view".into());
        self.inner.current_view().await
    }

    async fn choose(&mut self, index: usize) -> Result<(), SessionError> {
        let mut landing = self.inner.position().to_vec();
        landing.push(index);
        if landing == self.target.indices() && self.failures > 0 {
            self.failures -= 1;
            self.calls.push(format!("choose {index} failed"));
            return Err(SessionError::Navigation("click intercepted".into()));
        }
        self.calls.push(format!("choose {index}"));
        self.inner.choose(index).await
    }

    async fn reset_to_root(&mut self) -> Result<(), SessionError> {
        self.calls.push("reset".into());
        self.inner.reset_to_root().await
    }
}

/// Swaps in a different story once `swap_at` resets have been issued.
struct ShiftingSession {
    inner: TreeSession,
    replacement: Option<StoryNode>,
    resets: usize,
    swap_at: usize,
}

#[async_trait]
impl Session for ShiftingSession {
    async fn current_view(&mut self) -> Result<SessionView, SessionError> {
        self.inner.current_view().await
    }

    async fn choose(&mut self, index: usize) -> Result<(), SessionError> {
        self.inner.choose(index).await
    }

    async fn reset_to_root(&mut self) -> Result<(), SessionError> {
        self.resets += 1;
        if self.resets == self.swap_at {
            if let Some(story) = self.replacement.take() {
                self.inner = TreeSession::new(story);
            }
        }
        self.inner.reset_to_root().await
    }
}

/// Accepts `capacity` records, then fails every write.
struct FullDisk {
    records: Vec<PageRecord>,
    capacity: usize,
}

impl PageRecordSink for FullDisk {
    fn emit(&mut self, record: &PageRecord) -> Result<(), SinkError> {
        if self.records.len() >= self.capacity {
            return Err(SinkError::Io(io::Error::new(
                io::ErrorKind::Other,
                "no space left on device",
            )));
        }
        self.records.push(record.clone());
        Ok(())
    }
}

#[tokio::test(flavor = "current_thread")]
async fn fork_story_emits_four_records_breadth_first() {
    let mut records = Vec::new();
    let report = crawl(
        TreeSession::new(fork_story()),
        &mut records,
        CrawlControls::default(),
        no_stop(),
    )
    .await
    .expect("crawl succeeds");

    assert_eq!(report.pages, 4);
    assert_eq!(
        paths(&records),
        vec![
            ChoicePath::root(),
            ChoicePath::from([0]),
            ChoicePath::from([1]),
            ChoicePath::from([1, 0]),
        ]
    );
    assert_eq!(records[0].choices, vec!["A".to_string(), "B".to_string()]);
    assert_eq!(records[3].title, "C");
}

#[tokio::test(flavor = "current_thread")]
async fn replaying_a_path_twice_reads_the_same_page() {
    let mut session = TreeSession::new(fork_story());
    let mut views = Vec::new();
    for _ in 0..2 {
        session.reset_to_root().await.unwrap();
        session.choose(1).await.unwrap();
        session.choose(0).await.unwrap();
        views.push(session.current_view().await.unwrap());
    }
    assert_eq!(views[0], views[1]);
    assert_eq!(views[0].title, "C");
}

#[tokio::test(flavor = "current_thread")]
async fn single_transport_failure_is_retried_once() {
    let session = FlakySession {
        inner: TreeSession::new(fork_story()),
        target: ChoicePath::from([1]),
        failures: 1,
    };
    let mut records = Vec::new();
    let report = crawl(session, &mut records, CrawlControls::default(), no_stop())
        .await
        .expect("retry recovers");

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.retries, 1);
    assert_eq!(report.resets, 5);
    let hits = records
        .iter()
        .filter(|record| record.path == ChoicePath::from([1]))
        .count();
    assert_eq!(hits, 1);
    assert_eq!(records.len(), 4);
}

#[tokio::test(flavor = "current_thread")]
async fn repeated_transport_failure_aborts_with_path() {
    let session = FlakySession {
        inner: TreeSession::new(fork_story()),
        target: ChoicePath::from([0]),
        failures: 2,
    };
    let mut records = Vec::new();
    let err = crawl(session, &mut records, CrawlControls::default(), no_stop())
        .await
        .expect_err("second failure is fatal");

    match err {
        CrawlError::TransportFailure { path, cause } => {
            assert_eq!(path, ChoicePath::from([0]));
            assert!(cause.contains("element detached"));
        }
        other => panic!("expected transport failure, got {other:?}"),
    }
    assert_eq!(paths(&records), vec![ChoicePath::root()]);
}

#[tokio::test(flavor = "current_thread")]
async fn extra_retries_are_configurable() {
    let session = FlakySession {
        inner: TreeSession::new(fork_story()),
        target: ChoicePath::from([0]),
        failures: 2,
    };
    let mut records = Vec::new();
    let report = crawl(session, &mut records, CrawlControls::new(None, None, 2), no_stop())
        .await
        .expect("third attempt succeeds");
    assert_eq!(report.retries, 2);
    assert_eq!(records.len(), 4);
}

#[tokio::test(flavor = "current_thread")]
async fn failed_click_replays_from_a_fresh_reset() {
    let mut session = ClickFailingSession {
        inner: TreeSession::new(fork_story()),
        target: ChoicePath::from([1, 0]),
        failures: 1,
        calls: Vec::new(),
    };
    let mut records = Vec::new();
    let report = crawl(&mut session, &mut records, CrawlControls::default(), no_stop())
        .await
        .expect("retry recovers");

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.retries, 1);
    assert_eq!(report.resets, 5);
    assert_eq!(report.choices_made, 5);
    assert_eq!(records.len(), 4);
    let tail = &session.calls[session.calls.len() - 7..];
    assert_eq!(
        tail,
        [
            "reset",
            "choose 1",
            "choose 0 failed",
            "reset",
            "choose 1",
            "choose 0",
            "view",
        ]
    );
}

#[tokio::test(flavor = "current_thread")]
async fn click_failure_on_every_attempt_is_fatal() {
    let session = ClickFailingSession {
        inner: TreeSession::new(fork_story()),
        target: ChoicePath::from([0]),
        failures: 2,
        calls: Vec::new(),
    };
    let mut records = Vec::new();
    let err = crawl(session, &mut records, CrawlControls::default(), no_stop())
        .await
        .expect_err("both attempts fail");

    match err {
        CrawlError::TransportFailure { path, cause } => {
            assert_eq!(path, ChoicePath::from([0]));
            assert_eq!(cause, "click intercepted");
        }
        other => panic!("expected transport failure, got {other:?}"),
    }
    assert_eq!(paths(&records), vec![ChoicePath::root()]);
}

#[tokio::test(flavor = "current_thread")]
async fn vanished_choice_is_an_inconsistent_replay() {
    let pruned = StoryNode::leaf("Root", "<p>root</p>").with_choice("A", StoryNode::leaf("A", ""));
    let session = ShiftingSession {
        inner: TreeSession::new(fork_story()),
        replacement: Some(pruned),
        resets: 0,
        swap_at: 3,
    };
    let mut records = Vec::new();
    let err = crawl(session, &mut records, CrawlControls::default(), no_stop())
        .await
        .expect_err("story changed under the crawler");

    match &err {
        CrawlError::InconsistentReplay {
            path,
            index,
            available,
        } => {
            assert_eq!(path, &ChoicePath::from([1]));
            assert_eq!(*index, 1);
            assert_eq!(*available, 1);
        }
        other => panic!("expected inconsistent replay, got {other:?}"),
    }
    assert_eq!(err.path(), &ChoicePath::from([1]));
    assert_eq!(
        paths(&records),
        vec![ChoicePath::root(), ChoicePath::from([0])]
    );
}

#[tokio::test(flavor = "current_thread")]
async fn sink_failure_stops_the_crawl() {
    let mut sink = FullDisk {
        records: Vec::new(),
        capacity: 2,
    };
    let mut crawler = Crawler::new(
        TreeSession::new(fork_story()),
        &mut sink,
        CrawlControls::default(),
    );
    let err = crawler.run().await.expect_err("disk fills up");
    assert_eq!(crawler.pages_emitted(), 2);
    drop(crawler);

    match err {
        CrawlError::Persistence { path, source } => {
            assert_eq!(path, ChoicePath::from([1]));
            assert!(matches!(source, SinkError::Io(_)));
        }
        other => panic!("expected persistence failure, got {other:?}"),
    }
    assert_eq!(sink.records.len(), 2);
}
