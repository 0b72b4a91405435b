#![warn(missing_docs)]
//! Core library entry points for the storycrawl archiver.

pub mod controls;
pub mod frontier;
pub mod path;
pub mod record;
pub mod runtime;
pub mod session;
pub mod sink;

pub use controls::{Cli, CrawlControls};
pub use frontier::{Frontier, FrontierError};
pub use path::ChoicePath;
pub use record::{PageRecord, SessionView};
pub use runtime::{crawl, CrawlError, Crawler, RunOutcome, RunReport, TruncationReason};
pub use session::{
    Session, SessionError, StoryNode, StorySelectors, TreeSession, WebDriverConfig,
    WebDriverSession,
};
pub use sink::{JsonSink, PageRecordSink, Persist, RecordFormat, SinkError};
