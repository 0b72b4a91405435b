//! Sessions: stateful handles to the page a story instance is currently showing.
//!
//! A session can only be steered with three operations. The crawler reaches any
//! interior page by resetting to the root and replaying every choice on the way down,
//! so implementations never need to support direct addressing.

pub mod tree;
pub mod webdriver;

pub use tree::{StoryChoice, StoryNode, TreeSession};
pub use webdriver::{StorySelectors, WebDriverConfig, WebDriverSession};

use crate::record::SessionView;
use async_trait::async_trait;
use thiserror::Error;

/// Failures a session reports back to the crawler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The requested choice does not exist on the current page.
    #[error("choice {index} out of range, page offers {available}")]
    ChoiceOutOfRange {
        /// Requested choice index.
        index: usize,
        /// Number of choices the page actually shows.
        available: usize,
    },
    /// The transport could not complete the action (timeout, detached element, crash).
    #[error("navigation failed: {0}")]
    Navigation(String),
}

/// Stateful handle to one interactive story instance.
///
/// Every operation completes only after the page has settled; callers never issue a
/// second operation while one is outstanding.
#[async_trait]
pub trait Session {
    /// Reads the page currently on display.
    async fn current_view(&mut self) -> Result<SessionView, SessionError>;

    /// Follows choice `index` on the current page.
    async fn choose(&mut self, index: usize) -> Result<(), SessionError>;

    /// Returns to the story's first page.
    async fn reset_to_root(&mut self) -> Result<(), SessionError>;
}

#[async_trait]
impl<S: Session + Send + ?Sized> Session for &mut S {
    async fn current_view(&mut self) -> Result<SessionView, SessionError> {
        (**self).current_view().await
    }

    async fn choose(&mut self, index: usize) -> Result<(), SessionError> {
        (**self).choose(index).await
    }

    async fn reset_to_root(&mut self) -> Result<(), SessionError> {
        (**self).reset_to_root().await
    }
}

#[async_trait]
impl<S: Session + Send + ?Sized> Session for Box<S> {
    async fn current_view(&mut self) -> Result<SessionView, SessionError> {
        (**self).current_view().await
    }

    async fn choose(&mut self, index: usize) -> Result<(), SessionError> {
        (**self).choose(index).await
    }

    async fn reset_to_root(&mut self) -> Result<(), SessionError> {
        (**self).reset_to_root().await
    }
}
