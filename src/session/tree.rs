//! In-memory story tree session, used for offline crawls and as a test double.

use super::{Session, SessionError};
use crate::record::SessionView;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// One page of a story held in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryNode {
    /// Page heading.
    pub title: String,
    /// Article markup.
    #[serde(default)]
    pub article: String,
    /// Answers leading to child pages.
    #[serde(default)]
    pub choices: Vec<StoryChoice>,
}

/// A labelled edge to a child page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryChoice {
    /// Answer text shown on the parent page.
    pub label: String,
    /// Page reached by the answer.
    pub next: StoryNode,
}

impl StoryNode {
    /// Leaf page without answers.
    pub fn leaf(title: impl Into<String>, article: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            article: article.into(),
            choices: Vec::new(),
        }
    }

    /// Adds an answer leading to `next`.
    pub fn with_choice(mut self, label: impl Into<String>, next: StoryNode) -> Self {
        self.choices.push(StoryChoice {
            label: label.into(),
            next,
        });
        self
    }

    /// Reads a story tree from a JSON document.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read story file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse story file {}", path.display()))
    }

    /// Total number of pages in the tree, this one included.
    pub fn page_count(&self) -> usize {
        1 + self
            .choices
            .iter()
            .map(|choice| choice.next.page_count())
            .sum::<usize>()
    }

    fn view(&self) -> SessionView {
        SessionView::new(
            self.title.clone(),
            self.article.clone(),
            self.choices
                .iter()
                .map(|choice| choice.label.clone())
                .collect(),
        )
    }
}

/// Session that walks a [`StoryNode`] tree with a cursor.
#[derive(Debug, Clone)]
pub struct TreeSession {
    root: StoryNode,
    cursor: Vec<usize>,
}

impl TreeSession {
    /// Opens the tree at its root page.
    pub fn new(root: StoryNode) -> Self {
        Self {
            root,
            cursor: Vec::new(),
        }
    }

    /// Choices taken since the last reset.
    pub fn position(&self) -> &[usize] {
        &self.cursor
    }

    fn current(&self) -> &StoryNode {
        self.cursor
            .iter()
            .fold(&self.root, |node, &index| &node.choices[index].next)
    }
}

#[async_trait]
impl Session for TreeSession {
    async fn current_view(&mut self) -> Result<SessionView, SessionError> {
        Ok(self.current().view())
    }

    async fn choose(&mut self, index: usize) -> Result<(), SessionError> {
        let available = self.current().choices.len();
        if index >= available {
            return Err(SessionError::ChoiceOutOfRange { index, available });
        }
        self.cursor.push(index);
        Ok(())
    }

    async fn reset_to_root(&mut self) -> Result<(), SessionError> {
        self.cursor.clear();
        Ok(())
    }
}
