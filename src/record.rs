//! Page records emitted once per visited node, plus the transient view they are built from.

use crate::path::ChoicePath;
use serde::{Deserialize, Serialize};

/// Snapshot of whatever page a session is currently showing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    /// Page heading text.
    pub title: String,
    /// Raw article markup, kept verbatim.
    pub article: String,
    /// Human-readable answer labels in on-page order.
    pub choice_labels: Vec<String>,
}

impl SessionView {
    /// Builds a view from its parts.
    pub fn new(title: String, article: String, choice_labels: Vec<String>) -> Self {
        Self {
            title,
            article,
            choice_labels,
        }
    }

    /// Number of choices offered by the page.
    pub fn choice_count(&self) -> usize {
        self.choice_labels.len()
    }
}

/// Archived page, addressed by the choices that reach it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    /// Tree address of the page.
    pub path: ChoicePath,
    /// Page heading text.
    pub title: String,
    /// Raw article markup.
    pub article: String,
    /// Answer labels, index-aligned with the child paths.
    pub choices: Vec<String>,
}

impl PageRecord {
    /// Finalizes the view read at `path` into a record.
    pub fn from_view(path: ChoicePath, view: SessionView) -> Self {
        Self {
            path,
            title: view.title,
            article: view.article,
            choices: view.choice_labels,
        }
    }

    /// Paths of every page reachable in one step from this record.
    pub fn child_paths(&self) -> impl Iterator<Item = ChoicePath> + '_ {
        (0..self.choices.len()).map(move |choice| self.path.child(choice))
    }

    /// Leading characters of the article, used for progress output.
    pub fn article_preview(&self, max_chars: usize) -> &str {
        match self.article.char_indices().nth(max_chars) {
            Some((cut, _)) => &self.article[..cut],
            None => &self.article,
        }
    }
}
