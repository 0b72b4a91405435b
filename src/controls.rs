//! Crawl bounds and the command-line surface that configures them.

use crate::session::webdriver::{StorySelectors, WebDriverConfig, DEFAULT_WEBDRIVER_URL};
use crate::sink::RecordFormat;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// Number of article characters echoed in progress logs.
pub const DEFAULT_PREVIEW_CHARS: usize = 50;

/// Tunable knobs that bound crawl behavior.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrawlControls {
    max_depth: Option<usize>,
    max_pages: Option<usize>,
    navigation_retries: u32,
    preview_chars: usize,
}

impl CrawlControls {
    /// Constructs a new set of crawl controls.
    pub fn new(max_depth: Option<usize>, max_pages: Option<usize>, navigation_retries: u32) -> Self {
        Self {
            max_depth,
            max_pages,
            navigation_retries,
            preview_chars: DEFAULT_PREVIEW_CHARS,
        }
    }

    /// Deepest path the crawl will visit, if bounded.
    pub fn max_depth(&self) -> Option<usize> {
        self.max_depth
    }

    /// Maximum number of pages to emit, if bounded.
    pub fn max_pages(&self) -> Option<usize> {
        self.max_pages
    }

    /// Extra whole-path replays attempted after a transport failure.
    pub fn navigation_retries(&self) -> u32 {
        self.navigation_retries
    }

    /// Article characters included in progress logs.
    pub fn preview_chars(&self) -> usize {
        self.preview_chars
    }
}

impl Default for CrawlControls {
    fn default() -> Self {
        Self::new(None, None, 1)
    }
}

/// Command-line interface of the `storycrawl` binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "storycrawl",
    version,
    about = "Archive every page of a branching interactive story"
)]
pub struct Cli {
    /// Story entry page
    #[arg(env = "STORYCRAWL_URL", required_unless_present = "story_file")]
    pub url: Option<Url>,

    /// Output file receiving one record per visited page
    #[arg(long, env = "STORYCRAWL_PAGES_FILE", default_value = "data/pages.json")]
    pub pages_file: PathBuf,

    /// Record layout
    #[arg(long, env = "STORYCRAWL_FORMAT", value_enum, default_value_t = RecordFormat::Jsonl)]
    pub format: RecordFormat,

    /// Crawl a JSON story tree instead of a live browser session
    #[arg(long, env = "STORYCRAWL_STORY_FILE", conflicts_with = "url")]
    pub story_file: Option<PathBuf>,

    /// WebDriver server endpoint
    #[arg(long, env = "STORYCRAWL_WEBDRIVER", default_value = DEFAULT_WEBDRIVER_URL)]
    pub webdriver: Url,

    /// Show the browser window
    #[arg(long, env = "STORYCRAWL_HEADED", default_value_t = false)]
    pub headed: bool,

    /// Milliseconds element lookups wait for a match
    #[arg(long, env = "STORYCRAWL_IMPLICIT_WAIT_MS", default_value_t = 1000)]
    pub implicit_wait_ms: u64,

    /// Milliseconds to wait after each click for the page to re-render
    #[arg(long, env = "STORYCRAWL_SETTLE_MS", default_value_t = 250)]
    pub settle_ms: u64,

    /// Seconds before a page load is abandoned
    #[arg(long, env = "STORYCRAWL_PAGE_LOAD_TIMEOUT_SECS", default_value_t = 30)]
    pub page_load_timeout_secs: u64,

    /// Seconds before a single WebDriver request is abandoned
    #[arg(long, env = "STORYCRAWL_REQUEST_TIMEOUT_SECS", default_value_t = 60)]
    pub request_timeout_secs: u64,

    /// Hosts the browser may contact, comma separated (empty allows all)
    #[arg(long, env = "STORYCRAWL_DOMAINS", default_value = "")]
    pub allowed_domains: String,

    /// Selector of the page title
    #[arg(long, env = "STORYCRAWL_TITLE_SELECTOR", default_value = ".at-story__title")]
    pub title_selector: String,

    /// Selector of the article body
    #[arg(
        long,
        env = "STORYCRAWL_ARTICLE_SELECTOR",
        default_value = ".at-story__article article"
    )]
    pub article_selector: String,

    /// Selector matching every answer link
    #[arg(
        long,
        env = "STORYCRAWL_ANSWER_SELECTOR",
        default_value = ".at-story__answers ul li a"
    )]
    pub answer_selector: String,

    /// Selector of the restart control
    #[arg(
        long,
        env = "STORYCRAWL_RESTART_SELECTOR",
        default_value = ".at-button--restart:nth-child(2)"
    )]
    pub restart_selector: String,

    /// Deepest choice path to visit
    #[arg(long, env = "STORYCRAWL_MAX_DEPTH")]
    pub max_depth: Option<usize>,

    /// Stop after this many pages
    #[arg(long, env = "STORYCRAWL_MAX_PAGES")]
    pub max_pages: Option<usize>,

    /// Whole-path replays attempted after a transport failure
    #[arg(long, env = "STORYCRAWL_NAVIGATION_RETRIES", default_value_t = 1)]
    pub navigation_retries: u32,
}

impl Cli {
    /// Converts the parsed CLI into `CrawlControls`.
    pub fn build_controls(&self) -> CrawlControls {
        CrawlControls::new(self.max_depth, self.max_pages, self.navigation_retries)
    }

    /// Browser session settings for the given entry page.
    pub fn webdriver_config(&self, entry_url: Url) -> WebDriverConfig {
        let mut config = WebDriverConfig::new(self.webdriver.clone(), entry_url);
        config.headless = !self.headed;
        config.implicit_wait = Duration::from_millis(self.implicit_wait_ms);
        config.settle_delay = Duration::from_millis(self.settle_ms);
        config.page_load_timeout = Duration::from_secs(self.page_load_timeout_secs.max(1));
        config.request_timeout = Duration::from_secs(self.request_timeout_secs.max(1));
        config.allowed_domains = self.domains_vec();
        config.selectors = StorySelectors {
            title: self.title_selector.clone(),
            article: self.article_selector.clone(),
            answers: self.answer_selector.clone(),
            restart: self.restart_selector.clone(),
        };
        config
    }

    fn domains_vec(&self) -> Vec<String> {
        self.allowed_domains
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_the_story_site() {
        let cli = Cli::try_parse_from(["storycrawl", "https://instory.su/story/7"]).unwrap();
        assert_eq!(cli.pages_file, PathBuf::from("data/pages.json"));
        assert_eq!(cli.build_controls(), CrawlControls::default());

        let config = cli.webdriver_config(cli.url.clone().unwrap());
        assert!(config.headless);
        assert_eq!(config.implicit_wait, Duration::from_secs(1));
        assert_eq!(config.selectors, StorySelectors::default());
        assert!(config.allowed_domains.is_empty());
    }

    #[test]
    fn parses_bounds_and_domains() {
        let cli = Cli::try_parse_from([
            "storycrawl",
            "https://instory.su/story/7",
            "--max-depth",
            "3",
            "--max-pages=40",
            "--allowed-domains",
            "instory.su, static.instory.su,",
            "--format",
            "pretty",
        ])
        .unwrap();
        let controls = cli.build_controls();
        assert_eq!(controls.max_depth(), Some(3));
        assert_eq!(controls.max_pages(), Some(40));
        assert_eq!(cli.format, RecordFormat::Pretty);
        assert_eq!(cli.domains_vec(), vec!["instory.su", "static.instory.su"]);
    }

    #[test]
    fn story_file_replaces_url() {
        let cli = Cli::try_parse_from(["storycrawl", "--story-file", "story.json"]).unwrap();
        assert!(cli.url.is_none());
        assert!(Cli::try_parse_from(["storycrawl"]).is_err());
    }
}
