//! Browser session speaking the W3C WebDriver protocol to a running `chromedriver`.
//!
//! Each page is read from the live DOM: the heading text, the article's inner HTML and
//! the text of every answer link. Answers are located again before every click, since
//! the story re-renders the page in place after each choice.

use super::{Session, SessionError};
use crate::record::SessionView;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use url::Url;

/// Default `chromedriver` endpoint.
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

/// CSS selectors locating the parts of a story page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorySelectors {
    /// Element whose text is the page title.
    pub title: String,
    /// Element whose inner HTML is the article.
    pub article: String,
    /// Clickable answer links, in display order.
    pub answers: String,
    /// Control that restarts the story from its first page.
    pub restart: String,
}

impl Default for StorySelectors {
    fn default() -> Self {
        Self {
            title: ".at-story__title".to_string(),
            article: ".at-story__article article".to_string(),
            answers: ".at-story__answers ul li a".to_string(),
            restart: ".at-button--restart:nth-child(2)".to_string(),
        }
    }
}

/// Connection and timing settings for a [`WebDriverSession`].
#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    /// WebDriver server endpoint.
    pub endpoint: Url,
    /// Story entry page.
    pub entry_url: Url,
    /// Run the browser without a window.
    pub headless: bool,
    /// How long element lookups poll before giving up.
    pub implicit_wait: Duration,
    /// Upper bound for a page load.
    pub page_load_timeout: Duration,
    /// Upper bound for a single WebDriver HTTP round trip.
    pub request_timeout: Duration,
    /// Pause after each click so the page can re-render.
    pub settle_delay: Duration,
    /// Hosts the browser may resolve; empty allows everything.
    pub allowed_domains: Vec<String>,
    /// Page part selectors.
    pub selectors: StorySelectors,
}

impl WebDriverConfig {
    /// Settings with the defaults used by the command line.
    pub fn new(endpoint: Url, entry_url: Url) -> Self {
        Self {
            endpoint,
            entry_url,
            headless: true,
            implicit_wait: Duration::from_secs(1),
            page_load_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            settle_delay: Duration::from_millis(250),
            allowed_domains: Vec::new(),
            selectors: StorySelectors::default(),
        }
    }

    fn browser_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.headless {
            args.push("--headless=new".to_string());
        }
        args.push("--no-sandbox".to_string());
        args.push("--disable-dev-shm-usage".to_string());
        if let Some(rules) = self.host_resolver_rules() {
            args.push(format!("--host-resolver-rules={rules}"));
        }
        args
    }

    /// Resolver rules that black-hole every host outside the allowlist.
    fn host_resolver_rules(&self) -> Option<String> {
        if self.allowed_domains.is_empty() {
            return None;
        }
        let mut rules = String::from("MAP * ~NOTFOUND");
        for domain in &self.allowed_domains {
            rules.push_str(" , EXCLUDE ");
            rules.push_str(domain);
        }
        Some(rules)
    }

    fn capabilities(&self) -> Value {
        json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "args": self.browser_args() }
                }
            }
        })
    }
}

/// Errors raised while talking to the WebDriver server.
#[derive(Debug, Error)]
pub enum WebDriverError {
    /// The HTTP round trip itself failed.
    #[error("webdriver request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with a W3C error payload.
    #[error("webdriver error `{error}` (HTTP {status}): {message}")]
    Protocol {
        /// HTTP status code.
        status: u16,
        /// W3C error code, e.g. `no such element`.
        error: String,
        /// Human-readable detail from the driver.
        message: String,
    },
    /// The response did not have the expected shape.
    #[error("malformed webdriver response: {0}")]
    Malformed(String),
    /// A command URL could not be built.
    #[error("invalid webdriver url: {0}")]
    Url(#[from] url::ParseError),
}

impl WebDriverError {
    fn is_no_such_element(&self) -> bool {
        matches!(self, Self::Protocol { error, .. } if error == "no such element")
    }
}

impl From<WebDriverError> for SessionError {
    fn from(err: WebDriverError) -> Self {
        SessionError::Navigation(err.to_string())
    }
}

/// Live browser session for one story instance.
pub struct WebDriverSession {
    client: Client,
    session_url: Url,
    config: WebDriverConfig,
    at_root: bool,
}

impl WebDriverSession {
    /// Starts a browser session and opens the story entry page.
    pub async fn connect(config: WebDriverConfig) -> Result<Self, WebDriverError> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let endpoint = with_trailing_slash(&config.endpoint)?;
        let created = send(
            &client,
            Method::POST,
            endpoint.join("session")?,
            Some(config.capabilities()),
        )
        .await?;
        let session_id = created
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| WebDriverError::Malformed(format!("no sessionId in {created}")))?;
        let session_url = endpoint.join(&format!("session/{session_id}/"))?;
        tracing::info!(session = session_id, "webdriver session started");

        let timeouts = json!({
            "implicit": config.implicit_wait.as_millis() as u64,
            "pageLoad": config.page_load_timeout.as_millis() as u64,
        });
        let mut session = Self {
            client,
            session_url,
            config,
            at_root: false,
        };
        session
            .command(Method::POST, "timeouts", Some(timeouts))
            .await?;
        session.open_entry().await?;
        Ok(session)
    }

    /// Ends the browser session.
    pub async fn close(self) -> Result<(), WebDriverError> {
        let url = Url::parse(self.session_url.as_str().trim_end_matches('/'))?;
        send(&self.client, Method::DELETE, url, None).await?;
        tracing::info!("webdriver session closed");
        Ok(())
    }

    async fn open_entry(&mut self) -> Result<(), WebDriverError> {
        tracing::info!(url = %self.config.entry_url, "opening story");
        self.command(
            Method::POST,
            "url",
            Some(json!({ "url": self.config.entry_url.as_str() })),
        )
        .await?;
        self.at_root = true;
        Ok(())
    }

    async fn command(
        &self,
        method: Method,
        suffix: &str,
        body: Option<Value>,
    ) -> Result<Value, WebDriverError> {
        let url = self.session_url.join(suffix)?;
        send(&self.client, method, url, body).await
    }

    async fn find_element(&self, css: &str) -> Result<String, WebDriverError> {
        let value = self
            .command(
                Method::POST,
                "element",
                Some(json!({ "using": "css selector", "value": css })),
            )
            .await?;
        element_id(&value)
    }

    async fn find_elements(&self, css: &str) -> Result<Vec<String>, WebDriverError> {
        let value = self
            .command(
                Method::POST,
                "elements",
                Some(json!({ "using": "css selector", "value": css })),
            )
            .await?;
        value
            .as_array()
            .ok_or_else(|| WebDriverError::Malformed(format!("expected element list, got {value}")))?
            .iter()
            .map(element_id)
            .collect()
    }

    async fn element_text(&self, element: &str) -> Result<String, WebDriverError> {
        let value = self
            .command(Method::GET, &format!("element/{element}/text"), None)
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn element_property(&self, element: &str, name: &str) -> Result<String, WebDriverError> {
        let value = self
            .command(
                Method::GET,
                &format!("element/{element}/property/{name}"),
                None,
            )
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn click(&self, element: &str) -> Result<(), WebDriverError> {
        self.command(
            Method::POST,
            &format!("element/{element}/click"),
            Some(json!({})),
        )
        .await?;
        Ok(())
    }

    async fn settle(&self) {
        if !self.config.settle_delay.is_zero() {
            sleep(self.config.settle_delay).await;
        }
    }

    async fn read_view(&self) -> Result<SessionView, WebDriverError> {
        let selectors = &self.config.selectors;
        let title_el = self.find_element(&selectors.title).await?;
        let title = self.element_text(&title_el).await?;
        let article_el = self.find_element(&selectors.article).await?;
        let article = self.element_property(&article_el, "innerHTML").await?;

        let mut labels = Vec::new();
        for answer in self.find_elements(&selectors.answers).await? {
            labels.push(self.element_text(&answer).await?);
        }
        Ok(SessionView::new(title, article, labels))
    }

    async fn click_answer(&self, index: usize) -> Result<(), SessionError> {
        let answers = self.find_elements(&self.config.selectors.answers).await?;
        let Some(answer) = answers.get(index) else {
            return Err(SessionError::ChoiceOutOfRange {
                index,
                available: answers.len(),
            });
        };
        self.click(answer).await?;
        self.settle().await;
        Ok(())
    }

    async fn restart(&mut self) -> Result<(), WebDriverError> {
        match self.find_element(&self.config.selectors.restart).await {
            Ok(restart) => {
                self.click(&restart).await?;
                self.settle().await;
                self.at_root = true;
                Ok(())
            }
            Err(err) if err.is_no_such_element() => {
                tracing::debug!("restart control missing, reloading entry page");
                self.open_entry().await
            }
            Err(err) => Err(err),
        }
    }

    /// After any failed command the browser may sit anywhere, so the next reset is real.
    fn distrust_on_error<T, E>(&mut self, result: Result<T, E>) -> Result<T, SessionError>
    where
        E: Into<SessionError>,
    {
        result.map_err(|err| {
            self.at_root = false;
            err.into()
        })
    }
}

#[async_trait]
impl Session for WebDriverSession {
    async fn current_view(&mut self) -> Result<SessionView, SessionError> {
        let view = self.read_view().await;
        self.distrust_on_error(view)
    }

    async fn choose(&mut self, index: usize) -> Result<(), SessionError> {
        self.at_root = false;
        self.click_answer(index).await
    }

    async fn reset_to_root(&mut self) -> Result<(), SessionError> {
        if self.at_root {
            return Ok(());
        }
        let restarted = self.restart().await;
        self.distrust_on_error(restarted)
    }
}

async fn send(
    client: &Client,
    method: Method,
    url: Url,
    body: Option<Value>,
) -> Result<Value, WebDriverError> {
    tracing::debug!(%method, %url, "webdriver command");
    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }
    let response = request.send().await?;
    let status = response.status();
    let payload: Value = response.json().await?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if !status.is_success() {
        let error = value
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Err(WebDriverError::Protocol {
            status: status.as_u16(),
            error,
            message,
        });
    }

    // Pre-W3C drivers put the session id next to `value` instead of inside it.
    if let (Some(id), Value::Object(mut map)) = (payload.get("sessionId"), value.clone()) {
        map.entry("sessionId").or_insert_with(|| id.clone());
        return Ok(Value::Object(map));
    }
    Ok(value)
}

fn element_id(value: &Value) -> Result<String, WebDriverError> {
    value
        .get(ELEMENT_KEY)
        .or_else(|| value.get(LEGACY_ELEMENT_KEY))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| WebDriverError::Malformed(format!("expected element reference, got {value}")))
}

fn with_trailing_slash(url: &Url) -> Result<Url, url::ParseError> {
    if url.path().ends_with('/') {
        Ok(url.clone())
    } else {
        Url::parse(&format!("{}/", url.as_str()))
    }
}
