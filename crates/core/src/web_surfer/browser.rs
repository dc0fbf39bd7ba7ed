// Text browser used by the inner web surfing agent
//
// Design decisions:
// - Pages are fetched once and rendered as plain text split into viewports, so
//   the LLM reads a page in bounded chunks (page_down / page_up / find_on_page)
// - Fetching sits behind the WebPageFetcher trait; HTTP is the default, tests
//   inject fakes or point the HTTP fetcher at a mock server
// - Fetch failures are tool-level errors: the LLM sees them and can try
//   another URL
// - Timeout for connect plus first response byte: 5 seconds; body reads stop
//   after 30 seconds and keep the partial content

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, USER_AGENT};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use super::html::html_to_page;
use crate::tools::{Tool, ToolExecutionResult};

/// Timeout for connection plus first response byte
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for reading the entire response body
const BODY_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of characters shown per viewport
pub const DEFAULT_VIEWPORT_SIZE: usize = 5120;

/// Links listed under each viewport
const MAX_LISTED_LINKS: usize = 25;

// ============================================================================
// Fetching
// ============================================================================

/// A page rendered as text
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub url: String,
    pub title: Option<String>,
    pub text: String,
    /// (anchor text, absolute URL)
    pub links: Vec<(String, String)>,
}

/// Why a page could not be loaded
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid URL '{0}': must be an absolute http or https URL")]
    InvalidUrl(String),

    #[error("Request to {url} failed with status {status}")]
    Status { url: String, status: u16 },

    #[error("Binary content ({0}) cannot be displayed")]
    Binary(String),

    #[error("Request failed: {0}")]
    Request(String),
}

/// Source of web pages
#[async_trait]
pub trait WebPageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

/// Fetches pages over HTTP(S)
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: reqwest::Client,
    first_byte_timeout: Duration,
    body_timeout: Duration,
}

impl HttpPageFetcher {
    pub fn new() -> Result<Self, FetchError> {
        Self::with_timeouts(CONNECT_TIMEOUT, BODY_TIMEOUT)
    }

    pub fn with_timeouts(first_byte_timeout: Duration, body_timeout: Duration) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("FastAgency-WebSurfer/0.1"));
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html, text/plain, */*;q=0.8"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(first_byte_timeout)
            .build()
            .map_err(|e| FetchError::Request(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            first_byte_timeout,
            body_timeout,
        })
    }
}

#[async_trait]
impl WebPageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let parsed = url::Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(url.to_string()));
        }

        let request = self.client.get(parsed.clone()).send();
        let response = match tokio::time::timeout(self.first_byte_timeout, request).await {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => {
                tracing::warn!(url = %url, error = %e, "Page request failed");
                return Err(if e.is_connect() {
                    FetchError::Request("Failed to connect to server".to_string())
                } else {
                    FetchError::Request(e.to_string())
                });
            }
            Err(_) => {
                tracing::warn!(url = %url, "Page request timed out waiting for first byte");
                return Err(FetchError::Request(format!(
                    "Request timed out: server did not respond within {:?}",
                    self.first_byte_timeout
                )));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().to_string();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();

        if is_binary_content_type(&content_type) {
            return Err(FetchError::Binary(content_type));
        }

        let (body, timed_out) = read_body_with_timeout(response, self.body_timeout).await;

        let is_html = content_type.contains("text/html")
            || content_type.contains("application/xhtml")
            || body.trim_start().starts_with("<!DOCTYPE")
            || body.trim_start().starts_with("<html");

        let mut page = if is_html {
            let rendered = html_to_page(&body);
            let base = url::Url::parse(&final_url).unwrap_or(parsed);
            FetchedPage {
                url: final_url,
                title: rendered.title,
                text: rendered.text,
                links: rendered
                    .links
                    .into_iter()
                    .filter_map(|(text, href)| {
                        base.join(&href).ok().map(|absolute| (text, absolute.to_string()))
                    })
                    .collect(),
            }
        } else {
            FetchedPage {
                url: final_url,
                title: None,
                text: body,
                links: Vec::new(),
            }
        };

        if timed_out {
            page.text.push_str("\n\n[..more content timed out...]");
        }
        Ok(page)
    }
}

fn is_binary_content_type(content_type: &str) -> bool {
    const BINARY_PREFIXES: [&str; 10] = [
        "image/",
        "audio/",
        "video/",
        "font/",
        "application/octet-stream",
        "application/pdf",
        "application/zip",
        "application/gzip",
        "application/vnd.ms-",
        "application/vnd.openxmlformats",
    ];

    BINARY_PREFIXES.iter().any(|prefix| content_type.contains(prefix))
}

/// Read the body, returning partial content if the timeout is exceeded
async fn read_body_with_timeout(response: reqwest::Response, timeout: Duration) -> (String, bool) {
    let start = Instant::now();
    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();
    let mut timed_out = false;

    loop {
        let remaining = timeout.saturating_sub(start.elapsed());
        let chunk = match tokio::time::timeout(remaining, stream.next()).await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(_) => {
                timed_out = true;
                tracing::warn!(
                    bytes = bytes.len(),
                    "Body read timed out after {:?}, keeping partial content",
                    timeout
                );
                break;
            }
        };

        match chunk {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(e) => {
                tracing::warn!(error = %e, "Error reading response chunk");
                break;
            }
        }
    }

    (String::from_utf8_lossy(&bytes).into_owned(), timed_out)
}

// ============================================================================
// Browser
// ============================================================================

#[derive(Default)]
struct BrowserState {
    page: Option<FetchedPage>,
    viewports: Vec<String>,
    position: usize,
    history: Vec<String>,
}

/// Stateful text browser: one open page, a viewport position, a history
pub struct Browser {
    fetcher: Arc<dyn WebPageFetcher>,
    viewport_size: usize,
    state: Mutex<BrowserState>,
}

impl Browser {
    pub fn new(fetcher: Arc<dyn WebPageFetcher>, viewport_size: usize) -> Self {
        Self {
            fetcher,
            viewport_size: viewport_size.max(1),
            state: Mutex::new(BrowserState::default()),
        }
    }

    /// Open a URL (relative URLs resolve against the open page)
    pub async fn visit(&self, url: &str) -> Result<String, FetchError> {
        let target = self.resolve(url);
        tracing::debug!(url = %target, "Visiting page");

        let page = self.fetcher.fetch(&target).await?;

        let mut state = self.state.lock();
        state.viewports = split_viewports(&page.text, self.viewport_size);
        state.position = 0;
        state.history.push(page.url.clone());
        state.page = Some(page);
        Ok(render(&state))
    }

    pub fn page_down(&self) -> Option<String> {
        let mut state = self.state.lock();
        state.page.as_ref()?;
        if state.position + 1 < state.viewports.len() {
            state.position += 1;
        }
        Some(render(&state))
    }

    pub fn page_up(&self) -> Option<String> {
        let mut state = self.state.lock();
        state.page.as_ref()?;
        state.position = state.position.saturating_sub(1);
        Some(render(&state))
    }

    /// Jump to the next viewport containing `query` (case-insensitive),
    /// starting at the current one and wrapping around.
    ///
    /// Outer `None`: no page is open. Inner `None`: not found.
    pub fn find(&self, query: &str) -> Option<Option<String>> {
        let mut state = self.state.lock();
        state.page.as_ref()?;

        let needle = query.to_lowercase();
        let count = state.viewports.len();
        let found = (0..count)
            .map(|offset| (state.position + offset) % count)
            .find(|&index| state.viewports[index].to_lowercase().contains(&needle));

        Some(found.map(|index| {
            state.position = index;
            render(&state)
        }))
    }

    /// URLs visited in order
    pub fn history(&self) -> Vec<String> {
        self.state.lock().history.clone()
    }

    pub fn current_url(&self) -> Option<String> {
        self.state.lock().page.as_ref().map(|p| p.url.clone())
    }

    fn resolve(&self, url: &str) -> String {
        let state = self.state.lock();
        match state.page.as_ref().and_then(|p| url::Url::parse(&p.url).ok()) {
            Some(base) if url::Url::parse(url).is_err() => base
                .join(url)
                .map(|u| u.to_string())
                .unwrap_or_else(|_| url.to_string()),
            _ => url.to_string(),
        }
    }
}

fn split_viewports(text: &str, size: usize) -> Vec<String> {
    if text.is_empty() {
        return vec![String::new()];
    }

    let mut viewports = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + size).min(text.len());
        while !text.is_char_boundary(end) {
            end += 1;
        }
        if end < text.len() {
            if let Some(space) = text[start..end].rfind(char::is_whitespace) {
                if space > 0 {
                    end = start + space;
                }
            }
        }

        let chunk = text[start..end].trim();
        if !chunk.is_empty() {
            viewports.push(chunk.to_string());
        }
        start = end;
    }

    if viewports.is_empty() {
        viewports.push(String::new());
    }
    viewports
}

fn render(state: &BrowserState) -> String {
    let Some(page) = &state.page else {
        return String::new();
    };

    let mut out = format!("Address: {}\n", page.url);
    if let Some(title) = &page.title {
        out.push_str(&format!("Title: {}\n", title));
    }
    out.push_str(&format!(
        "Viewport position: Showing page {} of {}.\n=======================\n",
        state.position + 1,
        state.viewports.len()
    ));
    out.push_str(state.viewports.get(state.position).map(String::as_str).unwrap_or(""));

    if !page.links.is_empty() {
        out.push_str("\n\nLinks on this page:");
        for (text, href) in page.links.iter().take(MAX_LISTED_LINKS) {
            out.push_str(&format!("\n- [{}]({})", text, href));
        }
    }
    out
}

// ============================================================================
// Browser tools
// ============================================================================

/// Names of the functions offered to the inner browsing agent
pub const BROWSER_TOOL_NAMES: [&str; 4] = ["visit_page", "page_down", "page_up", "find_on_page"];

const NO_PAGE_OPEN: &str = "No page is open. Use visit_page first.";

/// Tools operating on one shared browser
pub fn browser_tools(browser: Arc<Browser>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(VisitPageTool {
            browser: Arc::clone(&browser),
        }),
        Arc::new(PageDownTool {
            browser: Arc::clone(&browser),
        }),
        Arc::new(PageUpTool {
            browser: Arc::clone(&browser),
        }),
        Arc::new(FindOnPageTool { browser }),
    ]
}

struct VisitPageTool {
    browser: Arc<Browser>,
}

#[async_trait]
impl Tool for VisitPageTool {
    fn name(&self) -> &str {
        "visit_page"
    }

    fn description(&self) -> &str {
        "Visit a web page by URL and show its first viewport as text, followed by the links on the page."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Absolute http(s) URL, or a path relative to the current page"
                }
            },
            "required": ["url"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let Some(url) = arguments.get("url").and_then(|v| v.as_str()) else {
            return ToolExecutionResult::tool_error("Missing required parameter: url");
        };

        match self.browser.visit(url).await {
            Ok(view) => ToolExecutionResult::success(view),
            Err(e) => ToolExecutionResult::tool_error(e.to_string()),
        }
    }
}

struct PageDownTool {
    browser: Arc<Browser>,
}

#[async_trait]
impl Tool for PageDownTool {
    fn name(&self) -> &str {
        "page_down"
    }

    fn description(&self) -> &str {
        "Scroll the open page down by one viewport."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}, "additionalProperties": false})
    }

    async fn execute(&self, _arguments: Value) -> ToolExecutionResult {
        match self.browser.page_down() {
            Some(view) => ToolExecutionResult::success(view),
            None => ToolExecutionResult::tool_error(NO_PAGE_OPEN),
        }
    }
}

struct PageUpTool {
    browser: Arc<Browser>,
}

#[async_trait]
impl Tool for PageUpTool {
    fn name(&self) -> &str {
        "page_up"
    }

    fn description(&self) -> &str {
        "Scroll the open page up by one viewport."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}, "additionalProperties": false})
    }

    async fn execute(&self, _arguments: Value) -> ToolExecutionResult {
        match self.browser.page_up() {
            Some(view) => ToolExecutionResult::success(view),
            None => ToolExecutionResult::tool_error(NO_PAGE_OPEN),
        }
    }
}

struct FindOnPageTool {
    browser: Arc<Browser>,
}

#[async_trait]
impl Tool for FindOnPageTool {
    fn name(&self) -> &str {
        "find_on_page"
    }

    fn description(&self) -> &str {
        "Scroll the open page to the next viewport containing the search string (case-insensitive)."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "search_string": {
                    "type": "string",
                    "description": "Text to look for"
                }
            },
            "required": ["search_string"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let Some(query) = arguments.get("search_string").and_then(|v| v.as_str()) else {
            return ToolExecutionResult::tool_error("Missing required parameter: search_string");
        };

        match self.browser.find(query) {
            None => ToolExecutionResult::tool_error(NO_PAGE_OPEN),
            Some(Some(view)) => ToolExecutionResult::success(view),
            Some(None) => ToolExecutionResult::success(format!(
                "The search string '{}' was not found on this page.",
                query
            )),
        }
    }
}
