use std::path::PathBuf;
use std::sync::Arc;

use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use crate::error::{Error, Result};

const SUPPORTED_HOST: &str = "github.com";
const USER_AGENT: &str = concat!("pr-autofill/", env!("CARGO_PKG_VERSION"));

/// Which GitHub pull-request layout a URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Creation,
    Existing,
    Other,
}

impl PageKind {
    pub fn from_url(url: &str) -> Self {
        let path = url_path(url);
        if path.contains("/pull/new") || path.contains("/compare/") {
            PageKind::Creation
        } else if path.contains("/pull/") {
            PageKind::Existing
        } else {
            PageKind::Other
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PageKind::Creation => "PR Creation",
            PageKind::Existing => "Existing PR",
            PageKind::Other => "Other",
        }
    }
}

/// Host portion of an absolute URL, without port or credentials.
pub fn url_host(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or_default();
    let authority = authority.rsplit('@').next().unwrap_or(authority);
    authority.split(':').next().unwrap_or(authority)
}

/// Path portion of an absolute URL, without query or fragment.
pub fn url_path(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let Some(slash) = rest.find('/') else {
        return "/";
    };
    let path = &rest[slash..];
    path.split(['?', '#']).next().unwrap_or(path)
}

pub fn is_supported_host(url: &str) -> bool {
    url_host(url).eq_ignore_ascii_case(SUPPORTED_HOST)
}

/// Pull request number from an existing-PR URL such as `/owner/repo/pull/42/files`.
pub fn pr_number(url: &str) -> Option<u64> {
    let mut segments = url_path(url).split('/');
    segments.find(|s| *s == "pull")?;
    segments.next()?.parse().ok()
}

/// A live or saved pull-request page that can be re-read on demand.
pub trait PageSource: Send + Sync {
    fn url(&self) -> &str;

    /// Current HTML of the page. May block on I/O.
    fn snapshot(&self) -> Result<String>;

    /// True when every snapshot returns the same HTML, so waiting for late
    /// content is pointless.
    fn is_static(&self) -> bool {
        false
    }
}

/// Take a snapshot on the blocking pool.
pub async fn fetch_snapshot(source: &Arc<dyn PageSource>) -> Result<String> {
    let source = Arc::clone(source);
    tokio::task::spawn_blocking(move || source.snapshot())
        .await
        .map_err(|e| Error::PageFetch(format!("snapshot task failed: {e}")))?
}

/// Page saved to disk. Each snapshot re-reads the file, but nothing is
/// expected to change it mid-run.
pub struct FileSource {
    url: String,
    path: PathBuf,
}

impl FileSource {
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
        }
    }
}

impl PageSource for FileSource {
    fn url(&self) -> &str {
        &self.url
    }

    fn snapshot(&self) -> Result<String> {
        std::fs::read_to_string(&self.path).map_err(|e| {
            Error::PageFetch(format!("failed to read {}: {e}", self.path.display()))
        })
    }

    fn is_static(&self) -> bool {
        true
    }
}

/// Page fetched over HTTP on every snapshot.
pub struct HttpSource {
    url: String,
    cookie: Option<String>,
}

impl HttpSource {
    pub fn new(url: impl Into<String>, cookie: Option<String>) -> Self {
        Self {
            url: url.into(),
            cookie,
        }
    }
}

impl PageSource for HttpSource {
    fn url(&self) -> &str {
        &self.url
    }

    fn snapshot(&self) -> Result<String> {
        let mut request = ureq::get(&self.url).set("User-Agent", USER_AGENT);
        if let Some(ref cookie) = self.cookie {
            request = request.set("Cookie", cookie);
        }
        let response = request.call().map_err(|e| match e {
            ureq::Error::Status(code, _) => {
                Error::PageFetch(format!("GET {} returned {code}", self.url))
            }
            ureq::Error::Transport(t) => Error::PageFetch(format!("GET {} failed: {t}", self.url)),
        })?;
        let body = response
            .into_string()
            .map_err(|e| Error::PageFetch(format!("failed to read page body: {e}")))?;
        debug!(url = %self.url, bytes = body.len(), "fetched page snapshot");
        Ok(body)
    }
}

pub fn parse_selector(selector: &str) -> Result<Selector> {
    Selector::parse(selector).map_err(|e| Error::Selector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Trimmed text content of an element.
pub fn text_of(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Form value of an element, falling back to its text (for `<textarea>`).
pub fn value_of(element: &ElementRef<'_>) -> String {
    match element.value().attr("value") {
        Some(v) => v.to_string(),
        None if element.value().name() == "textarea" => element.text().collect(),
        None => String::new(),
    }
}

/// Parsed snapshot of a page.
pub struct Document {
    html: Html,
}

impl Document {
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
        }
    }

    pub fn select_all(&self, selector: &str) -> Result<Vec<ElementRef<'_>>> {
        let selector = parse_selector(selector)?;
        Ok(self.html.select(&selector).collect())
    }

    pub fn first(&self, selector: &str) -> Result<Option<ElementRef<'_>>> {
        let selector = parse_selector(selector)?;
        Ok(self.html.select(&selector).next())
    }

    /// Total number of matches across all selectors.
    pub fn count(&self, selectors: &[&str]) -> Result<usize> {
        let mut total = 0;
        for selector in selectors {
            total += self.select_all(selector)?.len();
        }
        Ok(total)
    }

    /// Walk a selector fallback chain and return the matches of the first
    /// selector that finds anything, along with that selector.
    pub fn first_nonempty<'s>(
        &self,
        chain: &[&'s str],
    ) -> Result<Option<(&'s str, Vec<ElementRef<'_>>)>> {
        for &selector in chain {
            let found = self.select_all(selector)?;
            debug!(selector, count = found.len(), "trying selector");
            if !found.is_empty() {
                return Ok(Some((selector, found)));
            }
        }
        Ok(None)
    }

    /// First element matched by the first selector in the chain that matches.
    pub fn first_match(&self, chain: &[&str]) -> Result<Option<ElementRef<'_>>> {
        for selector in chain {
            if let Some(el) = self.first(selector)? {
                return Ok(Some(el));
            }
        }
        Ok(None)
    }
}

/// Nearest element (starting at `element` itself) that matches `selector`.
pub fn closest<'a>(element: ElementRef<'a>, selector: &Selector) -> Option<ElementRef<'a>> {
    std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .find(|el| selector.matches(el))
}

/// First descendant of `element` matching `selector`.
pub fn select_within<'a>(element: ElementRef<'a>, selector: &str) -> Result<Option<ElementRef<'a>>> {
    let selector = parse_selector(selector)?;
    Ok(element.select(&selector).next())
}
