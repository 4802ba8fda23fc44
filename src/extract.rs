//! Pull-request context scraping.
//!
//! GitHub renders PR pages with several generations of markup at once, so
//! every field is read through an ordered list of selectors. The first
//! selector that yields anything wins, except on the creation page where all
//! file selectors are merged.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::context::{FileStatus, PrContext};
use crate::error::{Error, Result};
use crate::page::{
    Document, PageKind, PageSource, closest, fetch_snapshot, is_supported_host, parse_selector,
    select_within, text_of, url_path, value_of,
};
use crate::wait::{settle, wait_for_elements};

const DIFF_EXCERPT_CHARS: usize = 2000;
const MIN_CREATION_FILES: usize = 2;

const CREATION_TITLE: &str = r#"input[name="pull_request[title]"]"#;
/// One selector group so commits come out in page order.
const CREATION_COMMITS: &str =
    ".commit-message, .commit-title, .js-commit-title, .commit-message-link, .markdown-title";
const CREATION_FILE_SELECTORS: &[&str] = &[
    ".file-info a",
    ".file .file-info a",
    ".file-header .file-info a",
    ".file-header a",
    ".file .file-header a",
];
const CREATION_STATUS: &str = ".file-info .status, .file-status, .status-badge";
const FILE_CONTAINER: &str = ".file, .js-file";

const EXISTING_TITLE: &str = ".gh-header-title .js-issue-title";
const EXISTING_COMMIT_SELECTORS: &[&str] = &[
    ".commit-message a",
    ".commit-title a",
    ".commit-message",
    ".js-commit-message",
    r#"[data-testid="commit-message"]"#,
    ".commit .commit-message",
    ".commit-title",
    ".commit .message",
    ".js-commit-title",
    ".commit-message-link",
];
const EXISTING_FILE_SELECTORS: &[&str] = &[
    ".file-info a",
    ".file a",
    ".js-file a",
    r#"[data-testid="file-name"]"#,
    ".file-info .file-name",
    ".file-name a",
    ".file-header a",
    ".file-info .file-name a",
    ".js-file .file-name",
    ".file .file-name a",
];
const FILE_ROW_SELECTORS: &[&str] = &[".file.js-file", ".js-file", r#"[data-testid="file-row"]"#];
const ROW_NAME: &str = ".file-info a, .file a, .file-name";
const ROW_STATUS_SELECTORS: &[&str] = &[
    ".file-info .status",
    ".file-status",
    ".status-badge",
    r#"[data-testid="file-status"]"#,
];

const DIFF_LINES: &str = ".blob-code-addition, .blob-code-deletion";
const DIFF_BODY: &str = ".diff-view, .diff-table";

/// Timing knobs for pages that load content after the initial render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Upper bound on waiting for file entries on creation pages.
    pub wait_timeout: Duration,
    /// Delay between snapshots while waiting.
    pub poll_interval: Duration,
    /// Fixed delay before reading commits and files on existing PR pages.
    pub settle_delay: Duration,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            wait_timeout: Duration::from_millis(2000),
            poll_interval: Duration::from_millis(200),
            settle_delay: Duration::from_millis(1000),
        }
    }
}

/// Scrape the PR context from `source`.
pub async fn extract(
    source: &Arc<dyn PageSource>,
    options: &ExtractOptions,
) -> Result<PrContext> {
    let url = source.url().to_string();
    if !is_supported_host(&url) {
        return Err(Error::UnsupportedPage(
            "Not on a supported PR page".to_string(),
        ));
    }

    let kind = PageKind::from_url(&url);
    let mut context = PrContext::default();

    let html = match kind {
        PageKind::Creation => {
            let initial = fetch_snapshot(source).await?;
            read_creation_header(&Document::parse(&initial), &url, &mut context)?;
            let html = wait_for_elements(
                source,
                CREATION_FILE_SELECTORS,
                MIN_CREATION_FILES,
                options.wait_timeout,
                options.poll_interval,
            )
            .await?;
            read_creation_files(&Document::parse(&html), &mut context)?;
            html
        }
        PageKind::Existing => {
            let initial = fetch_snapshot(source).await?;
            read_existing_header(&Document::parse(&initial), &mut context)?;
            let html = settle(source, options.settle_delay).await?;
            read_existing_body(&Document::parse(&html), &mut context)?;
            html
        }
        PageKind::Other => fetch_snapshot(source).await?,
    };

    let doc = Document::parse(&html);
    read_diff(&doc, &mut context)?;
    log_page_elements(&doc, kind)?;

    if context.is_empty() {
        warn!(page = kind.label(), "no PR data found on page");
    }
    info!(
        page = kind.label(),
        commits = context.commits.len(),
        files = context.files.len(),
        total_lines = context.changes.total_lines,
        "extracted PR context"
    );
    Ok(context)
}

fn read_creation_header(doc: &Document, url: &str, context: &mut PrContext) -> Result<()> {
    if let Some(input) = doc.first(CREATION_TITLE)? {
        context.title = value_of(&input);
    }

    context.branch = creation_branch(doc, url)?;

    for el in doc.select_all(CREATION_COMMITS)? {
        let text = text_of(&el);
        if !text.is_empty() {
            context.push_commit(&text);
        }
    }
    Ok(())
}

fn creation_branch(doc: &Document, url: &str) -> Result<String> {
    let names = doc.select_all(".branch-name")?;
    if names.len() >= 2 {
        return Ok(format!("{} → {}", text_of(&names[0]), text_of(&names[1])));
    }

    if let (Some(head), Some(base)) = (doc.first(".head-ref")?, doc.first(".base-ref")?) {
        return Ok(format!("{} → {}", text_of(&head), text_of(&base)));
    }

    if let (Some(head), Some(base)) = (doc.first("input#head_ref")?, doc.first("input#base_ref")?)
    {
        let branch = format!("{} → {}", value_of(&head), value_of(&base));
        if branch.trim() != "→" {
            return Ok(branch);
        }
    }

    let path = url_path(url);
    if path.contains("/compare/")
        && let Some(last) = path.rsplit('/').next()
        && !last.is_empty()
    {
        return Ok(last.to_string());
    }

    Ok(String::new())
}

fn read_creation_files(doc: &Document, context: &mut PrContext) -> Result<()> {
    let container = parse_selector(FILE_CONTAINER)?;
    for selector in CREATION_FILE_SELECTORS {
        for el in doc.select_all(selector)? {
            let name = text_of(&el);
            if name.is_empty() || !context.push_file(&name) {
                continue;
            }
            let Some(file) = closest(el, &container) else {
                continue;
            };
            if let Some(status) = select_within(file, CREATION_STATUS)?
                && let Some(kind) = FileStatus::classify(&text_of(&status))
            {
                context.record_status(&name, kind);
            }
        }
    }
    Ok(())
}

fn read_existing_header(doc: &Document, context: &mut PrContext) -> Result<()> {
    if let Some(title) = doc.first(EXISTING_TITLE)? {
        context.title = text_of(&title);
    }

    let refs = doc.select_all(".head-ref, .base-ref")?;
    if refs.len() >= 2 {
        context.branch = format!("{} → {}", text_of(&refs[0]), text_of(&refs[1]));
    }
    Ok(())
}

fn read_existing_body(doc: &Document, context: &mut PrContext) -> Result<()> {
    if let Some(tab) = doc.first(".tabnav-tab.selected")? {
        debug!(tab = %text_of(&tab), "current tab");
    }

    if let Some((selector, commits)) = doc.first_nonempty(EXISTING_COMMIT_SELECTORS)? {
        debug!(selector, count = commits.len(), "using commit selector");
        for el in commits {
            let text = text_of(&el);
            if text.chars().count() > 5 {
                context.push_commit(&text);
            }
        }
    }

    if let Some((selector, files)) = doc.first_nonempty(EXISTING_FILE_SELECTORS)? {
        debug!(selector, count = files.len(), "using file selector");
        for el in files {
            let name = text_of(&el);
            if name.chars().count() > 1 {
                context.push_file(&name);
            }
        }
    }

    if let Some((_, rows)) = doc.first_nonempty(FILE_ROW_SELECTORS)? {
        for row in rows {
            let Some(name_el) = select_within(row, ROW_NAME)? else {
                continue;
            };
            let name = text_of(&name_el);
            if name.is_empty() {
                continue;
            }
            for selector in ROW_STATUS_SELECTORS {
                if let Some(status) = select_within(row, selector)? {
                    if let Some(kind) = FileStatus::classify(&text_of(&status)) {
                        context.record_status(&name, kind);
                    }
                    break;
                }
            }
        }
    }
    Ok(())
}

fn read_diff(doc: &Document, context: &mut PrContext) -> Result<()> {
    let mut added = 0usize;
    let mut deleted = 0usize;
    for line in doc.select_all(DIFF_LINES)? {
        if line.value().classes().any(|c| c == "blob-code-addition") {
            added += 1;
        } else {
            deleted += 1;
        }
    }
    context.changes.total_lines = added + deleted;

    if let Some(body) = doc.first(DIFF_BODY)? {
        context.diff = body.text().collect::<String>().chars().take(DIFF_EXCERPT_CHARS).collect();
    }
    debug!(added, deleted, "counted diff lines");
    Ok(())
}

fn log_page_elements(doc: &Document, kind: PageKind) -> Result<()> {
    debug!(
        page = kind.label(),
        title_input = doc.count(&[CREATION_TITLE])? > 0,
        title_element = doc.count(&[EXISTING_TITLE])? > 0,
        branch_elements = doc.count(&[".branch-name, .head-ref, .base-ref"])?,
        commit_messages = doc.count(&[".commit-message a, .commit-title a, .commit-message"])?,
        file_elements = doc.count(&[".file-info a, .file a, .js-file"])?,
        file_rows = doc.count(&[".file.js-file, .js-file"])?,
        diff_elements = doc.count(&[DIFF_LINES])?,
        "page elements found"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticPage {
        url: String,
        html: String,
    }

    impl StaticPage {
        fn new(url: &str, html: &str) -> Arc<dyn PageSource> {
            Arc::new(Self {
                url: url.to_string(),
                html: html.to_string(),
            })
        }
    }

    impl PageSource for StaticPage {
        fn url(&self) -> &str {
            &self.url
        }

        fn snapshot(&self) -> Result<String> {
            Ok(self.html.clone())
        }
    }

    fn fast() -> ExtractOptions {
        ExtractOptions {
            wait_timeout: Duration::from_millis(10),
            poll_interval: Duration::from_millis(1),
            settle_delay: Duration::ZERO,
        }
    }

    const CREATION_PAGE: &str = r#"
        <input name="pull_request[title]" value="Add OAuth login">
        <span class="branch-name">main</span><span class="branch-name">feat/oauth</span>
        <div class="commit-message">Add OAuth provider</div>
        <div class="commit-title">Wire login button</div>
        <div class="commit-title">Add OAuth provider</div>
        <div class="file">
          <div class="file-header"><div class="file-info">
            <a>src/oauth.rs</a><span class="status">added</span>
          </div></div>
        </div>
        <div class="file">
          <div class="file-header"><div class="file-info">
            <a>src/main.rs</a><span class="status">modified</span>
          </div></div>
        </div>
        <table class="diff-table">
          <tr><td class="blob-code blob-code-addition">+ fn login()</td></tr>
          <tr><td class="blob-code blob-code-addition">+ }</td></tr>
          <tr><td class="blob-code blob-code-deletion">- old()</td></tr>
        </table>
    "#;

    #[tokio::test]
    async fn test_rejects_unsupported_host() {
        let page = StaticPage::new("https://gitlab.com/o/r/-/merge_requests/1", "");
        let err = extract(&page, &fast()).await.unwrap_err();
        assert_eq!(err.to_string(), "Not on a supported PR page");
    }

    #[tokio::test]
    async fn test_creation_page() {
        let page = StaticPage::new("https://github.com/o/r/compare/main...feat", CREATION_PAGE);
        let ctx = extract(&page, &fast()).await.unwrap();
        assert_eq!(ctx.title, "Add OAuth login");
        assert_eq!(ctx.branch, "main → feat/oauth");
        assert_eq!(ctx.commits, vec!["Add OAuth provider", "Wire login button"]);
        assert_eq!(ctx.files, vec!["src/oauth.rs", "src/main.rs"]);
        assert_eq!(ctx.changes.added, vec!["src/oauth.rs"]);
        assert_eq!(ctx.changes.modified, vec!["src/main.rs"]);
        assert_eq!(ctx.changes.total_lines, 3);
        assert!(ctx.diff.contains("fn login()"));
    }

    #[tokio::test]
    async fn test_creation_commits_in_page_order() {
        let html = r#"
            <div class="commit-title">First commit in page</div>
            <div class="commit-message">Second commit in page</div>
            <a class="markdown-title">Third commit in page</a>
        "#;
        let page = StaticPage::new("https://github.com/o/r/compare/main...feat", html);
        let ctx = extract(&page, &fast()).await.unwrap();
        assert_eq!(
            ctx.commits,
            vec![
                "First commit in page",
                "Second commit in page",
                "Third commit in page"
            ]
        );
        // No title on the page, so the summary falls back to the first commit.
        assert_eq!(
            crate::template::render_local("{{summary}}", &ctx).unwrap(),
            "First commit in page"
        );
    }

    #[tokio::test]
    async fn test_creation_branch_from_refs() {
        let html = r#"<span class="head-ref"> feat </span><span class="base-ref"> main </span>"#;
        let page = StaticPage::new("https://github.com/o/r/pull/new/feat", html);
        let ctx = extract(&page, &fast()).await.unwrap();
        assert_eq!(ctx.branch, "feat → main");
    }

    #[tokio::test]
    async fn test_creation_branch_from_inputs() {
        let html = r#"<input id="head_ref" value="feat"><input id="base_ref" value="main">"#;
        let page = StaticPage::new("https://github.com/o/r/pull/new/feat", html);
        let ctx = extract(&page, &fast()).await.unwrap();
        assert_eq!(ctx.branch, "feat → main");
    }

    #[tokio::test]
    async fn test_creation_branch_from_compare_url() {
        let page = StaticPage::new("https://github.com/o/r/compare/main...feat", "<p></p>");
        let ctx = extract(&page, &fast()).await.unwrap();
        assert_eq!(ctx.branch, "main...feat");
    }

    #[tokio::test]
    async fn test_creation_page_without_files_times_out_gracefully() {
        let html = r#"<input name="pull_request[title]" value="Tiny">"#;
        let page = StaticPage::new("https://github.com/o/r/pull/new/feat", html);
        let ctx = extract(&page, &fast()).await.unwrap();
        assert_eq!(ctx.title, "Tiny");
        assert!(ctx.files.is_empty());
    }

    const EXISTING_PAGE: &str = r#"
        <h1 class="gh-header-title"><bdi class="js-issue-title"> Fix cache eviction </bdi></h1>
        <span class="head-ref">fix/cache</span><span class="base-ref">main</span>
        <nav><a class="tabnav-tab selected">Files changed</a></nav>
        <p class="commit-message"><a>Fix</a></p>
        <p class="commit-message"><a>Evict oldest entry first</a></p>
        <p class="commit-title">ignored because an earlier selector matched</p>
        <div class="file js-file">
          <div class="file-info"><a>src/cache.rs</a></div>
          <span class="file-status">modified</span>
        </div>
        <div class="file js-file">
          <div class="file-info"><a>src/old.rs</a></div>
          <span class="status-badge">deleted</span>
        </div>
        <div class="file js-file"><div class="file-info"><a>x</a></div></div>
        <table><tr><td class="blob-code-deletion">-</td></tr></table>
    "#;

    #[tokio::test]
    async fn test_existing_page() {
        let page = StaticPage::new("https://github.com/o/r/pull/7/files", EXISTING_PAGE);
        let ctx = extract(&page, &fast()).await.unwrap();
        assert_eq!(ctx.title, "Fix cache eviction");
        assert_eq!(ctx.branch, "fix/cache → main");
        // "Fix" is too short to count as a commit message.
        assert_eq!(ctx.commits, vec!["Evict oldest entry first"]);
        // single-character names are dropped
        assert_eq!(ctx.files, vec!["src/cache.rs", "src/old.rs"]);
        assert_eq!(ctx.changes.modified, vec!["src/cache.rs"]);
        assert_eq!(ctx.changes.deleted, vec!["src/old.rs"]);
        assert_eq!(ctx.changes.total_lines, 1);
    }

    #[tokio::test]
    async fn test_other_page_still_counts_diff() {
        let html = r#"<span class="blob-code-addition">+</span><span class="blob-code-addition">+</span>"#;
        let page = StaticPage::new("https://github.com/o/r/commit/abc", html);
        let ctx = extract(&page, &fast()).await.unwrap();
        assert!(ctx.title.is_empty());
        assert_eq!(ctx.changes.total_lines, 2);
    }

    #[tokio::test]
    async fn test_diff_excerpt_truncated() {
        let long = "x".repeat(5000);
        let html = format!(r#"<div class="diff-view">{long}</div>"#);
        let page = StaticPage::new("https://github.com/o/r/pull/1", &html);
        let ctx = extract(&page, &fast()).await.unwrap();
        assert_eq!(ctx.diff.chars().count(), DIFF_EXCERPT_CHARS);
    }
}
