use std::cell::Cell;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;

use lol_html::html_content::ContentType;
use lol_html::{RewriteStrSettings, element, rewrite_str};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::page::{Document, PageSource, pr_number, url_path, value_of};

const FIELD_SELECTORS: &[&str] = &[
    r#"textarea[name="pull_request[body]"]"#,
    "textarea#pull_request_body",
    "form.js-new-pr-form textarea",
    "form.js-issue-update textarea",
    "markdown-toolbar + textarea",
    ".comment-form-textarea textarea",
    ".js-comment-field",
];
const RICH_EDITOR: &str = ".ProseMirror";
const BODY_FIELD: &str =
    r#"textarea[name="pull_request[body]"], textarea#pull_request_body, .js-comment-field"#;

const FILL_FAILED: &str =
    "Failed to fill description. Please check if you are on a supported PR page.";

/// Where a description can be written on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldTarget {
    /// A form control, identified by tag name and its position among
    /// elements with that tag in document order.
    FormField { tag: String, index: usize },
    /// The rich markdown editor; the first `.ProseMirror` element.
    RichEditor,
}

/// Find the description field, trying plain form controls before the rich editor.
pub fn locate_field(doc: &Document) -> Result<Option<FieldTarget>> {
    if let Some(field) = doc.first_match(FIELD_SELECTORS)? {
        let tag = field.value().name().to_string();
        let index = doc
            .select_all(&tag)?
            .iter()
            .position(|el| el.id() == field.id())
            .unwrap_or(0);
        debug!(tag = %tag, index, "found description field");
        return Ok(Some(FieldTarget::FormField { tag, index }));
    }
    if doc.first(RICH_EDITOR)?.is_some() {
        debug!("falling back to rich editor");
        return Ok(Some(FieldTarget::RichEditor));
    }
    Ok(None)
}

/// Text currently in the description field, for reuse as a template.
pub fn current_body(doc: &Document) -> Result<String> {
    if let Some(field) = doc.first(BODY_FIELD)? {
        let text = value_of(&field);
        if !text.trim().is_empty() {
            return Ok(text);
        }
    }
    if let Some(editor) = doc.first(RICH_EDITOR)? {
        let text: String = editor.text().collect();
        if !text.trim().is_empty() {
            return Ok(text);
        }
    }
    Ok(String::new())
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// One `<p>` per line, the way the rich editor stores pasted text.
fn paragraphs(description: &str) -> String {
    description
        .lines()
        .map(|line| {
            if line.is_empty() {
                "<p><br></p>".to_string()
            } else {
                format!("<p>{}</p>", escape_html(line))
            }
        })
        .collect()
}

/// Rewrite `html` with `description` placed in the description field.
pub fn fill_html(html: &str, description: &str) -> Result<String> {
    if description.is_empty() {
        return Err(Error::Fill("No description provided".to_string()));
    }

    let target = locate_field(&Document::parse(html))?
        .ok_or_else(|| Error::Fill(FILL_FAILED.to_string()))?;

    let filled = Cell::new(false);
    let seen = Cell::new(0usize);

    let rewritten = match target {
        FieldTarget::FormField { ref tag, index } => rewrite_str(
            html,
            RewriteStrSettings {
                element_content_handlers: vec![element!(tag.as_str(), |el| {
                    let position = seen.get();
                    seen.set(position + 1);
                    if position == index {
                        if el.tag_name() == "input" {
                            el.set_attribute("value", description)?;
                        } else {
                            el.set_inner_content(description, ContentType::Text);
                        }
                        filled.set(true);
                    }
                    Ok(())
                })],
                ..Default::default()
            },
        ),
        FieldTarget::RichEditor => {
            let content = paragraphs(description);
            rewrite_str(
                html,
                RewriteStrSettings {
                    element_content_handlers: vec![element!(RICH_EDITOR, |el| {
                        if !filled.get() {
                            el.set_inner_content(&content, ContentType::Html);
                            filled.set(true);
                        }
                        Ok(())
                    })],
                    ..Default::default()
                },
            )
        }
    }
    .map_err(|e| Error::Fill(format!("failed to rewrite page: {e}")))?;

    if !filled.get() {
        return Err(Error::Fill(FILL_FAILED.to_string()));
    }
    Ok(rewritten)
}

/// Destination for a generated description.
pub trait DescriptionSink {
    /// Apply the description. Returns a short note on where it went.
    fn write(&self, page: &dyn PageSource, description: &str) -> Result<String>;
}

/// Prints the description.
pub struct StdoutSink;

impl DescriptionSink for StdoutSink {
    fn write(&self, _page: &dyn PageSource, description: &str) -> Result<String> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{description}")?;
        Ok("stdout".to_string())
    }
}

/// Writes a copy of the page with the description field filled in.
pub struct HtmlFileSink {
    output: PathBuf,
}

impl HtmlFileSink {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

impl DescriptionSink for HtmlFileSink {
    fn write(&self, page: &dyn PageSource, description: &str) -> Result<String> {
        let html = page.snapshot()?;
        let filled = fill_html(&html, description)?;
        std::fs::write(&self.output, filled)?;
        info!(path = %self.output.display(), "wrote filled page");
        Ok(self.output.display().to_string())
    }
}

/// Abstraction over `gh` CLI execution for testability.
pub trait GhClient {
    fn run(&self, args: &[&str]) -> Result<String>;
}

/// Real `gh` CLI client.
pub struct DefaultGhClient;

impl GhClient for DefaultGhClient {
    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("gh")
            .args(args)
            .output()
            .map_err(|e| Error::Fill(format!("failed to run gh: {e}")))?;

        if output.status.success() {
            String::from_utf8(output.stdout)
                .map_err(|e| Error::Fill(format!("invalid utf8 from gh: {e}")))
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(Error::Fill(format!("gh pr edit failed: {stderr}")))
        }
    }
}

/// Updates an existing pull request's body on GitHub via `gh pr edit`.
pub struct GhSink {
    client: Box<dyn GhClient>,
}

impl GhSink {
    pub fn new() -> Self {
        Self {
            client: Box::new(DefaultGhClient),
        }
    }

    pub fn with_client(client: Box<dyn GhClient>) -> Self {
        Self { client }
    }
}

impl Default for GhSink {
    fn default() -> Self {
        Self::new()
    }
}

/// `owner/repo` from a GitHub URL path.
fn repo_slug(url: &str) -> Option<String> {
    let mut segments = url_path(url).split('/').filter(|s| !s.is_empty());
    let owner = segments.next()?;
    let repo = segments.next()?;
    Some(format!("{owner}/{repo}"))
}

impl DescriptionSink for GhSink {
    fn write(&self, page: &dyn PageSource, description: &str) -> Result<String> {
        if description.is_empty() {
            return Err(Error::Fill("No description provided".to_string()));
        }
        let url = page.url();
        let number = pr_number(url).ok_or_else(|| {
            Error::Fill("gh updates need an existing pull request URL".to_string())
        })?;
        let repo = repo_slug(url)
            .ok_or_else(|| Error::Fill(format!("cannot determine repository from {url}")))?;
        let number = number.to_string();

        self.client.run(&[
            "pr",
            "edit",
            &number,
            "--repo",
            &repo,
            "--body",
            description,
        ])?;
        info!(repo = %repo, number = %number, "updated PR description");
        Ok(format!("{repo}#{number}"))
    }
}
