use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::context::PrContext;
use crate::error::{Error, Result};

const DEFAULT_TEMPLATE: &str = include_str!("default_templates/default.md");
const FRONTEND_TEMPLATE: &str = include_str!("default_templates/frontend.md");
const BACKEND_TEMPLATE: &str = include_str!("default_templates/backend.md");
const BLANK_TEMPLATE: &str = include_str!("default_templates/blank.md");

/// Placeholder names that can be filled from a PR context.
pub const KNOWN_VARIABLES: &[&str] = &[
    "title",
    "branch",
    "summary",
    "commits",
    "files",
    "addedFiles",
    "modifiedFiles",
    "deletedFiles",
    "totalLines",
];

/// Variables whose values are rendered as `- item` lines.
const LIST_VARIABLES: &[&str] = &[
    "commits",
    "files",
    "addedFiles",
    "modifiedFiles",
    "deletedFiles",
];

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}").expect("placeholder pattern is valid")
});

/// Any `{{...}}` on one line, with an optional leading `- ` bullet.
static SLOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)(^[ \t]*- )?\{\{([^{}\n]*)\}\}").expect("slot pattern is valid")
});

/// A user-authored description blueprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    pub name: String,
    pub template: String,
    /// Free-form instructions for the model. Blank means the default rule set.
    #[serde(default)]
    pub rules: String,
}

impl Template {
    pub fn new(id: &str, name: &str, template: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            template: template.to_string(),
            rules: String::new(),
        }
    }

    /// A fresh template with a timestamp-derived id.
    pub fn new_blank() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self::new(&format!("template_{millis}"), "New Template", BLANK_TEMPLATE)
    }

    pub fn custom_rules(&self) -> Option<&str> {
        let rules = self.rules.trim();
        (!rules.is_empty()).then_some(rules)
    }
}

/// The template seeded on first run.
pub fn install_defaults() -> Vec<Template> {
    vec![Template::new("default", "Default Template", DEFAULT_TEMPLATE)]
}

/// Team-flavoured starting points offered when no settings exist yet.
pub fn team_defaults() -> Vec<Template> {
    vec![
        Template::new("frontend", "Frontend Team", FRONTEND_TEMPLATE),
        Template::new("backend", "Backend Team", BACKEND_TEMPLATE),
    ]
}

/// Distinct `{{name}}` placeholders in order of first appearance.
pub fn placeholders(text: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(text) {
        let name = &caps[1];
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}

/// Placeholders in `text` that the offline renderer has no value for.
pub fn unknown_placeholders(text: &str) -> Vec<String> {
    placeholders(text)
        .into_iter()
        .filter(|name| !KNOWN_VARIABLES.contains(&name.as_str()))
        .collect()
}

fn bullets(items: &[String]) -> String {
    if items.is_empty() {
        return "- None".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Values for every known placeholder, derived from `context`.
pub fn context_vars(context: &PrContext) -> HashMap<String, String> {
    let summary = if !context.title.is_empty() {
        context.title.clone()
    } else {
        context.commits.first().cloned().unwrap_or_default()
    };

    HashMap::from([
        ("title".to_string(), context.title.clone()),
        ("branch".to_string(), context.branch.clone()),
        ("summary".to_string(), summary),
        ("commits".to_string(), bullets(&context.commits)),
        ("files".to_string(), bullets(&context.files)),
        ("addedFiles".to_string(), bullets(&context.changes.added)),
        ("modifiedFiles".to_string(), bullets(&context.changes.modified)),
        ("deletedFiles".to_string(), bullets(&context.changes.deleted)),
        (
            "totalLines".to_string(),
            context.changes.total_lines.to_string(),
        ),
    ])
}

/// Fill a template from the PR context without calling the model.
pub fn render_local(template: &str, context: &PrContext) -> Result<String> {
    render_template(template, &context_vars(context))
}

/// Fill `{{variable}}` placeholders from `vars`. Unknown names are errors.
///
/// A list variable written as a bullet (`- {{commits}}`) keeps the bullet's
/// indentation but not its dash, since the value is already a bullet list.
pub fn render_template(template: &str, vars: &HashMap<String, String>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in SLOT.captures_iter(template) {
        let (Some(slot), Some(inner)) = (caps.get(0), caps.get(2)) else {
            continue;
        };
        push_literal(&mut out, &template[last..slot.start()])?;
        last = slot.end();

        let name = inner.as_str().trim();
        if !KNOWN_VARIABLES.contains(&name) {
            return Err(Error::Template(format!("unknown template variable: {name}")));
        }
        let value = vars.get(name).ok_or_else(|| {
            Error::Template(format!("missing value for template variable: {name}"))
        })?;

        match caps.get(1).map(|m| m.as_str()) {
            Some(bullet) if LIST_VARIABLES.contains(&name) => {
                let indent = &bullet[..bullet.len() - 2];
                let lines: Vec<String> = value.lines().map(|l| format!("{indent}{l}")).collect();
                out.push_str(&lines.join("\n"));
            }
            Some(bullet) => {
                out.push_str(bullet);
                out.push_str(value);
            }
            None => out.push_str(value),
        }
    }
    push_literal(&mut out, &template[last..])?;

    Ok(out)
}

fn push_literal(out: &mut String, text: &str) -> Result<()> {
    if let Some(at) = text.find("{{") {
        let rest = text[at..].lines().next().unwrap_or_default();
        return Err(Error::Template(format!("unclosed template variable: {rest}")));
    }
    out.push_str(text);
    Ok(())
}
