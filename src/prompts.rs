use std::path::Path;

use serde::Serialize;

use crate::context::PrContext;
use crate::error::{Error, Result};
use crate::template::Template;

const DEFAULT_GUARDRAILS: &str = include_str!("default_prompts/guardrails.md");
const DEFAULT_RULES: &str = include_str!("default_prompts/rules.md");
const DEFAULT_USER: &str = include_str!("default_prompts/user.md");

fn default_prompt(name: &str) -> Option<&'static str> {
    match name {
        "guardrails" => Some(DEFAULT_GUARDRAILS),
        "rules" => Some(DEFAULT_RULES),
        "user" => Some(DEFAULT_USER),
        _ => None,
    }
}

fn prompt_filename(name: &str) -> String {
    format!("{name}.md")
}

/// The two chat messages sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatPrompt {
    pub system: String,
    pub user: String,
}

#[derive(Serialize)]
struct UserVars<'a> {
    template: &'a str,
    context: &'a str,
}

/// Prompt assembly with embedded defaults and user overrides.
pub struct PromptEngine {
    override_dir: Option<String>,
}

impl PromptEngine {
    pub fn new(override_dir: Option<String>) -> Self {
        Self { override_dir }
    }

    /// Load a prompt by name. User overrides in `override_dir` take
    /// precedence over the embedded defaults.
    pub fn load_prompt(&self, name: &str) -> Result<String> {
        if let Some(ref dir) = self.override_dir {
            let path = Path::new(dir).join(prompt_filename(name));
            if path.exists() {
                return std::fs::read_to_string(&path).map_err(|e| {
                    Error::Prompt(format!(
                        "failed to read override prompt {}: {e}",
                        path.display()
                    ))
                });
            }
        }

        default_prompt(name)
            .map(|s| s.to_string())
            .ok_or_else(|| Error::Prompt(format!("unknown prompt: {name}")))
    }

    /// Guardrails followed by the template's own rules, or the default rule set.
    pub fn system_prompt(&self, template: &Template) -> Result<String> {
        let guardrails = self.load_prompt("guardrails")?;
        let rules = match template.custom_rules() {
            Some(rules) => rules.to_string(),
            None => self.load_prompt("rules")?,
        };
        Ok(format!("{}\n{}", guardrails.trim_end(), rules.trim_end()))
    }

    pub fn user_prompt(&self, template: &Template, context: &PrContext) -> Result<String> {
        let source = self.load_prompt("user")?;
        let mut engine = upon::Engine::new();
        engine
            .add_template("user", source)
            .map_err(|e| Error::Prompt(format!("invalid user prompt: {e}")))?;

        let context_json = context.prompt_json();
        let rendered = engine
            .template("user")
            .render(UserVars {
                template: &template.template,
                context: &context_json,
            })
            .to_string()
            .map_err(|e| Error::Prompt(format!("failed to render user prompt: {e}")))?;
        Ok(rendered.trim_end().to_string())
    }

    pub fn build(&self, template: &Template, context: &PrContext) -> Result<ChatPrompt> {
        Ok(ChatPrompt {
            system: self.system_prompt(template)?,
            user: self.user_prompt(template, context)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn template() -> Template {
        Template::new("t", "T", "## Summary\n{{summary}}")
    }

    #[test]
    fn test_system_prompt_uses_default_rules() {
        let engine = PromptEngine::new(None);
        let system = engine.system_prompt(&template()).unwrap();
        assert!(system.starts_with("You fill an existing PR description template exactly"));
        assert!(system.contains("code fences.\nFilling rules:"));
        assert!(system.ends_with("Output only the final filled template."));
    }

    #[test]
    fn test_system_prompt_prefers_template_rules() {
        let engine = PromptEngine::new(None);
        let mut t = template();
        t.rules = "  Key Classes: names only.  ".to_string();
        let system = engine.system_prompt(&t).unwrap();
        assert!(system.ends_with("code fences.\nKey Classes: names only."));
        assert!(!system.contains("Filling rules:"));
    }

    #[test]
    fn test_user_prompt_layout() {
        let engine = PromptEngine::new(None);
        let ctx = PrContext {
            title: "Add login".to_string(),
            ..Default::default()
        };
        let user = engine.user_prompt(&template(), &ctx).unwrap();
        assert!(user.starts_with("Template:\n## Summary\n{{summary}}\n\nContext (JSON):\n{"));
        assert!(user.contains("\"title\": \"Add login\""));
        assert!(user.ends_with("\n\nTask: Fill the template strictly following the rules above."));
    }

    #[test]
    fn test_override_takes_precedence() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("guardrails.md"), "Be terse.").unwrap();
        let engine = PromptEngine::new(Some(dir.path().to_string_lossy().to_string()));
        let system = engine.system_prompt(&template()).unwrap();
        assert!(system.starts_with("Be terse.\nFilling rules:"));
    }

    #[test]
    fn test_override_fallback_to_default() {
        let dir = TempDir::new().unwrap();
        let engine = PromptEngine::new(Some(dir.path().to_string_lossy().to_string()));
        let user = engine.load_prompt("user").unwrap();
        assert!(user.contains("{{ context }}"));
    }

    #[test]
    fn test_unknown_prompt() {
        let engine = PromptEngine::new(None);
        let err = engine.load_prompt("review").unwrap_err();
        assert!(err.to_string().contains("unknown prompt"));
    }

    #[test]
    fn test_build_returns_both_messages() {
        let engine = PromptEngine::new(None);
        let prompt = engine.build(&template(), &PrContext::default()).unwrap();
        assert!(!prompt.system.is_empty());
        assert!(prompt.user.contains("Context (JSON):"));
    }
}
