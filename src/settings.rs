use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::template::{Template, install_defaults};

pub const API_KEY_PREFIX: &str = "sk-";

/// User-authored settings: the API key and the template library.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub templates: Vec<Template>,
}

/// Template fields that can be edited in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateField {
    Name,
    Template,
    Rules,
}

impl std::str::FromStr for TemplateField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "name" => Ok(TemplateField::Name),
            "template" => Ok(TemplateField::Template),
            "rules" => Ok(TemplateField::Rules),
            other => Err(Error::Settings(format!(
                "unknown template field: {other} (expected: name, template, rules)"
            ))),
        }
    }
}

impl Settings {
    pub fn find(&self, id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// The template with `id`, or the first one when `id` is absent or unknown.
    pub fn resolve(&self, id: Option<&str>) -> Option<&Template> {
        id.and_then(|id| self.find(id))
            .or_else(|| self.templates.first())
    }

    pub fn add_blank(&mut self) -> &Template {
        self.templates.push(Template::new_blank());
        &self.templates[self.templates.len() - 1]
    }

    pub fn add(&mut self, template: Template) -> Result<()> {
        if self.find(&template.id).is_some() {
            return Err(Error::Settings(format!(
                "template id already exists: {}",
                template.id
            )));
        }
        self.templates.push(template);
        Ok(())
    }

    pub fn update(&mut self, id: &str, field: TemplateField, value: &str) -> Result<()> {
        let template = self
            .templates
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| Error::Settings(format!("Template not found: {id}")))?;
        let slot = match field {
            TemplateField::Name => &mut template.name,
            TemplateField::Template => &mut template.template,
            TemplateField::Rules => &mut template.rules,
        };
        *slot = value.to_string();
        Ok(())
    }

    /// Remove by id, or by 1-based position when `key` is a number.
    pub fn remove(&mut self, key: &str) -> Result<Template> {
        let index = self
            .templates
            .iter()
            .position(|t| t.id == key)
            .or_else(|| {
                key.parse::<usize>()
                    .ok()
                    .filter(|n| (1..=self.templates.len()).contains(n))
                    .map(|n| n - 1)
            })
            .ok_or_else(|| Error::Settings(format!("Template not found: {key}")))?;
        Ok(self.templates.remove(index))
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(ref key) = self.api_key
            && !key.is_empty()
            && !key.starts_with(API_KEY_PREFIX)
        {
            return Err(Error::Settings(
                "API key should start with \"sk-\"".to_string(),
            ));
        }

        for (i, template) in self.templates.iter().enumerate() {
            if template.name.trim().is_empty() {
                return Err(Error::Settings(format!(
                    "Template {} must have a name",
                    i + 1
                )));
            }
            if template.template.trim().is_empty() {
                return Err(Error::Settings(format!(
                    "Template \"{}\" must have a template",
                    template.name
                )));
            }
        }
        Ok(())
    }
}

/// Check that a key is present and well-formed before any request is made.
pub fn validate_api_key(key: Option<&str>) -> Result<&str> {
    let key = key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| Error::Generation("API key not configured".to_string()))?;
    if !key.starts_with(API_KEY_PREFIX) {
        return Err(Error::Generation("Invalid API key format".to_string()));
    }
    Ok(key)
}

/// Resolve the API key: env var first, then the stored settings.
pub fn resolve_api_key(settings: &Settings, api_key_env: &str) -> Option<String> {
    if let Ok(key) = std::env::var(api_key_env)
        && !key.trim().is_empty()
    {
        debug!(env = api_key_env, "using API key from environment");
        return Some(key.trim().to_string());
    }
    settings.api_key.clone().filter(|k| !k.is_empty())
}

/// Persists [`Settings`] as TOML.
pub struct SettingsStore {
    dir: PathBuf,
}

impl SettingsStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn settings_file(&self) -> PathBuf {
        self.dir.join("settings.toml")
    }

    pub fn path(&self) -> PathBuf {
        self.settings_file()
    }

    /// Load settings. A missing file yields the install-time default template.
    pub fn load(&self) -> Result<Settings> {
        let path = self.settings_file();
        if !path.exists() {
            return Ok(Settings {
                api_key: None,
                templates: install_defaults(),
            });
        }
        load_from(&path)
    }

    /// Validate and write settings to disk.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        settings.validate()?;

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| Error::Settings(format!("failed to create settings dir: {e}")))?;

        let content = toml::to_string_pretty(settings)
            .map_err(|e| Error::Settings(format!("failed to serialize settings: {e}")))?;

        std::fs::write(self.settings_file(), content)
            .map_err(|e| Error::Settings(format!("failed to write settings file: {e}")))?;

        debug!(templates = settings.templates.len(), "settings saved");
        Ok(())
    }
}

fn load_from(path: &Path) -> Result<Settings> {
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| {
        Error::Settings(format!("failed to parse settings {}: {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, SettingsStore) {
        let dir = TempDir::new().unwrap();
        let store = SettingsStore::new(dir.path().join("settings"));
        (dir, store)
    }

    fn two_templates() -> Settings {
        Settings {
            api_key: Some("sk-test".to_string()),
            templates: vec![
                Template::new("a", "Alpha", "{{summary}}"),
                Template::new("b", "Beta", "{{files}}"),
            ],
        }
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let (_dir, store) = test_store();
        let settings = store.load().unwrap();
        assert!(settings.api_key.is_none());
        assert_eq!(settings.templates.len(), 1);
        assert_eq!(settings.templates[0].id, "default");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let (_dir, store) = test_store();
        let mut settings = two_templates();
        settings.templates[1].rules = "Only bullets.".to_string();
        store.save(&settings).unwrap();
        assert_eq!(store.load().unwrap(), settings);
    }

    #[test]
    fn test_save_rejects_bad_key() {
        let (_dir, store) = test_store();
        let mut settings = two_templates();
        settings.api_key = Some("pk-live".to_string());
        let err = store.save(&settings).unwrap_err();
        assert_eq!(err.to_string(), "API key should start with \"sk-\"");
        assert!(!store.path().exists());
    }

    #[test]
    fn test_save_rejects_nameless_template() {
        let (_dir, store) = test_store();
        let mut settings = two_templates();
        settings.templates[1].name = "  ".to_string();
        let err = store.save(&settings).unwrap_err();
        assert_eq!(err.to_string(), "Template 2 must have a name");
    }

    #[test]
    fn test_save_rejects_empty_body() {
        let (_dir, store) = test_store();
        let mut settings = two_templates();
        settings.templates[0].template = "\n".to_string();
        let err = store.save(&settings).unwrap_err();
        assert_eq!(err.to_string(), "Template \"Alpha\" must have a template");
    }

    #[test]
    fn test_corrupted_settings_error() {
        let (_dir, store) = test_store();
        std::fs::create_dir_all(&store.dir).unwrap();
        std::fs::write(store.path(), "templates = [[[").unwrap();
        let err = store.load().unwrap_err();
        assert!(err.to_string().contains("failed to parse settings"));
    }

    #[test]
    fn test_resolve_falls_back_to_first() {
        let settings = two_templates();
        assert_eq!(settings.resolve(Some("b")).unwrap().id, "b");
        assert_eq!(settings.resolve(Some("gone")).unwrap().id, "a");
        assert_eq!(settings.resolve(None).unwrap().id, "a");
        assert!(Settings::default().resolve(None).is_none());
    }

    #[test]
    fn test_update_fields() {
        let mut settings = two_templates();
        settings.update("a", TemplateField::Name, "Renamed").unwrap();
        settings.update("a", TemplateField::Rules, "Be brief").unwrap();
        let t = settings.find("a").unwrap();
        assert_eq!(t.name, "Renamed");
        assert_eq!(t.rules, "Be brief");
        assert!(settings.update("zzz", TemplateField::Name, "x").is_err());
    }

    #[test]
    fn test_template_field_parse() {
        assert_eq!("rules".parse::<TemplateField>().unwrap(), TemplateField::Rules);
        assert!("body".parse::<TemplateField>().is_err());
    }

    #[test]
    fn test_remove_by_id_and_position() {
        let mut settings = two_templates();
        assert_eq!(settings.remove("b").unwrap().id, "b");
        assert_eq!(settings.remove("1").unwrap().id, "a");
        assert!(settings.templates.is_empty());
        assert!(settings.remove("1").is_err());
    }

    #[test]
    fn test_add_rejects_duplicate_id() {
        let mut settings = two_templates();
        let err = settings.add(Template::new("a", "Again", "x")).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_add_blank_appends() {
        let mut settings = two_templates();
        let id = settings.add_blank().id.clone();
        assert_eq!(settings.templates.last().unwrap().id, id);
    }

    #[test]
    fn test_validate_api_key() {
        assert_eq!(validate_api_key(Some("sk-abc")).unwrap(), "sk-abc");
        assert_eq!(
            validate_api_key(None).unwrap_err().to_string(),
            "API key not configured"
        );
        assert_eq!(
            validate_api_key(Some("")).unwrap_err().to_string(),
            "API key not configured"
        );
        assert_eq!(
            validate_api_key(Some("abc")).unwrap_err().to_string(),
            "Invalid API key format"
        );
    }

    #[test]
    #[serial]
    fn test_resolve_api_key_prefers_env() {
        let settings = two_templates();
        unsafe { std::env::set_var("PR_AUTOFILL_TEST_KEY", "sk-from-env") };
        assert_eq!(
            resolve_api_key(&settings, "PR_AUTOFILL_TEST_KEY").as_deref(),
            Some("sk-from-env")
        );
        unsafe { std::env::remove_var("PR_AUTOFILL_TEST_KEY") };
        assert_eq!(
            resolve_api_key(&settings, "PR_AUTOFILL_TEST_KEY").as_deref(),
            Some("sk-test")
        );
    }
}
