use std::sync::Arc;

use tracing::info;

use crate::context::PrContext;
use crate::error::{Error, Result};
use crate::extract::{ExtractOptions, extract};
use crate::fill::DescriptionSink;
use crate::generate::Generator;
use crate::page::PageSource;
use crate::settings::Settings;
use crate::state::StateManager;
use crate::template::render_local;

const NOTHING_GENERATED: &str = "Please generate a description first";

/// Outcome of a `generate` step.
#[derive(Debug, Clone, PartialEq)]
pub struct Generated {
    pub template_id: String,
    pub context: PrContext,
    pub description: String,
}

/// The generate / autofill flow over one page.
pub struct Autofiller<'a> {
    settings: &'a Settings,
    state: &'a StateManager,
    generator: Generator<'a>,
    options: ExtractOptions,
    api_key: Option<String>,
    offline: bool,
}

impl<'a> Autofiller<'a> {
    pub fn new(
        settings: &'a Settings,
        state: &'a StateManager,
        generator: Generator<'a>,
        options: ExtractOptions,
        api_key: Option<String>,
    ) -> Self {
        Self {
            settings,
            state,
            generator,
            options,
            api_key,
            offline: false,
        }
    }

    /// Fill templates by plain substitution instead of calling the model.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Extract the context, fill the chosen template and remember the result.
    ///
    /// Template choice: `template_id`, else the last one used, else the first.
    pub async fn generate(
        &self,
        page: &Arc<dyn PageSource>,
        template_id: Option<&str>,
    ) -> Result<Generated> {
        let context = extract(page, &self.options).await?;

        let wanted = template_id
            .map(str::to_string)
            .or_else(|| self.state.selected_template(&self.settings.templates));
        let template = self
            .settings
            .resolve(wanted.as_deref())
            .ok_or_else(|| Error::Generation("No template configured".to_string()))?;

        let description = if self.offline {
            render_local(&template.template, &context)?
        } else {
            self.generator
                .generate(
                    self.settings,
                    self.api_key.as_deref(),
                    Some(&template.id),
                    &context,
                )
                .await?
        };

        self.state.set_last_template(&template.id)?;
        self.state.set_generated_description(&description)?;
        info!(template = %template.id, offline = self.offline, "description stored");

        Ok(Generated {
            template_id: template.id.clone(),
            context,
            description,
        })
    }

    /// Write the stored description through `sink`.
    pub fn autofill(&self, page: &dyn PageSource, sink: &dyn DescriptionSink) -> Result<String> {
        let description = self
            .state
            .generated_description()
            .ok_or_else(|| Error::Fill(NOTHING_GENERATED.to_string()))?;
        let target = sink.write(page, &description)?;
        info!(target = %target, "description filled");
        Ok(target)
    }

    /// `generate` followed by `autofill`.
    pub async fn run(
        &self,
        page: &Arc<dyn PageSource>,
        template_id: Option<&str>,
        sink: &dyn DescriptionSink,
    ) -> Result<String> {
        self.generate(page, template_id).await?;
        self.autofill(page.as_ref(), sink)
    }
}
