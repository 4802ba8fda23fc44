use std::sync::Arc;

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use pr_autofill::autofill::Autofiller;
use pr_autofill::cli::{Cli, CliCommand, PageArgs, SettingsCommand, SinkArgs, TemplateCommand};
use pr_autofill::config::Config;
use pr_autofill::error::{Error, Result};
use pr_autofill::extract::extract;
use pr_autofill::fill::{DescriptionSink, GhSink, HtmlFileSink, StdoutSink, current_body};
use pr_autofill::generate::Generator;
use pr_autofill::llm::{CompletionClient, HttpCompletionClient};
use pr_autofill::page::{Document, FileSource, HttpSource, PageSource};
use pr_autofill::prompts::PromptEngine;
use pr_autofill::settings::{Settings, SettingsStore, TemplateField, resolve_api_key};
use pr_autofill::state::StateManager;
use pr_autofill::template::{Template, team_defaults, unknown_placeholders};

fn init_logging() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli)?;
    debug!(?config, "config loaded");

    let store = SettingsStore::new(&config.state_dir);
    let state = StateManager::new(&config.state_dir);

    match cli.command {
        CliCommand::Context => {
            let page = open_page(&cli.page, &config)?;
            let context = extract(&page, &config.extract_options()).await?;
            println!("{}", serde_json::to_string_pretty(&context)?);
        }
        CliCommand::CurrentBody => {
            let page = open_page(&cli.page, &config)?;
            let body = current_body(&Document::parse(&page.snapshot()?))?;
            println!("{body}");
        }
        CliCommand::Generate {
            ref template,
            offline,
        } => {
            let page = open_page(&cli.page, &config)?;
            let settings = store.load()?;
            let prompts = PromptEngine::new(config.prompt_dir.clone());
            let autofiller =
                build_autofiller(&config, &settings, &state, &prompts, http_client(&config), offline);
            let generated = autofiller
                .generate(&page, template.as_deref())
                .await?;
            println!("{}", generated.description);
        }
        CliCommand::Autofill { ref sink } => {
            let page = open_page(&cli.page, &config)?;
            let settings = store.load()?;
            let prompts = PromptEngine::new(config.prompt_dir.clone());
            let autofiller =
                build_autofiller(&config, &settings, &state, &prompts, http_client(&config), false);
            let target = autofiller.autofill(page.as_ref(), open_sink(sink).as_ref())?;
            info!(target = %target, "autofill complete");
        }
        CliCommand::Run {
            ref template,
            offline,
            ref sink,
        } => {
            let page = open_page(&cli.page, &config)?;
            let settings = store.load()?;
            let prompts = PromptEngine::new(config.prompt_dir.clone());
            let autofiller =
                build_autofiller(&config, &settings, &state, &prompts, http_client(&config), offline);
            autofiller
                .run(&page, template.as_deref(), open_sink(sink).as_ref())
                .await?;
        }
        CliCommand::Template { ref action } => {
            template_command(action, &cli.page, &config, &store, &state)?;
        }
        CliCommand::Settings { ref action } => {
            settings_command(action, &config, &store)?;
        }
    }
    Ok(())
}

fn build_autofiller<'a>(
    config: &Config,
    settings: &'a Settings,
    state: &'a StateManager,
    prompts: &'a PromptEngine,
    client: Arc<dyn CompletionClient>,
    offline: bool,
) -> Autofiller<'a> {
    let generator = Generator::new(prompts, client, config.model_params());
    let api_key = resolve_api_key(settings, &config.api_key_env);
    Autofiller::new(settings, state, generator, config.extract_options(), api_key).offline(offline)
}

fn http_client(config: &Config) -> Arc<dyn CompletionClient> {
    Arc::new(HttpCompletionClient::new(&config.api_url))
}

fn open_page(args: &PageArgs, config: &Config) -> Result<Arc<dyn PageSource>> {
    let url = args
        .url
        .clone()
        .ok_or_else(|| Error::PageFetch("--url is required".to_string()))?;
    match args.page_file {
        Some(ref path) => Ok(Arc::new(FileSource::new(url, path))),
        None => {
            let cookie = std::env::var(&config.cookie_env)
                .ok()
                .filter(|c| !c.trim().is_empty());
            Ok(Arc::new(HttpSource::new(url, cookie)))
        }
    }
}

fn open_sink(args: &SinkArgs) -> Box<dyn DescriptionSink> {
    if let Some(ref out) = args.out {
        Box::new(HtmlFileSink::new(out))
    } else if args.gh {
        Box::new(GhSink::new())
    } else {
        Box::new(StdoutSink)
    }
}

fn template_command(
    action: &TemplateCommand,
    page: &PageArgs,
    config: &Config,
    store: &SettingsStore,
    state: &StateManager,
) -> Result<()> {
    let mut settings = store.load()?;

    match action {
        TemplateCommand::List => {
            let selected = state.selected_template(&settings.templates);
            for (i, template) in settings.templates.iter().enumerate() {
                let marker = if selected.as_deref() == Some(template.id.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {}. {}\t{}", i + 1, template.id, template.name);
            }
            return Ok(());
        }
        TemplateCommand::Add {
            name,
            from_page,
            file,
            team_defaults: with_team_defaults,
        } => {
            if *with_team_defaults {
                for template in team_defaults() {
                    if settings.find(&template.id).is_none() {
                        println!("added {}", template.id);
                        settings.add(template)?;
                    }
                }
            } else {
                let mut template = Template::new_blank();
                if *from_page {
                    let source = open_page(page, config)?;
                    let body = current_body(&Document::parse(&source.snapshot()?))?;
                    if body.trim().is_empty() {
                        return Err(Error::Settings(
                            "No PR description found on this page".to_string(),
                        ));
                    }
                    template.name = "Current PR Template".to_string();
                    template.template = body;
                } else if let Some(path) = file {
                    template.template = std::fs::read_to_string(path)?;
                }
                if let Some(name) = name {
                    template.name = name.clone();
                }
                warn_unknown_placeholders(&template.template);
                println!("added {}", template.id);
                settings.add(template)?;
            }
        }
        TemplateCommand::Remove { key } => {
            let removed = settings.remove(key)?;
            println!("removed {}", removed.id);
        }
        TemplateCommand::Set { id, field, value } => {
            let field: TemplateField = field.parse()?;
            if field == TemplateField::Template {
                warn_unknown_placeholders(value);
            }
            settings.update(id, field, value)?;
        }
        TemplateCommand::Use { id } => {
            if settings.find(id).is_none() {
                return Err(Error::Settings(format!("Template not found: {id}")));
            }
            state.set_last_template(id)?;
            return Ok(());
        }
    }

    store.save(&settings)
}

fn warn_unknown_placeholders(text: &str) {
    let unknown = unknown_placeholders(text);
    if !unknown.is_empty() {
        warn!(?unknown, "placeholders cannot be filled offline; the model will see them verbatim");
    }
}

fn settings_command(
    action: &SettingsCommand,
    config: &Config,
    store: &SettingsStore,
) -> Result<()> {
    let mut settings = store.load()?;
    match action {
        SettingsCommand::Show => {
            let key = match settings.api_key.as_deref() {
                Some(key) if !key.is_empty() => mask_key(key),
                _ => "not set".to_string(),
            };
            let env_set = std::env::var(&config.api_key_env).is_ok_and(|v| !v.trim().is_empty());
            println!("settings: {}", store.path().display());
            println!("api key: {key}");
            println!(
                "{}: {}",
                config.api_key_env,
                if env_set { "set" } else { "not set" }
            );
            println!("model: {}", config.model);
            println!("templates: {}", settings.templates.len());
            Ok(())
        }
        SettingsCommand::SetApiKey { key } => {
            settings.api_key = Some(key.trim().to_string());
            store.save(&settings)?;
            println!("Settings saved successfully!");
            Ok(())
        }
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 7 {
        return "sk-…".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("sk-…{tail}")
}
