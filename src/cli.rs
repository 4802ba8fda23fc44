use clap::{Args, Parser, Subcommand};

/// pr-autofill: fill pull-request descriptions from the PR page
#[derive(Parser, Debug, Clone)]
#[command(name = "pr-autofill", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,

    /// Directory holding settings.toml, state.toml and config.toml (default: ~/.pr-autofill)
    #[arg(long, global = true)]
    pub state_dir: Option<String>,

    /// Path to config file
    #[arg(long, global = true)]
    pub config: Option<String>,

    #[command(flatten)]
    pub page: PageArgs,

    /// Chat model to use (default: gpt-4o-mini)
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Chat completions endpoint
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Sampling temperature (default: 0.5)
    #[arg(long, global = true)]
    pub temperature: Option<f32>,

    /// Completion token limit (default: 900)
    #[arg(long, global = true)]
    pub max_tokens: Option<u32>,

    /// How long to wait for the file list on new-PR pages, in milliseconds
    #[arg(long, global = true)]
    pub wait_timeout_ms: Option<u64>,

    /// Delay before re-reading an existing PR page, in milliseconds
    #[arg(long, global = true)]
    pub settle_ms: Option<u64>,

    /// Directory of prompt overrides (guardrails.md, rules.md, user.md)
    #[arg(long, global = true)]
    pub prompt_dir: Option<String>,
}

/// Where the PR page comes from.
#[derive(Args, Debug, Clone, Default)]
pub struct PageArgs {
    /// URL of the pull-request page
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Read the page from a saved HTML file instead of fetching --url
    #[arg(long, global = true)]
    pub page_file: Option<String>,
}

/// Where a generated description goes.
#[derive(Args, Debug, Clone, Default)]
pub struct SinkArgs {
    /// Write a copy of the page with the description field filled in
    #[arg(long, conflicts_with = "gh")]
    pub out: Option<String>,

    /// Update the existing pull request with `gh pr edit`
    #[arg(long)]
    pub gh: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Print the PR context scraped from the page as JSON
    Context,

    /// Generate a description and remember it for `autofill`
    Generate {
        /// Template id (default: last used, else the first)
        #[arg(long)]
        template: Option<String>,

        /// Fill the template locally without calling the model
        #[arg(long)]
        offline: bool,
    },

    /// Write the last generated description into the page
    Autofill {
        #[command(flatten)]
        sink: SinkArgs,
    },

    /// Generate, then autofill
    Run {
        /// Template id (default: last used, else the first)
        #[arg(long)]
        template: Option<String>,

        /// Fill the template locally without calling the model
        #[arg(long)]
        offline: bool,

        #[command(flatten)]
        sink: SinkArgs,
    },

    /// Print the description currently in the page's body field
    CurrentBody,

    /// Manage description templates
    Template {
        #[command(subcommand)]
        action: TemplateCommand,
    },

    /// Show or change settings
    Settings {
        #[command(subcommand)]
        action: SettingsCommand,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum TemplateCommand {
    /// List templates; the selected one is marked with `*`
    List,

    /// Add a template (blank unless --from-page or --file is given)
    Add {
        /// Template name
        #[arg(long)]
        name: Option<String>,

        /// Use the page's current PR body as the template text
        #[arg(long, conflicts_with_all = ["file", "team_defaults"])]
        from_page: bool,

        /// Read the template text from a file
        #[arg(long, conflicts_with = "team_defaults")]
        file: Option<String>,

        /// Add the frontend and backend team templates
        #[arg(long)]
        team_defaults: bool,
    },

    /// Remove a template by id or 1-based position
    Remove { key: String },

    /// Set a template field (name, template, rules)
    Set {
        id: String,
        field: String,
        value: String,
    },

    /// Select the template used by default
    Use { id: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum SettingsCommand {
    /// Print the settings location, key status and template count
    Show,

    /// Store the API key in settings.toml
    SetApiKey { key: String },
}
