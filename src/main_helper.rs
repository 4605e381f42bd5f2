use crate::constants::{DEFAULT_AI_GATEWAY_URL, DEFAULT_COUNSELLOR_ENDPOINT, DEFAULT_MODEL};
use crate::db::DbPool;
use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(author, version, about = "Study-abroad counsellor: assistant gateway and CLI", long_about = None)]
pub struct Args {
    #[arg(long, env = "COUNSELLOR_DATABASE", default_value = "counsellor.db", global = true)]
    pub database: PathBuf,
    #[arg(long, env = "COUNSELLOR_LOG_DIR", default_value = "logs", global = true)]
    pub log_dir: PathBuf,
    #[arg(long, env = "COUNSELLOR_USER_ID", global = true)]
    pub user: Option<String>,
    #[arg(long, default_value_t = 10, global = true)]
    pub connect_timeout_secs: u64,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the assistant endpoint gateway
    Serve(ServeArgs),
    /// Chat with the counsellor in the terminal
    Chat(ChatArgs),
    /// Show or create the current user's profile
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Browse the catalog and manage the shortlist
    #[command(subcommand)]
    Universities(UniversityCommand),
    /// Manage application tasks
    #[command(subcommand)]
    Todos(TodoCommand),
    /// Operator tasks for the university catalog
    #[command(subcommand)]
    Catalog(CatalogCommand),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, default_value_t = 8787)]
    pub port: u16,
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,
    #[arg(long, env = "AI_GATEWAY_URL", default_value = DEFAULT_AI_GATEWAY_URL)]
    pub upstream_url: String,
    #[arg(long, env = "AI_GATEWAY_API_KEY", hide_env_values = true)]
    pub upstream_key: Option<String>,
    #[arg(long, env = "AI_MODEL", default_value = DEFAULT_MODEL)]
    pub model: String,
    #[arg(long, default_value_t = 1024 * 1024)]
    pub max_body_size: usize,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ChatArgs {
    #[arg(long, env = "COUNSELLOR_ENDPOINT", default_value = DEFAULT_COUNSELLOR_ENDPOINT)]
    pub endpoint: String,
    #[arg(long, env = "COUNSELLOR_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    /// Send one message and exit instead of starting the prompt loop
    #[arg(long)]
    pub message: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    Show,
    Create {
        #[arg(long)]
        email: String,
        #[arg(long)]
        name: String,
    },
    /// Save onboarding answers from a JSON file and unlock the dashboard
    Onboard {
        #[arg(long)]
        file: PathBuf,
    },
    /// Apply field edits from a JSON object; fields not named are kept
    Edit {
        #[arg(long)]
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum UniversityCommand {
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    Shortlisted,
    /// Add to the shortlist, or remove when already there
    Toggle { university_id: String },
    /// Lock, or unlock when already locked
    Lock { university_id: String },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum CompletionArg {
    All,
    Pending,
    Completed,
}

#[derive(Subcommand, Debug)]
pub enum TodoCommand {
    List {
        #[arg(long, value_enum, default_value_t = CompletionArg::All)]
        status: CompletionArg,
        #[arg(long)]
        category: Option<String>,
    },
    Add {
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value = "medium")]
        priority: String,
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        university: Option<String>,
    },
    Toggle { id: String },
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
pub enum CatalogCommand {
    /// Load universities from a JSON array
    Import { file: PathBuf },
}

/// Gateway settings resolved once at startup.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub upstream_url: String,
    pub upstream_key: Option<String>,
    pub model: String,
}

impl From<&ServeArgs> for GatewaySettings {
    fn from(a: &ServeArgs) -> Self {
        Self {
            upstream_url: a.upstream_url.clone(),
            upstream_key: a.upstream_key.clone().filter(|k| !k.trim().is_empty()),
            model: a.model.clone(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub client: reqwest::Client,
    pub settings: Arc<GatewaySettings>,
    pub db: DbPool,
}
