use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "opnrecon")]
#[command(version)]
#[command(about = "Reconcile OPNsense configuration against declared desired state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Connection overrides, applied on top of the config file
#[derive(Args, Debug, Default, Clone)]
pub struct ConnectionArgs {
    /// Connection config file (default: ~/.config/opnrecon/config.toml)
    #[arg(long, global = true, env = "OPNRECON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Firewall hostname or IP address
    #[arg(long, global = true, env = "OPN_FIREWALL")]
    pub firewall: Option<String>,

    /// API port
    #[arg(long, global = true, env = "OPN_PORT")]
    pub port: Option<u16>,

    /// API key
    #[arg(long, global = true, env = "OPN_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// API secret
    #[arg(long, global = true, env = "OPN_API_SECRET", hide_env_values = true)]
    pub api_secret: Option<String>,

    /// File with `key=` and `secret=` lines
    #[arg(long, global = true, env = "OPN_API_CREDENTIAL_FILE")]
    pub api_credential_file: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, global = true)]
    pub insecure: bool,

    /// Per-call timeout in seconds
    #[arg(long, global = true, env = "OPN_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Extra attempts for calls failing with network errors
    #[arg(long, global = true, env = "OPN_API_RETRIES")]
    pub retries: Option<u32>,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the resource types that can be managed
    Resources,

    /// Show the current configuration of a resource
    Show(ShowArgs),

    /// Compare a desired-state file against the appliance (no changes made)
    Check(CheckArgs),

    /// Reconcile the appliance with a desired-state file
    Apply(ApplyArgs),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Args)]
pub struct ShowArgs {
    /// Resource type (see `opnrecon resources`)
    pub resource: String,

    /// Key of the item to show (item resources only)
    #[arg(long)]
    pub key: Option<String>,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Resource type (see `opnrecon resources`)
    pub resource: String,

    /// Desired-state file (TOML or JSON)
    pub file: PathBuf,

    /// Whether the item should exist (overrides the file's [run] table)
    #[arg(long, value_enum)]
    pub state: Option<StateArg>,
}

#[derive(Args)]
pub struct ApplyArgs {
    /// Resource type (see `opnrecon resources`)
    pub resource: String,

    /// Desired-state file (TOML or JSON)
    pub file: PathBuf,

    /// Reload the affected service after a change
    #[arg(long)]
    pub reload: bool,

    /// Show what would change without applying
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Whether the item should exist (overrides the file's [run] table)
    #[arg(long, value_enum)]
    pub state: Option<StateArg>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StateArg {
    Present,
    Absent,
}

impl From<StateArg> for declarative::Presence {
    fn from(state: StateArg) -> Self {
        match state {
            StateArg::Present => Self::Present,
            StateArg::Absent => Self::Absent,
        }
    }
}
