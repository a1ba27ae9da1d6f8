use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "idml-translator")]
#[command(author, version, about = "Translate InDesign IDML packages with an LLM chat API", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Translate IDML packages into one or more languages
    Translate(TranslateArgs),

    /// Translate a single piece of text
    Text(TextArgs),

    /// Estimate tokens and cost without calling the API
    Estimate(EstimateArgs),

    /// List known language codes
    Languages,

    /// Manage configuration
    Config(ConfigArgs),
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Initialize configuration file with defaults
    Init {
        /// Overwrite existing config
        #[arg(short, long, default_value_t = false)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., api.openai_api_key)
        key: String,
        /// Value to set
        value: String,
    },

    /// Get a configuration value
    Get {
        /// Configuration key
        key: String,
    },

    /// Show config file path
    Path,

    /// Edit config file with default editor
    Edit,
}

#[derive(Parser, Debug)]
pub struct TranslateArgs {
    /// IDML files to translate
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Target language codes (e.g., cs, de, pl); falls back to the config
    #[arg(short, long = "target", value_delimiter = ',', num_args = 1..)]
    pub targets: Vec<String>,

    /// Source language code
    #[arg(short, long)]
    pub source: Option<String>,

    /// Custom system prompt; {from_lang} and {to_lang} are substituted
    #[arg(long)]
    pub prompt: Option<String>,

    /// Model name to use
    #[arg(long)]
    pub model: Option<String>,

    /// API key (can also be set via OPENAI_API_KEY)
    #[arg(long)]
    pub api_key: Option<String>,

    /// API base URL (for compatible endpoints)
    #[arg(long)]
    pub api_base: Option<String>,

    /// Send every batch at once instead of one after another
    #[arg(long, default_value_t = false)]
    pub concurrent: bool,

    /// Token ceiling per batch
    #[arg(long)]
    pub max_tokens: Option<usize>,

    /// Seconds to wait after each batch
    #[arg(long)]
    pub delay: Option<f64>,

    /// Output directory (defaults to the directory of each input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the finished job record as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct TextArgs {
    /// Text to translate
    #[arg(required = true)]
    pub text: String,

    /// Target language code
    #[arg(short, long = "target")]
    pub target: String,

    /// Source language code
    #[arg(short, long)]
    pub source: Option<String>,

    /// Custom system prompt
    #[arg(long)]
    pub prompt: Option<String>,

    /// Model name to use
    #[arg(long)]
    pub model: Option<String>,

    /// API key
    #[arg(long)]
    pub api_key: Option<String>,

    /// API base URL
    #[arg(long)]
    pub api_base: Option<String>,
}

#[derive(Parser, Debug)]
pub struct EstimateArgs {
    /// IDML files to inspect
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Target language codes
    #[arg(short, long = "target", value_delimiter = ',', num_args = 1..)]
    pub targets: Vec<String>,

    /// Source language code
    #[arg(short, long)]
    pub source: Option<String>,

    /// Model whose tokenizer and price are used
    #[arg(long)]
    pub model: Option<String>,

    /// Print the estimate as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
