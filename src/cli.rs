//! Command-line surface: flags, help examples and the `--docs` guide.

use std::path::PathBuf;

use clap::Parser;
use owo_colors::OwoColorize;

use crate::provider::retry::DEFAULT_MAX_ATTEMPTS;
use crate::types::DEFAULT_TEMPERATURE;

const HELP_EXAMPLES: &str = "Examples:\n  mygem                                      # interactive chat\n  mygem -p \"Explain quantum computing\"       # single prompt\n  cat main.rs | mygem -p \"Review this code\"\n  mygem -f notes.txt -p \"Summarize this\" --stream\n  mygem -i -m gemini-1.5-pro                 # interactive with another model\n\nEnvironment:\n  GEMINI_API_KEY   API key (required)\n  MYGEM_MODEL      default model\n  GEMINI_BASE_URL  alternative endpoint";

/// Timeout applied to one HTTP exchange unless `--timeout` says otherwise.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Parser)]
#[command(
    name = "mygem",
    version,
    about = "Gemini CLI with streaming output, multi-turn chat and automatic retries",
    after_help = HELP_EXAMPLES
)]
pub struct Args {
    /// Prompt text to send
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Read additional input from a file
    #[arg(short, long, value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// Start interactive chat mode
    #[arg(short, long)]
    pub interactive: bool,

    /// Model name [env: MYGEM_MODEL] [default: gemini-2.0-flash-exp]
    #[arg(short, long)]
    pub model: Option<String>,

    /// Response style: creative, concise, technical, ...
    #[arg(short, long)]
    pub style: Option<String>,

    /// Sampling temperature in [0.0, 1.0]
    #[arg(short, long, default_value_t = DEFAULT_TEMPERATURE, allow_negative_numbers = true)]
    pub temperature: f32,

    /// Maximum output tokens
    #[arg(short = 'x', long, value_name = "N")]
    pub max_tokens: Option<u32>,

    /// Total attempts per request, including the first one
    #[arg(short, long, default_value_t = DEFAULT_MAX_ATTEMPTS, value_name = "N")]
    pub retries: u32,

    /// Stream the answer of a single prompt as it is generated
    #[arg(long)]
    pub stream: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Log requests, retries and stream metadata to stderr
    #[arg(long)]
    pub debug: bool,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, value_name = "SECS")]
    pub timeout: u64,

    /// API base URL [env: GEMINI_BASE_URL]
    #[arg(long, value_name = "URL")]
    pub base_url: Option<String>,

    /// Show extended documentation and exit
    #[arg(long)]
    pub docs: bool,
}

/// Long-form guide printed by `--docs`.
pub fn docs_text(use_color: bool) -> String {
    let heading = |text: &str| {
        if use_color {
            text.cyan().to_string()
        } else {
            text.to_string()
        }
    };
    let title = if use_color {
        "mygem: Gemini from the command line".bold().to_string()
    } else {
        "mygem: Gemini from the command line".to_string()
    };

    format!(
        "{title}
{rule}

{features}
  - Streaming responses, shown once an attempt completes cleanly
  - Multi-turn conversations with memory
  - Markdown formatting for bold, italic, inline code and code blocks
  - Prompt, file and stdin input, combinable
  - Automatic retries with exponential backoff for transient failures

{usage}
  mygem                                  interactive mode
  mygem -p \"prompt text\" [options]       single prompt
  cat file.txt | mygem -p \"prompt text\"  piped input
  mygem -f file.txt -p \"Explain this\"    file input

{options}
  -p, --prompt        Prompt text to send
  -f, --file          Read additional input from a file
  -i, --interactive   Start interactive chat mode
  -m, --model         Model name (default: gemini-2.0-flash-exp)
  -s, --style         Response style: creative, concise, technical, ...
  -t, --temperature   Sampling temperature (0.0-1.0, default 0.3)
  -x, --max-tokens    Maximum output tokens
  -r, --retries       Total attempts per request (default 3)
  --stream            Stream single-prompt output
  --timeout           Per-request timeout in seconds (default 120)
  --base-url          Alternative API endpoint
  --no-color          Disable colored output
  --debug             Log requests and retries to stderr
  --docs              Show this documentation

{models}
  gemini-2.0-flash-exp    latest experimental model (default)
  gemini-1.5-pro          high-quality reasoning
  gemini-1.5-flash        fast, efficient responses

{commands}
  /clear              Clear conversation history
  /help               List commands
  exit, quit          Leave interactive mode
  Ctrl+C              Cancel the running response, or exit at the prompt

{environment}
  GEMINI_API_KEY      Your Gemini API key (required)
  MYGEM_MODEL         Default model
  GEMINI_BASE_URL     Alternative API endpoint
  RUST_LOG            Log filter, overrides --debug

{exit_codes}
  0    success
  1    configuration, HTTP or API error
  2    network or protocol failure
  130  interrupted

{tips}
  - Low temperatures (0.1-0.3) give factual, consistent answers
  - High temperatures (0.7-0.9) give creative, varied output
  - Combine -f and -p to provide context and a specific instruction
  - Use --debug to troubleshoot API issues
",
        rule = "=".repeat(60),
        features = heading("FEATURES:"),
        usage = heading("USAGE:"),
        options = heading("OPTIONS:"),
        models = heading("POPULAR MODELS:"),
        commands = heading("INTERACTIVE COMMANDS:"),
        environment = heading("ENVIRONMENT VARIABLES:"),
        exit_codes = heading("EXIT CODES:"),
        tips = heading("TIPS:"),
    )
}
