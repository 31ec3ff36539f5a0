use std::path::PathBuf;
use std::time::Duration;

use crate::cli::Args;
use crate::error::GemError;
use crate::http::DynHttpTransport;
use crate::provider::google_gemini::{DEFAULT_BASE_URL, GeminiClient};
use crate::provider::retry::RetryPolicy;
use crate::types::{DEFAULT_MODEL, GenerationConfig};

pub const API_KEY_VAR: &str = "GEMINI_API_KEY";
pub const MODEL_VAR: &str = "MYGEM_MODEL";
pub const BASE_URL_VAR: &str = "GEMINI_BASE_URL";

/// How the process interacts with the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Read prompts from the terminal until the user quits.
    Interactive,
    /// Answer a single prompt, optionally enriched with a file and piped stdin.
    OneShot {
        prompt: String,
        file: Option<PathBuf>,
        read_stdin: bool,
    },
}

/// Whether the standard streams are attached to a terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Terminal {
    pub stdin: bool,
    pub stdout: bool,
}

/// Fully resolved runtime settings: flags merged with the environment and validated.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_key: String,
    pub base_url: String,
    pub generation: GenerationConfig,
    pub retry: RetryPolicy,
    pub timeout: Duration,
    pub mode: Mode,
    /// Stream responses; interactive mode always does.
    pub streaming: bool,
    pub use_color: bool,
}

impl Settings {
    /// Merges `args` with environment values read through `env`.
    ///
    /// Flags win over environment variables; blank variables count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`GemError::Config`] for an out-of-range flag or a missing API key.
    pub fn resolve<F>(args: &Args, env: F, terminal: Terminal) -> Result<Self, GemError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| env(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let retry = RetryPolicy::new(args.retries)?;
        if args.timeout == 0 {
            return Err(GemError::config("timeout", "must be at least one second"));
        }

        let model = args
            .model
            .clone()
            .or_else(|| lookup(MODEL_VAR))
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let generation = GenerationConfig {
            model,
            temperature: args.temperature,
            max_output_tokens: args.max_tokens,
            style: args.style.clone(),
        };
        generation.validate()?;

        let api_key = lookup(API_KEY_VAR).ok_or_else(|| {
            GemError::config(
                API_KEY_VAR,
                format!("environment variable not set; export {API_KEY_VAR}='your-api-key'"),
            )
        })?;
        let base_url = args
            .base_url
            .clone()
            .or_else(|| lookup(BASE_URL_VAR))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let mode = select_mode(args, terminal.stdin);
        let streaming = matches!(mode, Mode::Interactive) || args.stream;
        let use_color = !args.no_color && terminal.stdout && env("NO_COLOR").is_none();

        Ok(Self {
            api_key,
            base_url,
            generation,
            retry,
            timeout: Duration::from_secs(args.timeout),
            mode,
            streaming,
            use_color,
        })
    }

    /// Builds the Gemini client for these settings on top of `transport`.
    pub fn build_client(&self, transport: DynHttpTransport) -> GeminiClient {
        GeminiClient::new(transport, self.api_key.clone())
            .with_base_url(self.base_url.clone())
            .with_timeout(self.timeout)
    }
}

/// Interactive when asked for, or when there is nothing to answer and a user at the
/// keyboard; one-shot otherwise.
pub fn select_mode(args: &Args, stdin_is_terminal: bool) -> Mode {
    let has_input = args.prompt.is_some() || args.file.is_some() || !stdin_is_terminal;
    if args.interactive || !has_input {
        Mode::Interactive
    } else {
        Mode::OneShot {
            prompt: args.prompt.clone().unwrap_or_default(),
            file: args.file.clone(),
            read_stdin: !stdin_is_terminal,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use clap::Parser;

    use super::*;
    use crate::http::reqwest::default_dyn_transport;

    const TTY: Terminal = Terminal {
        stdin: true,
        stdout: true,
    };

    fn args(flags: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("mygem").chain(flags.iter().copied())).unwrap()
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn resolves_defaults_from_environment() {
        let settings = Settings::resolve(
            &args(&["-p", "hi"]),
            env(&[(API_KEY_VAR, "key"), (MODEL_VAR, "gemini-1.5-flash")]),
            TTY,
        )
        .unwrap();
        assert_eq!(settings.api_key, "key");
        assert_eq!(settings.generation.model, "gemini-1.5-flash");
        assert_eq!(settings.generation.temperature, 0.3);
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.timeout, Duration::from_secs(120));
        assert!(!settings.streaming);
        assert!(settings.use_color);
    }

    #[test]
    fn flags_override_environment() {
        let settings = Settings::resolve(
            &args(&["-p", "hi", "-m", "gemini-1.5-pro", "--base-url", "http://flag", "--stream"]),
            env(&[
                (API_KEY_VAR, "key"),
                (MODEL_VAR, "from-env"),
                (BASE_URL_VAR, "http://env"),
            ]),
            TTY,
        )
        .unwrap();
        assert_eq!(settings.generation.model, "gemini-1.5-pro");
        assert_eq!(settings.base_url, "http://flag");
        assert!(settings.streaming);
    }

    #[test]
    fn missing_or_blank_key_is_config_error() {
        for vars in [vec![], vec![(API_KEY_VAR, "   ")]] {
            let err = Settings::resolve(&args(&["-p", "hi"]), env(&vars), TTY).unwrap_err();
            match err {
                GemError::Config { field, .. } => assert_eq!(field, API_KEY_VAR),
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn rejects_out_of_range_flags() {
        let key = [(API_KEY_VAR, "key")];
        for flags in [
            &["-t", "1.5"][..],
            &["-t", "-0.1"],
            &["-r", "0"],
            &["-x", "0"],
            &["--timeout", "0"],
            &["-m", " "],
        ] {
            let err = Settings::resolve(&args(flags), env(&key), TTY).unwrap_err();
            assert!(matches!(err, GemError::Config { .. }), "{flags:?}");
            assert_eq!(err.exit_code(), 1);
        }
    }

    #[test]
    fn mode_selection_follows_inputs() {
        assert_eq!(select_mode(&args(&[]), true), Mode::Interactive);
        assert_eq!(select_mode(&args(&["-i", "-p", "x"]), true), Mode::Interactive);
        assert_eq!(
            select_mode(&args(&[]), false),
            Mode::OneShot {
                prompt: String::new(),
                file: None,
                read_stdin: true
            }
        );
        assert_eq!(
            select_mode(&args(&["-f", "a.txt"]), true),
            Mode::OneShot {
                prompt: String::new(),
                file: Some(PathBuf::from("a.txt")),
                read_stdin: false
            }
        );
    }

    #[test]
    fn interactive_mode_always_streams_and_color_needs_a_terminal() {
        let settings = Settings::resolve(&args(&[]), env(&[(API_KEY_VAR, "k")]), TTY).unwrap();
        assert_eq!(settings.mode, Mode::Interactive);
        assert!(settings.streaming);

        let piped = Terminal {
            stdin: false,
            stdout: false,
        };
        let settings = Settings::resolve(&args(&[]), env(&[(API_KEY_VAR, "k")]), piped).unwrap();
        assert!(!settings.use_color);

        let settings =
            Settings::resolve(&args(&["--no-color"]), env(&[(API_KEY_VAR, "k")]), TTY).unwrap();
        assert!(!settings.use_color);
    }

    #[test]
    fn builds_client_with_resolved_endpoint() {
        let settings = Settings::resolve(
            &args(&["-p", "hi"]),
            env(&[(API_KEY_VAR, "k"), (BASE_URL_VAR, "http://localhost:9")]),
            TTY,
        )
        .unwrap();
        let client = settings.build_client(default_dyn_transport().expect("transport"));
        assert_eq!(
            client.endpoint("models/gemini-2.0-flash-exp", true),
            "http://localhost:9/v1beta/models/gemini-2.0-flash-exp:streamGenerateContent?alt=sse"
        );
    }
}
