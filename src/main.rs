use std::io::{self, IsTerminal};
use std::path::Path;
use std::{env, fs, process};

use clap::Parser;
use owo_colors::OwoColorize;

use mygem::cli::{Args, docs_text};
use mygem::config::{Mode, Settings, Terminal};
use mygem::http::reqwest::default_dyn_transport;
use mygem::provider::google_gemini::CONTENT_SEPARATOR;
use mygem::render::TerminalRenderer;
use mygem::session::{CtrlC, EditorLines};
use mygem::{GemError, RetryController, Session, logging};

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let color_allowed = !args.no_color && env::var_os("NO_COLOR").is_none();

    if args.docs {
        print!("{}", docs_text(color_allowed && io::stdout().is_terminal()));
        return;
    }

    logging::init(args.debug);

    if let Err(err) = run(args).await {
        if color_allowed && io::stderr().is_terminal() {
            eprintln!("{} {err}", "Error:".red());
        } else {
            eprintln!("Error: {err}");
        }
        process::exit(err.exit_code());
    }
}

async fn run(args: Args) -> Result<(), GemError> {
    let terminal = Terminal {
        stdin: io::stdin().is_terminal(),
        stdout: io::stdout().is_terminal(),
    };
    let settings = Settings::resolve(&args, |name| env::var(name).ok(), terminal)?;

    let client = settings.build_client(default_dyn_transport()?);
    let mut session = Session::new(
        client,
        RetryController::new(settings.retry),
        settings.generation.clone(),
    )
    .with_streaming(settings.streaming);
    let mut renderer = TerminalRenderer::new(settings.use_color);
    let mut interrupt = CtrlC;

    match &settings.mode {
        Mode::Interactive => {
            let mut lines = EditorLines::new()?;
            session.run(&mut lines, &mut renderer, &mut interrupt).await;
            Ok(())
        }
        Mode::OneShot {
            prompt,
            file,
            read_stdin,
        } => {
            let extra = read_extra(file.as_deref(), *read_stdin)?;
            if prompt.trim().is_empty() && extra.is_empty() {
                return Err(GemError::config(
                    "prompt",
                    "no prompt provided; use -p, -f, or pipe input",
                ));
            }
            let extra = (!extra.is_empty()).then_some(extra.as_str());
            session
                .ask(prompt, extra, &mut renderer, &mut interrupt)
                .await
                .map(|_| ())
        }
    }
}

/// File text followed by piped stdin, skipping whichever is empty.
fn read_extra(file: Option<&Path>, read_stdin: bool) -> Result<String, GemError> {
    let mut parts = Vec::new();
    if let Some(path) = file {
        let text = fs::read_to_string(path).map_err(|err| {
            GemError::config("file", format!("cannot read '{}': {err}", path.display()))
        })?;
        parts.push(text);
    }
    if read_stdin {
        let text = io::read_to_string(io::stdin())
            .map_err(|err| GemError::config("stdin", format!("cannot read input: {err}")))?;
        parts.push(text.trim().to_string());
    }
    parts.retain(|part| !part.trim().is_empty());
    Ok(parts.join(CONTENT_SEPARATOR))
}
