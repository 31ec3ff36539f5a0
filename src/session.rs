//! Interactive and one-shot drivers tying the conversation, the request pipeline and
//! the terminal together.

use async_trait::async_trait;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{debug, warn};

use crate::commands::{SessionCommand, help_text, parse_command};
use crate::conversation::Conversation;
use crate::error::GemError;
use crate::provider::google_gemini::{GeminiClient, RequestPayload, build_request};
use crate::provider::retry::RetryController;
use crate::render::Renderer;
use crate::types::{GenerationConfig, Turn};

const PROMPT: &str = "You: ";

/// Lifecycle of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingInput,
    Processing,
    Terminated,
}

/// Result of reading one line from the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Line(String),
    /// Ctrl+C at the prompt.
    Interrupted,
    /// Ctrl+D or closed input.
    Eof,
}

/// Source of user input lines.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> Input;

    /// Records an accepted line for later recall.
    fn add_history(&mut self, _line: &str) {}
}

/// Line editor backed by rustyline.
pub struct EditorLines {
    editor: DefaultEditor,
}

impl EditorLines {
    /// # Errors
    ///
    /// Returns [`GemError::Config`] when the terminal cannot be set up.
    pub fn new() -> Result<Self, GemError> {
        DefaultEditor::new()
            .map(|editor| Self { editor })
            .map_err(|err| GemError::config("terminal", err.to_string()))
    }
}

impl LineSource for EditorLines {
    fn read_line(&mut self, prompt: &str) -> Input {
        match self.editor.readline(prompt) {
            Ok(line) => Input::Line(line),
            Err(ReadlineError::Interrupted) => Input::Interrupted,
            Err(ReadlineError::Eof) => Input::Eof,
            Err(err) => {
                warn!(error = %err, "failed to read input");
                Input::Eof
            }
        }
    }

    fn add_history(&mut self, line: &str) {
        let _ = self.editor.add_history_entry(line);
    }
}

/// Resolves when the user asks to cancel the request in flight.
#[async_trait]
pub trait InterruptSignal: Send {
    async fn interrupted(&mut self);
}

/// Ctrl+C listener. Never fires when the signal handler cannot be installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct CtrlC;

#[async_trait]
impl InterruptSignal for CtrlC {
    async fn interrupted(&mut self) {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

/// One conversation with the model.
///
/// The session owns the [`Conversation`]; the retry controller only ever sees a
/// snapshot of it. A prompt is fully processed, retries included, before the next
/// line is read.
pub struct Session {
    client: GeminiClient,
    controller: RetryController,
    generation: GenerationConfig,
    conversation: Conversation,
    streaming: bool,
    state: SessionState,
}

impl Session {
    /// Creates a streaming session with an empty conversation.
    pub fn new(
        client: GeminiClient,
        controller: RetryController,
        generation: GenerationConfig,
    ) -> Self {
        Self {
            client,
            controller,
            generation,
            conversation: Conversation::new(),
            streaming: true,
            state: SessionState::Idle,
        }
    }

    /// Chooses between the streaming and the buffered endpoint.
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    /// Forgets every turn.
    pub fn reset(&mut self) {
        self.conversation.clear();
    }

    /// Sends `prompt` (plus `extra` material) with the current history.
    ///
    /// Deltas go to `renderer` as they arrive. The conversation grows by one
    /// user/model exchange on success and is left untouched otherwise.
    ///
    /// # Errors
    ///
    /// Returns the terminal pipeline error, or [`GemError::Aborted`] when `interrupt`
    /// fires first. The in-flight request is dropped in that case.
    pub async fn submit<R, I>(
        &mut self,
        prompt: &str,
        extra: Option<&str>,
        renderer: &mut R,
        interrupt: &mut I,
    ) -> Result<String, GemError>
    where
        R: Renderer + ?Sized,
        I: InterruptSignal + ?Sized,
    {
        let previous = self.state;
        self.state = SessionState::Processing;

        let history = self.conversation.snapshot();
        debug!(turns = history.len(), streaming = self.streaming, "submitting prompt");
        let mut user_turn = None;
        let build = || -> Result<RequestPayload, GemError> {
            let payload = build_request(prompt, &history, &self.generation, extra)?;
            user_turn = Some(payload.user_turn.clone());
            Ok(payload)
        };

        let outcome = tokio::select! {
            result = self.controller.execute(&self.client, self.streaming, build, renderer) => result,
            () = interrupt.interrupted() => Err(GemError::Aborted {
                message: "interrupted by user".to_string(),
            }),
        };

        self.state = previous;
        let completion = outcome?;

        match user_turn {
            Some(user) if !completion.text.is_empty() => {
                self.conversation
                    .append_exchange(user, Turn::model(completion.text.clone()))?;
            }
            _ => warn!("empty response, conversation left unchanged"),
        }
        Ok(completion.text)
    }

    /// Runs the interactive loop until the user quits or input ends.
    pub async fn run<L, R, I>(&mut self, lines: &mut L, renderer: &mut R, interrupt: &mut I)
    where
        L: LineSource + ?Sized,
        R: Renderer + ?Sized,
        I: InterruptSignal + ?Sized,
    {
        renderer.print_banner(&self.generation.model);
        self.state = SessionState::AwaitingInput;

        loop {
            let line = match lines.read_line(PROMPT) {
                Input::Line(line) => line,
                Input::Interrupted | Input::Eof => break,
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            lines.add_history(line);

            match parse_command(line) {
                Some(SessionCommand::Quit) => break,
                Some(SessionCommand::Reset) => {
                    self.reset();
                    renderer.print_info("Conversation history cleared.");
                }
                Some(SessionCommand::Help) => renderer.print_info(help_text()),
                None => {
                    renderer.start_response();
                    match self.submit(line, None, renderer, interrupt).await {
                        Ok(_) => renderer.finish_response(),
                        Err(GemError::Aborted { .. }) => renderer.print_interrupted(),
                        Err(err) => renderer.print_error(&err.to_string()),
                    }
                }
            }
        }

        renderer.print_info("Goodbye!");
        self.state = SessionState::Terminated;
    }

    /// Answers a single prompt and terminates the session.
    ///
    /// # Errors
    ///
    /// Same as [`Session::submit`].
    pub async fn ask<R, I>(
        &mut self,
        prompt: &str,
        extra: Option<&str>,
        renderer: &mut R,
        interrupt: &mut I,
    ) -> Result<String, GemError>
    where
        R: Renderer + ?Sized,
        I: InterruptSignal + ?Sized,
    {
        let result = self.submit(prompt, extra, renderer, interrupt).await;
        match &result {
            Ok(_) => renderer.finish_response(),
            Err(GemError::Aborted { .. }) => renderer.print_interrupted(),
            Err(_) => {}
        }
        self.state = SessionState::Terminated;
        result
    }
}
