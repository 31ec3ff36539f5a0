//! In-band commands recognised by the interactive session.
//!
//! Commands are matched exactly and case-sensitively after trimming surrounding
//! whitespace; anything else is sent to the model as a prompt.

/// A parsed session command. Commands never reach the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Empty the conversation history.
    Reset,
    /// End the session.
    Quit,
    /// Print the command summary.
    Help,
}

/// Classifies one input line.
///
/// Returns `None` when the line should be treated as a prompt.
///
/// # Examples
///
/// ```
/// use mygem::commands::{SessionCommand, parse_command};
///
/// assert_eq!(parse_command("/clear"), Some(SessionCommand::Reset));
/// assert_eq!(parse_command("  quit "), Some(SessionCommand::Quit));
/// assert_eq!(parse_command("Quit"), None);
/// assert_eq!(parse_command("explain /clear"), None);
/// ```
pub fn parse_command(input: &str) -> Option<SessionCommand> {
    match input.trim() {
        "/clear" => Some(SessionCommand::Reset),
        "exit" | "quit" | "/exit" | "/quit" => Some(SessionCommand::Quit),
        "/help" => Some(SessionCommand::Help),
        _ => None,
    }
}

/// Lines printed in response to `/help`.
pub fn help_text() -> &'static str {
    "/clear              Clear conversation history\n\
     /help               Show this help\n\
     exit, quit          End the session (also /exit, /quit)\n\
     Ctrl+C              Cancel the current response, or exit at the prompt\n\
     Ctrl+D              Exit"
}
