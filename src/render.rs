//! Terminal output: markdown-aware formatting of streamed text plus status lines.

use std::io::{self, Stdout, Write};
use std::sync::LazyLock;

use owo_colors::OwoColorize;
use regex::{Captures, Regex};

use crate::provider::retry::DeltaSink;

/// Inline code, bold and italic spans. Leftmost match wins, so code spans shield their
/// content from emphasis markers.
static INLINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"`([^`\n]+)`|\*\*([^*\n]+?)\*\*|\*([^*\n]+)\*")
        .expect("inline markdown pattern is valid")
});

/// Incremental markdown formatter for streamed text.
///
/// Complete lines are formatted as soon as their newline arrives. A partial line is
/// released early only when it cannot be the start of a marker, which keeps output
/// live without ever splitting a `**bold**` span across two formatting passes. The
/// code-block flag carries over from one delta to the next.
#[derive(Debug, Clone)]
pub struct MarkdownFormatter {
    use_color: bool,
    in_code_block: bool,
    pending: String,
    /// Part of the current line was already released.
    mid_line: bool,
}

impl MarkdownFormatter {
    pub fn new(use_color: bool) -> Self {
        Self {
            use_color,
            in_code_block: false,
            pending: String::new(),
            mid_line: false,
        }
    }

    /// Feeds a delta and returns whatever can be displayed right away.
    ///
    /// # Examples
    ///
    /// ```
    /// use mygem::render::MarkdownFormatter;
    ///
    /// let mut formatter = MarkdownFormatter::new(false);
    /// let mut out = formatter.push("a **bo");
    /// out += &formatter.push("ld** claim\n");
    /// out += &formatter.finish();
    /// assert_eq!(out, "a bold claim\n");
    /// ```
    pub fn push(&mut self, delta: &str) -> String {
        self.pending.push_str(delta);
        let mut out = String::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            let line = line.trim_end_matches('\n').trim_end_matches('\r');
            out.push_str(&self.format_line(line));
            out.push('\n');
            self.mid_line = false;
        }
        let releasable = !self.in_code_block
            && !self.pending.is_empty()
            && !self.pending.contains(['*', '`']);
        if releasable {
            out.push_str(&self.pending);
            self.pending.clear();
            self.mid_line = true;
        }
        out
    }

    /// Formats the buffered tail and resets all state for the next response.
    pub fn finish(&mut self) -> String {
        let tail = std::mem::take(&mut self.pending);
        let out = if tail.is_empty() {
            String::new()
        } else {
            self.format_line(&tail)
        };
        self.in_code_block = false;
        self.mid_line = false;
        out
    }

    /// Drops buffered text and state without producing output.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.in_code_block = false;
        self.mid_line = false;
    }

    fn format_line(&mut self, line: &str) -> String {
        if !self.mid_line && line.trim_start().starts_with("```") {
            self.in_code_block = !self.in_code_block;
            if !self.use_color {
                return line.to_string();
            }
            let rule = if self.in_code_block {
                "┌─ Code Block ─"
            } else {
                "└──────────────"
            };
            return rule.bright_black().to_string();
        }
        if self.in_code_block {
            return if self.use_color {
                format!("{} {}", "│".bright_black(), line.green())
            } else {
                line.to_string()
            };
        }
        format_inline(line, self.use_color)
    }
}

/// Applies inline markdown to a single line, or strips the markers without color.
pub fn format_inline(line: &str, use_color: bool) -> String {
    INLINE
        .replace_all(line, |caps: &Captures<'_>| {
            if let Some(code) = caps.get(1) {
                if use_color {
                    code.as_str().cyan().to_string()
                } else {
                    code.as_str().to_string()
                }
            } else if let Some(bold) = caps.get(2) {
                if use_color {
                    bold.as_str().bold().to_string()
                } else {
                    bold.as_str().to_string()
                }
            } else if let Some(italic) = caps.get(3) {
                if use_color {
                    italic.as_str().italic().to_string()
                } else {
                    italic.as_str().to_string()
                }
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

/// Output surface used by the session.
///
/// Deltas arrive through the [`DeltaSink`] half; everything else is status output.
pub trait Renderer: DeltaSink {
    /// Printed once per session before the first prompt.
    fn print_banner(&mut self, model: &str);

    /// Called before the first delta of a response.
    fn start_response(&mut self);

    /// Called after the last delta of a successful response.
    fn finish_response(&mut self);

    fn print_info(&mut self, info: &str);

    fn print_error(&mut self, error: &str);

    /// Called when the user cancels an in-flight response.
    fn print_interrupted(&mut self);
}

/// ANSI terminal renderer writing responses to `W` (stdout by default) and
/// diagnostics to stderr.
pub struct TerminalRenderer<W: Write = Stdout> {
    out: W,
    use_color: bool,
    formatter: MarkdownFormatter,
}

impl TerminalRenderer<Stdout> {
    pub fn new(use_color: bool) -> Self {
        Self::with_writer(io::stdout(), use_color)
    }
}

impl<W: Write> TerminalRenderer<W> {
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            formatter: MarkdownFormatter::new(use_color),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, text: &str) {
        // Terminal write failures (closed pipe) are not actionable mid-response.
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }
}

impl<W: Write> DeltaSink for TerminalRenderer<W> {
    fn on_delta(&mut self, text: &str) {
        let formatted = self.formatter.push(text);
        if !formatted.is_empty() {
            self.write(&formatted);
        }
    }
}

impl<W: Write> Renderer for TerminalRenderer<W> {
    fn print_banner(&mut self, model: &str) {
        let lines = [
            "Interactive mode started.".to_string(),
            "Type 'exit', 'quit', or Ctrl+D to end the session.".to_string(),
            "Use '/clear' to reset conversation history, '/help' for commands.".to_string(),
        ];
        if self.use_color {
            let header = format!("{}", "Gemini CLI".bold().cyan());
            self.write(&format!("\n{header}\n{}\n", lines[0].green()));
            for line in &lines[1..] {
                self.write(&format!("{}\n", line.bright_black()));
            }
            self.write(&format!("{} {}\n", "Model:".bright_black(), model.cyan()));
        } else {
            self.write("\nGemini CLI\n");
            for line in &lines {
                self.write(&format!("{line}\n"));
            }
            self.write(&format!("Model: {model}\n"));
        }
    }

    fn start_response(&mut self) {
        self.formatter.reset();
        if self.use_color {
            self.write(&format!("\n{}\n", "Assistant:".magenta()));
        } else {
            self.write("\nAssistant:\n");
        }
    }

    fn finish_response(&mut self) {
        let tail = self.formatter.finish();
        self.write(&format!("{tail}\n"));
    }

    fn print_info(&mut self, info: &str) {
        if self.use_color {
            self.write(&format!("{}\n", info.yellow()));
        } else {
            self.write(&format!("{info}\n"));
        }
    }

    fn print_error(&mut self, error: &str) {
        if self.use_color {
            eprintln!("{} {error}", "Error:".red());
        } else {
            eprintln!("Error: {error}");
        }
    }

    fn print_interrupted(&mut self) {
        self.formatter.reset();
        self.write("\n");
        if self.use_color {
            eprintln!("{}", "[interrupted]".bright_black());
        } else {
            eprintln!("[interrupted]");
        }
    }
}
