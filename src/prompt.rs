//! Concrete user prompts.
//!
//! [`ConsolePrompt`] asks for the focus level on the terminal. On Windows,
//! [`DesktopPrompt`] shows the intervention as a native message box.

use crate::collaborators::{PromptOutcome, PromptReply, UserPrompt};
use std::io::{self, BufRead, Write};

pub const SURVEY_QUESTION: &str = "How focused have you been? (0-10, empty to skip)";

/// Reads one survey answer. Blank, unparsable and out-of-range answers
/// count as dismissals.
pub fn parse_focus_level(input: &str) -> PromptOutcome {
    let input = input.trim();
    if input.is_empty() {
        return PromptOutcome::Dismissed;
    }
    match input.parse::<u8>() {
        Ok(level) if level <= 10 => PromptOutcome::Submitted(level),
        _ => {
            tracing::warn!(answer = input, "Ignoring invalid focus level");
            PromptOutcome::Dismissed
        }
    }
}

/// Terminal prompt: the survey question is read from stdin on a helper
/// thread; alerts are printed.
///
/// Stdin reads cannot be cancelled. A survey abandoned at shutdown leaves
/// its reader thread blocked in `read_line`; it consumes the next input
/// line and its answer is discarded.
#[derive(Debug, Default, Clone)]
pub struct ConsolePrompt;

impl UserPrompt for ConsolePrompt {
    fn request_focus_level(&self) -> PromptReply {
        let (responder, reply) = PromptReply::channel();
        let spawned = std::thread::Builder::new()
            .name("console-survey".to_string())
            .spawn(move || {
                print!("\n{SURVEY_QUESTION} ");
                let _ = io::stdout().flush();

                let mut line = String::new();
                match io::stdin().lock().read_line(&mut line) {
                    Ok(0) | Err(_) => responder.dismiss(),
                    Ok(_) => match parse_focus_level(&line) {
                        PromptOutcome::Submitted(level) => responder.submit(level),
                        PromptOutcome::Dismissed => responder.dismiss(),
                    },
                }
            });

        match spawned {
            Ok(_) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "Could not start survey prompt");
                PromptReply::ready(PromptOutcome::Dismissed)
            }
        }
    }

    fn show_alert(&self, title: &str, message: &str) {
        eprintln!("\n⚠ {title}: {message}");
    }
}

#[cfg(windows)]
pub use desktop::DesktopPrompt;

#[cfg(windows)]
mod desktop {
    use super::ConsolePrompt;
    use crate::collaborators::{PromptReply, UserPrompt};
    use crate::winapi_utils::show_message_box;

    /// Console survey plus a topmost native alert box.
    #[derive(Debug, Default, Clone)]
    pub struct DesktopPrompt {
        console: ConsolePrompt,
    }

    impl UserPrompt for DesktopPrompt {
        fn request_focus_level(&self) -> PromptReply {
            self.console.request_focus_level()
        }

        fn show_alert(&self, title: &str, message: &str) {
            show_message_box(title, message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_focus_level() {
        assert_eq!(parse_focus_level("7\n"), PromptOutcome::Submitted(7));
        assert_eq!(parse_focus_level(" 0 "), PromptOutcome::Submitted(0));
        assert_eq!(parse_focus_level("10"), PromptOutcome::Submitted(10));
        assert_eq!(parse_focus_level(""), PromptOutcome::Dismissed);
        assert_eq!(parse_focus_level("11"), PromptOutcome::Dismissed);
        assert_eq!(parse_focus_level("very"), PromptOutcome::Dismissed);
    }
}
