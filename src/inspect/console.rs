use std::io::{self, BufRead, Write};
use std::time::Duration;

use crate::events::Event;
use crate::waiter::TimeoutContinuation;

const MESSAGES: &[(&str, &str)] = &[
    (
        "service_uninstall_confirmation",
        "This will uninstall service {0}. Do you want to continue?",
    ),
    (
        "application_uninstall_confirmation",
        "This will uninstall application {0} and all of its services. Do you want to continue?",
    ),
    (
        "timeout_continue",
        "Still waiting after {0} seconds. Do you want to keep waiting?",
    ),
];

/// Formats the message registered under `key` with positional arguments.
///
/// Unknown keys are returned as they are so nothing is silently dropped.
pub fn message(key: &str, args: &[&str]) -> String {
    let Some((_, template)) = MESSAGES.iter().find(|(name, _)| *name == key) else {
        return key.to_string();
    };
    args.iter()
        .enumerate()
        .fold(template.to_string(), |text, (position, arg)| {
            text.replace(&format!("{{{position}}}"), arg)
        })
}

/// Asks a yes/no question on the terminal. Anything but `y`/`yes` is a no.
pub fn prompt_yes_no(key: &str, args: &[&str]) -> io::Result<bool> {
    let mut stdout = io::stdout().lock();
    write!(stdout, "{} [y/N] ", message(key, args))?;
    stdout.flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Where inspectors report progress to.
pub trait ProgressDisplay: Send + Sync {
    fn print_events(&self, events: &[Event]);
    fn print_no_change(&self);
    fn print_event(&self, line: &str);
}

/// Prints to stdout. Polls without news print a single dot.
pub struct ConsoleDisplay;

impl ProgressDisplay for ConsoleDisplay {
    fn print_events(&self, events: &[Event]) {
        let mut stdout = io::stdout().lock();
        for event in events {
            let _ = writeln!(stdout, "{}", event.description);
        }
    }

    fn print_no_change(&self) {
        let mut stdout = io::stdout().lock();
        let _ = write!(stdout, ".");
        let _ = stdout.flush();
    }

    fn print_event(&self, line: &str) {
        println!("{line}");
    }
}

/// Asks the operator whether to keep waiting once a timeout expired.
pub struct PromptOnTimeout;

impl TimeoutContinuation for PromptOnTimeout {
    fn keep_waiting(&mut self, waited: Duration) -> bool {
        let seconds = waited.as_secs().to_string();
        let answer = tokio::task::block_in_place(|| prompt_yes_no("timeout_continue", &[&seconds]));
        match answer {
            Ok(answer) => answer,
            Err(e) => {
                log::warn!("Failed to read answer, giving up: {e}");
                false
            }
        }
    }
}
