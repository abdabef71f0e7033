//! Notifiers.

use super::Notifier;
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Writes notifications to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, title: &str, body: &str) {
        info!(title, body, "notification");
    }
}

/// Runs a user-configured command for each notification.
///
/// The template is split with shell quoting rules, then `{title}` and
/// `{body}` are substituted inside each argument, so message text never
/// goes through a shell.
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    template: Vec<String>,
}

impl CommandNotifier {
    /// Parse a command template such as `notify-send {title} {body}`.
    ///
    /// Returns `None` for an empty or unparsable template.
    pub fn parse(template: &str) -> Option<Self> {
        match shell_words::split(template) {
            Ok(words) if !words.is_empty() => Some(Self { template: words }),
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "invalid notify_command; notifications will only be logged");
                None
            }
        }
    }

    /// The argv a notification would run.
    pub fn render(&self, title: &str, body: &str) -> Vec<String> {
        self.template
            .iter()
            .map(|word| word.replace("{title}", title).replace("{body}", body))
            .collect()
    }
}

impl Notifier for CommandNotifier {
    fn notify(&self, title: &str, body: &str) {
        let argv = self.render(title, body);
        let Some((program, args)) = argv.split_first() else {
            return;
        };

        let spawned = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                debug!(error = %e, program = %program, "notification command failed");
                return;
            }
        };
        let pid = child.id();
        debug!(pid, program = %program, "notification command spawned");

        // Reap off-thread; callers may hold the engine lock.
        let reaper = std::thread::Builder::new()
            .name("curfew-notify-reaper".to_string())
            .spawn(move || match child.wait() {
                Ok(status) => debug!(pid, %status, "notification command exited"),
                Err(e) => debug!(pid, error = %e, "failed to wait for notification command"),
            });
        if let Err(e) = reaper {
            warn!(pid, error = %e, "failed to start notification reaper");
        }
    }
}
