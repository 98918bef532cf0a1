use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// Structured events emitted by the iteration engine.
///
/// Iteration numbers are 1-based, as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    HistoryLoaded {
        iterations: usize,
        current: usize,
    },
    HistorySeeded {
        iteration_id: String,
        items: usize,
    },
    IterationRequested {
        from_iteration: usize,
        iteration_number: usize,
        has_edits: bool,
        has_feedback: bool,
    },
    IterationCreated {
        iteration_number: usize,
        iteration_id: String,
        items: usize,
        duration_secs: f64,
    },
    IterationRejected {
        reason: String,
    },
    IterationFailed {
        iteration_number: usize,
        code: String,
        error: String,
    },
    IterationSelected {
        iteration_number: usize,
    },
    MarkedSatisfied {
        iteration_number: usize,
    },
    IterationSaved {
        iteration_number: usize,
        items: usize,
    },
    PersistFailed {
        error: String,
    },
    HistoryReset {
        removed: usize,
    },
}

impl LogEvent {
    fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors
    #[default]
    Pretty,
    /// JSON lines for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Logger for engine events. Writes to stderr and optionally to a JSONL file.
pub struct Logger {
    format: LogFormat,
    console: bool,
    file_writer: Option<Mutex<File>>,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            console: true,
            file_writer: None,
        }
    }

    /// Create a logger with file output in addition to console
    pub fn with_file(format: LogFormat, log_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            format,
            console: true,
            file_writer: Some(Mutex::new(file)),
        })
    }

    /// Suppress console output, keeping only the file sink
    pub fn quiet(mut self) -> Self {
        self.console = false;
        self
    }

    pub fn format(&self) -> LogFormat {
        self.format
    }

    pub fn log(&self, event: &LogEvent) {
        // File output is always JSON
        if let Some(ref writer) = self.file_writer {
            if let Ok(mut file) = writer.lock() {
                let _ = writeln!(file, "{}", event.with_timestamp());
            }
        }

        if !self.console {
            return;
        }

        match self.format {
            LogFormat::Json => self.log_json(event),
            LogFormat::Pretty => self.log_pretty(event),
            LogFormat::Compact => self.log_compact(event),
        }
    }

    fn log_json(&self, event: &LogEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{}", json);
        }
    }

    fn log_pretty(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        match event {
            LogEvent::HistoryLoaded { .. } => {
                // Startup noise; available in json and compact modes
            }
            LogEvent::HistorySeeded { items, .. } => {
                let _ = writeln!(
                    stderr,
                    "{} {} ({} items)",
                    "●".bright_blue(),
                    "Iteration 1 created from initial analysis".bold(),
                    items
                );
            }
            LogEvent::IterationRequested {
                from_iteration,
                iteration_number,
                has_edits,
                has_feedback,
            } => {
                let mut inputs = Vec::new();
                if *has_edits {
                    inputs.push("edits");
                }
                if *has_feedback {
                    inputs.push("feedback");
                }
                let inputs = if inputs.is_empty() {
                    String::new()
                } else {
                    format!(" with {}", inputs.join(" + "))
                };
                let _ = writeln!(
                    stderr,
                    "{} {}{}",
                    "▶".bright_cyan(),
                    format!(
                        "Refining iteration {} into {}",
                        from_iteration, iteration_number
                    )
                    .bright_cyan()
                    .bold(),
                    inputs.dimmed()
                );
            }
            LogEvent::IterationCreated {
                iteration_number,
                items,
                duration_secs,
                ..
            } => {
                let _ = writeln!(
                    stderr,
                    "  {} Iteration {} ready, {} items ({:.1}s)",
                    "✓".bright_green(),
                    iteration_number,
                    items,
                    duration_secs
                );
            }
            LogEvent::IterationRejected { reason } => {
                let _ = writeln!(
                    stderr,
                    "{} Cannot iterate: {}",
                    "⚠".bright_yellow(),
                    reason
                );
            }
            LogEvent::IterationFailed {
                iteration_number,
                code,
                error,
            } => {
                let _ = writeln!(
                    stderr,
                    "  {} Iteration {} failed [{}]: {}",
                    "✗".bright_red(),
                    iteration_number,
                    code,
                    error.bright_red()
                );
            }
            LogEvent::IterationSelected { iteration_number } => {
                let _ = writeln!(
                    stderr,
                    "{} Viewing iteration {}",
                    "→".bright_blue(),
                    iteration_number
                );
            }
            LogEvent::MarkedSatisfied { iteration_number } => {
                let _ = writeln!(
                    stderr,
                    "{} Iteration {} marked satisfied",
                    "✓".bright_green(),
                    iteration_number
                );
            }
            LogEvent::IterationSaved {
                iteration_number,
                items,
            } => {
                let _ = writeln!(
                    stderr,
                    "{} Saved edits to iteration {} ({} items)",
                    "✎".bright_blue(),
                    iteration_number,
                    items
                );
            }
            LogEvent::PersistFailed { error } => {
                let _ = writeln!(
                    stderr,
                    "{} History not persisted: {}",
                    "⚠".bright_yellow(),
                    error.dimmed()
                );
            }
            LogEvent::HistoryReset { removed } => {
                let _ = writeln!(
                    stderr,
                    "{} Cleared {} iterations",
                    "●".bright_blue(),
                    removed
                );
            }
        }
    }

    fn log_compact(&self, event: &LogEvent) {
        let timestamp = chrono::Utc::now().format("%H:%M:%S");
        let msg = match event {
            LogEvent::HistoryLoaded {
                iterations,
                current,
            } => format!("[{}] history:load {} @{}", timestamp, iterations, current),
            LogEvent::HistorySeeded { items, .. } => {
                format!("[{}] history:seed items={}", timestamp, items)
            }
            LogEvent::IterationRequested {
                from_iteration,
                iteration_number,
                ..
            } => format!(
                "[{}] iter:start {}->{}",
                timestamp, from_iteration, iteration_number
            ),
            LogEvent::IterationCreated {
                iteration_number,
                items,
                duration_secs,
                ..
            } => format!(
                "[{}] iter:done:{} items={} {:.1}s",
                timestamp, iteration_number, items, duration_secs
            ),
            LogEvent::IterationRejected { reason } => {
                format!("[{}] iter:reject {}", timestamp, reason)
            }
            LogEvent::IterationFailed {
                iteration_number,
                code,
                ..
            } => format!("[{}] iter:fail:{} {}", timestamp, iteration_number, code),
            LogEvent::IterationSelected { iteration_number } => {
                format!("[{}] select:{}", timestamp, iteration_number)
            }
            LogEvent::MarkedSatisfied { iteration_number } => {
                format!("[{}] satisfied:{}", timestamp, iteration_number)
            }
            LogEvent::IterationSaved {
                iteration_number,
                items,
            } => format!("[{}] save:{} items={}", timestamp, iteration_number, items),
            LogEvent::PersistFailed { error } => format!("[{}] persist:fail {}", timestamp, error),
            LogEvent::HistoryReset { removed } => {
                format!("[{}] history:reset {}", timestamp, removed)
            }
        };
        let _ = writeln!(std::io::stderr(), "{}", msg);
    }
}
