//! Logging utilities using the tracing framework, plus the progress console
//!
//! Diagnostics go through `tracing`. The lines an operator follows during a
//! deploy (`#### ...` sections, `# ...` confirmations, indented messages and
//! container logs) go through [`Console`].

use colored::Colorize;
use std::fmt::Display;
use std::sync::{Arc, Mutex};

/// Prefix for every line of an indented multi-line message
pub const INDENT: &str = "#     ";

/// Log an informational message (wrapper around tracing::info)
pub fn log_info<T: Display>(msg: T) {
    tracing::info!("{}", msg);
}

/// Log a warning message (wrapper around tracing::warn)
pub fn log_warn<T: Display>(msg: T) {
    tracing::warn!("{}", msg);
}

/// Macro for convenient info logging
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::utils::logger::log_info(format!($($arg)*))
    };
}

/// Macro for convenient warning logging
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::utils::logger::log_warn(format!($($arg)*))
    };
}

/// Prefix every line of `message` with [`INDENT`]
pub fn indent_multiline(message: &str) -> String {
    message
        .split('\n')
        .map(|line| format!("{}{}", INDENT, line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Clone)]
enum Sink {
    Stderr,
    Quiet,
    Capture(Arc<Mutex<Vec<String>>>),
}

/// Progress output for the operator
#[derive(Clone)]
pub struct Console {
    sink: Sink,
}

impl std::fmt::Debug for Console {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sink = match self.sink {
            Sink::Stderr => "stderr",
            Sink::Quiet => "quiet",
            Sink::Capture(_) => "capture",
        };
        f.debug_struct("Console").field("sink", &sink).finish()
    }
}

impl Console {
    /// Console on stderr, silenced when `quiet` is set
    pub fn new(quiet: bool) -> Self {
        let sink = if quiet { Sink::Quiet } else { Sink::Stderr };
        Self { sink }
    }

    /// In-memory console; read back with [`captured`](Self::captured)
    pub fn capture() -> Self {
        Self {
            sink: Sink::Capture(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    /// Lines written so far to a capturing console
    pub fn captured(&self) -> Vec<String> {
        match &self.sink {
            Sink::Capture(lines) => lines
                .lock()
                .map(|lines| lines.clone())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Print one line (or several, if `text` contains newlines)
    pub fn line(&self, text: impl Display) {
        self.write(text.to_string(), false);
    }

    /// Print a `#### ...` section marker
    pub fn section(&self, text: impl Display) {
        self.write(format!("#### {}", text), true);
    }

    /// Print `message` with every line prefixed by [`INDENT`]
    pub fn indented(&self, message: &str) {
        self.write(indent_multiline(message), false);
    }

    /// Print a container log framed by start and end markers
    pub fn container_log(&self, log: &str, pod: &str, container: &str) {
        self.line(format!("# ---------- {}/{}", pod, container));
        self.indented(log.trim_end());
        self.line("# ---------- end");
    }

    fn write(&self, text: String, highlight: bool) {
        match &self.sink {
            Sink::Quiet => {}
            Sink::Stderr if highlight => eprintln!("{}", text.cyan().bold()),
            Sink::Stderr => eprintln!("{}", text),
            Sink::Capture(lines) => {
                if let Ok(mut lines) = lines.lock() {
                    lines.extend(text.split('\n').map(str::to_string));
                }
            }
        }
    }
}
