//! GitHub Actions workflow-command sink

use crate::reporting::ReportingSink;
use std::io::{self, Write};
use std::sync::Mutex;
use tracing::{debug, error, warn};

/// Annotation title attached to errors
pub const ANNOTATION_TITLE: &str = "stagebuild";

/// Sink that emits workflow commands (`::group::`, `::error::`, ...)
///
/// Errors and warnings are also logged, so the information is in the raw log
/// as well as in the CI annotations.
pub struct ActionsSink<W: Write + Send> {
    out: Mutex<W>,
}

impl ActionsSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ActionsSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    /// Recover the writer
    pub fn into_inner(self) -> W {
        match self.out.into_inner() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn command(&self, line: String) {
        let mut out = match self.out.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Err(e) = writeln!(out, "{}", line).and_then(|_| out.flush()) {
            debug!("Failed to write workflow command: {}", e);
        }
    }
}

impl<W: Write + Send> ReportingSink for ActionsSink<W> {
    fn start_group(&self, name: &str) {
        self.command(format!("::group::{}", escape_data(name)));
    }

    fn end_group(&self, _name: &str) {
        self.command("::endgroup::".to_string());
    }

    fn notice(&self, message: &str) {
        self.command(format!("::notice::{}", escape_data(message)));
    }

    fn warning(&self, message: &str) {
        warn!("{}", message);
        self.command(format!("::warning::{}", escape_data(message)));
    }

    fn error(&self, message: &str) {
        error!("{}", message);
        self.command(format!(
            "::error title={}::{}",
            escape_property(ANNOTATION_TITLE),
            escape_data(message)
        ));
    }
}

/// Escape a workflow-command message
pub fn escape_data(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// Escape a workflow-command property value
pub fn escape_property(value: &str) -> String {
    escape_data(value).replace(':', "%3A").replace(',', "%2C")
}
