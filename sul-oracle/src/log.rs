use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use sul_core::prelude::*;
use tracing::{info, warn};

/// The complete input/output trace of an answered query, rendered as
/// `[prefix | suffix / response to prefix | response to suffix]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTrace {
    pub prefix: String,
    pub suffix: String,
    pub response_prefix: String,
    pub response_suffix: String,
}

impl QueryTrace {
    pub fn new<I: Symbol, O: Symbol>(
        prefix: &Word<I>,
        suffix: &Word<I>,
        response_prefix: &Word<O>,
        response_suffix: &Word<O>,
    ) -> Self {
        Self {
            prefix: prefix.show(),
            suffix: suffix.show(),
            response_prefix: response_prefix.show(),
            response_suffix: response_suffix.show(),
        }
    }
}

impl std::fmt::Display for QueryTrace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{} | {} / {} | {}]",
            self.prefix, self.suffix, self.response_prefix, self.response_suffix
        )
    }
}

/// Records every answered query. Logging is best effort: implementations must not fail in a way
/// that aborts the query being logged, which is why [`QueryLog::log_query`] cannot return an
/// error.
pub trait QueryLog {
    fn log_query(&mut self, trace: &QueryTrace);
}

/// Discards all traces.
impl QueryLog for () {
    fn log_query(&mut self, _trace: &QueryTrace) {}
}

impl<L: QueryLog + ?Sized> QueryLog for Box<L> {
    fn log_query(&mut self, trace: &QueryTrace) {
        L::log_query(&mut **self, trace)
    }
}

/// Emits every trace as an `info` event with target `sul_oracle::query`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLog;

impl QueryLog for TracingLog {
    fn log_query(&mut self, trace: &QueryTrace) {
        info!(target: "sul_oracle::query", "{trace}");
    }
}

/// Appends one line per query to a file.
#[derive(Debug)]
pub struct FileLog {
    path: PathBuf,
    file: File,
}

impl FileLog {
    /// Opens `path` for appending, creating it if necessary.
    pub fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl QueryLog for FileLog {
    fn log_query(&mut self, trace: &QueryTrace) {
        if let Err(e) = writeln!(self.file, "{trace}").and_then(|_| self.file.flush()) {
            warn!(
                "could not write query to log {}: {e}",
                self.path.display()
            );
        }
    }
}

/// Keeps the rendered traces in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryLog(Vec<String>);

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl QueryLog for MemoryLog {
    fn log_query(&mut self, trace: &QueryTrace) {
        self.0.push(trace.to_string());
    }
}
