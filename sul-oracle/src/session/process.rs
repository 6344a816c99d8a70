use std::{
    io::{BufRead, BufReader, Write},
    path::PathBuf,
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use serde::Deserialize;
use sul_core::prelude::*;
use tracing::{debug, info, trace, warn};

use super::{CancelToken, Session, SessionError};
use crate::protocol::{LineCodec, ProtocolError, RESET};

/// How long a blocked call waits on a channel before it checks for cancellation again.
const POLL_INTERVAL: Duration = Duration::from_millis(25);
/// How long a closed process may take to exit on its own before it is killed.
const EXIT_GRACE_PERIOD: Duration = Duration::from_millis(500);

fn default_delimiter() -> String {
    " ".to_string()
}

/// Describes how to launch the system under learning and how to talk to it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProcessConfig {
    /// The program to run.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Separates the symbols of a sequence that is sent as one line.
    #[serde(default = "default_delimiter")]
    pub delimiter_input: String,
    /// Separates the output symbols in a response line.
    #[serde(default = "default_delimiter")]
    pub delimiter_output: String,
    /// Upper bound for waiting on a single response line, waits forever if absent.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl ProcessConfig {
    pub fn new<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            delimiter_input: default_delimiter(),
            delimiter_output: default_delimiter(),
            timeout_ms: None,
            working_dir: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_delimiters(mut self, input: impl Into<String>, output: impl Into<String>) -> Self {
        self.delimiter_input = input.into();
        self.delimiter_output = output.into();
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn codec(&self) -> Result<LineCodec, ProtocolError> {
        LineCodec::new(&self.delimiter_input, &self.delimiter_output)
    }
}

/// A [`Session`] backed by a long-lived child process that speaks the line protocol on its
/// standard input and output. Standard error is inherited.
///
/// Requests are written and responses are read by two dedicated threads that hand over through
/// channels, so that every call, including writes into a full pipe, can be bounded by the
/// configured timeout and aborted through a [`CancelToken`]. After a timeout, a cancellation or
/// an I/O failure the process may still be in the middle of an abandoned exchange, hence the
/// session is poisoned and refuses all further work.
pub struct ProcessSession {
    child: Option<Child>,
    outbox: Option<Sender<String>>,
    written: Receiver<std::io::Result<()>>,
    lines: Receiver<std::io::Result<String>>,
    codec: LineCodec,
    combine_query: bool,
    timeout: Option<Duration>,
    cancel: CancelToken,
    poisoned: bool,
}

/// The point in time at which the current call gives up, together with the configured timeout.
type Deadline = Option<(Instant, Duration)>;

impl ProcessSession {
    /// Launches the process described by `config`. The session starts out in stepwise mode,
    /// see [`Session::set_combined`].
    pub fn start(config: &ProcessConfig) -> Result<Self, SessionError> {
        let codec = config.codec()?;

        let mut command = Command::new(&config.command);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(dir) = &config.working_dir {
            command.current_dir(dir);
        }

        let mut child = command.spawn().map_err(SessionError::Spawn)?;
        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                return Err(SessionError::Spawn(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "standard streams of the child are not available",
                )));
            }
        };

        let (outbox, written, lines) = match spawn_pipes(child.id(), stdin, stdout) {
            Ok(pipes) => pipes,
            Err(e) => {
                let _ = child.kill();
                return Err(SessionError::Spawn(e));
            }
        };

        info!(
            "started system under learning `{}` with pid {}",
            config.command,
            child.id()
        );

        Ok(Self {
            child: Some(child),
            outbox: Some(outbox),
            written,
            lines,
            codec,
            combine_query: false,
            timeout: config.timeout(),
            cancel: CancelToken::new(),
            poisoned: false,
        })
    }

    /// Returns a handle that can abort a blocked call from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_combined(&self) -> bool {
        self.combine_query
    }

    /// The OS process id, or `None` once the session was closed.
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    fn ensure_usable(&self) -> Result<(), SessionError> {
        if self.child.is_none() {
            Err(SessionError::Closed)
        } else if self.poisoned {
            Err(SessionError::Poisoned)
        } else {
            Ok(())
        }
    }

    fn deadline(&self) -> Deadline {
        // a timeout too large to represent never expires
        let timeout = self.timeout?;
        Some((Instant::now().checked_add(timeout)?, timeout))
    }

    /// Waits for the next message on `channel` until the deadline passes or the call is
    /// cancelled. A disconnected channel means the process went away.
    fn wait_for<T>(&self, channel: &Receiver<T>, deadline: Deadline) -> Result<T, SessionError> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(SessionError::Cancelled);
            }
            let wait = match deadline {
                Some((deadline, timeout)) => {
                    let now = Instant::now();
                    if now >= deadline {
                        warn!("system under learning did not respond within {timeout:?}");
                        return Err(SessionError::Timeout(timeout));
                    }
                    (deadline - now).min(POLL_INTERVAL)
                }
                None => POLL_INTERVAL,
            };
            match channel.recv_timeout(wait) {
                Ok(message) => return Ok(message),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(SessionError::Exited),
            }
        }
    }

    fn write_line(&self, line: &str, deadline: Deadline) -> Result<(), SessionError> {
        let outbox = self.outbox.as_ref().ok_or(SessionError::Closed)?;
        trace!("-> {line}");
        outbox
            .send(format!("{line}\n"))
            .map_err(|_| SessionError::Exited)?;
        self.wait_for(&self.written, deadline)??;
        Ok(())
    }

    fn read_line(&self, deadline: Deadline) -> Result<String, SessionError> {
        let line = self.wait_for(&self.lines, deadline)??;
        trace!("<- {line}");
        Ok(line)
    }

    /// Writes `line` and reads the single response line, both within one deadline.
    fn exchange(&mut self, line: &str) -> Result<String, SessionError> {
        let deadline = self.deadline();
        let response = self
            .write_line(line, deadline)
            .and_then(|()| self.read_line(deadline));
        self.poison_on_failure(response)
    }

    fn poison_on_failure<T>(&mut self, result: Result<T, SessionError>) -> Result<T, SessionError> {
        if let Err(
            SessionError::Timeout(_) | SessionError::Cancelled | SessionError::Io(_),
        ) = &result
        {
            self.poisoned = true;
        }
        result
    }
}

/// Requests to the writer thread, its acknowledgements and the lines from the reader thread.
type Pipes = (
    Sender<String>,
    Receiver<std::io::Result<()>>,
    Receiver<std::io::Result<String>>,
);

/// Starts the writer and reader threads of a child with the given pid.
fn spawn_pipes(pid: u32, mut stdin: ChildStdin, stdout: ChildStdout) -> std::io::Result<Pipes> {
    let (outbox, requests) = crossbeam_channel::unbounded::<String>();
    let (acks, written) = crossbeam_channel::unbounded();
    std::thread::Builder::new()
        .name(format!("sul-writer-{pid}"))
        .spawn(move || {
            // ends when the session drops its sender, which closes stdin
            for request in requests.iter() {
                let result = stdin
                    .write_all(request.as_bytes())
                    .and_then(|()| stdin.flush());
                let failed = result.is_err();
                if acks.send(result).is_err() || failed {
                    break;
                }
            }
        })?;

    let (tx, lines) = crossbeam_channel::unbounded();
    std::thread::Builder::new()
        .name(format!("sul-reader-{pid}"))
        .spawn(move || {
            for line in BufReader::new(stdout).lines() {
                let failed = line.is_err();
                if tx.send(line).is_err() || failed {
                    break;
                }
            }
        })?;

    Ok((outbox, written, lines))
}

impl Session for ProcessSession {
    type Input = String;
    type Output = String;

    fn reset(&mut self) -> Result<(), SessionError> {
        self.ensure_usable()?;
        if self.combine_query {
            trace!("combined queries start from the initial state, not sending {RESET}");
            return Ok(());
        }
        let written = self.write_line(RESET, self.deadline());
        self.poison_on_failure(written)
    }

    fn send_symbol(&mut self, symbol: &String) -> Result<String, SessionError> {
        self.ensure_usable()?;
        let line = self.codec.encode_symbol(symbol)?;
        let response = self.exchange(&line)?;
        Ok(self.codec.decode_symbol(&response)?)
    }

    fn send_sequence(&mut self, word: &Word<String>) -> Result<Word<String>, SessionError> {
        self.ensure_usable()?;
        let line = self.codec.encode_word(word)?;
        let response = self.exchange(&line)?;
        Ok(self.codec.decode_word(&response))
    }

    fn set_combined(&mut self, combine_query: bool) {
        self.combine_query = combine_query;
    }

    fn close(&mut self) -> Result<(), SessionError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        // the writer thread drops stdin once its queue is gone, which tells a well-behaved
        // driver to shut down on its own
        drop(self.outbox.take());

        let start = Instant::now();
        while start.elapsed() < EXIT_GRACE_PERIOD {
            match child.try_wait() {
                Ok(Some(status)) => {
                    debug!("system under learning exited with {status}");
                    return Ok(());
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => {
                    warn!("could not query status of system under learning, killing it: {e}");
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(SessionError::Io(e));
                }
            }
        }

        warn!(
            "system under learning (pid {}) did not exit after closing its input, killing it",
            child.id()
        );
        child.kill()?;
        child.wait()?;
        Ok(())
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("could not close system under learning: {e}");
        }
    }
}
