use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use sul_core::prelude::*;
use thiserror::Error;

use crate::protocol::ProtocolError;

pub mod memory;
pub mod process;

pub use memory::{FnSession, SessionStats};
pub use process::{ProcessConfig, ProcessSession};

/// Failures of the session with the system under learning. Apart from
/// [`SessionError::Protocol`], all of them mean the process can no longer be trusted.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not start system under learning: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("I/O failure while talking to the system under learning: {0}")]
    Io(#[from] std::io::Error),
    #[error("system under learning closed its output stream")]
    Exited,
    #[error("no response from system under learning within {0:?}")]
    Timeout(Duration),
    #[error("waiting for the system under learning was cancelled")]
    Cancelled,
    #[error("session is unusable after an earlier timeout or cancellation")]
    Poisoned,
    #[error("session has been closed")]
    Closed,
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// A live session with a stateful system under learning (SUL).
///
/// A session is not shareable, all calls block until the SUL has answered. Callers that do not
/// combine prefix and suffix into a single sequence must call [`Session::reset`] before every
/// independent run.
pub trait Session {
    type Input: Symbol;
    type Output: Symbol;

    /// Brings the SUL back into its initial state.
    fn reset(&mut self) -> Result<(), SessionError>;

    /// Sends a single input symbol and returns the single output symbol that the SUL answers with.
    fn send_symbol(&mut self, symbol: &Self::Input) -> Result<Self::Output, SessionError>;

    /// Sends a complete word as one message and returns the decoded response. The response may
    /// have a different length than `word`, validating it is the caller's job.
    fn send_sequence(
        &mut self,
        word: &Word<Self::Input>,
    ) -> Result<Word<Self::Output>, SessionError>;

    /// Tells the session whether every query is sent as a single sequence that is answered from
    /// the initial state. Sessions that do not care keep the default, which ignores it.
    fn set_combined(&mut self, _combine_query: bool) {}

    /// Cleanup hook that is called exactly once at the end of every query evaluation.
    fn post(&mut self) -> Result<(), SessionError> {
        Ok(())
    }

    /// Releases the underlying resources. Calling this more than once has no further effect.
    fn close(&mut self) -> Result<(), SessionError>;

    fn can_fork(&self) -> bool {
        false
    }

    /// Creates an independent copy of this session.
    fn fork(&self) -> Result<Self, SessionError>
    where
        Self: Sized,
    {
        Err(SessionError::Unsupported(
            "this session is stateful and cannot be forked",
        ))
    }
}

impl<S: Session + ?Sized> Session for &mut S {
    type Input = S::Input;
    type Output = S::Output;

    fn reset(&mut self) -> Result<(), SessionError> {
        S::reset(self)
    }
    fn send_symbol(&mut self, symbol: &Self::Input) -> Result<Self::Output, SessionError> {
        S::send_symbol(self, symbol)
    }
    fn send_sequence(
        &mut self,
        word: &Word<Self::Input>,
    ) -> Result<Word<Self::Output>, SessionError> {
        S::send_sequence(self, word)
    }
    fn set_combined(&mut self, combine_query: bool) {
        S::set_combined(self, combine_query)
    }
    fn post(&mut self) -> Result<(), SessionError> {
        S::post(self)
    }
    fn close(&mut self) -> Result<(), SessionError> {
        S::close(self)
    }
    fn can_fork(&self) -> bool {
        S::can_fork(self)
    }
}

/// Gives mutable access to a session for the duration of one query evaluation and calls
/// [`Session::post`] exactly once when it goes out of scope, no matter how the evaluation ends.
pub(crate) struct PostGuard<'a, S: Session>(&'a mut S);

impl<'a, S: Session> PostGuard<'a, S> {
    pub(crate) fn new(session: &'a mut S) -> Self {
        Self(session)
    }
}

impl<S: Session> std::ops::Deref for PostGuard<'_, S> {
    type Target = S;
    fn deref(&self) -> &S {
        self.0
    }
}

impl<S: Session> std::ops::DerefMut for PostGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.0
    }
}

impl<S: Session> Drop for PostGuard<'_, S> {
    fn drop(&mut self) {
        if let Err(e) = self.0.post() {
            tracing::warn!("cleanup after query evaluation failed: {e}");
        }
    }
}

/// A cloneable flag that aborts blocking reads of a [`ProcessSession`] from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
