use std::marker::PhantomData;

use sul_core::prelude::*;
use tracing::trace;

use super::{Session, SessionError};

/// Counts how often the individual operations of a [`FnSession`] were invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub resets: usize,
    pub symbols: usize,
    pub sequences: usize,
    pub posts: usize,
}

impl SessionStats {
    /// Number of interactions with the system under learning, i.e. symbol and sequence sends.
    pub fn interactions(&self) -> usize {
        self.symbols + self.sequences
    }
}

/// A session that simulates a system under learning in memory. The wrapped function receives
/// all inputs since the last reset together with the current input and produces the output for
/// the current input, which makes it easy to plug in a Mealy machine or a noisy fake.
///
/// # Example
/// ```
/// use sul_core::prelude::*;
/// use sul_oracle::{FnSession, Session};
///
/// let mut session = FnSession::new(|history: &[String], _: &String| history.len().to_string());
/// session.reset().unwrap();
/// assert_eq!(session.send_sequence(&word!["a", "b"]).unwrap(), word!["0", "1"]);
/// ```
pub struct FnSession<I, O, F> {
    step: F,
    history: Vec<I>,
    stats: SessionStats,
    closed: bool,
    _output: PhantomData<O>,
}

impl<I, O, F> FnSession<I, O, F>
where
    I: Symbol,
    O: Symbol,
    F: FnMut(&[I], &I) -> O,
{
    pub fn new(step: F) -> Self {
        Self {
            step,
            history: Vec::new(),
            stats: SessionStats::default(),
            closed: false,
            _output: PhantomData,
        }
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    fn advance(&mut self, symbol: &I) -> O {
        let output = (self.step)(&self.history, symbol);
        trace!("{} -> {}", symbol.show(), output.show());
        self.history.push(symbol.clone());
        output
    }
}

impl<I, O, F> Session for FnSession<I, O, F>
where
    I: Symbol,
    O: Symbol,
    F: FnMut(&[I], &I) -> O,
{
    type Input = I;
    type Output = O;

    fn reset(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.stats.resets += 1;
        self.history.clear();
        Ok(())
    }

    fn send_symbol(&mut self, symbol: &I) -> Result<O, SessionError> {
        self.ensure_open()?;
        self.stats.symbols += 1;
        Ok(self.advance(symbol))
    }

    fn send_sequence(&mut self, word: &Word<I>) -> Result<Word<O>, SessionError> {
        self.ensure_open()?;
        self.stats.sequences += 1;
        Ok(word.iter().map(|sym| self.advance(sym)).collect())
    }

    fn post(&mut self) -> Result<(), SessionError> {
        self.stats.posts += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SessionError> {
        self.closed = true;
        Ok(())
    }
}
