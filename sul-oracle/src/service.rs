use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use sul_core::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    log::QueryLog,
    oracle::{MembershipOracle, OracleError, Query, SulOracle},
    session::{Session, SessionError},
};

enum Request<I: Symbol, O: Symbol> {
    Answer {
        prefix: Word<I>,
        suffix: Word<I>,
        reply: Sender<Result<Word<O>, OracleError>>,
    },
    /// The queries travel back also if answering them failed, as the ones answered before the
    /// failure keep their answers.
    Batch {
        queries: Vec<Query<I, O>>,
        reply: Sender<(Vec<Query<I, O>>, Result<(), OracleError>)>,
    },
    Shutdown,
}

/// Owns a [`SulOracle`] on a dedicated worker thread. The worker is the only code that touches
/// the session, it takes requests from a channel and executes them one at a time in the order
/// they arrive. Thus a query always runs from its reset to its last read without interleaving
/// with another query, and the check-then-insert on the cache cannot race.
///
/// Use [`OracleService::handle`] to obtain cheap, cloneable handles that can be passed to other
/// threads.
pub struct OracleService<S: Session, L> {
    handle: OracleHandle<S::Input, S::Output>,
    worker: JoinHandle<SulOracle<S, L>>,
}

impl<S, L> OracleService<S, L>
where
    S: Session + Send + 'static,
    S::Input: Send + 'static,
    S::Output: Send + 'static,
    L: QueryLog + Send + 'static,
{
    /// Moves `oracle` onto a new worker thread.
    pub fn spawn(oracle: SulOracle<S, L>) -> Result<Self, SessionError> {
        let (requests, inbox) = crossbeam_channel::unbounded();
        let worker = std::thread::Builder::new()
            .name("sul-oracle".to_string())
            .spawn(move || serve(oracle, inbox))
            .map_err(SessionError::Spawn)?;
        info!("oracle service started");
        Ok(Self {
            handle: OracleHandle { requests },
            worker,
        })
    }

    pub fn handle(&self) -> OracleHandle<S::Input, S::Output> {
        self.handle.clone()
    }

    /// Stops the worker once all previously submitted requests are done, closes the session and
    /// gives back the oracle with its cache. Handles that are still around fail with
    /// [`OracleError::ServiceStopped`] from now on.
    pub fn shutdown(self) -> Result<SulOracle<S, L>, OracleError> {
        // if the worker is already gone, joining reports why
        let _ = self.handle.requests.send(Request::Shutdown);
        self.worker.join().map_err(|_| {
            warn!("oracle worker panicked");
            OracleError::ServiceStopped
        })
    }
}

fn serve<S, L>(
    mut oracle: SulOracle<S, L>,
    inbox: Receiver<Request<S::Input, S::Output>>,
) -> SulOracle<S, L>
where
    S: Session,
    L: QueryLog,
{
    for request in inbox.iter() {
        match request {
            Request::Answer {
                prefix,
                suffix,
                reply,
            } => {
                let result = oracle.answer_query(&prefix, &suffix);
                if reply.send(result).is_err() {
                    debug!("requester went away before receiving its answer");
                }
            }
            Request::Batch { mut queries, reply } => {
                let result = oracle.process_queries(&mut queries);
                if reply.send((queries, result)).is_err() {
                    debug!("requester went away before receiving its answers");
                }
            }
            Request::Shutdown => break,
        }
    }

    if let Err(e) = oracle.close() {
        warn!("could not close session: {e}");
    }
    info!(
        "oracle service stopped after {} executions, {} cached answers",
        oracle.executions(),
        oracle.cache_len()
    );
    oracle
}

/// A cloneable, thread-safe entry point to an [`OracleService`]. Every call blocks until the
/// worker has answered.
pub struct OracleHandle<I: Symbol, O: Symbol> {
    requests: Sender<Request<I, O>>,
}

impl<I: Symbol, O: Symbol> Clone for OracleHandle<I, O> {
    fn clone(&self) -> Self {
        Self {
            requests: self.requests.clone(),
        }
    }
}

impl<I: Symbol, O: Symbol> OracleHandle<I, O> {
    fn call<T>(&self, make: impl FnOnce(Sender<T>) -> Request<I, O>) -> Result<T, OracleError> {
        let (reply, answer) = crossbeam_channel::bounded(1);
        self.requests
            .send(make(reply))
            .map_err(|_| OracleError::ServiceStopped)?;
        answer.recv().map_err(|_| OracleError::ServiceStopped)
    }
}

impl<I: Symbol, O: Symbol> MembershipOracle for OracleHandle<I, O> {
    type Input = I;
    type Output = O;

    fn answer_query(&mut self, prefix: &Word<I>, suffix: &Word<I>) -> Result<Word<O>, OracleError> {
        self.call(|reply| Request::Answer {
            prefix: prefix.clone(),
            suffix: suffix.clone(),
            reply,
        })?
    }

    /// Sends the whole batch as one request, so it is answered without queries from other
    /// handles in between.
    fn process_queries(&mut self, queries: &mut [Query<I, O>]) -> Result<(), OracleError> {
        let (answered, result) = self.call(|reply| Request::Batch {
            queries: queries.to_vec(),
            reply,
        })?;
        for (query, answer) in queries.iter_mut().zip(answered) {
            *query = answer;
        }
        result
    }
}
