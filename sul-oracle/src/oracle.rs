use sul_core::prelude::*;
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    engine::NoiseTolerantEngine,
    log::{QueryLog, QueryTrace, TracingLog},
    protocol::ProtocolError,
    session::{PostGuard, Session, SessionError},
};

#[derive(Debug, Error)]
pub enum OracleError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("symbol `{0}` is not part of the input alphabet")]
    UnknownSymbol(String),
    #[error("no majority among the runs of [{query}]: {tally}")]
    Inconclusive { query: String, tally: String },
    #[error("noise tolerant evaluation did not complete a single run")]
    NoRuns,
    #[error("the oracle service has stopped")]
    ServiceStopped,
}

/// A pending membership query, consisting of a prefix and a suffix, together with a slot for the
/// answer. The answer only covers the suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query<I: Symbol = String, O: Symbol = String> {
    prefix: Word<I>,
    suffix: Word<I>,
    output: Option<Word<O>>,
}

impl<I: Symbol, O: Symbol> Query<I, O> {
    pub fn new(prefix: Word<I>, suffix: Word<I>) -> Self {
        Self {
            prefix,
            suffix,
            output: None,
        }
    }

    pub fn prefix(&self) -> &Word<I> {
        &self.prefix
    }

    pub fn suffix(&self) -> &Word<I> {
        &self.suffix
    }

    pub fn answer(&mut self, output: Word<O>) {
        self.output = Some(output);
    }

    pub fn output(&self) -> Option<&Word<O>> {
        self.output.as_ref()
    }

    pub fn is_answered(&self) -> bool {
        self.output.is_some()
    }

    pub fn into_output(self) -> Option<Word<O>> {
        self.output
    }
}

/// The interface a learning algorithm uses to pose membership queries.
pub trait MembershipOracle {
    type Input: Symbol;
    type Output: Symbol;

    /// Returns the outputs that the system under learning produces for `suffix` after having
    /// read `prefix`. The result has the same length as `suffix`.
    fn answer_query(
        &mut self,
        prefix: &Word<Self::Input>,
        suffix: &Word<Self::Input>,
    ) -> Result<Word<Self::Output>, OracleError>;

    /// Returns the outputs for a complete word, i.e. a query with empty prefix.
    fn answer_word(
        &mut self,
        word: &Word<Self::Input>,
    ) -> Result<Word<Self::Output>, OracleError> {
        self.answer_query(&Word::epsilon(), word)
    }

    /// Answers the given queries one after another and stores each answer in its query. Stops
    /// at the first failure, queries after it remain unanswered.
    fn process_queries(
        &mut self,
        queries: &mut [Query<Self::Input, Self::Output>],
    ) -> Result<(), OracleError> {
        for query in queries.iter_mut() {
            let output = self.answer_query(query.prefix(), query.suffix())?;
            query.answer(output);
        }
        Ok(())
    }
}

impl<M: MembershipOracle + ?Sized> MembershipOracle for &mut M {
    type Input = M::Input;
    type Output = M::Output;

    fn answer_query(
        &mut self,
        prefix: &Word<Self::Input>,
        suffix: &Word<Self::Input>,
    ) -> Result<Word<Self::Output>, OracleError> {
        M::answer_query(self, prefix, suffix)
    }
}

type CacheKey<I> = (Word<I>, Word<I>);

/// A [`MembershipOracle`] that answers queries by running them against a [`Session`].
///
/// In *combined* mode every query is sent as one sequence after a single reset, without retries
/// and without caching. Otherwise queries are executed symbol by symbol through a
/// [`NoiseTolerantEngine`] and the answers are cached, so that each distinct query is executed at
/// most once during the lifetime of the oracle.
pub struct SulOracle<S: Session, L = TracingLog> {
    session: S,
    log: L,
    alphabet: Option<SimpleAlphabet<S::Input>>,
    combine_query: bool,
    engine: NoiseTolerantEngine,
    // write-once, entries are never invalidated
    cache: math::Map<CacheKey<S::Input>, Word<S::Output>>,
    executions: usize,
}

impl<S: Session, L: QueryLog> SulOracle<S, L> {
    pub fn new(session: S, log: L) -> Self {
        Self {
            session,
            log,
            alphabet: None,
            combine_query: false,
            engine: NoiseTolerantEngine::default(),
            cache: math::Map::default(),
            executions: 0,
        }
    }

    /// Restricts queries to the given input alphabet.
    pub fn with_alphabet(mut self, alphabet: SimpleAlphabet<S::Input>) -> Self {
        self.alphabet = Some(alphabet);
        self
    }

    /// Selects combined (`true`) or stepwise (`false`, the default) execution. The session is
    /// informed through [`Session::set_combined`], so both always agree on the mode.
    pub fn combined(mut self, combine_query: bool) -> Self {
        self.combine_query = combine_query;
        self.session.set_combined(combine_query);
        self
    }

    pub fn with_engine(mut self, engine: NoiseTolerantEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn is_combined(&self) -> bool {
        self.combine_query
    }

    pub fn engine(&self) -> &NoiseTolerantEngine {
        &self.engine
    }

    pub fn alphabet(&self) -> Option<&SimpleAlphabet<S::Input>> {
        self.alphabet.as_ref()
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    /// Number of cached answers.
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Number of queries that were actually executed against the session, i.e. not answered
    /// from the cache.
    pub fn executions(&self) -> usize {
        self.executions
    }

    /// Closes the underlying session.
    pub fn close(&mut self) -> Result<(), SessionError> {
        self.session.close()
    }

    fn check_alphabet(
        &self,
        prefix: &Word<S::Input>,
        suffix: &Word<S::Input>,
    ) -> Result<(), OracleError> {
        let Some(alphabet) = &self.alphabet else {
            return Ok(());
        };
        match alphabet.first_foreign(prefix.iter().chain(suffix.iter())) {
            Some(sym) => Err(OracleError::UnknownSymbol(sym.show())),
            None => Ok(()),
        }
    }

    /// Runs `prefix ++ suffix` as a single sequence after one reset.
    pub fn answer_query_combined(
        &mut self,
        prefix: &Word<S::Input>,
        suffix: &Word<S::Input>,
    ) -> Result<Word<S::Output>, OracleError> {
        let query = prefix.concat(suffix);
        self.executions += 1;

        let response = {
            let mut session = PostGuard::new(&mut self.session);
            session.reset()?;
            session.send_sequence(&query)?
        };
        ProtocolError::check_length(query.len(), response.len())?;

        let (response_prefix, response_suffix) = response.split_at(prefix.len());
        self.log.log_query(&QueryTrace::new(
            prefix,
            suffix,
            &response_prefix,
            &response_suffix,
        ));
        Ok(response_suffix)
    }

    /// Runs `prefix ++ suffix` symbol by symbol through the noise tolerant engine, bypassing
    /// the cache.
    pub fn answer_query_steps(
        &mut self,
        prefix: &Word<S::Input>,
        suffix: &Word<S::Input>,
    ) -> Result<Word<S::Output>, OracleError> {
        self.executions += 1;
        let response = self.engine.run(&mut self.session, prefix, suffix)?;

        let (response_prefix, response_suffix) = response.split_at(prefix.len());
        self.log.log_query(&QueryTrace::new(
            prefix,
            suffix,
            &response_prefix,
            &response_suffix,
        ));
        Ok(response_suffix)
    }
}

impl<S: Session, L: QueryLog> MembershipOracle for SulOracle<S, L> {
    type Input = S::Input;
    type Output = S::Output;

    fn answer_query(
        &mut self,
        prefix: &Word<S::Input>,
        suffix: &Word<S::Input>,
    ) -> Result<Word<S::Output>, OracleError> {
        self.check_alphabet(prefix, suffix)?;

        if self.combine_query {
            return self.answer_query_combined(prefix, suffix);
        }

        let key = (prefix.clone(), suffix.clone());
        if let Some(cached) = self.cache.get(&key) {
            debug!(
                "found in cache: [{} | {}] -> {}",
                prefix.show(),
                suffix.show(),
                cached.show()
            );
            return Ok(cached.clone());
        }

        let response = self.answer_query_steps(prefix, suffix)?;
        trace!("caching answer {} for [{} | {}]", response.show(), prefix.show(), suffix.show());
        self.cache.insert(key, response.clone());
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        engine::TiePolicy,
        log::MemoryLog,
        session::{FnSession, SessionStats},
    };

    fn echo() -> FnSession<String, String, impl FnMut(&[String], &String) -> String> {
        FnSession::new(|_: &[String], sym: &String| sym.clone())
    }

    fn stats<F>(oracle: &SulOracle<FnSession<String, String, F>, MemoryLog>) -> SessionStats
    where
        F: FnMut(&[String], &String) -> String,
    {
        oracle.session().stats()
    }

    #[test_log::test]
    fn answers_have_suffix_length() {
        let mut oracle = SulOracle::new(echo(), MemoryLog::new());
        for (prefix, suffix) in [
            (word![], word![]),
            (word!["a"], word![]),
            (word![], word!["a", "b"]),
            (word!["a", "b", "c"], word!["d"]),
        ] {
            let answer = oracle.answer_query(&prefix, &suffix).unwrap();
            assert_eq!(answer.len(), suffix.len());
            assert_eq!(answer, suffix);
        }
    }

    #[test_log::test]
    fn cache_prevents_repeated_execution() {
        let mut oracle = SulOracle::new(echo(), MemoryLog::new());
        let first = oracle.answer_query(&word!["a"], &word!["b"]).unwrap();
        let after_first = stats(&oracle);
        assert_eq!(after_first.resets, NoiseTolerantEngine::DEFAULT_RERUNS);

        let second = oracle.answer_query(&word!["a"], &word!["b"]).unwrap();
        assert_eq!(first, second);
        assert_eq!(stats(&oracle), after_first);
        assert_eq!(oracle.executions(), 1);
        assert_eq!(oracle.cache_len(), 1);
        assert_eq!(oracle.log().len(), 1);
    }

    #[test_log::test]
    fn cache_keys_respect_the_split() {
        let mut oracle = SulOracle::new(echo(), MemoryLog::new());
        oracle.answer_query(&word!["a"], &word!["b"]).unwrap();
        let answer = oracle.answer_query(&word![], &word!["a", "b"]).unwrap();
        assert_eq!(answer, word!["a", "b"]);
        assert_eq!(oracle.cache_len(), 2);
        assert_eq!(oracle.executions(), 2);
    }

    #[test_log::test]
    fn resets_once_per_rerun() {
        let engine = NoiseTolerantEngine::new(5);
        let mut oracle = SulOracle::new(echo(), MemoryLog::new()).with_engine(engine);
        oracle.answer_query(&word!["a"], &word!["b"]).unwrap();
        oracle.answer_query(&word!["b"], &word!["a"]).unwrap();
        assert_eq!(stats(&oracle).resets, 10);
        assert_eq!(stats(&oracle).posts, 2);
        oracle.answer_query(&word!["a"], &word!["b"]).unwrap();
        assert_eq!(stats(&oracle).resets, 10);
    }

    #[test_log::test]
    fn noisy_sessions_are_outvoted() {
        let mut run = 0;
        let noisy = FnSession::new(move |history: &[String], sym: &String| {
            if history.is_empty() {
                run += 1;
            }
            if run == 2 {
                format!("{sym}!")
            } else {
                sym.clone()
            }
        });
        let mut oracle = SulOracle::new(noisy, MemoryLog::new());
        let answer = oracle.answer_query(&word!["a"], &word!["b", "c"]).unwrap();
        assert_eq!(answer, word!["b", "c"]);
        assert_eq!(oracle.log().entries(), ["[a | b c / a | b c]".to_string()]);
    }

    #[test_log::test]
    fn ties_can_be_reported() {
        let mut run = 0;
        let alternating = FnSession::new(move |history: &[String], _: &String| {
            if history.is_empty() {
                run += 1;
            }
            format!("R{}", run % 2)
        });
        let engine = NoiseTolerantEngine::new(2).with_tie_policy(TiePolicy::Inconclusive);
        let mut oracle = SulOracle::new(alternating, MemoryLog::new()).with_engine(engine);
        assert!(matches!(
            oracle.answer_query(&word!["a"], &word!["b"]),
            Err(OracleError::Inconclusive { .. })
        ));
        assert_eq!(oracle.cache_len(), 0);
        assert!(oracle.log().is_empty());
    }

    #[test_log::test]
    fn combined_mode_splits_response() {
        let mut oracle = SulOracle::new(echo(), MemoryLog::new()).combined(true);
        let answer = oracle
            .answer_query(&word!["a", "b"], &word!["c"])
            .unwrap();
        assert_eq!(answer, word!["c"]);
        assert_eq!(oracle.log().entries(), ["[a b | c / a b | c]".to_string()]);

        oracle.answer_query(&word!["a", "b"], &word!["c"]).unwrap();
        let stats = stats(&oracle);
        assert_eq!(stats.sequences, 2);
        assert_eq!(stats.resets, 2);
        assert_eq!(stats.posts, 2);
        assert_eq!(stats.symbols, 0);
        assert_eq!(oracle.cache_len(), 0);
    }

    /// Drops the last output symbol of every sequence.
    struct Truncating {
        posts: usize,
    }

    impl Session for Truncating {
        type Input = String;
        type Output = String;

        fn reset(&mut self) -> Result<(), SessionError> {
            Ok(())
        }
        fn send_symbol(&mut self, symbol: &String) -> Result<String, SessionError> {
            Ok(symbol.clone())
        }
        fn send_sequence(&mut self, word: &Word<String>) -> Result<Word<String>, SessionError> {
            Ok(word.prefix(word.len().saturating_sub(1)))
        }
        fn post(&mut self) -> Result<(), SessionError> {
            self.posts += 1;
            Ok(())
        }
        fn close(&mut self) -> Result<(), SessionError> {
            Ok(())
        }
    }

    #[test_log::test]
    fn combined_mode_validates_length() {
        let mut oracle = SulOracle::new(Truncating { posts: 0 }, MemoryLog::new()).combined(true);
        let result = oracle.answer_query(&word!["a"], &word!["b"]);
        assert!(matches!(
            result,
            Err(OracleError::Protocol(ProtocolError::LengthMismatch {
                expected: 2,
                received: 1
            }))
        ));
        assert_eq!(oracle.session().posts, 1);
        assert!(oracle.log().is_empty());
    }

    #[test_log::test]
    fn foreign_symbols_are_rejected() {
        let alphabet = SimpleAlphabet::parse("PING PONG", " ").unwrap();
        let mut oracle = SulOracle::new(echo(), MemoryLog::new()).with_alphabet(alphabet);
        assert!(matches!(
            oracle.answer_query(&word!["PING"], &word!["PANG"]),
            Err(OracleError::UnknownSymbol(sym)) if sym == "PANG"
        ));
        assert_eq!(stats(&oracle).interactions(), 0);
    }

    #[test_log::test]
    fn batches_are_answered_in_place() {
        let mut oracle = SulOracle::new(echo(), MemoryLog::new());
        let mut queries = vec![
            Query::new(word!["a"], word!["b"]),
            Query::new(word![], word!["c", "d"]),
            Query::new(word!["a"], word!["b"]),
        ];
        oracle.process_queries(&mut queries).unwrap();
        assert!(queries.iter().all(Query::is_answered));
        assert_eq!(queries[1].output(), Some(&word!["c", "d"]));
        assert_eq!(queries[0].output(), queries[2].output());
        assert_eq!(oracle.executions(), 2);

        assert_eq!(oracle.answer_word(&word!["c", "d"]).unwrap(), word!["c", "d"]);
        assert_eq!(oracle.executions(), 2);
    }

    #[test_log::test]
    fn ping_pong() {
        let ok = FnSession::new(|_: &[String], _: &String| "OK".to_string());
        let alphabet = SimpleAlphabet::parse("PING PONG", " ").unwrap();
        let mut oracle = SulOracle::new(ok, MemoryLog::new()).with_alphabet(alphabet);

        assert_eq!(
            oracle.answer_query(&word!["PING"], &word!["PONG"]).unwrap(),
            word!["OK"]
        );
        let interactions = oracle.session().stats().interactions();
        assert_eq!(
            oracle.answer_query(&word!["PING"], &word!["PONG"]).unwrap(),
            word!["OK"]
        );
        assert_eq!(oracle.session().stats().interactions(), interactions);
    }
}
