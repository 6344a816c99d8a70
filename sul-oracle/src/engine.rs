use serde::Deserialize;
use sul_core::prelude::*;
use tracing::{debug, trace, warn};

use crate::{
    oracle::OracleError,
    session::{PostGuard, Session},
};

/// Decides what happens when the majority vote over several runs does not have a unique winner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TiePolicy {
    /// Take the tied response that was observed first.
    #[default]
    FirstSeen,
    /// Refuse to answer with [`OracleError::Inconclusive`].
    Inconclusive,
}

/// Counts how often each complete response was observed. Iteration follows the order in which
/// responses were first seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally<O: Symbol>(math::Map<Word<O>, usize>);

impl<O: Symbol> Default for Tally<O> {
    fn default() -> Self {
        Self(math::Map::default())
    }
}

impl<O: Symbol> Tally<O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one vote for `response` and returns its new count.
    pub fn record(&mut self, response: Word<O>) -> usize {
        let count = self.0.entry(response).or_insert(0);
        *count += 1;
        *count
    }

    pub fn count(&self, response: &Word<O>) -> usize {
        self.0.get(response).copied().unwrap_or(0)
    }

    /// Total number of recorded votes.
    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    /// Number of distinct responses.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Word<O>, usize)> + '_ {
        self.0.iter().map(|(w, c)| (w, *c))
    }

    /// Returns the response with the strictly highest count. Among responses with equal counts,
    /// the one that was recorded first wins.
    pub fn leader(&self) -> Option<(&Word<O>, usize)> {
        let mut best: Option<(&Word<O>, usize)> = None;
        for (response, count) in self.iter() {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((response, count));
            }
        }
        best
    }

    /// Whether at least two distinct responses share the highest count.
    pub fn is_tied(&self) -> bool {
        let Some((_, top)) = self.leader() else {
            return false;
        };
        self.iter().filter(|(_, c)| *c == top).count() > 1
    }

    /// Turns the tally into a [`Verdict`], `None` if nothing was recorded.
    pub fn verdict(self) -> Option<Verdict<O>> {
        let (response, votes) = self.leader().map(|(w, c)| (w.clone(), c))?;
        if self.is_tied() {
            Some(Verdict::Ambiguous {
                response,
                tally: self,
            })
        } else {
            let runs = self.total();
            Some(Verdict::Confident {
                response,
                votes,
                runs,
            })
        }
    }
}

impl<O: Symbol> Show for Tally<O> {
    fn show(&self) -> String {
        let entries: Vec<String> = self
            .iter()
            .map(|(w, c)| format!("{} x{c}", w.show()))
            .collect();
        format!("{{{}}}", entries.join(", "))
    }
}

/// Outcome of a noise-tolerant evaluation. A response is only `Confident` if its count is
/// strictly higher than that of every other response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<O: Symbol> {
    Confident {
        response: Word<O>,
        votes: usize,
        runs: usize,
    },
    /// The top two counts are equal, `response` is the first-seen of the tied responses.
    Ambiguous { response: Word<O>, tally: Tally<O> },
}

impl<O: Symbol> Verdict<O> {
    /// The complete response (covering prefix and suffix) that won the vote.
    pub fn response(&self) -> &Word<O> {
        match self {
            Verdict::Confident { response, .. } | Verdict::Ambiguous { response, .. } => response,
        }
    }

    pub fn into_response(self) -> Word<O> {
        match self {
            Verdict::Confident { response, .. } | Verdict::Ambiguous { response, .. } => response,
        }
    }

    pub fn is_confident(&self) -> bool {
        matches!(self, Verdict::Confident { .. })
    }
}

/// Executes queries symbol by symbol several times, resetting the session before each run, and
/// aggregates the complete responses by majority vote. This masks occasional non-determinism of
/// the system under learning at the price of `max_reruns` executions per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoiseTolerantEngine {
    max_reruns: usize,
    tie_policy: TiePolicy,
}

impl Default for NoiseTolerantEngine {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RERUNS)
    }
}

impl NoiseTolerantEngine {
    pub const DEFAULT_RERUNS: usize = 3;

    /// Creates an engine that runs every query `max_reruns` times.
    ///
    /// # Panics
    /// If `max_reruns` is zero, as no answer could ever be produced.
    pub fn new(max_reruns: usize) -> Self {
        assert!(max_reruns > 0, "at least one run per query is required");
        Self {
            max_reruns,
            tie_policy: TiePolicy::default(),
        }
    }

    pub fn with_tie_policy(mut self, tie_policy: TiePolicy) -> Self {
        self.tie_policy = tie_policy;
        self
    }

    pub fn max_reruns(&self) -> usize {
        self.max_reruns
    }

    pub fn tie_policy(&self) -> TiePolicy {
        self.tie_policy
    }

    /// Runs `prefix ++ suffix` against the session `max_reruns` times and returns the tagged
    /// result of the vote. [`Session::post`] is called exactly once before returning, also when a
    /// run fails. Any failure aborts the whole evaluation.
    pub fn evaluate<S: Session>(
        &self,
        session: &mut S,
        prefix: &Word<S::Input>,
        suffix: &Word<S::Input>,
    ) -> Result<Verdict<S::Output>, OracleError> {
        let mut session = PostGuard::new(session);
        let expected = prefix.len() + suffix.len();
        let mut tally = Tally::new();

        for rerun in 0..self.max_reruns {
            session.reset()?;

            let mut response = Word::with_capacity(expected);
            for sym in prefix.iter().chain(suffix.iter()) {
                response.push(session.send_symbol(sym)?);
            }

            trace!(
                "run {}/{} of [{} | {}] gave {}",
                rerun + 1,
                self.max_reruns,
                prefix.show(),
                suffix.show(),
                response.show()
            );
            tally.record(response);
        }

        debug!(
            "tally for [{} | {}]: {}",
            prefix.show(),
            suffix.show(),
            tally.show()
        );
        tally.verdict().ok_or(OracleError::NoRuns)
    }

    /// Like [`NoiseTolerantEngine::evaluate`] but applies the [`TiePolicy`] and returns only the
    /// winning complete response.
    pub fn run<S: Session>(
        &self,
        session: &mut S,
        prefix: &Word<S::Input>,
        suffix: &Word<S::Input>,
    ) -> Result<Word<S::Output>, OracleError> {
        match self.evaluate(session, prefix, suffix)? {
            Verdict::Ambiguous { response, tally } => match self.tie_policy {
                TiePolicy::FirstSeen => {
                    warn!(
                        "no majority for [{} | {}], using first seen response {}",
                        prefix.show(),
                        suffix.show(),
                        response.show()
                    );
                    Ok(response)
                }
                TiePolicy::Inconclusive => Err(OracleError::Inconclusive {
                    query: format!("{} | {}", prefix.show(), suffix.show()),
                    tally: tally.show(),
                }),
            },
            verdict => Ok(verdict.into_response()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{FnSession, SessionError};

    /// A session whose `n`-th run (counted by resets) answers every input with `runs[n]`.
    fn scripted(
        runs: &'static [&'static str],
    ) -> FnSession<String, String, impl FnMut(&[String], &String) -> String> {
        let mut run = 0;
        FnSession::new(move |history: &[String], _: &String| {
            if history.is_empty() {
                run += 1;
            }
            runs[(run - 1) % runs.len()].to_string()
        })
    }

    #[test_log::test]
    fn majority_wins() {
        let mut session = scripted(&["R1", "R2", "R1"]);
        let engine = NoiseTolerantEngine::new(3);
        let verdict = engine
            .evaluate(&mut session, &word!["a"], &word!["b", "c"])
            .unwrap();
        assert_eq!(
            verdict,
            Verdict::Confident {
                response: word!["R1", "R1", "R1"],
                votes: 2,
                runs: 3
            }
        );
        assert_eq!(session.stats().resets, 3);
        assert_eq!(session.stats().symbols, 9);
        assert_eq!(session.stats().posts, 1);
    }

    #[test_log::test]
    fn ties_prefer_the_first_run() {
        let mut session = scripted(&["R1", "R2"]);
        let engine = NoiseTolerantEngine::new(2);
        let verdict = engine
            .evaluate(&mut session, &word![], &word!["x"])
            .unwrap();
        assert!(!verdict.is_confident());
        assert_eq!(verdict.response(), &word!["R1"]);

        let mut session = scripted(&["R2", "R1"]);
        let response = engine.run(&mut session, &word![], &word!["x"]).unwrap();
        assert_eq!(response, word!["R2"]);
    }

    #[test_log::test]
    fn inconclusive_policy() {
        let mut session = scripted(&["R1", "R2"]);
        let engine = NoiseTolerantEngine::new(2).with_tie_policy(TiePolicy::Inconclusive);
        assert!(matches!(
            engine.run(&mut session, &word!["a"], &word!["b"]),
            Err(OracleError::Inconclusive { .. })
        ));
    }

    #[test_log::test]
    fn failures_abort_but_still_clean_up() {
        let mut session = FnSession::new(|_: &[String], _: &String| "OK".to_string());
        session.close().unwrap();
        let result =
            NoiseTolerantEngine::default().evaluate(&mut session, &word!["a"], &word!["b"]);
        assert!(matches!(
            result,
            Err(OracleError::Session(SessionError::Closed))
        ));
        assert_eq!(session.stats().posts, 1);
    }

    #[test]
    fn tally_order() {
        let mut tally = Tally::new();
        tally.record(word!["b"]);
        tally.record(word!["a"]);
        tally.record(word!["a"]);
        tally.record(word!["b"]);
        assert!(tally.is_tied());
        assert_eq!(tally.leader(), Some((&word!["b"], 2)));
        assert_eq!(tally.total(), 4);
        assert_eq!(tally.show(), "{b x2, a x2}");
        assert_eq!(Tally::<String>::new().verdict(), None);
    }

    #[test]
    #[should_panic]
    fn zero_reruns_are_rejected() {
        NoiseTolerantEngine::new(0);
    }
}
