use std::fmt::Debug;

use itertools::Itertools;
use thiserror::Error;

use crate::{math, Symbol};

/// Errors that can occur when building an alphabet from external input.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum AlphabetError {
    #[error("alphabet must contain at least one symbol")]
    Empty,
    #[error("symbol `{0}` occurs more than once in the alphabet")]
    Duplicate(String),
    #[error("alphabet delimiter must not be empty")]
    EmptyDelimiter,
}

/// An alphabet abstracts a finite collection of [`Symbol`]s. For a learning session, the input
/// alphabet is fixed and every queried word must be built from its symbols.
pub trait Alphabet: Clone + Debug {
    /// The type of symbols in this alphabet.
    type Symbol: Symbol;

    /// Type for an iterator over all symbols in the alphabet.
    type Universe<'this>: Iterator<Item = &'this Self::Symbol>
    where
        Self: 'this;

    /// Returns an iterator over all symbols in the alphabet.
    fn universe(&self) -> Self::Universe<'_>;

    /// Returns true if the given symbol is present in the alphabet.
    fn contains(&self, symbol: &Self::Symbol) -> bool;

    /// Returns the number of symbols in the alphabet.
    fn size(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns the first symbol of `word` that is not part of the alphabet, if any.
    fn first_foreign<'a, I>(&self, word: I) -> Option<&'a Self::Symbol>
    where
        I: IntoIterator<Item = &'a Self::Symbol>,
        Self::Symbol: 'a,
    {
        word.into_iter().find(|sym| !self.contains(sym))
    }
}

impl<A: Alphabet> Alphabet for &A {
    type Symbol = A::Symbol;
    type Universe<'this> = A::Universe<'this> where Self: 'this;

    fn universe(&self) -> Self::Universe<'_> {
        A::universe(self)
    }
    fn contains(&self, symbol: &Self::Symbol) -> bool {
        A::contains(self, symbol)
    }
    fn size(&self) -> usize {
        A::size(self)
    }
}

/// Represents an alphabet that is just a set of symbols. The symbols keep the order in which
/// they were given, duplicates are removed.
///
/// # Example
/// ```
/// use sul_core::prelude::*;
/// let alphabet = SimpleAlphabet::parse("PING PONG", " ").unwrap();
/// assert_eq!(alphabet.size(), 2);
/// assert!(alphabet.contains(&"PONG".to_string()));
/// ```
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SimpleAlphabet<S: Symbol = String>(math::Set<S>);

impl<S: Symbol> SimpleAlphabet<S> {
    /// Creates a new [`SimpleAlphabet`] from an iterator over the symbols.
    pub fn new<I>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
    {
        Self(symbols.into_iter().collect())
    }

    /// Like [`SimpleAlphabet::new`], but refuses empty alphabets and repeated symbols, which
    /// usually indicate a mistake in a configuration file.
    pub fn try_new<I>(symbols: I) -> Result<Self, AlphabetError>
    where
        I: IntoIterator<Item = S>,
    {
        let mut set = math::Set::default();
        for sym in symbols {
            if set.contains(&sym) {
                return Err(AlphabetError::Duplicate(sym.show()));
            }
            set.insert(sym);
        }
        if set.is_empty() {
            return Err(AlphabetError::Empty);
        }
        Ok(Self(set))
    }

    /// Returns the symbol at the given position.
    pub fn get(&self, index: usize) -> Option<&S> {
        self.0.get_index(index)
    }
}

impl SimpleAlphabet<String> {
    /// Parses an alphabet from a string in which symbols are separated by `delimiter`. Empty
    /// pieces, for example from repeated delimiters, are skipped.
    pub fn parse(input: &str, delimiter: &str) -> Result<Self, AlphabetError> {
        if delimiter.is_empty() {
            return Err(AlphabetError::EmptyDelimiter);
        }
        Self::try_new(
            input
                .split(delimiter)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        )
    }
}

impl<S: Symbol> Alphabet for SimpleAlphabet<S> {
    type Symbol = S;
    type Universe<'this> = indexmap::set::Iter<'this, S> where Self: 'this;

    fn universe(&self) -> Self::Universe<'_> {
        self.0.iter()
    }

    fn contains(&self, symbol: &S) -> bool {
        self.0.contains(symbol)
    }

    fn size(&self) -> usize {
        self.0.len()
    }
}

impl<S: Symbol> FromIterator<S> for SimpleAlphabet<S> {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new(iter)
    }
}

impl<S: Symbol> From<Vec<S>> for SimpleAlphabet<S> {
    fn from(value: Vec<S>) -> Self {
        Self::new(value)
    }
}

impl<S: Symbol> std::fmt::Display for SimpleAlphabet<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{{}}}", self.0.iter().map(|s| s.show()).join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::{Alphabet, AlphabetError, SimpleAlphabet};

    #[test]
    fn parse_alphabet() {
        let alphabet = SimpleAlphabet::parse("COMMIT  CONFIRM ASSOC", " ").unwrap();
        assert_eq!(alphabet.size(), 3);
        assert_eq!(alphabet.get(1).map(String::as_str), Some("CONFIRM"));
        assert_eq!(alphabet.to_string(), "{COMMIT, CONFIRM, ASSOC}");

        assert_eq!(SimpleAlphabet::parse("  ", " "), Err(AlphabetError::Empty));
        assert_eq!(
            SimpleAlphabet::parse("a,b,a", ","),
            Err(AlphabetError::Duplicate("a".into()))
        );
        assert_eq!(
            SimpleAlphabet::parse("a b", ""),
            Err(AlphabetError::EmptyDelimiter)
        );
    }

    #[test]
    fn foreign_symbols() {
        let alphabet: SimpleAlphabet<char> = "abc".chars().collect();
        assert!(alphabet.first_foreign(&['a', 'c']).is_none());
        assert_eq!(alphabet.first_foreign(&['a', 'x', 'y']), Some(&'x'));
        assert_eq!(alphabet.universe().copied().collect::<String>(), "abc");
    }
}
