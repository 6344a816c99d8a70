use std::ops::Deref;

use crate::{Show, Symbol};

/// A finite word, i.e. an ordered sequence of [`Symbol`]s. Two words are equal if and only if
/// they have the same length and agree on every position.
///
/// Words are used both for the inputs that are sent to a system under learning and for the
/// outputs it produces. They dereference to a slice, so all the usual read-only slice methods
/// are available.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct Word<S = String>(Vec<S>);

impl<S> Word<S> {
    /// Returns the empty word.
    pub const fn epsilon() -> Self {
        Self(Vec::new())
    }

    /// Creates an empty word that can hold `capacity` symbols without reallocating.
    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    /// Appends a single symbol.
    pub fn push(&mut self, symbol: S) {
        self.0.push(symbol)
    }
}

impl<S: Clone> Word<S> {
    /// Builds the concatenation `self ++ other`.
    ///
    /// # Example
    /// ```
    /// use sul_core::prelude::*;
    /// let w = word!["a", "b"].concat(&word!["c"]);
    /// assert_eq!(w, word!["a", "b", "c"]);
    /// ```
    pub fn concat(&self, other: &Word<S>) -> Word<S> {
        let mut out = Vec::with_capacity(self.len() + other.len());
        out.extend_from_slice(&self.0);
        out.extend_from_slice(&other.0);
        Self(out)
    }

    /// Returns the infix that starts at position `from` (inclusive) and ends at `to` (exclusive).
    /// Both bounds are clamped to the length of the word.
    pub fn sub_word(&self, from: usize, to: usize) -> Word<S> {
        let to = to.min(self.len());
        let from = from.min(to);
        Self(self.0[from..to].to_vec())
    }

    /// Returns the prefix of length `length`, or the whole word if it is shorter.
    pub fn prefix(&self, length: usize) -> Word<S> {
        self.sub_word(0, length)
    }

    /// Returns the suffix that starts at position `offset`, which is empty if the offset lies
    /// beyond the end of the word.
    pub fn suffix_from(&self, offset: usize) -> Word<S> {
        self.sub_word(offset, self.len())
    }

    /// Splits the word into the prefix of length `at` and the remaining suffix.
    pub fn split_at(&self, at: usize) -> (Word<S>, Word<S>) {
        (self.prefix(at), self.suffix_from(at))
    }
}

impl<S> Default for Word<S> {
    fn default() -> Self {
        Self::epsilon()
    }
}

impl<S> Deref for Word<S> {
    type Target = [S];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> From<Vec<S>> for Word<S> {
    fn from(value: Vec<S>) -> Self {
        Self(value)
    }
}

impl<S: Clone> From<&[S]> for Word<S> {
    fn from(value: &[S]) -> Self {
        Self(value.to_vec())
    }
}

impl From<&str> for Word<char> {
    fn from(value: &str) -> Self {
        value.chars().collect()
    }
}

impl<S> FromIterator<S> for Word<S> {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<S> IntoIterator for Word<S> {
    type Item = S;
    type IntoIter = std::vec::IntoIter<S>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, S> IntoIterator for &'a Word<S> {
    type Item = &'a S;
    type IntoIter = std::slice::Iter<'a, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<S: Symbol> Show for Word<S> {
    fn show(&self) -> String {
        S::show_collection(self.0.iter())
    }
}

impl<S: Symbol> std::fmt::Display for Word<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.show())
    }
}

/// Creates a [`Word`] of owned strings from a list of string literals, or of arbitrary symbols
/// when prefixed with `sym`.
///
/// # Example
/// ```
/// use sul_core::prelude::*;
/// let w = word!["PING", "PONG"];
/// assert_eq!(w.len(), 2);
/// assert_eq!(w[0], "PING");
/// let numbers: Word<u8> = word![sym 1, 2, 3];
/// assert_eq!(numbers.len(), 3);
/// let empty: Word = word![];
/// assert!(empty.is_empty());
/// ```
#[macro_export]
macro_rules! word {
    () => {
        $crate::word::Word::epsilon()
    };
    (sym $($s:expr),* $(,)?) => {
        $crate::word::Word::from(vec![$($s),*])
    };
    ($($s:expr),+ $(,)?) => {
        $crate::word::Word::<String>::from(vec![$(String::from($s)),+])
    };
}
