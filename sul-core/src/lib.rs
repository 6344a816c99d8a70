//! Basic building blocks shared by the membership oracle: symbols, finite words and alphabets.
use std::{fmt::Debug, hash::Hash};

pub mod math;

mod show;
pub use show::{show_duration, Show};

pub mod alphabet;

pub mod word;

/// A symbol is an opaque token that is sent to or received from a system under learning. We do
/// not care about its structure, it just has to be comparable, hashable and printable.
pub trait Symbol: Clone + Eq + Hash + Debug + Show {}

impl<S: Clone + Eq + Hash + Debug + Show> Symbol for S {}

pub mod prelude {
    pub use super::{
        alphabet::{Alphabet, AlphabetError, SimpleAlphabet},
        math,
        word::Word,
        Show, Symbol,
    };
    pub use crate::word;
}
