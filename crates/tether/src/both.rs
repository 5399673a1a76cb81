#![forbid(unsafe_code)]

//! Small value types used by the combinators.

use std::fmt;

/// The payload of an activation that carries no information.
pub type Unit = ();

/// An immutable pair, emitted by [`Observable::and`](crate::Observable::and)
/// and stored by [`Dict`](crate::Dict).
///
/// Equality and hashing are structural over both components.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Both<A, B> {
    pub first: A,
    pub second: B,
}

impl<A, B> Both<A, B> {
    #[must_use]
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }

    #[must_use]
    pub fn into_tuple(self) -> (A, B) {
        (self.first, self.second)
    }

    /// Borrow both components.
    #[must_use]
    pub fn by_ref(&self) -> Both<&A, &B> {
        Both::new(&self.first, &self.second)
    }
}

impl<A, B> From<(A, B)> for Both<A, B> {
    fn from((first, second): (A, B)) -> Self {
        Self::new(first, second)
    }
}

impl<A: fmt::Display, B: fmt::Display> fmt::Display for Both<A, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.first, self.second)
    }
}
