//! Coarse element identity.
//!
//! A [`Fingerprint`] is derived from `(tag, class, text excerpt)` only, never
//! from document position, so the same logical element maps to the same key
//! across rescans and page loads. Distinct elements with identical short text
//! alias to one fingerprint.

use std::fmt;
use std::str::FromStr;

/// Number of characters kept in a text excerpt.
pub const EXCERPT_CHARS: usize = 50;

/// Lowercased, whitespace-collapsed prefix of `text`, at most
/// [`EXCERPT_CHARS`] characters long. Never ends in a space, so excerpting
/// an excerpt is a no-op.
pub fn excerpt(text: &str) -> String {
    let mut out: String = text
        .split_whitespace()
        .flat_map(|word| std::iter::once(' ').chain(word.chars()))
        .skip(1)
        .flat_map(char::to_lowercase)
        .take(EXCERPT_CHARS)
        .collect();
    out.truncate(out.trim_end().len());
    out
}

/// Cheap non-cryptographic element identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(u32);

impl Fingerprint {
    /// Identity of an element. `class` and `excerpt` are expected to be
    /// lowercase already.
    pub fn of_element(tag: &str, class: &str, excerpt: &str) -> Self {
        Self::of_str(&format!("{tag}_{class}_{excerpt}"))
    }

    /// Identity of a piece of text, as used for feedback records.
    pub fn of_text(text: &str) -> Self {
        Self::of_str(&excerpt(text))
    }

    /// 31-multiplier rolling hash over UTF-16 code units.
    fn of_str(input: &str) -> Self {
        let hash = input
            .encode_utf16()
            .fold(0u32, |h, unit| h.wrapping_mul(31).wrapping_add(u32::from(unit)));
        Self(hash)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl FromStr for Fingerprint {
    type Err = std::num::ParseIntError;

    /// Parse the hex form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u32::from_str_radix(s, 16).map(Self)
    }
}
