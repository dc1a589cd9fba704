//! Pairing sequence helpers
//!
//! Generation with the no-immediate-repeat property, display formatting,
//! candidate normalization and matching.

use crate::types::Color;
use rand::Rng;

/// Default number of colours in a pairing sequence
pub const DEFAULT_SEQUENCE_LENGTH: usize = 4;

/// Separator used in the display form
pub const DISPLAY_SEPARATOR: char = '-';

/// Characters stripped from candidates before comparison
const IGNORED_SEPARATORS: [char; 4] = ['-', '_', ',', '.'];

/// Draw `length` colours, never repeating the immediately preceding one.
///
/// The first draw uses the full alphabet; each later draw excludes the
/// previous colour, so every remaining candidate is equally likely.
pub fn generate<R: Rng>(length: usize, rng: &mut R) -> Vec<Color> {
    let mut sequence: Vec<Color> = Vec::with_capacity(length);
    for _ in 0..length {
        let candidates: Vec<Color> = match sequence.last() {
            Some(prev) => Color::ALPHABET
                .into_iter()
                .filter(|c| c != prev)
                .collect(),
            None => Color::ALPHABET.to_vec(),
        };
        sequence.push(candidates[rng.random_range(0..candidates.len())]);
    }
    sequence
}

/// Codes joined with `-`, e.g. `R-G-B-Y`
#[must_use]
pub fn display_string(sequence: &[Color]) -> String {
    sequence
        .iter()
        .map(|c| c.code().to_string())
        .collect::<Vec<_>>()
        .join(&DISPLAY_SEPARATOR.to_string())
}

/// Codes concatenated, e.g. `RGBY`
#[must_use]
pub fn concat(sequence: &[Color]) -> String {
    sequence.iter().map(|c| c.code()).collect()
}

/// Strip separators and whitespace, upper-case the rest.
///
/// Idempotent: `normalize(&normalize(s)) == normalize(s)`.
#[must_use]
pub fn normalize(candidate: &str) -> String {
    candidate
        .chars()
        .filter(|c| !c.is_whitespace() && !IGNORED_SEPARATORS.contains(c))
        .flat_map(char::to_uppercase)
        .collect()
}

/// Check whether no two adjacent colours are equal
#[must_use]
pub fn has_no_adjacent_repeats(sequence: &[Color]) -> bool {
    sequence.windows(2).all(|w| w[0] != w[1])
}

/// Compare a normalized candidate against the expected concatenation.
///
/// With `accept_rotations`, any cyclic rotation of `expected` also matches.
#[must_use]
pub fn matches(expected: &str, normalized: &str, accept_rotations: bool) -> bool {
    if normalized == expected {
        return true;
    }
    if !accept_rotations || normalized.len() != expected.len() || expected.is_empty() {
        return false;
    }
    // A rotation of `expected` is always a substring of `expected + expected`.
    format!("{expected}{expected}").contains(normalized)
}
