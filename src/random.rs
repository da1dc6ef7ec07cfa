//! Seedless random test data.

use rand::distr::Alphanumeric;
use rand::seq::IndexedRandom;
use rand::Rng;

const SYMBOLS: &[u8] = b"~`!@#$%^&*()_-+={[}]|\\:;\"'<,>.?/";

/// Random ASCII letters and digits.
pub fn alphanumeric(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Random ASCII punctuation.
pub fn symbols(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from(SYMBOLS[rng.random_range(0..SYMBOLS.len())]))
        .collect()
}

/// Pick one entry uniformly, `None` for an empty slice.
pub fn choose<T>(items: &[T]) -> Option<&T> {
    items.choose(&mut rand::rng())
}
