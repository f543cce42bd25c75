use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{PpmError, Result};

/// An opaque atomic unit of text: one Unicode code point.
///
/// Equality and ordering follow the code point.
pub type Symbol = char;

/// The set of symbols a model may ever predict.
///
/// Fixed for the lifetime of a model; it defines the universe the
/// order -1 fallback spreads its mass over.
///
/// # Invariants
/// - Never empty
/// - Iteration is sorted by code point
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Alphabet {
	symbols: BTreeSet<Symbol>,
}

impl Alphabet {
	/// Builds an alphabet from any collection of symbols (duplicates are merged).
	///
	/// # Errors
	/// Returns `EmptyAlphabet` if no symbol is given.
	pub fn new<I: IntoIterator<Item = Symbol>>(symbols: I) -> Result<Self> {
		let symbols: BTreeSet<Symbol> = symbols.into_iter().collect();
		if symbols.is_empty() {
			return Err(PpmError::EmptyAlphabet);
		}
		Ok(Self { symbols })
	}

	/// Alphabet made of every distinct character of `text`.
	pub fn from_text(text: &str) -> Result<Self> {
		Self::new(text.chars())
	}

	pub fn contains(&self, symbol: Symbol) -> bool {
		self.symbols.contains(&symbol)
	}

	/// Rejects symbols outside the alphabet.
	pub fn check(&self, symbol: Symbol) -> Result<()> {
		if self.contains(symbol) {
			Ok(())
		} else {
			Err(PpmError::SymbolOutsideAlphabet(symbol))
		}
	}

	pub fn len(&self) -> usize {
		self.symbols.len()
	}

	pub fn is_empty(&self) -> bool {
		self.symbols.is_empty()
	}

	/// Symbols in code point order.
	pub fn iter(&self) -> impl Iterator<Item = Symbol> + '_ {
		self.symbols.iter().copied()
	}

	/// Keeps only the symbols of `text` that belong to the alphabet.
	pub fn retain_known(&self, text: &[Symbol]) -> Vec<Symbol> {
		text.iter().copied().filter(|s| self.contains(*s)).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn deduplicates_and_sorts() {
		let alphabet = Alphabet::from_text("abracadabra").unwrap();
		assert_eq!(alphabet.iter().collect::<String>(), "abcdr");
		assert_eq!(alphabet.len(), 5);
	}

	#[test]
	fn empty_alphabet_is_rejected() {
		assert!(matches!(Alphabet::from_text(""), Err(PpmError::EmptyAlphabet)));
	}

	#[test]
	fn check_rejects_unknown_symbols() {
		let alphabet = Alphabet::from_text("ab").unwrap();
		assert!(alphabet.check('a').is_ok());
		assert!(matches!(alphabet.check('z'), Err(PpmError::SymbolOutsideAlphabet('z'))));
		assert_eq!(alphabet.retain_known(&['a', 'z', 'b']), vec!['a', 'b']);
	}
}
