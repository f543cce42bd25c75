use std::io;

use thiserror::Error;

use crate::model::alphabet::Symbol;

/// Every failure the PPM core can report.
///
/// None of these are swallowed inside the estimator: a symbol that cannot be
/// priced would silently corrupt entropy totals, so the caller always gets to
/// decide what to do with it.
#[derive(Debug, Error)]
pub enum PpmError {
	/// A model was requested with `order < 1`.
	#[error("order must be >= 1, got {0}")]
	InvalidOrder(usize),

	/// An alphabet without any symbol cannot back a model.
	#[error("alphabet is empty")]
	EmptyAlphabet,

	/// A symbol that was never declared in the alphabet was presented
	/// for estimation or update.
	#[error("symbol {0:?} is not part of the alphabet")]
	SymbolOutsideAlphabet(Symbol),

	/// The cascade reached order -1 and the symbol was not assignable there.
	#[error("symbol {symbol:?} could not be resolved at any order (position {position:?})")]
	UnresolvableSymbol { symbol: Symbol, position: Option<usize> },

	/// A persisted model failed to parse or violates a table invariant.
	/// `line` is 1-based, 0 when the problem is not tied to a single line.
	#[error("malformed persisted model (line {line}): {reason}")]
	MalformedPersistedModel { line: usize, reason: String },

	/// An average was requested before any symbol was scored.
	#[error("no symbol has been scored")]
	EmptyScoreSequence,

	/// Classification needs at least one candidate model.
	#[error("no model available for classification")]
	NoModels,

	#[error(transparent)]
	Io(#[from] io::Error),

	/// The binary snapshot could not be encoded or decoded.
	#[error("binary cache: {0}")]
	Cache(#[from] postcard::Error),
}

impl PpmError {
	pub(crate) fn malformed(line: usize, reason: impl Into<String>) -> Self {
		PpmError::MalformedPersistedModel { line, reason: reason.into() }
	}
}

/// Shorthand used across the crate.
pub type Result<T> = std::result::Result<T, PpmError>;
