use serde::{Deserialize, Serialize};

use super::alphabet::Symbol;
use super::estimator::Estimate;
use super::ppm_model::PpmModel;
use crate::error::{PpmError, Result};

/// Sums `-log2(p)` over observed probabilities.
///
/// A probability of 0 has no finite cost: it is counted as an anomaly in
/// `unresolved` and kept out of both the bit total and the symbol count.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct EntropyAccumulator {
	total_bits: f64,
	total_symbols: u64,
	unresolved: u64,
}

impl EntropyAccumulator {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds the information content of `probability`.
	///
	/// Returns the bits added, or `None` when the probability was not positive.
	pub fn observe(&mut self, probability: f64) -> Option<f64> {
		if probability > 0.0 {
			let bits = -probability.log2();
			self.total_bits += bits;
			self.total_symbols += 1;
			Some(bits)
		} else {
			self.unresolved += 1;
			None
		}
	}

	pub fn total_bits(&self) -> f64 {
		self.total_bits
	}

	pub fn total_symbols(&self) -> u64 {
		self.total_symbols
	}

	/// Number of zero-probability observations.
	pub fn unresolved(&self) -> u64 {
		self.unresolved
	}

	/// Average bits per scored symbol.
	///
	/// # Errors
	/// Returns `EmptyScoreSequence` when nothing has been scored.
	pub fn average_bits(&self) -> Result<f64> {
		if self.total_symbols == 0 {
			return Err(PpmError::EmptyScoreSequence);
		}
		Ok(self.total_bits / self.total_symbols as f64)
	}
}

/// Read-only score of a sequence against a frozen model.
#[derive(Serialize, Clone, Debug)]
pub struct ScoreReport {
	pub total_bits: f64,
	pub average_bits: f64,
	pub symbols: u64,
	pub unresolved: u64,
	/// One estimate per input symbol, in order.
	#[serde(skip_serializing_if = "Vec::is_empty")]
	pub trace: Vec<Estimate>,
}

impl PpmModel {
	/// Bits needed for `symbols` under the current tables, without learning.
	///
	/// Symbol *i* is estimated with symbols `0..i` as history.
	pub fn measure(&self, symbols: &[Symbol]) -> Result<EntropyAccumulator> {
		let mut accumulator = EntropyAccumulator::new();
		for (i, symbol) in symbols.iter().enumerate() {
			let estimate = self.estimate(*symbol, &symbols[..i])?;
			accumulator.observe(estimate.probability);
		}
		Ok(accumulator)
	}

	/// Scores `symbols` against the frozen model and keeps the per-symbol trace.
	///
	/// # Errors
	/// - `SymbolOutsideAlphabet` for any symbol not in the alphabet
	/// - `EmptyScoreSequence` if no symbol could be scored
	pub fn score_sequence(&self, symbols: &[Symbol]) -> Result<ScoreReport> {
		let mut accumulator = EntropyAccumulator::new();
		let mut trace = Vec::with_capacity(symbols.len());
		for (i, symbol) in symbols.iter().enumerate() {
			let estimate = self.estimate(*symbol, &symbols[..i])?;
			accumulator.observe(estimate.probability);
			trace.push(estimate);
		}
		Ok(ScoreReport {
			total_bits: accumulator.total_bits(),
			average_bits: accumulator.average_bits()?,
			symbols: accumulator.total_symbols(),
			unresolved: accumulator.unresolved(),
			trace,
		})
	}
}
