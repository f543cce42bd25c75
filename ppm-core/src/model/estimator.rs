use std::collections::HashSet;

use serde::Serialize;

use super::alphabet::Symbol;
use super::ppm_model::PpmModel;
use crate::error::{PpmError, Result};

/// What one order of the cascade did with the target symbol.
#[derive(Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
	/// The context was never observed; nothing charged.
	Missing,
	/// Every symbol of the level was already excluded (or the level is empty); nothing charged.
	Uninformative,
	/// The symbol is not available here; the escape probability was charged.
	Escape,
	/// The symbol was resolved at this order.
	Found,
	/// Order -1 could not assign the symbol.
	Unresolved,
}

/// One per-order decision of the cascade.
///
/// `order` is `k` for context levels, 0 for the global table and -1 for
/// the uniform fallback. `factor` is `numerator / denominator`, or 1.0 when
/// nothing was charged.
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Step {
	pub order: i32,
	pub context: Vec<Symbol>,
	pub decision: Decision,
	pub numerator: u64,
	pub denominator: u64,
	pub factor: f64,
}

/// Result of pricing one symbol.
///
/// When `found` is false the probability is 0 and `order` is `None`; the
/// caller decides whether that is fatal (see `into_probability`).
#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Estimate {
	pub symbol: Symbol,
	pub probability: f64,
	pub found: bool,
	/// Order that resolved the symbol (-1 for the uniform fallback).
	pub order: Option<i32>,
	pub trace: Vec<Step>,
}

impl Estimate {
	/// Information content in bits, `None` for an unresolved symbol.
	pub fn bits(&self) -> Option<f64> {
		if self.found && self.probability > 0.0 {
			Some(-self.probability.log2())
		} else {
			None
		}
	}

	/// The probability, or `UnresolvableSymbol` when the cascade failed.
	pub fn into_probability(self) -> Result<f64> {
		if self.found {
			Ok(self.probability)
		} else {
			Err(PpmError::UnresolvableSymbol { symbol: self.symbol, position: None })
		}
	}
}

/// Per-call state threaded through the cascade.
///
/// Created fresh for every `estimate` call and dropped with it, so exclusions
/// can never leak from one query into the next.
struct Cascade {
	symbol: Symbol,
	excluded: HashSet<Symbol>,
	probability: f64,
	trace: Vec<Step>,
}

impl Cascade {
	fn new(symbol: Symbol) -> Self {
		Self { symbol, excluded: HashSet::new(), probability: 1.0, trace: Vec::new() }
	}

	fn is_available(&self, symbol: Symbol) -> bool {
		!self.excluded.contains(&symbol)
	}

	fn exclude<I: IntoIterator<Item = Symbol>>(&mut self, symbols: I) {
		self.excluded.extend(symbols);
	}

	/// Records a step without changing the probability.
	fn note(&mut self, order: i32, context: &[Symbol], decision: Decision) {
		self.trace.push(Step {
			order,
			context: context.to_vec(),
			decision,
			numerator: 0,
			denominator: 0,
			factor: 1.0,
		});
	}

	/// Multiplies the running probability by `numerator / denominator`.
	fn charge(&mut self, order: i32, context: &[Symbol], decision: Decision, numerator: u64, denominator: u64) {
		let factor = numerator as f64 / denominator as f64;
		self.probability *= factor;
		self.trace.push(Step {
			order,
			context: context.to_vec(),
			decision,
			numerator,
			denominator,
			factor,
		});
	}

	fn resolve(mut self, order: i32, context: &[Symbol], count: u64, denominator: u64) -> Estimate {
		self.charge(order, context, Decision::Found, count, denominator);
		Estimate {
			symbol: self.symbol,
			probability: self.probability,
			found: true,
			order: Some(order),
			trace: self.trace,
		}
	}

	fn unresolved(mut self) -> Estimate {
		self.note(-1, &[], Decision::Unresolved);
		Estimate {
			symbol: self.symbol,
			probability: 0.0,
			found: false,
			order: None,
			trace: self.trace,
		}
	}
}

impl PpmModel {
	/// Probability of `symbol` following `history`, with full exclusion.
	///
	/// Cascades from order `min(order, len(history))` down to 1, then the
	/// order-0 table, then the uniform order -1 fallback over symbols never
	/// seen. Pure with respect to the model: repeated calls with the same
	/// arguments return identical results.
	///
	/// # Errors
	/// Returns `SymbolOutsideAlphabet` if `symbol` is not in the alphabet.
	/// An unresolvable symbol is not an error here: it comes back with
	/// `found == false` and probability 0.
	pub fn estimate(&self, symbol: Symbol, history: &[Symbol]) -> Result<Estimate> {
		self.alphabet().check(symbol)?;
		let mut cascade = Cascade::new(symbol);

		let top = self.order().min(history.len());
		for k in (1..=top).rev() {
			let context = &history[history.len() - k..];
			let order = k as i32;
			let Some(entry) = self.context(k, context) else {
				cascade.note(order, context, Decision::Missing);
				continue;
			};

			let (total, unique) = entry.frequencies().available(&cascade.excluded);
			let denominator = total + unique as u64;
			let count = entry.frequencies().count(symbol);
			if count > 0 && cascade.is_available(symbol) {
				return Ok(cascade.resolve(order, context, count, denominator));
			}

			if denominator > 0 {
				cascade.charge(order, context, Decision::Escape, unique as u64, denominator);
			} else {
				cascade.note(order, context, Decision::Uninformative);
			}
			cascade.exclude(entry.seen().iter().copied());
		}

		// Order 0. Once every alphabet symbol has been seen there is nothing
		// left for order -1, so no escape mass is reserved.
		let seen = self.seen_symbols();
		let (total0, _) = self.order0().available(&cascade.excluded);
		let unique0 = seen.iter().filter(|s| cascade.is_available(**s)).count() as u64;
		let escape_possible = seen.len() < self.alphabet().len();
		let denominator0 = total0 + if escape_possible { unique0 } else { 0 };

		let count0 = self.order0().count(symbol);
		if count0 > 0 && cascade.is_available(symbol) {
			return Ok(cascade.resolve(0, &[], count0, denominator0));
		}
		if !escape_possible {
			return Ok(cascade.unresolved());
		}
		if denominator0 > 0 {
			cascade.charge(0, &[], Decision::Escape, unique0, denominator0);
		} else {
			cascade.note(0, &[], Decision::Uninformative);
		}
		cascade.exclude(seen.iter().copied());

		// Order -1: uniform over symbols never seen and not excluded.
		let unseen = self
			.alphabet()
			.iter()
			.filter(|s| !seen.contains(s) && cascade.is_available(*s))
			.count() as u64;
		if !seen.contains(&symbol) && cascade.is_available(symbol) {
			return Ok(cascade.resolve(-1, &[], 1, unseen));
		}
		Ok(cascade.unresolved())
	}

	/// Like `estimate`, but an unresolvable symbol is an error.
	pub fn probability(&self, symbol: Symbol, history: &[Symbol]) -> Result<f64> {
		self.estimate(symbol, history)?.into_probability()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::model::alphabet::Alphabet;

	const EPSILON: f64 = 1e-12;

	fn symbols(text: &str) -> Vec<Symbol> {
		text.chars().collect()
	}

	fn empty_model() -> PpmModel {
		PpmModel::new(Alphabet::from_text("abcdr").unwrap(), 2).unwrap()
	}

	fn trained() -> PpmModel {
		let mut model = empty_model();
		model.train(&symbols("abracadabra")).unwrap();
		model
	}

	#[test]
	fn empty_history_on_empty_model_is_uniform() {
		let model = empty_model();
		let estimate = model.estimate('c', &[]).unwrap();
		assert!(estimate.found);
		assert_eq!(estimate.order, Some(-1));
		assert!((estimate.probability - 0.2).abs() < EPSILON);
		// Order 0 had nothing to say and charged nothing.
		assert_eq!(estimate.trace[0].decision, Decision::Uninformative);
		assert_eq!(estimate.trace.len(), 2);
	}

	#[test]
	fn resolves_at_highest_known_context() {
		let model = trained();
		let estimate = model.estimate('a', &symbols("abracadabr")).unwrap();
		assert_eq!(estimate.order, Some(2));
		// "br" -> {a: 2}: 2 / (2 + 1)
		assert!((estimate.probability - 2.0 / 3.0).abs() < EPSILON);
		assert_eq!(estimate.trace.len(), 1);
		assert_eq!(estimate.trace[0].context, vec!['b', 'r']);
	}

	#[test]
	fn escape_excludes_symbols_from_lower_orders() {
		let model = trained();
		let estimate = model.estimate('c', &symbols("abracadabr")).unwrap();
		// "br" escapes with 1/3 and excludes 'a'; "r" only knows 'a' so it is
		// uninformative; order 0 without 'a' is b2 r2 c1 d1 and the alphabet is
		// fully seen, so no escape mass: 1/6.
		let decisions: Vec<Decision> = estimate.trace.iter().map(|s| s.decision).collect();
		assert_eq!(decisions, vec![Decision::Escape, Decision::Uninformative, Decision::Found]);
		assert_eq!(estimate.order, Some(0));
		assert!((estimate.probability - 1.0 / 18.0).abs() < EPSILON);
	}

	#[test]
	fn missing_contexts_are_skipped_without_charge() {
		let model = trained();
		// "dr" was never observed, "r" was.
		let estimate = model.estimate('a', &symbols("dr")).unwrap();
		assert_eq!(estimate.trace[0].decision, Decision::Missing);
		assert_eq!(estimate.trace[0].factor, 1.0);
		// "r" -> {a: 2}: 2/3
		assert!((estimate.probability - 2.0 / 3.0).abs() < EPSILON);
	}

	#[test]
	fn falls_back_to_unseen_symbols() {
		let mut model = empty_model();
		model.train(&symbols("abra")).unwrap();
		let estimate = model.estimate('c', &symbols("abra")).unwrap();
		// "ra" missing; "a" -> {b:1}: escape 1/2 excluding b; order 0 without b:
		// a2 r1, unique 2 -> escape 2/5; unseen {c, d} -> 1/2.
		assert_eq!(estimate.order, Some(-1));
		assert!((estimate.probability - 0.1).abs() < EPSILON);
	}

	#[test]
	fn adaptive_abracadabra_matches_hand_computation() {
		let mut model = empty_model();
		let estimates = model.process(&symbols("abracadabra")).unwrap();
		let expected = [
			1.0 / 5.0,
			1.0 / 8.0,
			1.0 / 6.0,
			1.0 / 6.0,
			1.0 / 10.0,
			2.0 / 9.0,
			1.0 / 6.0,
			3.0 / 7.0,
			1.0 / 6.0,
			1.0 / 2.0,
			1.0 / 2.0,
		];
		for (estimate, expected) in estimates.iter().zip(expected) {
			assert!(
				(estimate.probability - expected).abs() < EPSILON,
				"{:?}: got {}, expected {}",
				estimate.symbol,
				estimate.probability,
				expected
			);
		}
	}

	#[test]
	fn estimate_is_deterministic_and_call_scoped() {
		let model = trained();
		let history = symbols("abracadabr");
		let c_first = model.estimate('c', &history).unwrap();
		let b_second = model.estimate('b', &history).unwrap();
		let b_first = model.estimate('b', &history).unwrap();
		let c_second = model.estimate('c', &history).unwrap();
		assert_eq!(c_first, c_second);
		assert_eq!(b_first, b_second);
	}

	#[test]
	fn probabilities_sum_to_one() {
		let mut model = empty_model();
		let text = symbols("abracadabra");
		for i in 0..text.len() {
			let history = &text[..i];
			let sum: f64 = model
				.alphabet()
				.iter()
				.map(|s| model.estimate(s, history).unwrap().probability)
				.sum();
			assert!((sum - 1.0).abs() < 1e-9, "step {i}: {sum}");
			model.update(text[i], history).unwrap();
		}
	}

	#[test]
	fn probabilities_are_within_bounds() {
		let model = trained();
		let text = symbols("abracadabra");
		for i in 0..text.len() {
			for symbol in model.alphabet().iter() {
				let p = model.estimate(symbol, &text[..i]).unwrap().probability;
				assert!(p > 0.0 && p <= 1.0);
			}
		}
	}

	#[test]
	fn full_alphabet_never_reaches_order_minus_one() {
		let model = trained();
		let text = symbols("abracadabra");
		for i in 0..=text.len() {
			for symbol in model.alphabet().iter() {
				let estimate = model.estimate(symbol, &text[..i]).unwrap();
				assert!(estimate.trace.iter().all(|step| step.order >= 0));
			}
		}
	}

	#[test]
	fn symbols_outside_the_alphabet_are_rejected() {
		let model = trained();
		assert!(matches!(model.estimate('z', &[]), Err(PpmError::SymbolOutsideAlphabet('z'))));
	}

	#[test]
	fn unresolved_estimate_surfaces_an_error() {
		let estimate = Estimate { symbol: 'q', probability: 0.0, found: false, order: None, trace: Vec::new() };
		assert_eq!(estimate.bits(), None);
		assert!(matches!(
			estimate.into_probability(),
			Err(PpmError::UnresolvableSymbol { symbol: 'q', .. })
		));
	}
}
