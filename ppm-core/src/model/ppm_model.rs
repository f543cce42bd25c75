use std::collections::{HashMap, HashSet};

use log::info;
use serde::{Deserialize, Serialize};

use super::alphabet::{Alphabet, Symbol};
use super::context::{ContextEntry, FrequencyTable};
use super::entropy::EntropyAccumulator;
use super::estimator::Estimate;
use super::history::History;
use crate::error::{PpmError, Result};

/// Context tables of one order, keyed by the ordered window of the last k symbols.
pub type ContextTable = HashMap<Vec<Symbol>, ContextEntry>;

/// Adaptive PPM model over a fixed alphabet.
///
/// The `PpmModel` stores, for every order `k` in `1..=order`, the symbols
/// observed after each distinct length-k context, plus a global order-0
/// table. Estimation cascades from the highest order down to an implicit
/// uniform order -1 over symbols never seen.
///
/// # Responsibilities
/// - Grow counts one observed symbol at a time (`update`, `train`)
/// - Score symbols adaptively, estimating before updating (`process_symbol`)
/// - Expose read-only access to the tables for the estimator and the store
///
/// # Invariants
/// - `order >= 1` and `contexts.len() == order`
/// - Counts never decrease
/// - `seen_symbols` is exactly the key set of `order0`, a subset of the alphabet
/// - Every context key at order `k` has length `k`
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PpmModel {
	order: usize,
	alphabet: Alphabet,
	/// `contexts[k - 1]` holds the contexts of length `k`.
	contexts: Vec<ContextTable>,
	order0: FrequencyTable,
	seen_symbols: HashSet<Symbol>,
	/// Running totals of `process_symbol`. Not persisted.
	#[serde(skip)]
	stats: EntropyAccumulator,
}

/// One empty table per order `1..=order`, or `None` when that many tables
/// cannot be allocated.
pub(crate) fn context_tables(order: usize) -> Option<Vec<ContextTable>> {
	let mut tables = Vec::new();
	tables.try_reserve_exact(order).ok()?;
	tables.resize_with(order, ContextTable::new);
	Some(tables)
}

impl PpmModel {
	/// Creates an empty model of the given order.
	///
	/// # Errors
	/// Returns `InvalidOrder` if `order < 1` or if one table per order
	/// cannot be allocated.
	pub fn new(alphabet: Alphabet, order: usize) -> Result<Self> {
		if order < 1 {
			return Err(PpmError::InvalidOrder(order));
		}
		Ok(Self {
			order,
			alphabet,
			contexts: context_tables(order).ok_or(PpmError::InvalidOrder(order))?,
			order0: FrequencyTable::new(),
			seen_symbols: HashSet::new(),
			stats: EntropyAccumulator::default(),
		})
	}

	/// Reassembles a model from persisted parts and checks every invariant.
	pub(crate) fn from_parts(
		alphabet: Alphabet,
		order: usize,
		seen_symbols: HashSet<Symbol>,
		order0: FrequencyTable,
		contexts: Vec<ContextTable>,
	) -> std::result::Result<Self, String> {
		let model = Self {
			order,
			alphabet,
			contexts,
			order0,
			seen_symbols,
			stats: EntropyAccumulator::default(),
		};
		model.validate()?;
		Ok(model)
	}

	pub fn order(&self) -> usize {
		self.order
	}

	pub fn alphabet(&self) -> &Alphabet {
		&self.alphabet
	}

	/// Symbols seen at least once anywhere (order >= 0).
	pub fn seen_symbols(&self) -> &HashSet<Symbol> {
		&self.seen_symbols
	}

	/// The global order-0 table.
	pub fn order0(&self) -> &FrequencyTable {
		&self.order0
	}

	/// Entry for `context` at order `k`, if that context was ever observed.
	///
	/// Returns `None` for `k` outside `1..=order` or a context of the wrong length.
	pub fn context(&self, k: usize, context: &[Symbol]) -> Option<&ContextEntry> {
		if k == 0 || k > self.order || context.len() != k {
			return None;
		}
		self.contexts[k - 1].get(context)
	}

	/// All contexts of order `k` (empty for `k` outside `1..=order`).
	pub fn contexts_at(&self, k: usize) -> impl Iterator<Item = (&[Symbol], &ContextEntry)> + '_ {
		self.contexts
			.get(k.wrapping_sub(1))
			.into_iter()
			.flat_map(|table| table.iter().map(|(key, entry)| (key.as_slice(), entry)))
	}

	/// Number of distinct contexts stored at order `k`.
	pub fn context_count(&self, k: usize) -> usize {
		self.contexts.get(k.wrapping_sub(1)).map_or(0, |table| table.len())
	}

	/// Running totals of `process_symbol` since construction or the last reset.
	pub fn stats(&self) -> &EntropyAccumulator {
		&self.stats
	}

	pub fn reset_stats(&mut self) {
		self.stats = EntropyAccumulator::default();
	}

	/// Applies one observed symbol to every order table and the order-0 table.
	///
	/// `history` must be the stream *before* `symbol` is appended: counts used to
	/// estimate symbol *i* may only come from symbols `0..i`.
	///
	/// # Errors
	/// Returns `SymbolOutsideAlphabet` if `symbol`, or any symbol of the consulted
	/// history window, is not in the alphabet. Nothing is changed in that case.
	pub fn update(&mut self, symbol: Symbol, history: &[Symbol]) -> Result<()> {
		self.alphabet.check(symbol)?;
		let window = &history[history.len().saturating_sub(self.order)..];
		for s in window {
			self.alphabet.check(*s)?;
		}

		for k in 1..=window.len() {
			let context = &window[window.len() - k..];
			let table = &mut self.contexts[k - 1];
			match table.get_mut(context) {
				Some(entry) => entry.observe(symbol),
				None => {
					let mut entry = ContextEntry::new();
					entry.observe(symbol);
					table.insert(context.to_vec(), entry);
				}
			}
		}

		self.order0.increment(symbol);
		self.seen_symbols.insert(symbol);
		Ok(())
	}

	/// Trains the model on a whole sequence, as a strict sequential fold.
	///
	/// On error the model keeps every update applied before the failing symbol.
	pub fn train(&mut self, symbols: &[Symbol]) -> Result<()> {
		for (i, symbol) in symbols.iter().enumerate() {
			self.update(*symbol, &symbols[..i])?;
		}
		info!(
			"trained order-{} model on {} symbols ({} symbols seen, {} order-{} contexts)",
			self.order,
			symbols.len(),
			self.seen_symbols.len(),
			self.context_count(self.order),
			self.order
		);
		Ok(())
	}

	/// Estimates `symbol` against `history`, records its cost in the running
	/// accumulator, then learns it.
	///
	/// An unresolvable symbol is still learned; it is counted as an anomaly
	/// by the accumulator and returned with `found == false`.
	pub fn process_symbol(&mut self, symbol: Symbol, history: &[Symbol]) -> Result<Estimate> {
		let estimate = self.estimate(symbol, history)?;
		self.stats.observe(estimate.probability);
		self.update(symbol, history)?;
		Ok(estimate)
	}

	/// Adaptive pass over a stream: every symbol is priced with the counts of
	/// the symbols before it, then learned.
	///
	/// Returns the per-symbol estimates, in stream order.
	pub fn process(&mut self, symbols: &[Symbol]) -> Result<Vec<Estimate>> {
		let mut history = History::new(self.order);
		let mut estimates = Vec::with_capacity(symbols.len());
		for symbol in symbols {
			estimates.push(self.process_symbol(*symbol, history.as_slice())?);
			history.push(*symbol);
		}
		Ok(estimates)
	}

	/// Checks every table invariant. Used after loading.
	pub(crate) fn validate(&self) -> std::result::Result<(), String> {
		if self.order < 1 {
			return Err(format!("order must be >= 1, got {}", self.order));
		}
		if self.contexts.len() != self.order {
			return Err(format!("expected {} context orders, got {}", self.order, self.contexts.len()));
		}
		if let Some(s) = self.seen_symbols.iter().find(|s| !self.alphabet.contains(**s)) {
			return Err(format!("seen symbol {s:?} is not in the alphabet"));
		}
		if !self.order0.is_consistent() {
			return Err("order-0 total does not match its counts".to_owned());
		}
		if self.order0.unique() != self.seen_symbols.len()
			|| self.order0.symbols().any(|s| !self.seen_symbols.contains(&s))
		{
			return Err("seen symbols do not match the order-0 frequencies".to_owned());
		}

		for (index, table) in self.contexts.iter().enumerate() {
			let k = index + 1;
			for (context, entry) in table {
				let printable: String = context.iter().collect();
				if context.len() != k {
					return Err(format!("context {printable:?} has length {}, expected {k}", context.len()));
				}
				if let Some(s) = context.iter().find(|s| !self.alphabet.contains(**s)) {
					return Err(format!("context {printable:?} uses symbol {s:?} outside the alphabet"));
				}
				if entry.frequencies().is_empty() || !entry.is_consistent() {
					return Err(format!("context {printable:?} at order {k} is empty or inconsistent"));
				}
				if let Some(s) = entry.seen().iter().find(|s| !self.seen_symbols.contains(*s)) {
					return Err(format!("context {printable:?} counts {s:?} which was never seen at order 0"));
				}
			}
		}
		Ok(())
	}
}
