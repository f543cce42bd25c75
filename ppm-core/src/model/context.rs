use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::alphabet::Symbol;

/// Symbol occurrence counts observed in one context.
///
/// Conceptually, this is the outgoing edge set of a Markov state: each edge
/// is weighted by how many times the symbol followed the context.
///
/// # Invariants
/// - Every stored count is strictly positive
/// - `total` always equals the sum of the stored counts
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrequencyTable {
	/// Example: { 'e' => 42, 'a' => 3 }
	counts: HashMap<Symbol, u64>,
	total: u64,
}

impl FrequencyTable {
	pub fn new() -> Self {
		Self::default()
	}

	/// Records one more occurrence of `symbol`.
	pub fn increment(&mut self, symbol: Symbol) {
		*self.counts.entry(symbol).or_insert(0) += 1;
		self.total += 1;
	}

	/// Inserts a count read back from storage.
	///
	/// Returns `false` (and leaves the table unchanged) if the symbol is
	/// already present or the count is zero.
	pub(crate) fn insert(&mut self, symbol: Symbol, count: u64) -> bool {
		if count == 0 || self.counts.contains_key(&symbol) {
			return false;
		}
		self.counts.insert(symbol, count);
		self.total += count;
		true
	}

	/// Count for `symbol`, 0 when never observed.
	pub fn count(&self, symbol: Symbol) -> u64 {
		self.counts.get(&symbol).copied().unwrap_or(0)
	}

	pub fn contains(&self, symbol: Symbol) -> bool {
		self.counts.contains_key(&symbol)
	}

	pub fn total(&self) -> u64 {
		self.total
	}

	/// Number of distinct symbols with a positive count.
	pub fn unique(&self) -> usize {
		self.counts.len()
	}

	pub fn is_empty(&self) -> bool {
		self.counts.is_empty()
	}

	pub fn symbols(&self) -> impl Iterator<Item = Symbol> + '_ {
		self.counts.keys().copied()
	}

	/// `(symbol, count)` pairs sorted by code point.
	pub fn sorted(&self) -> Vec<(Symbol, u64)> {
		let mut pairs: Vec<(Symbol, u64)> = self.counts.iter().map(|(s, c)| (*s, *c)).collect();
		pairs.sort_unstable_by_key(|(s, _)| *s);
		pairs
	}

	/// `(total, unique)` of the table restricted to symbols not in `excluded`.
	pub fn available(&self, excluded: &HashSet<Symbol>) -> (u64, usize) {
		self.counts
			.iter()
			.filter(|(symbol, _)| !excluded.contains(*symbol))
			.fold((0, 0), |(total, unique), (_, count)| (total + count, unique + 1))
	}

	/// True when the cached total and the stored counts agree.
	pub(crate) fn is_consistent(&self) -> bool {
		self.counts.values().all(|c| *c > 0) && self.counts.values().sum::<u64>() == self.total
	}
}

/// Frequency table plus the set of symbols ever seen in one `(order, context)`.
///
/// # Invariants
/// - `seen` is exactly the key set of `frequencies`
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ContextEntry {
	frequencies: FrequencyTable,
	seen: HashSet<Symbol>,
}

impl ContextEntry {
	pub fn new() -> Self {
		Self::default()
	}

	/// Marks `symbol` as seen and increments its count by exactly one.
	pub fn observe(&mut self, symbol: Symbol) {
		self.seen.insert(symbol);
		self.frequencies.increment(symbol);
	}

	/// Restores a persisted count. See `FrequencyTable::insert`.
	pub(crate) fn insert(&mut self, symbol: Symbol, count: u64) -> bool {
		if !self.frequencies.insert(symbol, count) {
			return false;
		}
		self.seen.insert(symbol);
		true
	}

	pub fn frequencies(&self) -> &FrequencyTable {
		&self.frequencies
	}

	pub fn seen(&self) -> &HashSet<Symbol> {
		&self.seen
	}

	pub fn total(&self) -> u64 {
		self.frequencies.total()
	}

	pub fn unique(&self) -> usize {
		self.seen.len()
	}

	pub(crate) fn is_consistent(&self) -> bool {
		self.frequencies.is_consistent()
			&& self.seen.len() == self.frequencies.unique()
			&& self.seen.iter().all(|s| self.frequencies.contains(*s))
	}
}
