use std::collections::BTreeMap;
use std::sync::mpsc;
use std::thread;

use log::debug;
use serde::Serialize;

use super::alphabet::Symbol;
use super::ppm_model::PpmModel;
use crate::error::{PpmError, Result};

/// Outcome of scoring one text against several labelled models.
#[derive(Serialize, Clone, Debug)]
pub struct Classification {
	/// Label of the model with the lowest average bits/symbol.
	pub label: String,
	/// Average bits/symbol per label.
	pub entropies: BTreeMap<String, f64>,
}

/// Scores `text` against every model and picks the one that fits it best.
///
/// Models are only read, never updated, so they are scored in parallel:
/// they are split into at most `num_cpus` chunks, each chunk scored on a
/// scoped thread and the results collected over a channel.
///
/// Ties resolve to the lexicographically smallest label.
///
/// # Errors
/// - `NoModels` when `models` is empty
/// - the first scoring error of any model (`SymbolOutsideAlphabet`,
///   `EmptyScoreSequence`, ...)
pub fn classify<'a, I>(text: &[Symbol], models: I) -> Result<Classification>
where
	I: IntoIterator<Item = (&'a str, &'a PpmModel)>,
{
	let models: Vec<(&str, &PpmModel)> = models.into_iter().collect();
	if models.is_empty() {
		return Err(PpmError::NoModels);
	}

	let chunk_size = models.len().div_ceil(num_cpus::get().max(1));
	let (tx, rx) = mpsc::channel();
	thread::scope(|scope| {
		for chunk in models.chunks(chunk_size) {
			let tx = tx.clone();
			scope.spawn(move || {
				for (label, model) in chunk {
					let average = model.measure(text).and_then(|bits| bits.average_bits());
					// The receiver outlives the scope, so sending cannot fail.
					let _ = tx.send((label.to_string(), average));
				}
			});
		}
	});
	drop(tx);

	let mut entropies = BTreeMap::new();
	for (label, average) in rx.iter() {
		let average = average?;
		debug!("{label}: {average:.4} bits/symbol");
		entropies.insert(label, average);
	}

	let mut best: Option<(&String, f64)> = None;
	for (label, average) in &entropies {
		if best.is_none_or(|(_, lowest)| *average < lowest) {
			best = Some((label, *average));
		}
	}
	let label = best.map(|(label, _)| label.clone()).ok_or(PpmError::NoModels)?;
	Ok(Classification { label, entropies })
}
