use super::alphabet::Symbol;

/// Append-only view over the symbols of a stream.
///
/// Only the last `window` symbols are ever consulted by a model, so older
/// symbols are dropped in batches to keep memory bounded on long streams.
#[derive(Clone, Debug)]
pub struct History {
	buffer: Vec<Symbol>,
	window: usize,
}

impl History {
	/// Creates an empty history keeping at least `window` symbols.
	pub fn new(window: usize) -> Self {
		Self { buffer: Vec::with_capacity(window * 2), window }
	}

	pub fn push(&mut self, symbol: Symbol) {
		self.buffer.push(symbol);
		if self.buffer.len() > self.window.max(1) * 2 {
			let excess = self.buffer.len() - self.window;
			self.buffer.drain(..excess);
		}
	}

	/// The most recent symbols, at most `window` of them, oldest first.
	pub fn as_slice(&self) -> &[Symbol] {
		&self.buffer[self.buffer.len().saturating_sub(self.window)..]
	}

	pub fn len(&self) -> usize {
		self.as_slice().len()
	}

	pub fn is_empty(&self) -> bool {
		self.buffer.is_empty() || self.window == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn keeps_only_the_window() {
		let mut history = History::new(3);
		assert!(history.is_empty());
		for symbol in "abracadabra".chars() {
			history.push(symbol);
		}
		assert_eq!(history.as_slice(), &['b', 'r', 'a']);
		assert_eq!(history.len(), 3);
	}

	#[test]
	fn shorter_than_window() {
		let mut history = History::new(5);
		history.push('x');
		history.push('y');
		assert_eq!(history.as_slice(), &['x', 'y']);
	}
}
