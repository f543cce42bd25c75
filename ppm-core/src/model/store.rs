//! Persistence of a `PpmModel`.
//!
//! The text layout is canonical and line-oriented:
//!
//! ```text
//! ALPHABET: a,b,c,d,r
//! ORDER: 2
//! SEEN_SYMBOLS: a,b,c,d,r
//! K0_UNIQUE_SYMBOLS: 5
//!
//! === K0_FREQUENCIES ===
//! a:5
//! ...
//!
//! === K1_CONTEXTS ===
//! CONTEXT:a
//! b:2
//! END_CONTEXT
//! ```
//!
//! Symbols are escaped so any `char` survives: `\\`, `\,`, `\:`, `\n`, `\r`,
//! `\t`, `\s` (space) and `\u{hex}` for other control or whitespace characters.
//! Output is sorted by code point, so saving the same model twice yields the
//! same bytes.
//!
//! The binary snapshot (postcard) is a cache: it is faster to load but carries
//! no compatibility promise across versions of this crate.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::Chars;

use log::{debug, info, warn};

use super::alphabet::{Alphabet, Symbol};
use super::context::{ContextEntry, FrequencyTable};
use super::ppm_model::{context_tables, ContextTable, PpmModel};
use crate::error::{PpmError, Result};
use crate::io::{build_output_path, load_text};

const ALPHABET: &str = "ALPHABET:";
const ORDER: &str = "ORDER:";
const SEEN_SYMBOLS: &str = "SEEN_SYMBOLS:";
const K0_UNIQUE_SYMBOLS: &str = "K0_UNIQUE_SYMBOLS:";
const CONTEXT: &str = "CONTEXT:";
const END_CONTEXT: &str = "END_CONTEXT";

fn escape_symbol(symbol: Symbol, out: &mut String) {
	match symbol {
		'\\' => out.push_str("\\\\"),
		',' => out.push_str("\\,"),
		':' => out.push_str("\\:"),
		'\n' => out.push_str("\\n"),
		'\r' => out.push_str("\\r"),
		'\t' => out.push_str("\\t"),
		' ' => out.push_str("\\s"),
		c if c.is_control() || c.is_whitespace() => {
			let _ = write!(out, "\\u{{{:x}}}", c as u32);
		}
		c => out.push(c),
	}
}

fn escape_list<I: IntoIterator<Item = Symbol>>(symbols: I) -> String {
	let mut out = String::new();
	for (i, symbol) in symbols.into_iter().enumerate() {
		if i > 0 {
			out.push(',');
		}
		escape_symbol(symbol, &mut out);
	}
	out
}

fn decode_escape(chars: &mut Chars<'_>) -> std::result::Result<Symbol, String> {
	match chars.next() {
		Some('\\') => Ok('\\'),
		Some(',') => Ok(','),
		Some(':') => Ok(':'),
		Some('n') => Ok('\n'),
		Some('r') => Ok('\r'),
		Some('t') => Ok('\t'),
		Some('s') => Ok(' '),
		Some('u') => {
			if chars.next() != Some('{') {
				return Err("expected '{' after \\u".to_owned());
			}
			let mut hex = String::new();
			loop {
				match chars.next() {
					Some('}') => break,
					Some(c) => hex.push(c),
					None => return Err("unterminated \\u{...} escape".to_owned()),
				}
			}
			u32::from_str_radix(&hex, 16)
				.ok()
				.and_then(char::from_u32)
				.ok_or_else(|| format!("invalid code point \\u{{{hex}}}"))
		}
		Some(c) => Err(format!("unknown escape \\{c}")),
		None => Err("dangling backslash".to_owned()),
	}
}

/// Decodes escaped text, splitting on every unescaped `separator`.
fn decode_fields(text: &str, separator: char) -> std::result::Result<Vec<Vec<Symbol>>, String> {
	let mut fields = vec![Vec::new()];
	let mut chars = text.chars();
	while let Some(c) = chars.next() {
		let symbol = match c {
			'\\' => decode_escape(&mut chars)?,
			c if c == separator => {
				fields.push(Vec::new());
				continue;
			}
			c => c,
		};
		if let Some(field) = fields.last_mut() {
			field.push(symbol);
		}
	}
	Ok(fields)
}

/// Comma-separated list of single symbols. An empty list is an empty set.
fn decode_list(text: &str) -> std::result::Result<Vec<Symbol>, String> {
	if text.is_empty() {
		return Ok(Vec::new());
	}
	decode_fields(text, ',')?
		.into_iter()
		.map(|field| match field.as_slice() {
			[symbol] => Ok(*symbol),
			_ => Err(format!("expected a single symbol, got {:?}", field.iter().collect::<String>())),
		})
		.collect()
}

/// `<symbol>:<count>` with a positive count.
fn decode_count(line: &str) -> std::result::Result<(Symbol, u64), String> {
	let fields = decode_fields(line, ':')?;
	let [symbol, count] = fields.as_slice() else {
		return Err(format!("expected <symbol>:<count>, got {line:?}"));
	};
	let [symbol] = symbol.as_slice() else {
		return Err(format!("expected a single symbol in {line:?}"));
	};
	let digits: String = count.iter().collect();
	match digits.parse::<u64>() {
		Ok(count) if count > 0 => Ok((*symbol, count)),
		_ => Err(format!("invalid count {digits:?}")),
	}
}

/// Renders `model` in the text layout.
pub fn to_text(model: &PpmModel) -> String {
	let mut out = String::new();
	let mut seen: Vec<Symbol> = model.seen_symbols().iter().copied().collect();
	seen.sort_unstable();

	let _ = writeln!(out, "{ALPHABET} {}", escape_list(model.alphabet().iter()));
	let _ = writeln!(out, "{ORDER} {}", model.order());
	let _ = writeln!(out, "{SEEN_SYMBOLS} {}", escape_list(seen.iter().copied()));
	let _ = writeln!(out, "{K0_UNIQUE_SYMBOLS} {}", seen.len());
	out.push('\n');

	out.push_str("=== K0_FREQUENCIES ===\n");
	write_counts(&mut out, model.order0());

	for k in 1..=model.order() {
		let _ = write!(out, "\n=== K{k}_CONTEXTS ===\n");
		let mut contexts: Vec<(&[Symbol], &ContextEntry)> = model.contexts_at(k).collect();
		contexts.sort_unstable_by(|a, b| a.0.cmp(b.0));
		for (context, entry) in contexts {
			out.push_str(CONTEXT);
			for symbol in context {
				escape_symbol(*symbol, &mut out);
			}
			out.push('\n');
			write_counts(&mut out, entry.frequencies());
			out.push_str(END_CONTEXT);
			out.push('\n');
		}
	}
	out
}

fn write_counts(out: &mut String, table: &FrequencyTable) {
	for (symbol, count) in table.sorted() {
		escape_symbol(symbol, out);
		let _ = writeln!(out, ":{count}");
	}
}

/// Writes `model` to `path` in the text layout.
///
/// The file is written to a sibling temporary path first and renamed into
/// place, so a failed save never leaves a truncated model behind.
pub fn save<P: AsRef<Path>>(model: &PpmModel, path: P) -> Result<()> {
	let path = path.as_ref();
	let tmp = path.with_extension("tmp");
	fs::write(&tmp, to_text(model))?;
	fs::rename(&tmp, path)?;
	info!("saved order-{} model to {}", model.order(), path.display());
	Ok(())
}

/// Reads a model back from `path`.
pub fn load<P: AsRef<Path>>(path: P) -> Result<PpmModel> {
	let path = path.as_ref();
	let model = read(BufReader::new(File::open(path)?))?;
	info!("loaded order-{} model from {}", model.order(), path.display());
	Ok(model)
}

/// Parses the text layout from a string.
pub fn from_text(text: &str) -> Result<PpmModel> {
	read(text.as_bytes())
}

/// Value of a `NAME: value` header line.
fn field<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
	line.strip_prefix(prefix).map(|v| v.strip_prefix(' ').unwrap_or(v))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Section {
	Header,
	Order0,
	Contexts(usize),
}

/// Header fields, validated once the first section starts.
#[derive(Default)]
struct Header {
	alphabet: Option<Vec<Symbol>>,
	order: Option<usize>,
	seen: Option<Vec<Symbol>>,
	k0_unique: Option<usize>,
}

/// Line-by-line parser state.
struct Parser {
	line: usize,
	header: Header,
	alphabet: Option<Alphabet>,
	order: usize,
	section: Section,
	visited: HashSet<Section>,
	order0: FrequencyTable,
	contexts: Vec<ContextTable>,
	/// Context block opened by `CONTEXT:` and not yet closed.
	open: Option<(Vec<Symbol>, ContextEntry)>,
}

impl Parser {
	fn new() -> Self {
		Self {
			line: 0,
			header: Header::default(),
			alphabet: None,
			order: 0,
			section: Section::Header,
			visited: HashSet::new(),
			order0: FrequencyTable::new(),
			contexts: Vec::new(),
			open: None,
		}
	}

	fn error(&self, reason: impl Into<String>) -> PpmError {
		PpmError::malformed(self.line, reason)
	}

	fn feed(&mut self, line: &str) -> Result<()> {
		self.line += 1;
		if line.is_empty() {
			return Ok(());
		}
		if let Some(name) = line.strip_prefix("=== ").and_then(|l| l.strip_suffix(" ===")) {
			return self.enter_section(name);
		}
		match self.section {
			Section::Header => self.header_field(line),
			Section::Order0 => {
				let (symbol, count) = decode_count(line).map_err(|e| self.error(e))?;
				self.check_symbol(symbol)?;
				if !self.order0.insert(symbol, count) {
					return Err(self.error(format!("duplicate order-0 symbol {symbol:?}")));
				}
				Ok(())
			}
			Section::Contexts(k) => self.context_line(k, line),
		}
	}

	fn header_field(&mut self, line: &str) -> Result<()> {
		if let Some(value) = field(line, ALPHABET) {
			let symbols = decode_list(value).map_err(|e| self.error(e))?;
			return self.set(|h| h.alphabet.replace(symbols).is_none(), "ALPHABET");
		}
		if let Some(value) = field(line, ORDER) {
			let order = value.trim().parse::<usize>().map_err(|_| self.error(format!("invalid order {value:?}")))?;
			return self.set(|h| h.order.replace(order).is_none(), "ORDER");
		}
		if let Some(value) = field(line, SEEN_SYMBOLS) {
			let symbols = decode_list(value).map_err(|e| self.error(e))?;
			return self.set(|h| h.seen.replace(symbols).is_none(), "SEEN_SYMBOLS");
		}
		if let Some(value) = field(line, K0_UNIQUE_SYMBOLS) {
			let unique = value
				.trim()
				.parse::<usize>()
				.map_err(|_| self.error(format!("invalid unique count {value:?}")))?;
			return self.set(|h| h.k0_unique.replace(unique).is_none(), "K0_UNIQUE_SYMBOLS");
		}
		Err(self.error(format!("unexpected line {line:?} in header")))
	}

	/// Applies a header assignment; `apply` returns false when the field was already set.
	fn set<F: FnOnce(&mut Header) -> bool>(&mut self, apply: F, name: &str) -> Result<()> {
		if apply(&mut self.header) {
			Ok(())
		} else {
			Err(self.error(format!("duplicate {name} field")))
		}
	}

	fn enter_section(&mut self, name: &str) -> Result<()> {
		if let Some((context, _)) = &self.open {
			let context: String = context.iter().collect();
			return Err(self.error(format!("context {context:?} is missing END_CONTEXT")));
		}
		if self.section == Section::Header {
			self.finish_header()?;
		}

		let section = if name == "K0_FREQUENCIES" {
			Section::Order0
		} else {
			let k = name
				.strip_prefix('K')
				.and_then(|n| n.strip_suffix("_CONTEXTS"))
				.and_then(|n| n.parse::<usize>().ok())
				.ok_or_else(|| self.error(format!("unknown section {name:?}")))?;
			if k == 0 || k > self.order {
				return Err(self.error(format!("section K{k}_CONTEXTS outside orders 1..={}", self.order)));
			}
			Section::Contexts(k)
		};
		if !self.visited.insert(section) {
			return Err(self.error(format!("duplicate section {name:?}")));
		}
		self.section = section;
		Ok(())
	}

	fn finish_header(&mut self) -> Result<()> {
		let header = std::mem::take(&mut self.header);
		let (Some(alphabet), Some(order), Some(seen), Some(k0_unique)) =
			(header.alphabet, header.order, header.seen, header.k0_unique)
		else {
			return Err(self.error("header must define ALPHABET, ORDER, SEEN_SYMBOLS and K0_UNIQUE_SYMBOLS"));
		};
		if order < 1 {
			return Err(self.error(format!("order must be >= 1, got {order}")));
		}
		let seen_count = seen.iter().collect::<HashSet<_>>().len();
		if k0_unique != seen_count {
			return Err(self.error(format!(
				"K0_UNIQUE_SYMBOLS is {k0_unique} but SEEN_SYMBOLS lists {seen_count} symbols"
			)));
		}
		self.alphabet = Some(Alphabet::new(alphabet).map_err(|e| self.error(e.to_string()))?);
		self.header.seen = Some(seen);
		self.contexts = context_tables(order)
			.ok_or_else(|| self.error(format!("cannot allocate context tables for order {order}")))?;
		self.order = order;
		Ok(())
	}

	fn check_symbol(&self, symbol: Symbol) -> Result<()> {
		match &self.alphabet {
			Some(alphabet) if alphabet.contains(symbol) => Ok(()),
			_ => Err(self.error(format!("symbol {symbol:?} is not in the alphabet"))),
		}
	}

	fn context_line(&mut self, k: usize, line: &str) -> Result<()> {
		if let Some(raw) = line.strip_prefix(CONTEXT) {
			if self.open.is_some() {
				return Err(self.error("CONTEXT opened before END_CONTEXT"));
			}
			let mut fields = decode_fields(raw, ':').map_err(|e| self.error(e))?;
			let context = match (fields.pop(), fields.is_empty()) {
				(Some(context), true) => context,
				_ => return Err(self.error(format!("unescaped ':' in context {raw:?}"))),
			};
			if context.len() != k {
				return Err(self.error(format!("context of length {} in K{k}_CONTEXTS", context.len())));
			}
			for symbol in &context {
				self.check_symbol(*symbol)?;
			}
			self.open = Some((context, ContextEntry::new()));
			return Ok(());
		}

		if line == END_CONTEXT {
			let Some((context, entry)) = self.open.take() else {
				return Err(self.error("END_CONTEXT without CONTEXT"));
			};
			if entry.frequencies().is_empty() {
				return Err(self.error("empty context block"));
			}
			if self.contexts[k - 1].insert(context, entry).is_some() {
				return Err(self.error("duplicate context"));
			}
			return Ok(());
		}

		let (symbol, count) = decode_count(line).map_err(|e| self.error(e))?;
		self.check_symbol(symbol)?;
		let line_no = self.line;
		let Some((_, entry)) = self.open.as_mut() else {
			return Err(PpmError::malformed(line_no, "count outside of a CONTEXT block"));
		};
		if !entry.insert(symbol, count) {
			return Err(PpmError::malformed(line_no, format!("duplicate symbol {symbol:?} in context")));
		}
		Ok(())
	}

	fn finish(mut self) -> Result<PpmModel> {
		if let Some((context, _)) = &self.open {
			let context: String = context.iter().collect();
			return Err(self.error(format!("unexpected end of file: context {context:?} is missing END_CONTEXT")));
		}
		if self.section == Section::Header {
			self.finish_header()?;
		}
		let (Some(alphabet), Some(seen)) = (self.alphabet, self.header.seen) else {
			return Err(PpmError::malformed(self.line, "incomplete header"));
		};
		let seen: HashSet<Symbol> = seen.into_iter().collect();
		PpmModel::from_parts(alphabet, self.order, seen, self.order0, self.contexts)
			.map_err(|reason| PpmError::malformed(self.line, reason))
	}
}

/// Parses the text layout from any buffered reader.
///
/// Fails on the first malformed line; no partially populated model is ever returned.
pub fn read<R: BufRead>(input: R) -> Result<PpmModel> {
	let mut parser = Parser::new();
	for line in input.lines() {
		parser.feed(&line?)?;
	}
	parser.finish()
}

/// Writes the postcard snapshot of `model` to `path`.
pub fn save_binary<P: AsRef<Path>>(model: &PpmModel, path: P) -> Result<()> {
	let bytes = postcard::to_stdvec(model)?;
	fs::write(path.as_ref(), bytes)?;
	debug!("wrote binary snapshot {}", path.as_ref().display());
	Ok(())
}

/// Reads a postcard snapshot and checks the same invariants as a text load.
pub fn load_binary<P: AsRef<Path>>(path: P) -> Result<PpmModel> {
	let bytes = fs::read(path.as_ref())?;
	let model: PpmModel = postcard::from_bytes(&bytes)?;
	model.validate().map_err(|reason| PpmError::malformed(0, reason))?;
	Ok(model)
}

/// Trains a model on a corpus file, reusing a binary snapshot next to it.
///
/// `books/barroco.txt` is cached as `books/barroco.bin`. The snapshot is used
/// only when its alphabet and order match the request; otherwise it is
/// discarded, the corpus is trained from scratch and the snapshot rewritten.
/// The corpus itself is not fingerprinted: delete the `.bin` after editing it.
pub fn train_file_cached<P: AsRef<Path>>(corpus: P, alphabet: &Alphabet, order: usize) -> Result<PpmModel> {
	let cache = build_output_path(&corpus, "bin")?;
	if cache.exists() {
		match load_binary(&cache) {
			Ok(model) if model.order() == order && model.alphabet() == alphabet => {
				debug!("cache hit {}", cache.display());
				return Ok(model);
			}
			Ok(_) => warn!("discarding stale snapshot {} (alphabet or order changed)", cache.display()),
			Err(e) => warn!("discarding unreadable snapshot {}: {e}", cache.display()),
		}
	} else {
		debug!("cache miss {}", cache.display());
	}

	let text = load_text(&corpus)?;
	let mut model = PpmModel::new(alphabet.clone(), order)?;
	model.train(&text)?;
	save_binary(&model, &cache)?;
	Ok(model)
}

impl PpmModel {
	/// See [`save`].
	pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
		save(self, path)
	}

	/// See [`load`].
	pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
		load(path)
	}
}
