//! PPM command-line interface
//!
//! Train models from text corpora, score texts against them, classify a text
//! by minimum average bits/symbol, and inspect individual estimates.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::info;

use ppm_core::io::{build_alphabet, get_filename, list_files, load_text, normalize_folder, normalize_whitespace};
use ppm_core::model::classifier::classify;
use ppm_core::model::estimator::{Decision, Estimate};
use ppm_core::model::store::train_file_cached;
use ppm_core::{Alphabet, PpmModel, Symbol};

/// Default context length, as used for the literary period models.
const DEFAULT_ORDER: usize = 5;

#[derive(Parser)]
#[command(name = "ppm")]
#[command(about = "PPM text model - training, scoring and classification", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Commands,
}

/// Options shared by every command that reads an input text.
#[derive(clap::Args)]
struct TextOptions {
	/// Text file to read
	#[arg(long)]
	input: PathBuf,
	/// Lowercase the text and collapse whitespace runs before scoring
	#[arg(long)]
	normalize: bool,
	/// Drop symbols missing from the model alphabet instead of failing
	#[arg(long)]
	drop_unknown: bool,
}

#[derive(Subcommand)]
enum Commands {
	/// Train a model on a corpus and save it
	Train {
		/// Corpus text file
		#[arg(long)]
		corpus: PathBuf,
		/// Output model file (text layout)
		#[arg(long)]
		output: PathBuf,
		#[arg(long, default_value_t = DEFAULT_ORDER)]
		order: usize,
		/// Directory scanned recursively to build the alphabet
		#[arg(long, default_value = "books")]
		alphabet_dir: String,
		/// Extension of the files making up the alphabet
		#[arg(long, default_value = "txt")]
		extension: String,
		/// Reuse (or write) a binary snapshot next to the corpus
		#[arg(long)]
		cache: bool,
	},
	/// Score a text against a frozen model
	Score {
		#[arg(long)]
		model: PathBuf,
		#[command(flatten)]
		text: TextOptions,
		/// Print every per-symbol decision
		#[arg(long)]
		trace: bool,
	},
	/// Pick the model with the lowest average bits/symbol for a text
	Classify {
		/// Directory holding `.ppm` models; the label is the file name
		#[arg(long, default_value = "./data")]
		model_dir: String,
		#[command(flatten)]
		text: TextOptions,
	},
	/// Estimate one symbol after a history
	Estimate {
		#[arg(long)]
		model: PathBuf,
		#[arg(long)]
		symbol: char,
		#[arg(long, default_value = "")]
		history: String,
	},
	/// Sample text from a model
	Generate {
		#[arg(long)]
		model: PathBuf,
		#[arg(long, default_value_t = 200)]
		length: usize,
		#[arg(long, default_value = "")]
		seed: String,
	},
	/// Adaptively encode a short text step by step, printing every decision
	Walkthrough {
		#[arg(long, default_value = "abracadabra")]
		text: String,
		#[arg(long, default_value_t = 2)]
		order: usize,
	},
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
	env_logger::init();
	let cli = Cli::parse();

	match cli.command {
		Commands::Train { corpus, output, order, alphabet_dir, extension, cache } => {
			let alphabet = build_alphabet(normalize_folder(&alphabet_dir), &extension)?;
			info!("alphabet of {} symbols", alphabet.len());
			let model = if cache {
				train_file_cached(&corpus, &alphabet, order)?
			} else {
				let mut model = PpmModel::new(alphabet, order)?;
				model.train(&load_text(&corpus)?)?;
				model
			};
			model.save(&output)?;
			println!("Saved order-{order} model to {}", output.display());
		}
		Commands::Score { model, text, trace } => {
			let model = PpmModel::load(&model)?;
			let symbols = read_input(&text, model.alphabet())?;
			let report = model.score_sequence(&symbols)?;
			if trace {
				for (i, estimate) in report.trace.iter().enumerate() {
					println!("#{i} {:?}", estimate.symbol);
					print_estimate(estimate);
				}
			}
			println!("Total bits: {:.4}", report.total_bits);
			println!("Average entropy: {:.4} bits/symbol", report.average_bits);
			if report.unresolved > 0 {
				println!("Unresolved symbols: {}", report.unresolved);
			}
		}
		Commands::Classify { model_dir, text } => {
			let folder = normalize_folder(&model_dir);
			let mut models = Vec::new();
			for file in list_files(&folder, "ppm")? {
				let path = folder.join(&file);
				models.push((get_filename(&path)?, PpmModel::load(&path)?));
			}
			let Some((_, first)) = models.first() else {
				return Err(format!("No .ppm model found in {}", folder.display()).into());
			};
			let symbols = read_input(&text, first.alphabet())?;
			let result = classify(&symbols, models.iter().map(|(name, model)| (name.as_str(), model)))?;
			for (label, entropy) in &result.entropies {
				println!("Average entropy for '{label}': {entropy:.4} bits/symbol");
			}
			println!("Classified as: {}", result.label);
		}
		Commands::Estimate { model, symbol, history } => {
			let model = PpmModel::load(&model)?;
			let history: Vec<Symbol> = history.chars().collect();
			let estimate = model.estimate(symbol, &history)?;
			print_estimate(&estimate);
			println!("Probability: {:.6}", estimate.probability);
			if let Some(bits) = estimate.bits() {
				println!("Information: {bits:.4} bits");
			}
		}
		Commands::Generate { model, length, seed } => {
			let model = PpmModel::load(&model)?;
			let seed: Vec<Symbol> = seed.chars().collect();
			let generated = model.generate(&seed, length, &mut rand::rng())?;
			println!("{}{}", seed.iter().collect::<String>(), generated.iter().collect::<String>());
		}
		Commands::Walkthrough { text, order } => {
			let mut model = PpmModel::new(Alphabet::from_text(&text)?, order)?;
			let symbols: Vec<Symbol> = text.chars().collect();
			for (i, symbol) in symbols.iter().enumerate() {
				println!("\n--- Step {}: {symbol:?} after {:?} ---", i + 1, symbols[..i].iter().collect::<String>());
				let estimate = model.process_symbol(*symbol, &symbols[..i])?;
				print_estimate(&estimate);
				if let Some(bits) = estimate.bits() {
					println!("  = {:.4} -> {bits:.4} bits", estimate.probability);
				}
			}
			println!("\nTotal bits: {:.4}", model.stats().total_bits());
			println!("Average entropy: {:.4} bits/symbol", model.stats().average_bits()?);
		}
	}

	Ok(())
}

/// Loads and optionally cleans an input text.
fn read_input(options: &TextOptions, alphabet: &Alphabet) -> Result<Vec<Symbol>, Box<dyn std::error::Error>> {
	let mut symbols = load_text(&options.input)?;
	if options.normalize {
		symbols = normalize_whitespace(&symbols.iter().collect::<String>()).chars().collect();
	}
	if options.drop_unknown {
		let before = symbols.len();
		symbols = alphabet.retain_known(&symbols);
		info!("dropped {} symbols outside the alphabet", before - symbols.len());
	}
	Ok(symbols)
}

/// Renders the cascade of one estimate, one line per order.
fn print_estimate(estimate: &Estimate) {
	for step in &estimate.trace {
		let context: String = step.context.iter().collect();
		let level = match step.order {
			-1 => "order -1".to_owned(),
			0 => "order 0".to_owned(),
			k => format!("order {k} {context:?}"),
		};
		match step.decision {
			Decision::Missing => println!("  {level}: context never seen"),
			Decision::Uninformative => println!("  {level}: nothing left after exclusion"),
			Decision::Escape => println!("  {level}: escape {}/{} = {:.4}", step.numerator, step.denominator, step.factor),
			Decision::Found => println!("  {level}: found {}/{} = {:.4}", step.numerator, step.denominator, step.factor),
			Decision::Unresolved => println!("  {level}: symbol cannot be resolved"),
		}
	}
}
