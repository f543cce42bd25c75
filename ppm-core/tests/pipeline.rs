use std::fs;

use ppm_core::io::{build_alphabet, load_text, normalize_whitespace};
use ppm_core::model::classifier::classify;
use ppm_core::model::store::{from_text, load, to_text, train_file_cached};
use ppm_core::{Alphabet, PpmError, PpmModel, Symbol};

fn symbols(text: &str) -> Vec<Symbol> {
	text.chars().collect()
}

#[test]
fn abracadabra_scenario() {
	let alphabet = Alphabet::new(['a', 'b', 'c', 'd', 'r']).unwrap();
	let mut model = PpmModel::new(alphabet, 2).unwrap();
	let stream = symbols("abracadabra");
	model.process(&stream).unwrap();

	assert_eq!(model.order0().count('a'), 5);
	assert_eq!(model.order0().count('b'), 2);
	assert_eq!(model.order0().count('r'), 2);
	assert_eq!(model.order0().count('c'), 1);
	assert_eq!(model.order0().count('d'), 1);
	assert_eq!(model.seen_symbols().len(), 5);

	let estimate = model.estimate('a', &stream[..10]).unwrap();
	assert!(estimate.found);
	assert_eq!(estimate.order, Some(2));
	assert!(estimate.probability > 0.0);

	// Adaptive cost of the whole stream, from the hand-computed per-symbol probabilities.
	let expected: f64 = [5.0, 8.0, 6.0, 6.0, 10.0, 4.5, 6.0, 7.0 / 3.0, 6.0, 2.0, 2.0]
		.iter()
		.map(|inverse: &f64| inverse.log2())
		.sum();
	assert!((model.stats().total_bits() - expected).abs() < 1e-9);
	assert!((model.stats().average_bits().unwrap() - expected / 11.0).abs() < 1e-9);
}

#[test]
fn empty_history_falls_through_to_uniform() {
	let model = PpmModel::new(Alphabet::from_text("abcdr").unwrap(), 3).unwrap();
	let estimate = model.estimate('d', &[]).unwrap();
	assert_eq!(estimate.order, Some(-1));
	assert!((estimate.probability - 1.0 / 5.0).abs() < 1e-12);
}

#[test]
fn train_save_load_classify() {
	let dir = tempfile::tempdir().unwrap();
	let books = dir.path().join("books");
	fs::create_dir_all(books.join("vowels")).unwrap();
	fs::create_dir_all(books.join("consonants")).unwrap();
	let vowels = books.join("vowels/corpus.txt");
	let consonants = books.join("consonants/corpus.txt");
	fs::write(&vowels, "aeiou uoiea aeiou eaiou ".repeat(30)).unwrap();
	fs::write(&consonants, "bcdfg gfdcb bcdfg cbdgf ".repeat(30)).unwrap();

	let alphabet = build_alphabet(&books, "txt").unwrap();
	assert_eq!(alphabet.len(), 11);

	let vowel_model = train_file_cached(&vowels, &alphabet, 3).unwrap();
	assert!(books.join("vowels/corpus.bin").exists());
	let consonant_model = train_file_cached(&consonants, &alphabet, 3).unwrap();

	// Cached snapshot is reused and equivalent.
	let cached = train_file_cached(&vowels, &alphabet, 3).unwrap();
	assert_eq!(to_text(&cached), to_text(&vowel_model));

	// A different order invalidates the snapshot.
	let retrained = train_file_cached(&vowels, &alphabet, 2).unwrap();
	assert_eq!(retrained.order(), 2);

	let vowel_path = dir.path().join("vowels.ppm");
	let consonant_path = dir.path().join("consonants.ppm");
	vowel_model.save(&vowel_path).unwrap();
	consonant_model.save(&consonant_path).unwrap();
	let vowel_loaded = load(&vowel_path).unwrap();
	let consonant_loaded = load(&consonant_path).unwrap();

	let text = symbols(&normalize_whitespace("  IOU   aei "));
	let before = vowel_loaded.score_sequence(&text).unwrap();
	let original = vowel_model.score_sequence(&text).unwrap();
	assert_eq!(before.total_bits.to_bits(), original.total_bits.to_bits());

	let result = classify(&text, [("vowels", &vowel_loaded), ("consonants", &consonant_loaded)]).unwrap();
	assert_eq!(result.label, "vowels");
}

#[test]
fn round_trip_preserves_every_estimate() {
	let dir = tempfile::tempdir().unwrap();
	let corpus = dir.path().join("corpus.txt");
	fs::write(&corpus, "she sells sea shells by the sea shore, the shells she sells are surely seashells").unwrap();
	let text = load_text(&corpus).unwrap();
	let alphabet = Alphabet::new(text.iter().copied()).unwrap();
	let mut model = PpmModel::new(alphabet, 4).unwrap();
	model.train(&text).unwrap();

	let loaded = from_text(&to_text(&model)).unwrap();
	for i in 0..=text.len() {
		for symbol in model.alphabet().iter() {
			let left = model.estimate(symbol, &text[..i]).unwrap();
			let right = loaded.estimate(symbol, &text[..i]).unwrap();
			assert_eq!(left.probability.to_bits(), right.probability.to_bits());
			assert_eq!(left.order, right.order);
		}
	}
}

#[test]
fn truncated_file_is_rejected_whole() {
	let mut model = PpmModel::new(Alphabet::from_text("abcdr").unwrap(), 2).unwrap();
	model.train(&symbols("abracadabra")).unwrap();
	let text = to_text(&model);
	let cut = text.rfind("END_CONTEXT").unwrap();
	let result = from_text(&text[..cut]);
	assert!(matches!(result, Err(PpmError::MalformedPersistedModel { .. })));
}
