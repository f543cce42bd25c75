use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::{env, fs, io};

use log::debug;
use walkdir::WalkDir;

use crate::error::Result;
use crate::model::alphabet::{Alphabet, Symbol};

/// Reads a UTF-8 text file into its sequence of symbols.
///
/// - Reads the entire file into memory
/// - One symbol per Unicode code point, nothing is normalized
pub fn load_text<P: AsRef<Path>>(path: P) -> io::Result<Vec<Symbol>> {
	Ok(fs::read_to_string(path)?.chars().collect())
}

/// Lowercases `text` and collapses every whitespace run into a single space.
///
/// Example: `"Era  uma\nVez"` → `"era uma vez"`
pub fn normalize_whitespace(text: &str) -> String {
	text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Builds the alphabet of every character found in the files with the
/// given extension below `root` (recursively). Symbolic links are not followed.
///
/// # Errors
/// - I/O errors while walking or reading
/// - `EmptyAlphabet` if no character was found
pub fn build_alphabet<P: AsRef<Path>>(root: P, extension: &str) -> Result<Alphabet> {
	let mut charset = BTreeSet::new();
	let mut files = 0usize;

	for entry in WalkDir::new(root.as_ref()).follow_links(false).sort_by_file_name() {
		let entry = entry.map_err(io::Error::from)?;
		if entry.file_type().is_file() && entry.path().extension() == Some(std::ffi::OsStr::new(extension)) {
			charset.extend(fs::read_to_string(entry.path())?.chars());
			files += 1;
		}
	}

	debug!("alphabet of {} symbols from {files} files under {}", charset.len(), root.as_ref().display());
	Alphabet::new(charset)
}

/// Builds an output path based on an input path and a new extension.
///
/// Example:
/// `books/barroco.txt` + `"bin"` → `books/barroco.bin`
pub fn build_output_path<P: AsRef<Path>>(input_path: P, output_extension: &str) -> io::Result<PathBuf> {
	let input_path = input_path.as_ref();

	let parent = input_path.parent().unwrap_or_else(|| Path::new("."));
	let file_stem = input_path
		.file_stem()
		.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Input path has no filename"))?;

	let mut output = PathBuf::from(parent);
	output.push(file_stem);
	output.set_extension(output_extension);

	Ok(output)
}

/// Extracts the base filename without extension.
///
/// Examples:
/// - `"./data/barroco.ppm"` → `"barroco"`
/// - `"barroco.ppm"` → `"barroco"`
pub fn get_filename<P: AsRef<Path>>(input_path: P) -> io::Result<String> {
	let stem = input_path
		.as_ref()
		.file_stem()
		.ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Path has no filename"))?;

	Ok(stem.to_string_lossy().to_string())
}

/// Normalize a folder path.
///
/// - `"."` or `"./"` resolves to the current working directory
/// - Other paths are returned as-is (not canonicalized)
pub fn normalize_folder(input: &str) -> PathBuf {
	if input == "." || input == "./" {
		env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
	} else {
		PathBuf::from(input)
	}
}

/// Lists all files with a given extension in a directory (not recursive).
///
/// Returns file names only (no paths), sorted.
pub fn list_files<P: AsRef<Path>>(dir: P, extension: &str) -> io::Result<Vec<String>> {
	let mut files = Vec::new();

	for entry in fs::read_dir(dir)? {
		let path = entry?.path();
		if path.is_file() && path.extension() == Some(std::ffi::OsStr::new(extension)) {
			if let Some(name) = path.file_name() {
				files.push(name.to_string_lossy().to_string());
			}
		}
	}

	files.sort();
	Ok(files)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn normalizes_whitespace_and_case() {
		assert_eq!(normalize_whitespace("  Era  uma\n\tVez "), "era uma vez");
	}

	#[test]
	fn output_path_swaps_extension() {
		let path = build_output_path("books/barroco.txt", "bin").unwrap();
		assert_eq!(path, PathBuf::from("books/barroco.bin"));
		assert_eq!(get_filename("./data/barroco.ppm").unwrap(), "barroco");
	}

	#[test]
	fn alphabet_is_the_union_of_all_matching_files() {
		let dir = tempfile::tempdir().unwrap();
		fs::create_dir(dir.path().join("nested")).unwrap();
		fs::write(dir.path().join("one.txt"), "abc").unwrap();
		fs::write(dir.path().join("nested/two.txt"), "cdé").unwrap();
		fs::write(dir.path().join("ignored.md"), "xyz").unwrap();

		let alphabet = build_alphabet(dir.path(), "txt").unwrap();
		assert_eq!(alphabet.iter().collect::<String>(), "abcdé");
		assert_eq!(list_files(dir.path(), "txt").unwrap(), vec!["one.txt".to_owned()]);
	}

	#[cfg(unix)]
	#[test]
	fn alphabet_scan_ignores_symlink_cycles() {
		let dir = tempfile::tempdir().unwrap();
		fs::create_dir(dir.path().join("nested")).unwrap();
		fs::write(dir.path().join("nested/one.txt"), "ab").unwrap();
		std::os::unix::fs::symlink(dir.path(), dir.path().join("nested/back")).unwrap();
		std::os::unix::fs::symlink(dir.path().join("nested/one.txt"), dir.path().join("alias.txt")).unwrap();

		let alphabet = build_alphabet(dir.path(), "txt").unwrap();
		assert_eq!(alphabet.iter().collect::<String>(), "ab");
	}

	#[test]
	fn load_text_splits_code_points() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("text.txt");
		fs::write(&path, "ação").unwrap();
		assert_eq!(load_text(&path).unwrap(), vec!['a', 'ç', 'ã', 'o']);
	}
}
