use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::sync::Mutex;

use actix_cors::Cors;
use actix_web::{get, put, web, App, HttpResponse, HttpServer, Responder};
use log::{info, warn};
use serde::Deserialize;

use ppm_core::io::{get_filename, list_files, normalize_folder};
use ppm_core::model::classifier::classify;
use ppm_core::{PpmError, PpmModel, Symbol};

/// Extension of persisted models inside the model directory.
const MODEL_EXTENSION: &str = "ppm";

/// Symbols generated when `length` is omitted.
const DEFAULT_GENERATED_LENGTH: usize = 100;

/// Largest `length` accepted by `/v1/generate`. Generation holds the model lock.
const MAX_GENERATED_LENGTH: usize = 10_000;

/// Server settings, read from the environment.
///
/// - `PPM_BIND`: listen address (default `127.0.0.1:5000`)
/// - `PPM_MODEL_DIR`: directory holding `.ppm` models (default `./data`)
struct ServerConfig {
	bind: String,
	model_dir: PathBuf,
}

impl ServerConfig {
	fn from_env() -> Self {
		Self {
			bind: env::var("PPM_BIND").unwrap_or_else(|_| "127.0.0.1:5000".to_owned()),
			model_dir: normalize_folder(&env::var("PPM_MODEL_DIR").unwrap_or_else(|_| "./data".to_owned())),
		}
	}
}

/// Query parameters for `/v1/score`.
#[derive(Deserialize)]
struct ScoreParams {
	model: String,
	text: String,
	trace: Option<bool>,
}

/// Query parameters for `/v1/classify`.
#[derive(Deserialize)]
struct ClassifyParams {
	text: String,
}

/// Query parameters for `/v1/generate`.
#[derive(Deserialize)]
struct GenerateParams {
	model: String,
	length: Option<usize>,
	seed: Option<String>,
}

#[derive(Deserialize)]
struct ModelQuery {
	names: Option<String>,
}

/// Models currently loaded, keyed by their file name.
struct SharedData {
	models: HashMap<String, PpmModel>,
}

/// Resolves the requested generation length against the default and the cap.
fn generation_length(requested: Option<usize>) -> Result<usize, String> {
	match requested.unwrap_or(DEFAULT_GENERATED_LENGTH) {
		length if length > MAX_GENERATED_LENGTH => {
			Err(format!("length {length} exceeds the maximum of {MAX_GENERATED_LENGTH}"))
		}
		length => Ok(length),
	}
}

/// Maps a core error to the HTTP status that fits it.
fn error_response(error: PpmError) -> HttpResponse {
	match error {
		PpmError::SymbolOutsideAlphabet(_) | PpmError::EmptyScoreSequence | PpmError::UnresolvableSymbol { .. } => {
			HttpResponse::BadRequest().body(error.to_string())
		}
		PpmError::NoModels => HttpResponse::NotFound().body(error.to_string()),
		_ => HttpResponse::InternalServerError().body(error.to_string()),
	}
}

/// HTTP GET endpoint `/v1/score`
///
/// Scores `text` against one loaded model and returns the JSON report.
/// The per-symbol trace is included only with `trace=true`.
#[get("/v1/score")]
async fn get_score(data: web::Data<Mutex<SharedData>>, query: web::Query<ScoreParams>) -> impl Responder {
	let shared_data = match data.lock() {
		Ok(m) => m,
		Err(_) => return HttpResponse::InternalServerError().body("Model lock failed"),
	};
	let Some(model) = shared_data.models.get(&query.model) else {
		return HttpResponse::NotFound().body(format!("Model {} is not loaded", query.model));
	};

	let symbols: Vec<Symbol> = query.text.chars().collect();
	match model.score_sequence(&symbols) {
		Ok(mut report) => {
			if !query.trace.unwrap_or(false) {
				report.trace.clear();
			}
			HttpResponse::Ok().json(report)
		}
		Err(e) => error_response(e),
	}
}

/// HTTP GET endpoint `/v1/classify`
///
/// Scores `text` against every loaded model and returns the best label
/// with the average bits/symbol of each model.
#[get("/v1/classify")]
async fn get_classify(data: web::Data<Mutex<SharedData>>, query: web::Query<ClassifyParams>) -> impl Responder {
	let shared_data = match data.lock() {
		Ok(m) => m,
		Err(_) => return HttpResponse::InternalServerError().body("Model lock failed"),
	};

	let symbols: Vec<Symbol> = query.text.chars().collect();
	let models = shared_data.models.iter().map(|(name, model)| (name.as_str(), model));
	match classify(&symbols, models) {
		Ok(result) => HttpResponse::Ok().json(result),
		Err(e) => error_response(e),
	}
}

/// HTTP GET endpoint `/v1/generate`
///
/// Samples `length` symbols (default 100, at most 10 000) from a loaded model,
/// continuing `seed`.
#[get("/v1/generate")]
async fn get_generated(data: web::Data<Mutex<SharedData>>, query: web::Query<GenerateParams>) -> impl Responder {
	let length = match generation_length(query.length) {
		Ok(length) => length,
		Err(message) => return HttpResponse::BadRequest().body(message),
	};
	let shared_data = match data.lock() {
		Ok(m) => m,
		Err(_) => return HttpResponse::InternalServerError().body("Model lock failed"),
	};
	let Some(model) = shared_data.models.get(&query.model) else {
		return HttpResponse::NotFound().body(format!("Model {} is not loaded", query.model));
	};

	let seed: Vec<Symbol> = query.seed.as_deref().unwrap_or("").chars().collect();
	match model.generate(&seed, length, &mut rand::rng()) {
		Ok(generated) => HttpResponse::Ok().body(generated.into_iter().collect::<String>()),
		Err(e) => error_response(e),
	}
}

#[get("/v1/models")]
async fn get_models(config: web::Data<ServerConfig>) -> impl Responder {
	match list_files(&config.model_dir, MODEL_EXTENSION) {
		Ok(files) => {
			let names: Vec<String> = files.iter().filter_map(|f| get_filename(f).ok()).collect();
			HttpResponse::Ok().body(names.join("\n"))
		}
		Err(_) => HttpResponse::InternalServerError().body("Failed to list models"),
	}
}

#[get("/v1/loaded_models")]
async fn get_loaded_models(data: web::Data<Mutex<SharedData>>) -> impl Responder {
	let shared_data = match data.lock() {
		Ok(m) => m,
		Err(_) => return HttpResponse::InternalServerError().body("Model lock failed"),
	};
	let mut names: Vec<&str> = shared_data.models.keys().map(String::as_str).collect();
	names.sort_unstable();
	HttpResponse::Ok().body(names.join("\n"))
}

/// HTTP PUT endpoint `/v1/load_models?names=a,b`
///
/// Replaces the loaded set with the named models. All files are read before
/// anything is swapped in, so a failing name leaves the current set untouched.
#[put("/v1/load_models")]
async fn put_model(
	data: web::Data<Mutex<SharedData>>,
	config: web::Data<ServerConfig>,
	query: web::Query<ModelQuery>,
) -> impl Responder {
	let query_names = match &query.names {
		Some(s) if !s.trim().is_empty() => s.trim(),
		_ => return HttpResponse::BadRequest().body("Missing or empty model name"),
	};

	let mut models = HashMap::new();
	for name in query_names.split(',').map(str::trim).filter(|s| !s.is_empty()) {
		let model_path = config.model_dir.join(format!("{name}.{MODEL_EXTENSION}"));
		match PpmModel::load(&model_path) {
			Ok(model) => {
				models.insert(name.to_owned(), model);
			}
			Err(e) => {
				warn!("failed to load {}: {e}", model_path.display());
				return HttpResponse::InternalServerError().body(format!("Failed to load model {name}: {e}"));
			}
		}
	}

	let mut shared_data = match data.lock() {
		Ok(m) => m,
		Err(_) => return HttpResponse::InternalServerError().body("Model lock failed"),
	};
	shared_data.models = models;
	HttpResponse::Ok().body("Models loaded successfully")
}

/// Main entry point for the server.
///
/// Starts with no model loaded; models are brought in through `/v1/load_models`.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
	env_logger::init();
	let config = ServerConfig::from_env();
	let bind = config.bind.clone();
	info!("serving models from {} on {bind}", config.model_dir.display());

	let shared_model = web::Data::new(Mutex::new(SharedData { models: HashMap::new() }));
	let config = web::Data::new(config);

	HttpServer::new(move || {
		App::new()
			.wrap(Cors::permissive())
			.app_data(shared_model.clone())
			.app_data(config.clone())
			.service(get_score)
			.service(get_classify)
			.service(get_generated)
			.service(get_models)
			.service(put_model)
			.service(get_loaded_models)
	})
	.bind(bind)?
	.run()
	.await
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn generation_length_is_capped() {
		assert_eq!(generation_length(None), Ok(DEFAULT_GENERATED_LENGTH));
		assert_eq!(generation_length(Some(0)), Ok(0));
		assert_eq!(generation_length(Some(MAX_GENERATED_LENGTH)), Ok(MAX_GENERATED_LENGTH));
		assert!(generation_length(Some(MAX_GENERATED_LENGTH + 1)).is_err());
		assert!(generation_length(Some(usize::MAX)).is_err());
	}
}
