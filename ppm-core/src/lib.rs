//! Prediction-by-Partial-Matching (PPM) statistical text model.
//!
//! This crate provides an adaptive, character-level PPM model including:
//! - Per-order context tables and a global order-0 table
//! - An escape/exclusion cascade estimating the probability of the next symbol
//! - Entropy (bits/symbol) accumulation and sequence scoring
//! - A line-oriented text format and a binary snapshot cache
//! - Entropy-based classification of a text against several trained models
//! - Sampling of new text from a trained model
//!
//! The estimator never mutates the model: exclusion state lives only for the
//! duration of a single `estimate` call.

/// PPM model, estimator, scoring, persistence and classification.
pub mod model;

/// I/O utilities (alphabet scanning, text loading, path helpers).
pub mod io;

/// Error type shared by the whole crate.
pub mod error;

pub use error::{PpmError, Result};
pub use model::alphabet::{Alphabet, Symbol};
pub use model::ppm_model::PpmModel;
