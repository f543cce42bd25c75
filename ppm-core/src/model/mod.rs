//! Top-level module for the PPM model.
//!
//! This module provides:
//! - The fixed symbol universe (`Alphabet`)
//! - Per-context frequency bookkeeping (`FrequencyTable`, `ContextEntry`)
//! - The model itself and its updater (`PpmModel`)
//! - The escape/exclusion estimator (`Estimate`, `Step`)
//! - Entropy accumulation and scoring (`EntropyAccumulator`, `ScoreReport`)
//! - Text and binary persistence
//! - Classification and sampling on top of trained models

/// Symbol type and the immutable alphabet a model predicts over.
pub mod alphabet;

/// Frequency tables and per-context entries.
///
/// Counts only ever grow; a table is never reset once created.
pub mod context;

/// Bounded window over the most recent symbols of a stream.
pub mod history;

/// The PPM model: table hierarchy, updater and adaptive processing.
pub mod ppm_model;

/// Order-descending escape/exclusion cascade.
///
/// Read-only with respect to the model. Returns a structured trace as data.
pub mod estimator;

/// Bits/symbol accumulation and read-only sequence scoring.
pub mod entropy;

/// Line-oriented text format and the postcard binary cache.
pub mod store;

/// Pick the model with the lowest average bits/symbol for a text.
pub mod classifier;

/// Predictive distribution and random text generation.
pub mod sampler;
