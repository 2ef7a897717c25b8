//! Normalization and parsing pipeline for the LLM action protocol.
//!
//! Model output goes through four stages: [`MarkdownConverter`],
//! [`preprocess`], [`AutoRepair`], then the strict parser with a fuzzy
//! fallback. [`Processor`] composes them and is the only entry point a host
//! needs.

pub mod batch;
pub mod config;
pub mod error;
pub mod fuzzy;
pub mod io;
pub mod markdown;
pub mod markers;
pub mod params;
pub mod preprocess;
pub mod processor;
pub mod render;
pub mod repair;
pub mod strict;
pub mod token;
pub mod types;

pub use batch::split_batch;
pub use config::ProtocolConfig;
pub use error::{ProtocolError, Result};
pub use fuzzy::{fuzzy_parse, FuzzyParser};
pub use markdown::MarkdownConverter;
pub use preprocess::{preprocess, Correction};
pub use processor::{Prepared, Processor};
pub use repair::{AutoRepair, RepairPass};
pub use strict::{strict_parse, StrictOutcome, StrictParser};
pub use types::{Action, ParseMode, ParseResult, VitalKey, Vitals};
