//! The pipeline entry point.
//!
//! `Processor::process` runs markdown conversion, preprocessing and repair,
//! then the strict parser with a fuzzy fallback. It never panics and never
//! returns an error: an internal fault becomes an empty result in
//! [`ParseMode::Fault`].

use crate::config::ProtocolConfig;
use crate::error::ProtocolError;
use crate::fuzzy::FuzzyParser;
use crate::markdown::MarkdownConverter;
use crate::preprocess::{preprocess, Correction};
use crate::repair::{AutoRepair, RepairPass};
use crate::strict::{StrictOutcome, StrictParser};
use crate::types::{ParseMode, ParseResult};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

/// Text after conversion, preprocessing and repair, with what each stage did.
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    pub text: String,
    pub converted: bool,
    pub corrections: Vec<Correction>,
    pub repairs: Vec<RepairPass>,
}

impl Prepared {
    /// One warning per stage action, in pipeline order.
    pub fn notes(&self) -> Vec<String> {
        let mut notes = Vec::new();
        if self.converted {
            notes.push("converted markdown response to action protocol".to_string());
        }
        for c in &self.corrections {
            notes.push(format!("preprocess: {}", c.describe()));
        }
        for r in &self.repairs {
            notes.push(format!("repair: {}", r.describe()));
        }
        notes
    }
}

#[derive(Debug, Clone)]
pub struct Processor {
    config: ProtocolConfig,
    converter: MarkdownConverter,
    repair: AutoRepair,
    strict: StrictParser,
    fuzzy: FuzzyParser,
}

impl Default for Processor {
    fn default() -> Self {
        Self::new(ProtocolConfig::default())
    }
}

impl Processor {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            converter: MarkdownConverter::new(&config),
            repair: AutoRepair::new(&config),
            strict: StrictParser::new(&config),
            fuzzy: FuzzyParser::new(&config),
            config,
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Run the three text stages without parsing.
    pub fn prepare(&self, raw: &str) -> Prepared {
        let (text, converted) = self.converter.convert(raw);
        let (text, corrections) = preprocess(&text);
        let (text, repairs) = self.repair.repair_report(&text);
        tracing::debug!(
            converted,
            corrections = corrections.len(),
            repairs = repairs.len(),
            "prepared model output"
        );
        Prepared {
            text,
            converted,
            corrections,
            repairs,
        }
    }

    pub fn parse_strict(&self, text: &str) -> StrictOutcome {
        self.strict.parse(text)
    }

    pub fn parse_fuzzy(&self, text: &str) -> ParseResult {
        self.fuzzy.parse(text)
    }

    /// Parse raw model output. Always returns a well-formed result.
    pub fn process(&self, raw: &str) -> ParseResult {
        guard(raw, || self.run(raw))
    }

    fn run(&self, raw: &str) -> ParseResult {
        let prepared = self.prepare(raw);
        let mut result = match self.strict.parse(&prepared.text) {
            StrictOutcome::Success(r) => r,
            StrictOutcome::NeedsFallback(reason) => {
                tracing::warn!(%reason, "strict parse failed, using fuzzy fallback");
                let mut r = self.fuzzy.parse(&prepared.text);
                r.warnings
                    .push(format!("strict parse failed ({reason}); used fuzzy fallback"));
                r
            }
        };
        let mut warnings = prepared.notes();
        warnings.append(&mut result.warnings);
        result.warnings = warnings;
        result.raw = raw.to_string();
        tracing::debug!(mode = %result.mode, actions = result.actions.len(), "processed");
        result
    }
}

/// Run `f`, converting a panic into an empty fault result.
fn guard(raw: &str, f: impl FnOnce() -> ParseResult) -> ParseResult {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let err = ProtocolError::Pipeline(panic_message(payload.as_ref()));
            tracing::warn!(error = %err, "pipeline fault, returning empty result");
            let mut result = ParseResult::new(raw, ParseMode::Fault);
            result.confidence = 0.0;
            result.errors.push(err.to_string());
            result
                .warnings
                .push(format!("internal fault; returned empty result: {err}"));
            result
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
