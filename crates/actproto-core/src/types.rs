use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// VitalKey
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalKey {
    Confidence,
    Safety,
    Memory,
    Focus,
}

impl VitalKey {
    pub fn all() -> &'static [VitalKey] {
        &[
            VitalKey::Confidence,
            VitalKey::Safety,
            VitalKey::Memory,
            VitalKey::Focus,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VitalKey::Confidence => "confidence",
            VitalKey::Safety => "safety",
            VitalKey::Memory => "memory",
            VitalKey::Focus => "focus",
        }
    }

    /// Single-letter code used in the compact `::c0.9` form.
    pub fn code(self) -> char {
        match self {
            VitalKey::Confidence => 'c',
            VitalKey::Safety => 's',
            VitalKey::Memory => 'm',
            VitalKey::Focus => 'f',
        }
    }

    pub fn from_code(c: char) -> Option<VitalKey> {
        match c.to_ascii_lowercase() {
            'c' => Some(VitalKey::Confidence),
            's' => Some(VitalKey::Safety),
            'm' => Some(VitalKey::Memory),
            'f' => Some(VitalKey::Focus),
            _ => None,
        }
    }
}

impl fmt::Display for VitalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VitalKey {
    type Err = ProtocolError;

    /// Case-insensitive; accepts the full name or the single-letter code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "confidence" | "c" => Ok(VitalKey::Confidence),
            "safety" | "s" => Ok(VitalKey::Safety),
            "memory" | "m" => Ok(VitalKey::Memory),
            "focus" | "f" => Ok(VitalKey::Focus),
            _ => Err(ProtocolError::UnknownVital(s.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Vitals
// ---------------------------------------------------------------------------

/// Self-reported model signals. `None` means unspecified, not zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<f64>,
}

impl Vitals {
    pub fn get(&self, key: VitalKey) -> Option<f64> {
        match key {
            VitalKey::Confidence => self.confidence,
            VitalKey::Safety => self.safety,
            VitalKey::Memory => self.memory,
            VitalKey::Focus => self.focus,
        }
    }

    /// Set a value, clamped to `[0, 1]`. Non-finite values are ignored.
    pub fn set(&mut self, key: VitalKey, value: f64) {
        if !value.is_finite() {
            return;
        }
        let value = value.clamp(0.0, 1.0);
        let slot = match key {
            VitalKey::Confidence => &mut self.confidence,
            VitalKey::Safety => &mut self.safety,
            VitalKey::Memory => &mut self.memory,
            VitalKey::Focus => &mut self.focus,
        };
        *slot = Some(value);
    }

    /// Overlay `other` onto `self`; keys present in `other` win.
    pub fn merge(&mut self, other: &Vitals) {
        for (key, value) in other.entries() {
            self.set(key, value);
        }
    }

    /// Specified entries in canonical key order.
    pub fn entries(&self) -> Vec<(VitalKey, f64)> {
        VitalKey::all()
            .iter()
            .filter_map(|k| self.get(*k).map(|v| (*k, v)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// One structured instruction extracted from model output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<String>,
    /// 1.0 for strict extraction, lower when recovered without delimiters.
    pub confidence: f64,
}

impl Action {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            target: None,
            parameters: BTreeMap::new(),
            content: None,
            depends_on: None,
            confidence: 1.0,
        }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }

    pub fn is_batch(&self) -> bool {
        self.kind == crate::markers::BATCH_VERB
    }
}

// ---------------------------------------------------------------------------
// ParseMode
// ---------------------------------------------------------------------------

/// Which path produced a [`ParseResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseMode {
    Strict,
    Fuzzy,
    /// An internal fault was caught; the result is empty.
    Fault,
}

impl ParseMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ParseMode::Strict => "strict",
            ParseMode::Fuzzy => "fuzzy",
            ParseMode::Fault => "fault",
        }
    }
}

impl fmt::Display for ParseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ParseResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseResult {
    pub thoughts: Vec<String>,
    pub vitals: Vitals,
    /// Execution order.
    pub actions: Vec<Action>,
    pub questions: Vec<String>,
    pub errors: Vec<String>,
    pub confidence: f64,
    pub warnings: Vec<String>,
    pub raw: String,
    pub is_batch: bool,
    pub mode: ParseMode,
}

impl ParseResult {
    pub fn new(raw: impl Into<String>, mode: ParseMode) -> Self {
        Self {
            thoughts: Vec::new(),
            vitals: Vitals::default(),
            actions: Vec::new(),
            questions: Vec::new(),
            errors: Vec::new(),
            confidence: 1.0,
            warnings: Vec::new(),
            raw: raw.into(),
            is_batch: false,
            mode,
        }
    }

    /// All reasoning joined in appearance order.
    pub fn reasoning(&self) -> String {
        self.thoughts.join("\n")
    }

    /// True if any field carries parsed structure.
    pub fn has_structure(&self) -> bool {
        !self.thoughts.is_empty()
            || !self.vitals.is_empty()
            || !self.actions.is_empty()
            || !self.questions.is_empty()
            || !self.errors.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
