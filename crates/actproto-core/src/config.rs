use crate::error::{ProtocolError, Result};
use crate::types::{VitalKey, Vitals};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// File name the CLI looks for when walking up from the working directory.
pub const CONFIG_FILE: &str = ".actproto.yaml";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// FilenameKeyword
// ---------------------------------------------------------------------------

/// Maps a word seen near a code block to the file stem it implies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilenameKeyword {
    pub keyword: String,
    pub stem: String,
}

fn default_filename_keywords() -> Vec<FilenameKeyword> {
    [
        ("auth", "auth"),
        ("test", "test"),
        ("config", "config"),
        ("util", "utils"),
        ("helper", "helpers"),
        ("main", "main"),
        ("app", "app"),
        ("server", "server"),
        ("client", "client"),
        ("model", "models"),
        ("view", "views"),
        ("controller", "controller"),
    ]
    .iter()
    .map(|(k, s)| FilenameKeyword {
        keyword: k.to_string(),
        stem: s.to_string(),
    })
    .collect()
}

// ---------------------------------------------------------------------------
// FuzzyConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzyConfig {
    /// Confidence for actions whose content was delimited by `<<<`/`>>>`.
    #[serde(default = "default_explicit_confidence")]
    pub explicit_confidence: f64,
    /// Confidence for actions whose content was collected by lookahead.
    #[serde(default = "default_implicit_confidence")]
    pub implicit_confidence: f64,
    #[serde(default = "default_low_threshold")]
    pub low_confidence_threshold: f64,
    /// Applied once per action below the threshold.
    #[serde(default = "default_low_penalty")]
    pub low_confidence_penalty: f64,
    /// Applied when no action was found at all.
    #[serde(default = "default_no_action_penalty")]
    pub no_action_penalty: f64,
}

fn default_explicit_confidence() -> f64 {
    0.95
}

fn default_implicit_confidence() -> f64 {
    0.7
}

fn default_low_threshold() -> f64 {
    0.8
}

fn default_low_penalty() -> f64 {
    0.8
}

fn default_no_action_penalty() -> f64 {
    0.5
}

impl Default for FuzzyConfig {
    fn default() -> Self {
        Self {
            explicit_confidence: default_explicit_confidence(),
            implicit_confidence: default_implicit_confidence(),
            low_confidence_threshold: default_low_threshold(),
            low_confidence_penalty: default_low_penalty(),
            no_action_penalty: default_no_action_penalty(),
        }
    }
}

// ---------------------------------------------------------------------------
// ProtocolConfig (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Words that start an action line when the model forgot the `::` prefix.
    #[serde(default = "default_verbs")]
    pub verbs: Vec<String>,
    #[serde(default = "default_run_verb")]
    pub run_verb: String,
    /// Code-fence language tag → file extension.
    #[serde(default = "default_extensions")]
    pub extensions: BTreeMap<String, String>,
    /// Checked in order; first hit wins.
    #[serde(default = "default_filename_keywords")]
    pub filename_keywords: Vec<FilenameKeyword>,
    #[serde(default = "default_markdown_vitals")]
    pub markdown_vitals: Vitals,
    #[serde(default = "default_prose_vitals")]
    pub prose_vitals: Vitals,
    #[serde(default)]
    pub fuzzy: FuzzyConfig,
}

fn default_verbs() -> Vec<String> {
    [
        "create",
        "edit",
        "delete",
        "update",
        "write",
        "read",
        "run",
        "execute",
        "finish",
        "response",
        "report",
        "propose_plan",
        "duck_call",
        "read_file",
        "create_file",
        "edit_file",
        "delete_file",
        "write_file",
        "list_files",
        "search_files",
        "run_command",
        "execute_batch",
        "ask_user",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_run_verb() -> String {
    "run_command".to_string()
}

fn default_extensions() -> BTreeMap<String, String> {
    [
        ("python", "py"),
        ("py", "py"),
        ("javascript", "js"),
        ("js", "js"),
        ("jsx", "jsx"),
        ("typescript", "ts"),
        ("ts", "ts"),
        ("tsx", "tsx"),
        ("rust", "rs"),
        ("rs", "rs"),
        ("go", "go"),
        ("java", "java"),
        ("kotlin", "kt"),
        ("swift", "swift"),
        ("c", "c"),
        ("cpp", "cpp"),
        ("c++", "cpp"),
        ("csharp", "cs"),
        ("cs", "cs"),
        ("ruby", "rb"),
        ("php", "php"),
        ("bash", "sh"),
        ("sh", "sh"),
        ("shell", "sh"),
        ("html", "html"),
        ("css", "css"),
        ("json", "json"),
        ("yaml", "yaml"),
        ("yml", "yaml"),
        ("toml", "toml"),
        ("sql", "sql"),
        ("markdown", "md"),
        ("md", "md"),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn vitals(c: f64, s: f64, m: f64, f: f64) -> Vitals {
    let mut v = Vitals::default();
    v.set(VitalKey::Confidence, c);
    v.set(VitalKey::Safety, s);
    v.set(VitalKey::Memory, m);
    v.set(VitalKey::Focus, f);
    v
}

fn default_markdown_vitals() -> Vitals {
    vitals(0.7, 0.8, 0.7, 0.8)
}

fn default_prose_vitals() -> Vitals {
    vitals(0.5, 0.9, 0.5, 0.5)
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            verbs: default_verbs(),
            run_verb: default_run_verb(),
            extensions: default_extensions(),
            filename_keywords: default_filename_keywords(),
            markdown_vitals: default_markdown_vitals(),
            prose_vitals: default_prose_vitals(),
            fuzzy: FuzzyConfig::default(),
        }
    }
}

impl ProtocolConfig {
    /// Extension for a fence language tag; `txt` when unknown or absent.
    pub fn extension_for(&self, lang: &str) -> &str {
        self.extensions
            .get(&lang.trim().to_ascii_lowercase())
            .map(String::as_str)
            .unwrap_or("txt")
    }

    /// Case-insensitive; surrounding whitespace on either side is ignored.
    pub fn is_known_verb(&self, word: &str) -> bool {
        let word = word.trim();
        !word.is_empty() && self.verbs.iter().any(|v| v.trim().eq_ignore_ascii_case(word))
    }

    /// Parse a config file without validating it.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ProtocolError::ConfigNotFound(path.to_path_buf()));
        }
        let data = std::fs::read_to_string(path)?;
        // An empty file deserializes to unit; treat it as all-defaults.
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        let cfg: ProtocolConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Parse a config file and reject it if validation reports any error.
    pub fn load(path: &Path) -> Result<Self> {
        let cfg = Self::read(path)?;
        let errors: Vec<String> = cfg
            .validate()
            .into_iter()
            .filter(|w| w.level == WarnLevel::Error)
            .map(|w| w.message)
            .collect();
        if !errors.is_empty() {
            return Err(ProtocolError::InvalidConfig(errors.join("; ")));
        }
        Ok(cfg)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.verbs.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "verbs is empty: lines missing the '::' prefix will not be repaired"
                    .to_string(),
            });
        }

        for verb in &self.verbs {
            if verb.trim().is_empty() || verb.chars().any(char::is_whitespace) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("verb '{verb}' must be a single non-empty word"),
                });
            }
        }

        if self.run_verb.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "run_verb must not be empty".to_string(),
            });
        } else if !self.is_known_verb(&self.run_verb) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!("run_verb '{}' is not listed in verbs", self.run_verb),
            });
        }

        for (lang, ext) in &self.extensions {
            if lang.trim().is_empty() || ext.trim().is_empty() || ext.contains('.') {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!(
                        "extension entry '{lang}: {ext}' must map a language to a bare extension"
                    ),
                });
            }
        }

        for kw in &self.filename_keywords {
            if kw.keyword.trim().is_empty() || kw.stem.trim().is_empty() {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!(
                        "filename keyword '{}' → '{}' has an empty side",
                        kw.keyword, kw.stem
                    ),
                });
            }
        }

        for (name, vitals) in [
            ("markdown_vitals", &self.markdown_vitals),
            ("prose_vitals", &self.prose_vitals),
        ] {
            for (key, value) in vitals.entries() {
                if !(0.0..=1.0).contains(&value) {
                    warnings.push(ConfigWarning {
                        level: WarnLevel::Error,
                        message: format!("{name}.{key}={value} is outside [0, 1]"),
                    });
                }
            }
        }

        let f = &self.fuzzy;
        for (name, value) in [
            ("fuzzy.explicit_confidence", f.explicit_confidence),
            ("fuzzy.implicit_confidence", f.implicit_confidence),
            ("fuzzy.low_confidence_threshold", f.low_confidence_threshold),
            ("fuzzy.low_confidence_penalty", f.low_confidence_penalty),
            ("fuzzy.no_action_penalty", f.no_action_penalty),
        ] {
            if !(0.0..=1.0).contains(&value) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("{name}={value} is outside [0, 1]"),
                });
            }
        }

        if f.implicit_confidence >= f.explicit_confidence {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "fuzzy.implicit_confidence ({}) should be lower than explicit_confidence ({})",
                    f.implicit_confidence, f.explicit_confidence
                ),
            });
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
