//! Normalization policy.

use serde::{Deserialize, Serialize};

/// Default maximum input size, in characters.
pub const DEFAULT_MAX_CHARS: usize = 200_000;

/// Identifier of the built-in sentence segmentation model.
pub const DEFAULT_SEGMENTER_MODEL: &str = "uax29";

/// Configuration for [`crate::TextNormalizer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Name of the segmentation model. Part of the fingerprint namespace.
    pub model: String,

    /// Casing policy applied to the output.
    pub case: CasePolicy,

    /// Drop lines that carry no content (rules, page numbers).
    pub strip_boilerplate: bool,

    /// Remove stop-words from every unit.
    pub strip_stopwords: bool,

    /// Remove tokens made only of punctuation.
    pub strip_punctuation: bool,

    /// Maximum accepted input length, in characters.
    pub max_chars: usize,
}

impl NormalizerConfig {
    /// Set the casing policy.
    pub fn with_case(mut self, case: CasePolicy) -> Self {
        self.case = case;
        self
    }

    /// Enable or disable stop-word removal.
    pub fn with_stopword_removal(mut self, enabled: bool) -> Self {
        self.strip_stopwords = enabled;
        self
    }

    /// Enable or disable punctuation-only token removal.
    pub fn with_punctuation_removal(mut self, enabled: bool) -> Self {
        self.strip_punctuation = enabled;
        self
    }

    /// Enable or disable boilerplate line removal.
    pub fn with_boilerplate_removal(mut self, enabled: bool) -> Self {
        self.strip_boilerplate = enabled;
        self
    }

    /// Set the maximum input length.
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_SEGMENTER_MODEL.to_string(),
            case: CasePolicy::Preserve,
            strip_boilerplate: true,
            strip_stopwords: false,
            strip_punctuation: false,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }
}

/// How casing is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CasePolicy {
    /// Keep the original casing.
    #[default]
    Preserve,

    /// Lowercase everything.
    Lowercase,
}
