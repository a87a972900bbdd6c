//! Cleaning and sentence segmentation.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;
use unicode_segmentation::UnicodeSegmentation;

use crate::config::{CasePolicy, NormalizerConfig};
use crate::error::{NormalizationError, Result};
use crate::stopwords::is_stopword;

/// Markers that open a list item. Each item becomes its own paragraph.
const BULLETS: &[&str] = &["- ", "* ", "• ", "· ", "‣ "];

/// Output of [`TextNormalizer::normalize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedText {
    /// Sentence units joined with `\n`.
    pub text: String,

    /// Sentence units, in document order.
    pub units: Vec<String>,
}

impl NormalizedText {
    /// The normalized text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of sentence units.
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }
}

/// Cleans raw text and segments it into sentence units.
///
/// Segmentation follows UAX #29 sentence boundaries, so output is stable for
/// a given input as long as the Unicode tables do not change. The version of
/// those tables is folded into [`TextNormalizer::model_version`].
#[derive(Debug, Clone, Default)]
pub struct TextNormalizer {
    config: NormalizerConfig,
}

impl TextNormalizer {
    /// Create a normalizer with the given policy.
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Create a normalizer with the default policy.
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// The active policy.
    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Identifier of the segmentation model and Unicode tables in use.
    pub fn model_version(&self) -> String {
        let (major, minor, patch) = unicode_segmentation::UNICODE_VERSION;
        format!("{}@unicode-{major}.{minor}.{patch}", self.config.model)
    }

    /// Normalize raw bytes, rejecting anything that is not UTF-8.
    pub fn normalize_bytes(&self, raw: &[u8]) -> Result<NormalizedText> {
        let text = std::str::from_utf8(raw).map_err(|e| NormalizationError::NotUtf8 {
            valid_up_to: e.valid_up_to(),
        })?;
        self.normalize(text)
    }

    /// Normalize raw text.
    pub fn normalize(&self, raw: &str) -> Result<NormalizedText> {
        let length = raw.chars().count();
        if length > self.config.max_chars {
            return Err(NormalizationError::TooLong {
                length,
                max_length: self.config.max_chars,
            });
        }

        let mut units = Vec::new();
        for paragraph in self.paragraphs(raw) {
            for sentence in paragraph.split_sentence_bounds() {
                if let Some(unit) = self.finish_unit(sentence) {
                    units.push(unit);
                }
            }
        }

        if units.is_empty() {
            return Err(NormalizationError::Empty);
        }

        debug!("Normalized {length} chars into {} units", units.len());

        Ok(NormalizedText {
            text: units.join("\n"),
            units,
        })
    }

    /// Lowercased content words of `text`, deduplicated and sorted.
    pub fn key_terms(&self, text: &str) -> Vec<String> {
        text.unicode_words()
            .map(str::to_lowercase)
            .filter(|w| w.chars().count() >= 2)
            .filter(|w| w.chars().any(char::is_alphabetic))
            .filter(|w| !is_stopword(w))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Group cleaned lines into paragraphs. Blank lines and list markers
    /// start a new paragraph; wrapped lines are joined with a space.
    fn paragraphs(&self, raw: &str) -> Vec<String> {
        let mut paragraphs = Vec::new();
        let mut current: Vec<String> = Vec::new();

        for line in raw.lines() {
            let line = clean_line(line);
            if line.is_empty() {
                flush(&mut current, &mut paragraphs);
                continue;
            }
            if self.config.strip_boilerplate && is_boilerplate(&line) {
                continue;
            }
            if let Some(item) = BULLETS.iter().find_map(|b| line.strip_prefix(b)) {
                flush(&mut current, &mut paragraphs);
                current.push(item.to_string());
                flush(&mut current, &mut paragraphs);
                continue;
            }
            current.push(line);
        }
        flush(&mut current, &mut paragraphs);

        paragraphs
    }

    fn finish_unit(&self, sentence: &str) -> Option<String> {
        let sentence = sentence.trim();
        if !sentence.chars().any(char::is_alphanumeric) {
            return None;
        }

        let unit = if self.config.strip_stopwords || self.config.strip_punctuation {
            sentence
                .split_whitespace()
                .filter(|token| self.keep_token(token))
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            sentence.to_string()
        };

        if unit.is_empty() {
            return None;
        }

        Some(match self.config.case {
            CasePolicy::Preserve => unit,
            CasePolicy::Lowercase => unit.to_lowercase(),
        })
    }

    fn keep_token(&self, token: &str) -> bool {
        let bare = token.trim_matches(|c: char| !c.is_alphanumeric());
        if bare.is_empty() {
            return !self.config.strip_punctuation;
        }
        !(self.config.strip_stopwords && is_stopword(bare))
    }
}

fn flush(current: &mut Vec<String>, paragraphs: &mut Vec<String>) {
    if !current.is_empty() {
        paragraphs.push(current.join(" "));
        current.clear();
    }
}

/// Drop control characters and collapse whitespace runs into one space.
fn clean_line(line: &str) -> String {
    let mapped: String = line
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some(' ')
            } else if c.is_control() {
                None
            } else {
                Some(c)
            }
        })
        .collect();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lines with no content: rules, bare page numbers, `Page 3 of 7`.
fn is_boilerplate(line: &str) -> bool {
    if !line.chars().any(char::is_alphanumeric) {
        return true;
    }

    let lower = line.to_lowercase();
    let trimmed = lower.trim_matches(|c: char| c == '-' || c.is_whitespace());
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }

    let words: Vec<&str> = trimmed.split_whitespace().collect();
    match words.as_slice() {
        ["page", n] => is_number(n),
        ["page", n, "of", m] => is_number(n) && is_number(m),
        _ => false,
    }
}

fn is_number(word: &str) -> bool {
    !word.is_empty() && word.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_is_deterministic() {
        let normalizer = TextNormalizer::with_defaults();
        let raw = "First sentence here.  Second   one follows!\n\nA new paragraph?";

        let a = normalizer.normalize(raw).unwrap();
        let b = normalizer.normalize(raw).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_segments_sentences() {
        let normalizer = TextNormalizer::with_defaults();
        let result = normalizer
            .normalize("The cat sat on the mat. It was happy.")
            .unwrap();

        assert_eq!(
            result.units,
            vec!["The cat sat on the mat.".to_string(), "It was happy.".to_string()]
        );
        assert_eq!(result.text, "The cat sat on the mat.\nIt was happy.");
    }

    #[test]
    fn test_collapses_whitespace_and_strips_controls() {
        let normalizer = TextNormalizer::with_defaults();
        let result = normalizer
            .normalize("Hello\u{0007}   world\t\tagain.\r\n")
            .unwrap();

        assert_eq!(result.text, "Hello world again.");
    }

    #[test]
    fn test_wrapped_lines_join_into_one_sentence() {
        let normalizer = TextNormalizer::with_defaults();
        let result = normalizer
            .normalize("Experienced engineer with\nten years in storage systems.")
            .unwrap();

        assert_eq!(
            result.units,
            vec!["Experienced engineer with ten years in storage systems.".to_string()]
        );
    }

    #[test]
    fn test_bullets_become_units() {
        let normalizer = TextNormalizer::with_defaults();
        let result = normalizer
            .normalize("Skills\n- Rust programming\n- Distributed systems")
            .unwrap();

        assert_eq!(
            result.units,
            vec![
                "Skills".to_string(),
                "Rust programming".to_string(),
                "Distributed systems".to_string(),
            ]
        );
    }

    #[test]
    fn test_strips_boilerplate() {
        let normalizer = TextNormalizer::with_defaults();
        let raw = "Summary of work.\n-----\nPage 2 of 5\n- 3 -\nMore text.";
        let result = normalizer.normalize(raw).unwrap();

        assert_eq!(result.text, "Summary of work.\nMore text.");
    }

    #[test]
    fn test_boilerplate_kept_when_disabled() {
        let normalizer =
            TextNormalizer::new(NormalizerConfig::default().with_boilerplate_removal(false));
        let result = normalizer.normalize("Page 2\n\nBody text.").unwrap();

        assert_eq!(result.units, vec!["Page 2".to_string(), "Body text.".to_string()]);
    }

    #[test]
    fn test_lowercase_policy() {
        let normalizer =
            TextNormalizer::new(NormalizerConfig::default().with_case(CasePolicy::Lowercase));
        let result = normalizer.normalize("Rust And Go.").unwrap();

        assert_eq!(result.text, "rust and go.");
    }

    #[test]
    fn test_stopword_and_punctuation_removal() {
        let config = NormalizerConfig::default()
            .with_stopword_removal(true)
            .with_punctuation_removal(true);
        let normalizer = TextNormalizer::new(config);
        let result = normalizer.normalize("The cat sat on the mat -- quietly.").unwrap();

        assert_eq!(result.text, "cat sat mat quietly.");
    }

    #[test]
    fn test_default_policy_keeps_content() {
        let normalizer = TextNormalizer::with_defaults();
        let result = normalizer.normalize("The cat sat on the mat.").unwrap();

        assert_eq!(result.text, "The cat sat on the mat.");
    }

    #[test]
    fn test_rejects_too_long() {
        let normalizer = TextNormalizer::new(NormalizerConfig::default().with_max_chars(5));
        let err = normalizer.normalize("abcdef").unwrap_err();

        assert_eq!(
            err,
            NormalizationError::TooLong {
                length: 6,
                max_length: 5
            }
        );
    }

    #[test]
    fn test_rejects_invalid_utf8() {
        let normalizer = TextNormalizer::with_defaults();
        let err = normalizer.normalize_bytes(&[b'o', b'k', 0xff, 0xfe]).unwrap_err();

        assert_eq!(err, NormalizationError::NotUtf8 { valid_up_to: 2 });
    }

    #[test]
    fn test_rejects_empty() {
        let normalizer = TextNormalizer::with_defaults();

        assert_eq!(normalizer.normalize("").unwrap_err(), NormalizationError::Empty);
        assert_eq!(
            normalizer.normalize(" \n\t --- \n").unwrap_err(),
            NormalizationError::Empty
        );
    }

    #[test]
    fn test_key_terms() {
        let normalizer = TextNormalizer::with_defaults();
        let terms = normalizer.key_terms("The Rust compiler and the rust toolchain, v2.");

        assert_eq!(
            terms,
            vec![
                "compiler".to_string(),
                "rust".to_string(),
                "toolchain".to_string(),
                "v2".to_string(),
            ]
        );
    }

    #[test]
    fn test_model_version_names_segmenter() {
        let normalizer = TextNormalizer::with_defaults();
        assert!(normalizer.model_version().starts_with("uax29@unicode-"));
    }
}
