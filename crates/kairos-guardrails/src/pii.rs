use async_trait::async_trait;
use regex::Regex;
use sha2::{Digest, Sha256};

use crate::pipeline::{OutputFilter, Redaction};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PiiCategory {
    Email,
    Phone,
    Ssn,
    CreditCard,
    Ipv4,
    DateOfBirth,
    Passport,
    Custom(&'static str),
}

impl PiiCategory {
    fn tag(self) -> &'static str {
        match self {
            PiiCategory::Email => "EMAIL",
            PiiCategory::Phone => "PHONE",
            PiiCategory::Ssn => "SSN",
            PiiCategory::CreditCard => "CREDIT_CARD",
            PiiCategory::Ipv4 => "IPV4",
            PiiCategory::DateOfBirth => "DOB",
            PiiCategory::Passport => "PASSPORT",
            PiiCategory::Custom(tag) => tag,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PiiMode {
    /// Replace with a category tag, e.g. `[EMAIL]`.
    Mask,
    /// Remove entirely.
    Redact,
    /// Replace with a short stable hash per occurrence.
    Hash,
}

struct CategoryPattern {
    category: PiiCategory,
    regex: Regex,
}

/// Detects and transforms PII occurrences (§4.4). Replacement iterates
/// matches in reverse position order to preserve offsets.
pub struct PiiFilter {
    mode: PiiMode,
    patterns: Vec<CategoryPattern>,
}

impl PiiFilter {
    pub fn new(mode: PiiMode) -> Self {
        let defaults = vec![
            (PiiCategory::Email, r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}"),
            (PiiCategory::Phone, r"\+?\d{1,3}?[-. (]?\d{3}[-. )]?\d{3}[-. ]?\d{4}"),
            (PiiCategory::Ssn, r"\b\d{3}-\d{2}-\d{4}\b"),
            (PiiCategory::CreditCard, r"\b(?:\d[ -]*?){13,16}\b"),
            (PiiCategory::Ipv4, r"\b(?:\d{1,3}\.){3}\d{1,3}\b"),
            (PiiCategory::DateOfBirth, r"\b\d{4}-\d{2}-\d{2}\b"),
            (PiiCategory::Passport, r"\b[A-Z]{1,2}\d{6,9}\b"),
        ];
        let patterns = defaults
            .into_iter()
            .map(|(category, pattern)| CategoryPattern {
                category,
                regex: Regex::new(pattern).expect("built-in PII patterns must compile"),
            })
            .collect();
        Self { mode, patterns }
    }

    /// Registers an additional custom detection pattern.
    pub fn with_custom_pattern(mut self, tag: &'static str, pattern: &str) -> Self {
        self.patterns.push(CategoryPattern {
            category: PiiCategory::Custom(tag),
            regex: Regex::new(pattern).expect("custom PII pattern must compile"),
        });
        self
    }

    fn replacement_for(&self, category: PiiCategory, matched: &str) -> String {
        match self.mode {
            PiiMode::Mask => format!("[{}]", category.tag()),
            PiiMode::Redact => String::new(),
            PiiMode::Hash => {
                let mut hasher = Sha256::new();
                hasher.update(matched.as_bytes());
                let digest = hasher.finalize();
                format!("[{}:{}]", category.tag(), hex::encode(&digest[..4]))
            }
        }
    }

    fn apply(&self, content: &str) -> (String, Vec<Redaction>) {
        let mut matches: Vec<(usize, usize, PiiCategory, String)> = Vec::new();
        for pattern in &self.patterns {
            for m in pattern.regex.find_iter(content) {
                matches.push((m.start(), m.end(), pattern.category, m.as_str().to_owned()));
            }
        }

        // Different categories' patterns can match overlapping spans (a
        // credit-card run nested inside a phone-shaped match, say).
        // Resolve clusters by walking matches left to right, preferring the
        // longest span starting at each position, and dropping any
        // candidate that overlaps a span already selected.
        matches.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
        let mut selected: Vec<(usize, usize, PiiCategory, String)> = Vec::new();
        let mut cursor = 0usize;
        for candidate in matches {
            if candidate.0 < cursor {
                continue;
            }
            cursor = candidate.1;
            selected.push(candidate);
        }
        selected.sort_by_key(|(start, ..)| std::cmp::Reverse(*start));

        let mut output = content.to_owned();
        let mut redactions = Vec::new();
        for (start, end, category, matched) in selected {
            let replacement = self.replacement_for(category, &matched);
            output.replace_range(start..end, &replacement);
            redactions.push(Redaction {
                category: category.tag().to_owned(),
                position: start,
                replacement,
            });
        }
        redactions.reverse();
        (output, redactions)
    }
}

#[async_trait]
impl OutputFilter for PiiFilter {
    fn name(&self) -> &str {
        "pii-filter"
    }

    async fn filter(&self, content: &str) -> (String, Vec<Redaction>) {
        self.apply(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn masks_email_with_category_tag() {
        let filter = PiiFilter::new(PiiMode::Mask);
        let (output, redactions) = filter.filter("contact me at jane@example.com please").await;
        assert_eq!(output, "contact me at [EMAIL] please");
        assert_eq!(redactions.len(), 1);
    }

    #[tokio::test]
    async fn mask_mode_is_idempotent() {
        let filter = PiiFilter::new(PiiMode::Mask);
        let (once, _) = filter.filter("jane@example.com").await;
        let (twice, _) = filter.filter(&once).await;
        assert_eq!(once, twice);
    }

    #[tokio::test]
    async fn redactions_count_matches_detected_occurrences() {
        let filter = PiiFilter::new(PiiMode::Redact);
        let (_, redactions) = filter
            .filter("emails: a@example.com and b@example.com")
            .await;
        assert_eq!(redactions.len(), 2);
    }

    #[tokio::test]
    async fn overlapping_matches_across_categories_do_not_panic() {
        let filter = PiiFilter::new(PiiMode::Mask);
        let (output, redactions) = filter
            .filter("card on file: 4111111111111111, call 415-555-0100")
            .await;
        assert!(!output.contains("4111111111111111"));
        assert!(redactions.len() >= 1);
    }

    #[tokio::test]
    async fn hash_mode_is_stable_per_occurrence() {
        let filter = PiiFilter::new(PiiMode::Hash);
        let (out1, _) = filter.filter("jane@example.com").await;
        let (out2, _) = filter.filter("jane@example.com").await;
        assert_eq!(out1, out2);
    }
}
