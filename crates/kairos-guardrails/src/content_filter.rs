use async_trait::async_trait;
use kairos_errors::CancellationToken;
use regex::RegexSet;

use crate::pipeline::{CheckOutcome, InputChecker, OutputFilter, Redaction};

/// A content category: a name plus the pattern/keyword set that detects it.
#[derive(Debug, Clone)]
pub struct ContentCategory {
    pub name: String,
    pub patterns: Vec<String>,
    pub keywords: Vec<String>,
}

impl ContentCategory {
    pub fn new(name: impl Into<String>, patterns: Vec<String>, keywords: Vec<String>) -> Self {
        Self {
            name: name.into(),
            patterns,
            keywords,
        }
    }
}

struct CompiledCategory {
    name: String,
    patterns: RegexSet,
    keywords: Vec<String>,
}

/// Maps categories to pattern+keyword sets (§4.4). As an input checker,
/// a match yields `blocked=true` unless `flag_only` is set; as an output
/// filter it never mutates content, only appends a `Redaction` per
/// category hit so callers can observe flags without losing the response.
pub struct ContentFilter {
    categories: Vec<CompiledCategory>,
    flag_only: bool,
}

impl ContentFilter {
    pub fn new(categories: Vec<ContentCategory>, flag_only: bool) -> Self {
        let categories = categories
            .into_iter()
            .map(|c| CompiledCategory {
                name: c.name,
                patterns: RegexSet::new(&c.patterns).expect("content-filter pattern set must compile"),
                keywords: c.keywords.into_iter().map(|k| k.to_lowercase()).collect(),
            })
            .collect();
        Self { categories, flag_only }
    }

    fn matching_categories(&self, content: &str) -> Vec<&str> {
        let lowered = content.to_lowercase();
        self.categories
            .iter()
            .filter(|category| {
                category.patterns.is_match(content)
                    || category.keywords.iter().any(|kw| lowered.contains(kw.as_str()))
            })
            .map(|category| category.name.as_str())
            .collect()
    }
}

#[async_trait]
impl InputChecker for ContentFilter {
    fn name(&self) -> &str {
        "content-filter"
    }

    async fn check(&self, input: &str, _cancel: &CancellationToken) -> CheckOutcome {
        let hits = self.matching_categories(input);
        if hits.is_empty() || self.flag_only {
            return CheckOutcome::Pass;
        }
        CheckOutcome::Block {
            reason: format!("content category matched: {}", hits.join(", ")),
        }
    }
}

#[async_trait]
impl OutputFilter for ContentFilter {
    fn name(&self) -> &str {
        "content-filter"
    }

    async fn filter(&self, content: &str) -> (String, Vec<Redaction>) {
        let redactions = self
            .matching_categories(content)
            .into_iter()
            .map(|name| Redaction {
                category: name.to_owned(),
                position: 0,
                replacement: content.to_owned(),
            })
            .collect();
        (content.to_owned(), redactions)
    }
}
