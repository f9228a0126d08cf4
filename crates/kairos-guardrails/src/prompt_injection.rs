use async_trait::async_trait;
use kairos_errors::CancellationToken;
use regex::RegexSet;

use crate::pipeline::{CheckOutcome, InputChecker};

/// Fail-closed (default) blocks with "cancelled" on a cancelled check;
/// fail-open lets the content pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailBehavior {
    FailClosed,
    FailOpen,
}

const DEFAULT_PATTERNS: &[&str] = &[
    r"ignore (all )?(previous|prior|above) instructions",
    r"disregard (all )?(previous|prior|above) (instructions|rules)",
    r"you are now (in )?(developer|dan|jailbreak) mode",
    r"reveal (your|the) (system prompt|instructions)",
    r"act as if you have no (restrictions|guardrails|filters)",
    r"pretend (you are|to be) an? (unfiltered|unrestricted)",
    r"override (your|the) (safety|guardrail)",
];

/// Matches a compiled pattern set against lowercased input (§4.4). In strict
/// mode, any single match blocks; otherwise confidence scales as
/// `0.7 + 0.1*(matches-1)` capped at 1.0, compared against `threshold`
/// (default 0, i.e. any positive confidence blocks).
pub struct PromptInjectionDetector {
    patterns: RegexSet,
    strict: bool,
    threshold: f64,
    fail_behavior: FailBehavior,
}

impl Default for PromptInjectionDetector {
    fn default() -> Self {
        Self::new(DEFAULT_PATTERNS.iter().map(|s| s.to_string()).collect(), true, 0.0, FailBehavior::FailClosed)
    }
}

impl PromptInjectionDetector {
    pub fn new(patterns: Vec<String>, strict: bool, threshold: f64, fail_behavior: FailBehavior) -> Self {
        let patterns = RegexSet::new(patterns).expect("prompt-injection pattern set must compile");
        Self {
            patterns,
            strict,
            threshold,
            fail_behavior,
        }
    }

    fn confidence(match_count: usize) -> f64 {
        if match_count == 0 {
            0.0
        } else {
            (0.7 + 0.1 * (match_count as f64 - 1.0)).min(1.0)
        }
    }
}

#[async_trait]
impl InputChecker for PromptInjectionDetector {
    fn name(&self) -> &str {
        "prompt-injection"
    }

    async fn check(&self, input: &str, cancel: &CancellationToken) -> CheckOutcome {
        if cancel.is_cancelled() {
            return match self.fail_behavior {
                FailBehavior::FailClosed => CheckOutcome::Block {
                    reason: "cancelled".to_owned(),
                },
                FailBehavior::FailOpen => CheckOutcome::Pass,
            };
        }

        let lowered = input.to_lowercase();
        let matches: Vec<usize> = self.patterns.matches(&lowered).into_iter().collect();

        if matches.is_empty() {
            return CheckOutcome::Pass;
        }

        if self.strict {
            return CheckOutcome::Block {
                reason: format!("prompt-injection pattern matched ({} hits)", matches.len()),
            };
        }

        let confidence = Self::confidence(matches.len());
        if confidence > self.threshold {
            CheckOutcome::Block {
                reason: format!("prompt-injection confidence {confidence:.2} exceeded threshold {:.2}", self.threshold),
            }
        } else {
            CheckOutcome::Pass
        }
    }
}
