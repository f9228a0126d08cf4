use async_trait::async_trait;
use kairos_errors::CancellationToken;

/// Result of a single input checker (§4.4): either the content passes, or it
/// is blocked with a reason.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Pass,
    Block { reason: String },
}

impl CheckOutcome {
    pub fn is_blocking(&self) -> bool {
        matches!(self, CheckOutcome::Block { .. })
    }
}

#[async_trait]
pub trait InputChecker: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self, input: &str, cancel: &CancellationToken) -> CheckOutcome;
}

/// Runs input checkers in declaration order; the first blocking result
/// short-circuits.
#[derive(Default)]
pub struct InputPipeline {
    checkers: Vec<Box<dyn InputChecker>>,
}

impl InputPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checker(mut self, checker: Box<dyn InputChecker>) -> Self {
        self.checkers.push(checker);
        self
    }

    pub async fn run(&self, input: &str, cancel: &CancellationToken) -> CheckOutcome {
        for checker in &self.checkers {
            let outcome = checker.check(input, cancel).await;
            if outcome.is_blocking() {
                return outcome;
            }
        }
        CheckOutcome::Pass
    }
}

/// A redaction performed by an output filter: the category, the byte
/// position it occurred at, and the replacement text.
#[derive(Debug, Clone, PartialEq)]
pub struct Redaction {
    pub category: String,
    pub position: usize,
    pub replacement: String,
}

#[async_trait]
pub trait OutputFilter: Send + Sync {
    fn name(&self) -> &str;
    /// Returns the (possibly mutated) content and any redactions performed.
    async fn filter(&self, content: &str) -> (String, Vec<Redaction>);
}

/// Runs output filters in order, chaining content through each.
#[derive(Default)]
pub struct OutputPipeline {
    filters: Vec<Box<dyn OutputFilter>>,
}

impl OutputPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filter(mut self, filter: Box<dyn OutputFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub async fn run(&self, content: &str) -> (String, Vec<Redaction>) {
        let mut current = content.to_owned();
        let mut redactions = Vec::new();
        for filter in &self.filters {
            let (next, mut filter_redactions) = filter.filter(&current).await;
            current = next;
            redactions.append(&mut filter_redactions);
        }
        (current, redactions)
    }
}
