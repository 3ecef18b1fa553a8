//! Ordered fallback chains over unreliable lookups
//!
//! A [`StrategyChain`] tries each [`Strategy`] in turn, each under its own
//! timeout, and returns the first result that passes the chain's validator.
//! Failures are logged and collected; they never abort the chain.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use super::client::LookupError;

/// A single named way of turning an input into an `O`
#[async_trait]
pub trait Strategy<O>: Send + Sync {
    fn name(&self) -> &'static str;

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn attempt(&self, input: &str) -> Result<O, LookupError>;
}

/// One strategy's failure inside a chain run
#[derive(Debug, Clone)]
pub struct StrategyFailure {
    /// 1-based position in the chain
    pub index: usize,
    pub name: &'static str,
    pub error: LookupError,
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}: {}", self.index, self.name, self.error)
    }
}

/// Every strategy in the chain failed
#[derive(Error, Debug)]
#[error("all {} strategies failed for '{input}'", .failures.len())]
pub struct ChainError {
    pub input: String,
    pub failures: Vec<StrategyFailure>,
}

/// The winning result and which strategy produced it
#[derive(Debug, Clone)]
pub struct ChainSuccess<O> {
    pub value: O,
    pub index: usize,
    pub name: &'static str,
}

type Validator<O> = fn(&str, &O) -> bool;

pub struct StrategyChain<O> {
    label: &'static str,
    strategies: Vec<Box<dyn Strategy<O>>>,
    validator: Option<Validator<O>>,
}

impl<O: Send> StrategyChain<O> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            strategies: Vec::new(),
            validator: None,
        }
    }

    pub fn with(mut self, strategy: impl Strategy<O> + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn push(&mut self, strategy: Box<dyn Strategy<O>>) {
        self.strategies.push(strategy);
    }

    /// Results the validator rejects count as failures and the chain moves on
    pub fn validated_by(mut self, validator: Validator<O>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub async fn run(&self, input: &str) -> Result<ChainSuccess<O>, ChainError> {
        let mut failures = Vec::new();

        for (i, strategy) in self.strategies.iter().enumerate() {
            let index = i + 1;
            let limit = strategy.timeout();

            let outcome = match tokio::time::timeout(limit, strategy.attempt(input)).await {
                Ok(Ok(value)) => match self.validator {
                    Some(valid) if !valid(input, &value) => {
                        Err(LookupError::Malformed("result failed validation".to_string()))
                    }
                    _ => Ok(value),
                },
                Ok(Err(e)) => Err(e),
                Err(_) => Err(LookupError::Timeout(limit)),
            };

            match outcome {
                Ok(value) => {
                    debug!(
                        "{} chain: strategy #{} {} succeeded for '{}'",
                        self.label,
                        index,
                        strategy.name(),
                        input
                    );
                    return Ok(ChainSuccess {
                        value,
                        index,
                        name: strategy.name(),
                    });
                }
                Err(error) => {
                    warn!(
                        "{} chain: strategy #{} {} failed for '{}': {}",
                        self.label,
                        index,
                        strategy.name(),
                        input,
                        error
                    );
                    failures.push(StrategyFailure {
                        index,
                        name: strategy.name(),
                        error,
                    });
                }
            }
        }

        Err(ChainError {
            input: input.to_string(),
            failures,
        })
    }
}
