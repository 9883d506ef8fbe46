//! Fraud-classification prompt and verdict parsing

use std::time::{Duration, Instant};

use crate::error::Result;
use crate::inference::TextGenerationEngine;

/// Build the classification prompt for a suspicious message. The model is
/// instructed to answer with a bare Yes/No.
pub fn fraud_prompt(message: &str) -> String {
    format!(
        "<|im_start|>system\n\
         You are a helpful assistant that detects financial fraud. \
         Respond with 'Yes' or 'No' only.<|im_end|>\n\
         <|im_start|>user\n\
         Is the following text fraudulent?\n\n\
         Text: {message}\n\
         Fraud:<|im_end|>\n\
         <|im_start|>assistant"
    )
}

/// Classification verdict derived from the model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Fraud,
    Safe,
}

impl Verdict {
    /// Parse the raw model output. The output is conclusive once at least
    /// three characters long; fraud iff the first three characters,
    /// lowercased, contain "yes".
    pub fn from_output(output: &str) -> Option<Verdict> {
        if output.chars().count() < 3 {
            return None;
        }
        let head = output.chars().take(3).collect::<String>().to_lowercase();
        if head.contains("yes") {
            Some(Verdict::Fraud)
        } else {
            Some(Verdict::Safe)
        }
    }

    pub fn is_fraud(&self) -> bool {
        matches!(self, Verdict::Fraud)
    }
}

/// Outcome of one classification run, including how long detection took.
#[derive(Debug, Clone)]
pub struct Classification {
    pub output: String,
    pub verdict: Option<Verdict>,
    pub elapsed: Duration,
}

/// Classify a message with an initialized engine.
pub async fn classify<E: TextGenerationEngine>(
    engine: &mut E,
    message: &str,
) -> Result<Classification> {
    let prompt = fraud_prompt(message);
    let started = Instant::now();
    let output = engine.generate(&prompt).await?;
    let elapsed = started.elapsed();
    let verdict = Verdict::from_output(&output);
    Ok(Classification {
        output,
        verdict,
        elapsed,
    })
}
