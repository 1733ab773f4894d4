//! One-line summaries of a selected work's abstract

use litgraph_common::errors::AppError;
use litgraph_common::llm::{GenerationRequest, Generator};
use litgraph_common::metrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub const EMPTY_ABSTRACT_SUMMARY: &str = "Related work and summary";

/// Trimmed abstract cut to `max_chars`, ending in `…` when shortened
pub fn truncate_abstract(abstract_text: &str, max_chars: usize) -> String {
    let trimmed = abstract_text.trim();
    if trimmed.is_empty() {
        return EMPTY_ABSTRACT_SUMMARY.to_string();
    }
    if trimmed.chars().count() <= max_chars {
        return trimmed.to_string();
    }

    let mut cut: String = trimmed.chars().take(max_chars.saturating_sub(1)).collect();
    cut.truncate(cut.trim_end().len());
    cut.push('…');
    cut
}

#[derive(Clone)]
pub struct Summarizer {
    generator: Arc<dyn Generator>,
    temperature: f32,
    timeout: Duration,
    max_chars: usize,
}

impl Summarizer {
    pub fn new(generator: Arc<dyn Generator>, temperature: f32, timeout: Duration, max_chars: usize) -> Self {
        Self {
            generator,
            temperature,
            timeout,
            max_chars: max_chars.max(2),
        }
    }

    /// Summarize through the generative service, falling back to the truncated abstract
    pub async fn summarize(&self, abstract_text: &str) -> String {
        if abstract_text.trim().is_empty() {
            return EMPTY_ABSTRACT_SUMMARY.to_string();
        }

        let prompt = format!(
            "Summarize the following paper abstract as one plain sentence of at most {} characters. \
             Reply with the sentence only.\n\nAbstract:\n{}",
            self.max_chars,
            abstract_text.trim()
        );
        let request = GenerationRequest::text(prompt, self.temperature);

        let outcome = match tokio::time::timeout(self.timeout, self.generator.generate(&request)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AppError::Timeout {
                service: "generative".to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        };

        let line = outcome.map(|text| {
            text.lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .unwrap_or_default()
                .to_string()
        });

        match line {
            Ok(line) if !line.is_empty() => line,
            Ok(_) => {
                warn!("Summary service returned nothing, using truncated abstract");
                metrics::record_fallback("summary");
                truncate_abstract(abstract_text, self.max_chars)
            }
            Err(e) => {
                let degraded = AppError::ExternalServiceDegraded {
                    service: "generative".to_string(),
                    message: e.to_string(),
                };
                warn!(error = %degraded, "Summary generation failed, using truncated abstract");
                metrics::record_fallback("summary");
                truncate_abstract(abstract_text, self.max_chars)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;

    #[test]
    fn test_truncate_abstract() {
        assert_eq!(truncate_abstract("", 35), EMPTY_ABSTRACT_SUMMARY);
        assert_eq!(truncate_abstract("   ", 35), EMPTY_ABSTRACT_SUMMARY);
        assert_eq!(truncate_abstract("  Short abstract.  ", 35), "Short abstract.");

        let exact = "a".repeat(35);
        assert_eq!(truncate_abstract(&exact, 35), exact);

        let long = "b".repeat(36);
        let cut = truncate_abstract(&long, 35);
        assert_eq!(cut.chars().count(), 35);
        assert!(cut.ends_with('…'));
    }

    #[test]
    fn test_truncate_counts_chars_not_bytes() {
        let text = "深度学习".repeat(20);
        let cut = truncate_abstract(&text, 10);
        assert_eq!(cut.chars().count(), 10);
    }

    #[tokio::test]
    async fn test_summary_from_service() {
        let generator = ScriptedGenerator::new().summarize_with("\n  Sparse attention scales.  \nextra");
        let summarizer = Summarizer::new(Arc::new(generator), 0.3, Duration::from_secs(5), 35);
        assert_eq!(summarizer.summarize("Long abstract text").await, "Sparse attention scales.");
    }

    #[tokio::test]
    async fn test_summary_falls_back_when_service_unavailable() {
        let summarizer = Summarizer::new(Arc::new(ScriptedGenerator::new()), 0.3, Duration::from_secs(5), 10);
        assert_eq!(summarizer.summarize("An abstract that is long").await, "An abstra…");
        assert_eq!(summarizer.summarize("").await, EMPTY_ABSTRACT_SUMMARY);
    }
}
