//! Candidate ranking
//!
//! Fixed linear combination of four signals:
//! - relevance (keyword overlap with the node's vocabulary), weight 0.45
//! - verification strength, weight 0.35
//! - publication recency over a year window, weight 0.10
//! - open-access bonus, weight 0.10

use crate::model::ResearchContext;
use litgraph_common::config::RecommenderConfig;
use std::collections::BTreeSet;

const RELEVANCE_WEIGHT: f64 = 0.45;
const VERIFICATION_WEIGHT: f64 = 0.35;
const RECENCY_WEIGHT: f64 = 0.10;
const OPEN_ACCESS_WEIGHT: f64 = 0.10;

/// Recency assumed when the publication year is unknown
const UNKNOWN_YEAR_RECENCY: f64 = 0.3;

/// Shortest token that counts as a keyword
const MIN_KEYWORD_LEN: usize = 3;

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 1.0)
}

/// Lowercased keyword set drawn from method aliases, dataset metrics and the problem
pub fn keywords(context: &ResearchContext) -> BTreeSet<String> {
    context
        .method_aliases
        .iter()
        .chain(context.dataset_metrics.iter())
        .chain(std::iter::once(&context.problem))
        .flat_map(|phrase| {
            phrase
                .to_lowercase()
                .split(|c: char| c.is_whitespace() || c == '/' || c == '-')
                .filter(|w| w.chars().count() >= MIN_KEYWORD_LEN)
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Keyword overlap between the context and a title, in [0.1, 1.0]
pub fn relevance(context: &ResearchContext, title: &str) -> f64 {
    let title = title.to_lowercase();
    let hits = keywords(context)
        .iter()
        .filter(|k| title.contains(k.as_str()))
        .count();

    (0.2 + 0.15 * hits as f64).clamp(0.1, 1.0)
}

/// Pipeline scorer
#[derive(Debug, Clone, Copy)]
pub struct Scorer {
    start_year: i32,
    end_year: i32,
}

impl Default for Scorer {
    fn default() -> Self {
        Self {
            start_year: 2015,
            end_year: 2025,
        }
    }
}

impl From<&RecommenderConfig> for Scorer {
    fn from(config: &RecommenderConfig) -> Self {
        Self::new(config.recency_start_year, config.recency_end_year)
    }
}

impl Scorer {
    pub fn new(start_year: i32, end_year: i32) -> Self {
        Self {
            start_year: start_year.min(end_year),
            end_year: end_year.max(start_year),
        }
    }

    /// Linear map of `year` onto [0, 1] over the window, clamped outside it
    pub fn recency(&self, year: Option<i32>) -> f64 {
        let Some(year) = year else {
            return UNKNOWN_YEAR_RECENCY;
        };
        if self.end_year == self.start_year {
            return if year >= self.end_year { 1.0 } else { 0.0 };
        }
        let span = f64::from(self.end_year - self.start_year);
        clamp_unit(f64::from(year - self.start_year) / span)
    }

    pub fn score(
        &self,
        relevance: f64,
        verification_strength: f64,
        year: Option<i32>,
        is_open_access: bool,
    ) -> f64 {
        let open_access = if is_open_access { 1.0 } else { 0.0 };

        let score = RELEVANCE_WEIGHT * clamp_unit(relevance)
            + VERIFICATION_WEIGHT * clamp_unit(verification_strength)
            + RECENCY_WEIGHT * self.recency(year)
            + OPEN_ACCESS_WEIGHT * open_access;

        clamp_unit(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(problem: &str, methods: &[&str], datasets: &[&str]) -> ResearchContext {
        ResearchContext {
            problem: problem.to_string(),
            method_aliases: methods.iter().map(|s| s.to_string()).collect(),
            dataset_metrics: datasets.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let total = RELEVANCE_WEIGHT + VERIFICATION_WEIGHT + RECENCY_WEIGHT + OPEN_ACCESS_WEIGHT;
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_score_extremes() {
        let scorer = Scorer::default();
        assert!((scorer.score(1.0, 1.0, Some(2025), true) - 1.0).abs() < 1e-12);
        assert_eq!(scorer.score(0.0, 0.0, Some(2000), false), 0.0);
        // Out-of-range inputs are clamped
        assert!((scorer.score(7.0, 3.0, Some(3000), true) - 1.0).abs() < 1e-12);
        assert_eq!(scorer.score(-1.0, f64::NAN, Some(1900), false), 0.0);
    }

    #[test]
    fn test_recency_window() {
        let scorer = Scorer::default();
        assert_eq!(scorer.recency(None), 0.3);
        assert_eq!(scorer.recency(Some(2010)), 0.0);
        assert_eq!(scorer.recency(Some(2015)), 0.0);
        assert!((scorer.recency(Some(2020)) - 0.5).abs() < 1e-12);
        assert_eq!(scorer.recency(Some(2025)), 1.0);
        assert_eq!(scorer.recency(Some(2030)), 1.0);
    }

    #[test]
    fn test_degenerate_window() {
        let scorer = Scorer::new(2020, 2020);
        assert_eq!(scorer.recency(Some(2019)), 0.0);
        assert_eq!(scorer.recency(Some(2020)), 1.0);
    }

    #[test]
    fn test_score_monotonic_in_each_input() {
        let scorer = Scorer::default();
        let steps: Vec<f64> = (0..=20).map(|i| i as f64 / 20.0).collect();

        for &held in &steps {
            for pair in steps.windows(2) {
                let (lo, hi) = (pair[0], pair[1]);
                assert!(scorer.score(lo, held, Some(2020), false) <= scorer.score(hi, held, Some(2020), false));
                assert!(scorer.score(held, lo, Some(2020), true) <= scorer.score(held, hi, Some(2020), true));
            }
            for year in 2005..2035 {
                assert!(
                    scorer.score(held, held, Some(year), false)
                        <= scorer.score(held, held, Some(year + 1), false)
                );
            }
            assert!(scorer.score(held, held, None, false) <= scorer.score(held, held, None, true));
        }
    }

    #[test]
    fn test_keywords_split_on_separators() {
        let ctx = context("Self-supervised vision", &["ViT/DeiT"], &["ImageNet top-1"]);
        let kws = keywords(&ctx);
        assert!(kws.contains("self"));
        assert!(kws.contains("supervised"));
        assert!(kws.contains("vit"));
        assert!(kws.contains("deit"));
        assert!(kws.contains("imagenet"));
        assert!(kws.contains("top"));
        // Short tokens are dropped
        assert!(!kws.contains("1"));
    }

    #[test]
    fn test_relevance_counts_hits() {
        let ctx = context("graph neural networks", &[], &[]);
        assert!((relevance(&ctx, "A survey of cooking") - 0.2).abs() < 1e-12);
        assert!((relevance(&ctx, "Graph attention networks") - 0.5).abs() < 1e-12);
        assert!((relevance(&ctx, "Neural networks on graphs") - 0.65).abs() < 1e-12);
    }

    #[test]
    fn test_relevance_is_bounded() {
        let ctx = context(
            "alpha beta gamma delta epsilon zeta theta",
            &[],
            &[],
        );
        let title = "alpha beta gamma delta epsilon zeta theta";
        assert_eq!(relevance(&ctx, title), 1.0);
        assert!(relevance(&context("", &[], &[]), "anything") >= 0.1);
    }
}
