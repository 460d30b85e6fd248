//! Keyword discovery and scoring.

pub mod autocomplete;
pub mod metrics;

pub use autocomplete::{
    AutocompleteExpander, ExpanderConfig, HttpSuggestionClient, KeywordCandidate, SuggestError,
    SuggestionSource,
};
pub use metrics::{DifficultyLabel, Intent, KeywordMetricsEstimator, ScoredKeyword};

/// Score every candidate and order by descending opportunity. Ties keep
/// their input order.
pub fn score_all<I>(candidates: I) -> Vec<ScoredKeyword>
where
    I: IntoIterator,
    I::Item: Into<KeywordCandidate>,
{
    let estimator = KeywordMetricsEstimator::new();
    let mut scored: Vec<ScoredKeyword> = candidates
        .into_iter()
        .map(|candidate| estimator.score(candidate))
        .collect();
    scored.sort_by(|a, b| b.opportunity_score.cmp(&a.opportunity_score));
    scored
}
