use std::{panic, thread};

use log::debug;
use serde::Serialize;

use crate::{
    config::AnalysisConfig,
    dataset::Dataset,
    quality::{QualityAnalyzer, QualityResult},
    suggest::{Suggestion, SuggestionEngine},
    trend::{TrendAnalyzer, TrendResult},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisOutcome {
    pub source: String,
    pub trend: TrendResult,
    pub quality: QualityResult,
    pub suggestions: Vec<Suggestion>,
}

/// Runs trend and quality analysis side by side over the same dataset, then
/// feeds both results to the suggestion engine.
pub fn analyze(dataset: &Dataset, source: &str, config: &AnalysisConfig) -> AnalysisOutcome {
    let (trend, quality) = thread::scope(|scope| {
        let trend_handle = scope.spawn(|| TrendAnalyzer::new(&config.policy).analyze(dataset));
        let quality = QualityAnalyzer::new(&config.registry, &config.policy).analyze(dataset, source);
        debug!(
            "Quality analysis complete: score {} ({} issue(s))",
            quality.completeness.score,
            quality.issues.len()
        );
        let trend = trend_handle
            .join()
            .unwrap_or_else(|payload| panic::resume_unwind(payload));
        debug!(
            "Trend analysis complete: {} categorical column(s)",
            trend.categories.len()
        );
        (trend, quality)
    });

    let suggestions =
        SuggestionEngine::new(&config.policy).generate(dataset, &trend, &quality, source);
    debug!("Generated {} suggestion(s)", suggestions.len());

    AnalysisOutcome {
        source: source.to_string(),
        trend,
        quality,
        suggestions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_matches_sequential_analysis() {
        let dataset = Dataset::from_rows(
            &["id", "severity", "created_time"],
            &[
                vec!["1", "high", "2025-01-01 10:00:00"],
                vec!["2", "low", "2025-01-02 11:00:00"],
                vec!["2", "low", "2025-01-02 11:00:00"],
            ],
        )
        .unwrap();
        let config = AnalysisConfig::default();
        let outcome = analyze(&dataset, "unknown", &config);

        let trend = TrendAnalyzer::new(&config.policy).analyze(&dataset);
        let quality = QualityAnalyzer::new(&config.registry, &config.policy).analyze(&dataset, "unknown");
        assert_eq!(outcome.trend, trend);
        assert_eq!(outcome.quality, quality);
        assert!(!outcome.suggestions.is_empty());
    }
}
