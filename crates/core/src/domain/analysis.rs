use serde::{Deserialize, Serialize};
use std::fmt;

/// Literal text stored in place of any completion that could not be generated.
pub const FAILURE_MARKER: &str = "Error in generating response";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sentiment {
    Bearish,
    Neutral,
    Bullish,
}

impl Sentiment {
    pub fn from_score(value: u8) -> Self {
        match value {
            0..=3 => Sentiment::Bearish,
            4..=6 => Sentiment::Neutral,
            _ => Sentiment::Bullish,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Sentiment::Bearish => "Bearish",
            Sentiment::Neutral => "Neutral",
            Sentiment::Bullish => "Bullish",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskScore {
    pub value: u8,
    pub sentiment: Sentiment,
}

impl RiskScore {
    pub fn new(value: u8) -> Self {
        let value = value.min(10);
        Self {
            value,
            sentiment: Sentiment::from_score(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PromptName {
    Summary,
    Insight,
    Watchlist,
}

impl PromptName {
    pub const ALL: [PromptName; 3] = [PromptName::Summary, PromptName::Insight, PromptName::Watchlist];

    pub fn as_str(self) -> &'static str {
        match self {
            PromptName::Summary => "Summary",
            PromptName::Insight => "Insight",
            PromptName::Watchlist => "Watchlist",
        }
    }
}

impl fmt::Display for PromptName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single completion result: real text or the failure marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisText {
    Generated(String),
    Failed,
}

impl AnalysisText {
    pub fn as_str(&self) -> &str {
        match self {
            AnalysisText::Generated(text) => text,
            AnalysisText::Failed => FAILURE_MARKER,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, AnalysisText::Failed)
    }
}

/// Round-1 outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisBundle {
    pub summary: AnalysisText,
    pub insight: AnalysisText,
    pub watchlist: AnalysisText,
}

impl AnalysisBundle {
    pub fn get(&self, name: PromptName) -> &AnalysisText {
        match name {
            PromptName::Summary => &self.summary,
            PromptName::Insight => &self.insight,
            PromptName::Watchlist => &self.watchlist,
        }
    }

    pub fn failed_count(&self) -> usize {
        PromptName::ALL
            .into_iter()
            .filter(|name| self.get(*name).is_failed())
            .count()
    }
}

/// Round-2 synthesis for one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledAnalysis {
    pub text: AnalysisText,
    pub risk_score: RiskScore,
    pub watchlist: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentiment_partition_is_inclusive() {
        let expected = [
            (0, Sentiment::Bearish),
            (3, Sentiment::Bearish),
            (4, Sentiment::Neutral),
            (6, Sentiment::Neutral),
            (7, Sentiment::Bullish),
            (10, Sentiment::Bullish),
        ];
        for (value, sentiment) in expected {
            assert_eq!(RiskScore::new(value).sentiment, sentiment, "score {value}");
        }
    }

    #[test]
    fn failed_text_renders_marker() {
        assert_eq!(AnalysisText::Failed.as_str(), FAILURE_MARKER);
        assert_eq!(AnalysisText::Generated("SPY, IWM".into()).as_str(), "SPY, IWM");
    }
}
