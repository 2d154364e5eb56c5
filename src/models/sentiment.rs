use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        }
    }
}

/// Metadata about an optional LLM verification pass.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VerificationMetadata {
    pub llm_consulted: bool,
    pub llm_label: Option<SentimentLabel>,
    pub llm_reasoning: Option<String>,
}

/// Classification output. Invariant: `sign(score)` agrees with `label`,
/// and `label == Neutral` implies `|score| < 0.1`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentScore {
    pub label: SentimentLabel,
    pub score: f64,
    pub confidence: f64,
    pub model: String,
    pub method: String,
    pub verification: Option<VerificationMetadata>,
}

impl SentimentScore {
    /// Builds a score, clamping it onto the label's sign so the
    /// `sign(score) == label` invariant can never be violated by a
    /// caller's rounding error.
    pub fn new(
        label: SentimentLabel,
        score: f64,
        confidence: f64,
        model: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        let score = Self::enforce_sign_invariant(label, score);
        Self {
            label,
            score: score.clamp(-1.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            model: model.into(),
            method: method.into(),
            verification: None,
        }
    }

    pub fn neutral_fallback(model: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            label: SentimentLabel::Neutral,
            score: 0.0,
            confidence: 0.0,
            model: model.into(),
            method: method.into(),
            verification: None,
        }
    }

    pub fn with_verification(mut self, verification: VerificationMetadata) -> Self {
        self.verification = Some(verification);
        self
    }

    fn enforce_sign_invariant(label: SentimentLabel, score: f64) -> f64 {
        match label {
            SentimentLabel::Neutral => {
                if score.abs() >= 0.1 {
                    0.0
                } else {
                    score
                }
            }
            SentimentLabel::Positive => score.abs(),
            SentimentLabel::Negative => -score.abs(),
        }
    }

    pub fn is_valid(&self) -> bool {
        let sign_ok = match self.label {
            SentimentLabel::Positive => self.score >= 0.0,
            SentimentLabel::Negative => self.score <= 0.0,
            SentimentLabel::Neutral => self.score.abs() < 0.1,
        };
        sign_ok && (-1.0..=1.0).contains(&self.score) && (0.0..=1.0).contains(&self.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_label_forces_nonnegative_score() {
        let s = SentimentScore::new(SentimentLabel::Positive, -0.6, 0.8, "m", "ml");
        assert!(s.is_valid());
        assert!(s.score > 0.0);
    }

    #[test]
    fn neutral_label_clamps_magnitude() {
        let s = SentimentScore::new(SentimentLabel::Neutral, 0.5, 0.5, "m", "ml");
        assert!(s.is_valid());
        assert!(s.score.abs() < 0.1);
    }

    #[test]
    fn negative_label_forces_nonpositive_score() {
        let s = SentimentScore::new(SentimentLabel::Negative, 0.4, 0.9, "m", "ml");
        assert!(s.is_valid());
        assert!(s.score < 0.0);
    }
}
