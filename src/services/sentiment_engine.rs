use crate::models::{SentimentLabel, SentimentScore, Source, VerificationMetadata};
use crate::services::classifier::{ClassifierOutput, LexiconClassifier, SentimentClassifier};
use crate::services::llm_client::LlmClient;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    Financial,
    Community,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationMode {
    None,
    LowConfidence,
    LowConfidenceAndNeutral,
    All,
}

/// One unit of work for `SentimentEngine::analyze`. Order of the output
/// `Vec<SentimentScore>` mirrors the order of the input slice.
#[derive(Debug, Clone)]
pub struct TextInput {
    pub source: Source,
    pub text: String,
}

/// Pre-ML gate: `(is_relevant, confidence, reason)`. When irrelevant
/// with high confidence the engine short-circuits to a low-confidence
/// neutral rather than spending a model call on off-topic text.
pub trait ContentRelevanceValidator: Send + Sync {
    fn validate(&self, text: &str) -> (bool, f64, String);
}

/// Accepts everything; the default when no validator is configured.
pub struct AlwaysRelevant;

impl ContentRelevanceValidator for AlwaysRelevant {
    fn validate(&self, _text: &str) -> (bool, f64, String) {
        (true, 1.0, "no validator configured".to_string())
    }
}

#[derive(Debug, Clone)]
pub struct SentimentEngineConfig {
    pub ensemble_weight_primary: f64,
    pub ensemble_weight_secondary: f64,
    pub temperature: f64,
    pub verification_mode: VerificationMode,
    pub confidence_threshold: f64,
    pub fallback_to_neutral: bool,
    pub ai_verification_enabled: bool,
}

impl Default for SentimentEngineConfig {
    fn default() -> Self {
        Self {
            ensemble_weight_primary: 0.6,
            ensemble_weight_secondary: 0.4,
            temperature: 1.5,
            verification_mode: VerificationMode::LowConfidenceAndNeutral,
            confidence_threshold: 0.85,
            fallback_to_neutral: true,
            ai_verification_enabled: true,
        }
    }
}

struct MlResult {
    label: SentimentLabel,
    confidence: f64,
    probs: ClassifierOutput,
    force_verification: bool,
}

/// Routes each `TextInput` to a model family by source, scores it with
/// a lexicon classifier (optionally ensembled and temperature-scaled),
/// and escalates uncertain or neutral cases to an LLM per the
/// configured `VerificationMode`.
pub struct SentimentEngine {
    routing: HashMap<Source, ModelFamily>,
    financial_classifier: Box<dyn SentimentClassifier>,
    community_classifier: Box<dyn SentimentClassifier>,
    ensemble_classifier: Option<Box<dyn SentimentClassifier>>,
    content_validator: Box<dyn ContentRelevanceValidator>,
    llm_client: Option<Arc<dyn LlmClient>>,
    config: SentimentEngineConfig,
    llm_error_count: std::sync::atomic::AtomicU32,
}

fn default_routing() -> HashMap<Source, ModelFamily> {
    HashMap::from([
        (Source::HackerNews, ModelFamily::Community),
        (Source::Finnhub, ModelFamily::Financial),
        (Source::NewsApi, ModelFamily::Financial),
        (Source::MarketAux, ModelFamily::Financial),
        (Source::Gdelt, ModelFamily::Financial),
        (Source::YahooFinance, ModelFamily::Financial),
    ])
}

impl SentimentEngine {
    pub fn new(config: SentimentEngineConfig, llm_client: Option<Arc<dyn LlmClient>>) -> Self {
        Self {
            routing: default_routing(),
            financial_classifier: Box::new(LexiconClassifier::financial()),
            community_classifier: Box::new(LexiconClassifier::community()),
            ensemble_classifier: None,
            content_validator: Box::new(AlwaysRelevant),
            llm_client,
            config,
            llm_error_count: std::sync::atomic::AtomicU32::new(0),
        }
    }

    pub fn with_ensemble(mut self, classifier: Box<dyn SentimentClassifier>) -> Self {
        self.ensemble_classifier = Some(classifier);
        self
    }

    pub fn with_content_validator(mut self, validator: Box<dyn ContentRelevanceValidator>) -> Self {
        self.content_validator = validator;
        self
    }

    pub fn with_routing(mut self, source: Source, family: ModelFamily) -> Self {
        self.routing.insert(source, family);
        self
    }

    fn family_for(&self, source: Source) -> ModelFamily {
        self.routing.get(&source).copied().unwrap_or(ModelFamily::Financial)
    }

    fn classifier_for(&self, family: ModelFamily) -> &dyn SentimentClassifier {
        match family {
            ModelFamily::Financial => self.financial_classifier.as_ref(),
            ModelFamily::Community => self.community_classifier.as_ref(),
        }
    }

    fn label_from_probs(probs: &ClassifierOutput) -> (SentimentLabel, f64) {
        let candidates = [
            (SentimentLabel::Positive, probs.p_positive),
            (SentimentLabel::Negative, probs.p_negative),
            (SentimentLabel::Neutral, probs.p_neutral),
        ];
        candidates
            .into_iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .unwrap_or((SentimentLabel::Neutral, 1.0))
    }

    /// Divides logit-like mass by `temperature` before renormalizing,
    /// approximating "temperature scaling on logits before softmax"
    /// over already-positive classifier mass.
    fn apply_temperature(probs: ClassifierOutput, temperature: f64) -> ClassifierOutput {
        if temperature <= 0.0 || (temperature - 1.0).abs() < f64::EPSILON {
            return probs;
        }
        let scale = |p: f64| (p.max(1e-6)).ln() / temperature;
        let exp_pos = scale(probs.p_positive).exp();
        let exp_neg = scale(probs.p_negative).exp();
        let exp_neu = scale(probs.p_neutral).exp();
        ClassifierOutput { p_positive: exp_pos, p_negative: exp_neg, p_neutral: exp_neu }.normalized()
    }

    fn compute_ml_result(&self, text: &str, family: ModelFamily) -> MlResult {
        let base_probs = Self::apply_temperature(self.classifier_for(family).classify(text), self.config.temperature);
        let (base_label, base_confidence) = Self::label_from_probs(&base_probs);

        let Some(ensemble) = &self.ensemble_classifier else {
            return MlResult { label: base_label, confidence: base_confidence, probs: base_probs, force_verification: false };
        };

        if !(0.70..0.95).contains(&base_confidence) {
            return MlResult { label: base_label, confidence: base_confidence, probs: base_probs, force_verification: false };
        }

        let ensemble_probs = ensemble.classify(text);
        let (ensemble_label, ensemble_confidence) = Self::label_from_probs(&ensemble_probs);

        let blended = ClassifierOutput {
            p_positive: base_probs.p_positive * self.config.ensemble_weight_primary
                + ensemble_probs.p_positive * self.config.ensemble_weight_secondary,
            p_negative: base_probs.p_negative * self.config.ensemble_weight_primary
                + ensemble_probs.p_negative * self.config.ensemble_weight_secondary,
            p_neutral: base_probs.p_neutral * self.config.ensemble_weight_primary
                + ensemble_probs.p_neutral * self.config.ensemble_weight_secondary,
        }
        .normalized();

        let (blended_label, _) = Self::label_from_probs(&blended);

        if ensemble_label != base_label {
            let adjusted_confidence = base_confidence * 0.85;
            let force_verification = base_confidence > 0.75 && ensemble_confidence > 0.75;
            MlResult { label: blended_label, confidence: adjusted_confidence, probs: blended, force_verification }
        } else {
            let adjusted_confidence = (base_confidence * 1.03).min(0.98);
            MlResult { label: blended_label, confidence: adjusted_confidence, probs: blended, force_verification: false }
        }
    }

    fn needs_verification(&self, result: &MlResult) -> bool {
        if !self.config.ai_verification_enabled || self.llm_client.is_none() {
            return false;
        }
        if result.force_verification {
            return true;
        }
        match self.config.verification_mode {
            VerificationMode::None => false,
            VerificationMode::All => true,
            VerificationMode::LowConfidence => result.confidence < self.config.confidence_threshold,
            VerificationMode::LowConfidenceAndNeutral => {
                result.confidence < self.config.confidence_threshold || result.label == SentimentLabel::Neutral
            }
        }
    }

    fn ml_score(result: &MlResult, model_name: &str) -> SentimentScore {
        let score = match result.label {
            SentimentLabel::Positive => result.probs.p_positive - result.probs.p_negative,
            SentimentLabel::Negative => (result.probs.p_positive - result.probs.p_negative).min(-0.1),
            SentimentLabel::Neutral => 0.0,
        };
        SentimentScore::new(result.label, score, result.confidence, model_name, "ml")
    }

    /// Order-preserving batch analysis. ML scoring is synchronous and
    /// run first for every input; texts the verification predicate
    /// selects are then grouped into as few LLM round-trips as possible.
    pub async fn analyze(&self, inputs: &[TextInput]) -> Vec<SentimentScore> {
        let mut scores: Vec<SentimentScore> = Vec::with_capacity(inputs.len());
        let mut pending_verification: Vec<(usize, String)> = Vec::new();
        let mut ml_results: Vec<Option<(MlResult, String)>> = Vec::with_capacity(inputs.len());

        for input in inputs {
            let (relevant, relevance_confidence, reason) = self.content_validator.validate(&input.text);
            if !relevant && relevance_confidence >= 0.75 {
                info!("content filtered as irrelevant: {reason}");
                scores.push(SentimentScore::new(SentimentLabel::Neutral, 0.0, 0.40, "content-filter", "filtered"));
                ml_results.push(None);
                continue;
            }

            let family = self.family_for(input.source);
            let model_name = match family {
                ModelFamily::Financial => "lexicon-financial-v1",
                ModelFamily::Community => "lexicon-community-v1",
            };
            let result = self.compute_ml_result(&input.text, family);

            let idx = scores.len();
            if self.needs_verification(&result) {
                pending_verification.push((idx, input.text.clone()));
            }
            scores.push(Self::ml_score(&result, model_name));
            ml_results.push(Some((result, model_name.to_string())));
        }

        if pending_verification.is_empty() {
            return scores;
        }

        let Some(llm) = &self.llm_client else {
            return scores;
        };

        match self.verify_batch(llm.as_ref(), &pending_verification).await {
            Ok(verdicts) => {
                for (idx, verdict) in verdicts {
                    if let Some((ml_result, model_name)) = &ml_results[idx] {
                        scores[idx] = Self::reconstruct_with_verification(ml_result, model_name, verdict);
                    }
                }
            }
            Err(e) => {
                self.llm_error_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                warn!("LLM verification batch failed, falling back to ML results: {e}");
            }
        }

        scores
    }

    fn reconstruct_with_verification(ml_result: &MlResult, model_name: &str, verdict: LlmVerdict) -> SentimentScore {
        let agrees = verdict.label == ml_result.label;
        let final_confidence = if agrees { verdict.confidence.max(ml_result.confidence) } else { verdict.confidence };

        let final_score = match verdict.label {
            SentimentLabel::Positive => final_confidence,
            SentimentLabel::Negative => -final_confidence,
            SentimentLabel::Neutral => 0.0,
        };

        SentimentScore::new(verdict.label, final_score, final_confidence, model_name, "ai_override")
            .with_verification(VerificationMetadata {
                llm_consulted: true,
                llm_label: Some(verdict.label),
                llm_reasoning: verdict.reasoning,
            })
    }

    /// Submits one JSON-indexed prompt covering every pending text. The
    /// `LlmClient` owns 429 retry/backoff internally, so any error that
    /// surfaces here has already exhausted that budget and is terminal.
    async fn verify_batch(&self, llm: &dyn LlmClient, pending: &[(usize, String)]) -> Result<Vec<(usize, LlmVerdict)>, crate::errors::AppError> {
        let prompt = build_batch_prompt(pending);
        let response = llm.complete(&prompt, 800, 0.0).await?;
        Ok(parse_batch_response(pending, &response))
    }
}

struct LlmVerdict {
    label: SentimentLabel,
    confidence: f64,
    reasoning: Option<String>,
}

fn build_batch_prompt(pending: &[(usize, String)]) -> String {
    let mut prompt = String::from(
        "Classify the sentiment of each numbered financial text as positive, negative, or neutral. \
         Respond with a JSON array of objects: {\"id\": <number>, \"sentiment\": <label>, \"confidence\": <0..1>}.\n\n",
    );
    for (id, text) in pending {
        prompt.push_str(&format!("{id}: {text}\n"));
    }
    prompt
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    id: usize,
    sentiment: String,
    confidence: f64,
}

fn parse_batch_response(pending: &[(usize, String)], response: &str) -> Vec<(usize, LlmVerdict)> {
    let pending_ids: std::collections::HashSet<usize> = pending.iter().map(|(id, _)| *id).collect();

    let json_slice = response
        .find('[')
        .and_then(|start| response.rfind(']').map(|end| &response[start..=end]))
        .unwrap_or(response);

    let raw: Vec<RawVerdict> = match serde_json::from_str(json_slice) {
        Ok(v) => v,
        Err(e) => {
            warn!("failed to parse LLM verification response: {e}");
            return Vec::new();
        }
    };

    raw.into_iter()
        .filter(|v| pending_ids.contains(&v.id))
        .map(|v| {
            let label = match v.sentiment.to_lowercase().as_str() {
                "positive" => SentimentLabel::Positive,
                "negative" => SentimentLabel::Negative,
                _ => SentimentLabel::Neutral,
            };
            (v.id, LlmVerdict { label, confidence: v.confidence.clamp(0.0, 1.0), reasoning: None })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::llm_client::FixedLlmClient;

    #[tokio::test]
    async fn analyzes_without_verification_when_mode_is_none() {
        let mut config = SentimentEngineConfig::default();
        config.verification_mode = VerificationMode::None;
        let engine = SentimentEngine::new(config, None);

        let inputs = vec![TextInput { source: Source::Finnhub, text: "Company beats earnings and surges".to_string() }];
        let scores = engine.analyze(&inputs).await;

        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].label, SentimentLabel::Positive);
        assert_eq!(scores[0].method, "ml");
    }

    #[tokio::test]
    async fn low_confidence_primary_is_overridden_by_ai_verification() {
        let config = SentimentEngineConfig {
            verification_mode: VerificationMode::LowConfidenceAndNeutral,
            confidence_threshold: 0.85,
            ..Default::default()
        };
        let llm = Arc::new(FixedLlmClient {
            response: r#"[{"id": 0, "sentiment": "negative", "confidence": 0.94}]"#.to_string(),
        });
        let engine = SentimentEngine::new(config, Some(llm));

        let inputs = vec![TextInput { source: Source::HackerNews, text: "The weather today is mild".to_string() }];
        let scores = engine.analyze(&inputs).await;

        assert_eq!(scores[0].label, SentimentLabel::Negative);
        assert!((scores[0].confidence - 0.94).abs() < 1e-9);
        assert!((scores[0].score - (-0.94)).abs() < 1e-9);
        assert!(scores[0].method.starts_with("ai_override"));
    }

    #[tokio::test]
    async fn content_filter_short_circuits_to_low_confidence_neutral() {
        struct AlwaysIrrelevant;
        impl ContentRelevanceValidator for AlwaysIrrelevant {
            fn validate(&self, _text: &str) -> (bool, f64, String) {
                (false, 0.9, "off-topic".to_string())
            }
        }

        let engine = SentimentEngine::new(SentimentEngineConfig::default(), None)
            .with_content_validator(Box::new(AlwaysIrrelevant));

        let inputs = vec![TextInput { source: Source::Gdelt, text: "Quarterly earnings beat expectations".to_string() }];
        let scores = engine.analyze(&inputs).await;

        assert_eq!(scores[0].label, SentimentLabel::Neutral);
        assert!((scores[0].confidence - 0.40).abs() < 1e-9);
        assert_eq!(scores[0].method, "filtered");
    }

    #[tokio::test]
    async fn preserves_input_order_across_mixed_verification() {
        let config = SentimentEngineConfig { verification_mode: VerificationMode::None, ..Default::default() };
        let engine = SentimentEngine::new(config, None);

        let inputs = vec![
            TextInput { source: Source::Finnhub, text: "Strong earnings beat".to_string() },
            TextInput { source: Source::HackerNews, text: "Stock crashes amid fraud probe".to_string() },
        ];
        let scores = engine.analyze(&inputs).await;

        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].label, SentimentLabel::Positive);
        assert_eq!(scores[1].label, SentimentLabel::Negative);
    }
}
