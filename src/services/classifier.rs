use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Raw (positive, negative, neutral) mass before normalization, plus the
/// VADER-style compound score used to pick a label.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierOutput {
    pub p_positive: f64,
    pub p_negative: f64,
    pub p_neutral: f64,
}

impl ClassifierOutput {
    pub fn neutral() -> Self {
        Self { p_positive: 0.0, p_negative: 0.0, p_neutral: 1.0 }
    }

    /// Normalizes so the three probabilities sum to 1, matching the
    /// "(positive, negative, neutral) probabilities" contract
    /// regardless of how a classifier computed its raw mass.
    pub fn normalized(self) -> Self {
        let total = self.p_positive + self.p_negative + self.p_neutral;
        if total <= 0.0 {
            return Self::neutral();
        }
        Self {
            p_positive: self.p_positive / total,
            p_negative: self.p_negative / total,
            p_neutral: self.p_neutral / total,
        }
    }
}

pub trait SentimentClassifier: Send + Sync {
    fn name(&self) -> &str;
    fn classify(&self, text: &str) -> ClassifierOutput;
}

/// Dictionary-based classifier in the spirit of VADER (Valence Aware
/// Dictionary and sEntiment Reasoner): sums per-word valence scores,
/// flips the sign of a word immediately preceded by a negator, and
/// normalizes by total matched magnitude rather than raw word count so
/// short snippets aren't washed out to neutral. No GPU, no external
/// model weights — the whole lexicon lives in this file.
pub struct LexiconClassifier {
    name: String,
    lexicon: &'static HashMap<&'static str, f64>,
}

const NEGATORS: &[&str] = &["not", "no", "never", "n't", "without", "hardly"];

static FINANCIAL_LEXICON: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    HashMap::from([
        ("beat", 2.5), ("beats", 2.5), ("beating", 2.5),
        ("miss", -2.5), ("misses", -2.5), ("missed", -2.5),
        ("surge", 3.0), ("surges", 3.0), ("surged", 3.0), ("soar", 3.0), ("soars", 3.0),
        ("plunge", -3.0), ("plunges", -3.0), ("plunged", -3.0), ("crash", -3.5), ("crashes", -3.5),
        ("rally", 2.5), ("rallies", 2.5), ("rallied", 2.5),
        ("slump", -2.5), ("slumps", -2.5), ("tumble", -2.5), ("tumbles", -2.5),
        ("growth", 1.8), ("grew", 1.5), ("growing", 1.5), ("expand", 1.5), ("expands", 1.5),
        ("decline", -1.8), ("declines", -1.8), ("declining", -1.8), ("shrink", -1.8), ("shrinks", -1.8),
        ("profit", 2.0), ("profits", 2.0), ("profitable", 2.0),
        ("loss", -2.0), ("losses", -2.0), ("unprofitable", -2.0),
        ("upgrade", 2.2), ("upgraded", 2.2), ("outperform", 2.2),
        ("downgrade", -2.2), ("downgraded", -2.2), ("underperform", -2.2),
        ("bullish", 2.8), ("bearish", -2.8),
        ("record", 1.5), ("strong", 1.8), ("robust", 1.8), ("solid", 1.3),
        ("weak", -1.8), ("sluggish", -1.5), ("disappointing", -2.3), ("disappoints", -2.3),
        ("lawsuit", -2.0), ("investigation", -2.0), ("fraud", -3.5), ("scandal", -3.0),
        ("bankruptcy", -3.8), ("default", -3.0), ("layoffs", -2.5), ("cuts", -1.5),
        ("innovation", 1.8), ("breakthrough", 2.5), ("partnership", 1.3), ("acquisition", 1.0),
        ("dividend", 1.0), ("buyback", 1.3),
        ("risk", -1.0), ("risks", -1.0), ("volatile", -1.0), ("volatility", -0.8),
        ("recovery", 1.8), ("rebound", 1.8), ("optimistic", 2.0), ("pessimistic", -2.0),
    ])
});

static COMMUNITY_LEXICON: Lazy<HashMap<&'static str, f64>> = Lazy::new(|| {
    let mut lexicon = HashMap::from([
        ("moon", 3.0), ("mooning", 3.0), ("rocket", 2.5),
        ("dump", -2.5), ("dumping", -2.5), ("tank", -2.5), ("tanking", -2.5),
        ("rekt", -3.0), ("bagholder", -2.0), ("bagholders", -2.0),
        ("yolo", 1.5), ("diamond", 1.5), ("hands", 0.3),
        ("pump", 2.0), ("pumping", 2.0), ("scam", -3.5), ("rug", -3.0), ("rugpull", -3.5),
        ("great", 2.2), ("awesome", 2.5), ("amazing", 2.8), ("love", 2.2), ("excited", 2.0),
        ("terrible", -2.5), ("awful", -2.8), ("hate", -2.5), ("worried", -1.8), ("scared", -1.8),
        ("good", 1.8), ("bad", -1.8), ("nice", 1.5), ("sucks", -2.0),
    ]);
    for (word, value) in FINANCIAL_LEXICON.iter() {
        lexicon.entry(word).or_insert(*value);
    }
    lexicon
});

impl LexiconClassifier {
    pub fn financial() -> Self {
        Self { name: "lexicon-financial-v1".to_string(), lexicon: &FINANCIAL_LEXICON }
    }

    pub fn community() -> Self {
        Self { name: "lexicon-community-v1".to_string(), lexicon: &COMMUNITY_LEXICON }
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

impl SentimentClassifier for LexiconClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify(&self, text: &str) -> ClassifierOutput {
        let tokens = tokenize(text);
        let mut pos_mag = 0.0;
        let mut neg_mag = 0.0;

        for (idx, token) in tokens.iter().enumerate() {
            let Some(mut valence) = self.lexicon.get(token.as_str()).copied() else { continue };

            let negated = idx > 0 && NEGATORS.iter().any(|n| tokens[idx - 1].contains(n));
            if negated {
                valence = -valence;
            }

            if valence > 0.0 {
                pos_mag += valence;
            } else {
                neg_mag += valence.abs();
            }
        }

        if pos_mag == 0.0 && neg_mag == 0.0 {
            return ClassifierOutput::neutral();
        }

        // VADER-like normalization constant damping short/ambiguous texts
        // toward neutral rather than letting one strong word dominate.
        const DAMPING: f64 = 4.0;
        let total = pos_mag + neg_mag;
        let pos = pos_mag / (total + DAMPING);
        let neg = neg_mag / (total + DAMPING);
        let neu = (1.0 - pos - neg).max(0.0);

        ClassifierOutput { p_positive: pos, p_negative: neg, p_neutral: neu }.normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_financial_text_favors_positive() {
        let classifier = LexiconClassifier::financial();
        let out = classifier.classify("Company beats earnings and stock surges on strong growth");
        assert!(out.p_positive > out.p_negative);
    }

    #[test]
    fn negative_financial_text_favors_negative() {
        let classifier = LexiconClassifier::financial();
        let out = classifier.classify("Company misses earnings amid fraud investigation and bankruptcy fears");
        assert!(out.p_negative > out.p_positive);
    }

    #[test]
    fn negation_flips_polarity() {
        let classifier = LexiconClassifier::financial();
        let plain = classifier.classify("Results were strong this quarter");
        let negated = classifier.classify("Results were not strong this quarter");
        assert!(plain.p_positive > negated.p_positive);
    }

    #[test]
    fn unrecognized_text_is_neutral() {
        let classifier = LexiconClassifier::financial();
        let out = classifier.classify("The meeting is scheduled for Tuesday afternoon");
        assert_eq!(out.p_neutral, 1.0);
    }
}
