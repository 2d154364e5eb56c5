use crate::models::ProcessedText;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::time::Instant;

/// Tunables for one `preprocess` call.
#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    pub min_length: usize,
    pub max_length: usize,
    pub lowercase: bool,
    pub strip_hashtags: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            min_length: 10,
            max_length: 5000,
            lowercase: false,
            strip_hashtags: false,
        }
    }
}

static HTML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new("<[^>]+>").unwrap());
static HTML_NUMERIC_ENTITY: Lazy<Regex> = Lazy::new(|| Regex::new(r"&#(x[0-9A-Fa-f]+|[0-9]+);").unwrap());

const HTML_NAMED_ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&#39;", "'"),
    ("&nbsp;", " "),
    ("&mdash;", "—"),
    ("&ndash;", "–"),
    ("&hellip;", "…"),
    ("&rsquo;", "\u{2019}"),
    ("&lsquo;", "\u{2018}"),
    ("&rdquo;", "\u{201d}"),
    ("&ldquo;", "\u{201c}"),
];

/// Decodes named and numeric HTML entities (`&amp;`, `&#39;`, `&#x2019;`)
/// so `&` survives instead of leaking its escaped form into cleaned text.
/// Runs before tag-stripping, matching how HTML-derived sources encode
/// entities around the tags they're found in.
fn decode_html_entities(text: &str) -> String {
    let mut result = text.to_string();
    for (entity, replacement) in HTML_NAMED_ENTITIES {
        result = result.replace(entity, replacement);
    }
    result = HTML_NUMERIC_ENTITY
        .replace_all(&result, |caps: &regex::Captures| {
            let digits = &caps[1];
            let code = if let Some(hex) = digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
                u32::from_str_radix(hex, 16).ok()
            } else {
                digits.parse::<u32>().ok()
            };
            code.and_then(char::from_u32).map(String::from).unwrap_or_else(|| caps[0].to_string())
        })
        .to_string();
    result
}
static URL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"https?://\S+").unwrap());
static SHORT_URL_HOST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:bit\.ly|t\.co|goo\.gl|tinyurl\.com)/\S+").unwrap()
});
static MENTION_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|\s)(?:@|u/|r/)[A-Za-z0-9_]+").unwrap());
static HASHTAG_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"#[A-Za-z0-9_]+").unwrap());
static QUOTE_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*>.*$").unwrap());
static EDIT_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bedit\s*\d*\s*:.*$").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static REPEATED_CHAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(.)\1{2,}").unwrap());
static DISALLOWED_PUNCT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[^\w\s.,!?;:()\-'"$%#@/]"#).unwrap());

/// Expansion lexicon for common contractions, applied before punctuation
/// stripping so `can't` doesn't get mangled into `cant`.
const CONTRACTIONS: &[(&str, &str)] = &[
    ("won't", "will not"),
    ("can't", "cannot"),
    ("n't", " not"),
    ("i'm", "i am"),
    ("you're", "you are"),
    ("we're", "we are"),
    ("they're", "they are"),
    ("it's", "it is"),
    ("that's", "that is"),
    ("what's", "what is"),
    ("there's", "there is"),
    ("here's", "here is"),
    ("who's", "who is"),
    ("let's", "let us"),
    ("i've", "i have"),
    ("you've", "you have"),
    ("we've", "we have"),
    ("they've", "they have"),
    ("i'd", "i would"),
    ("you'd", "you would"),
    ("he'd", "he would"),
    ("she'd", "she would"),
    ("we'd", "we would"),
    ("they'd", "they would"),
    ("i'll", "i will"),
    ("you'll", "you will"),
    ("he'll", "he will"),
    ("she'll", "she will"),
    ("we'll", "we will"),
    ("they'll", "they will"),
    ("isn't", "is not"),
    ("aren't", "are not"),
    ("wasn't", "was not"),
    ("weren't", "were not"),
    ("haven't", "have not"),
    ("hasn't", "has not"),
    ("hadn't", "had not"),
    ("doesn't", "does not"),
    ("don't", "do not"),
    ("didn't", "did not"),
    ("couldn't", "could not"),
    ("shouldn't", "should not"),
    ("wouldn't", "would not"),
    ("mightn't", "might not"),
    ("mustn't", "must not"),
    ("y'all", "you all"),
    ("gonna", "going to"),
    ("wanna", "want to"),
    ("gotta", "got to"),
    ("kinda", "kind of"),
    ("outta", "out of"),
];

fn expand_contractions(text: &str) -> String {
    let mut result = text.to_string();
    for (contraction, expansion) in CONTRACTIONS {
        result = replace_case_insensitive(&result, contraction, expansion);
    }
    result
}

fn replace_case_insensitive(haystack: &str, needle: &str, replacement: &str) -> String {
    let lower_haystack = haystack.to_lowercase();
    let lower_needle = needle.to_lowercase();
    let mut result = String::with_capacity(haystack.len());
    let mut last = 0;
    let mut search_from = 0;
    while let Some(pos) = lower_haystack[search_from..].find(&lower_needle) {
        let start = search_from + pos;
        let end = start + needle.len();
        result.push_str(&haystack[last..start]);
        result.push_str(replacement);
        last = end;
        search_from = end;
    }
    result.push_str(&haystack[last..]);
    result
}

/// Splits `text` into first-60%/last-40% word-boundary-snapped halves of
/// `budget`, joined with ` ... `.
fn intelligent_truncate(text: &str, budget: usize) -> String {
    if text.len() <= budget {
        return text.to_string();
    }

    let separator = " ... ";
    let usable = budget.saturating_sub(separator.len());
    let head_budget = (usable as f64 * 0.6) as usize;
    let tail_budget = usable.saturating_sub(head_budget);

    let head = snap_to_word_boundary(text, head_budget, true);
    let tail = snap_to_word_boundary(text, tail_budget, false);

    format!("{head}{separator}{tail}")
}

fn snap_to_word_boundary(text: &str, budget: usize, from_start: bool) -> String {
    if budget == 0 {
        return String::new();
    }
    if from_start {
        let mut end = budget.min(text.len());
        while end > 0 && !text.is_char_boundary(end) {
            end -= 1;
        }
        let slice = &text[..end];
        match slice.rfind(char::is_whitespace) {
            Some(idx) if idx > 0 => slice[..idx].to_string(),
            _ => slice.to_string(),
        }
    } else {
        let mut start = text.len().saturating_sub(budget);
        while start < text.len() && !text.is_char_boundary(start) {
            start += 1;
        }
        let slice = &text[start..];
        match slice.find(char::is_whitespace) {
            Some(idx) if idx + 1 < slice.len() => slice[idx + 1..].to_string(),
            _ => slice.to_string(),
        }
    }
}

/// Deterministic, pure normalization pipeline. Never panics or returns
/// `Err`; a caught failure surfaces as `ProcessedText::failed()`.
pub fn preprocess(raw_text: &str, config: &PreprocessConfig) -> ProcessedText {
    let start = Instant::now();
    let mut counts: HashMap<String, u32> = HashMap::new();

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let mut text = decode_html_entities(raw_text);

        let (stripped, n) = count_and_replace(&HTML_TAG, &text);
        text = stripped;
        counts.insert("html_tags".to_string(), n);

        let (stripped, n) = count_and_replace(&URL_PATTERN, &text);
        text = stripped;
        let (stripped, n2) = count_and_replace(&SHORT_URL_HOST, &text);
        text = stripped;
        counts.insert("urls".to_string(), n + n2);

        let (stripped, n) = count_and_replace(&MENTION_PATTERN, &text);
        text = stripped;
        counts.insert("mentions".to_string(), n);

        if config.strip_hashtags {
            let (stripped, n) = count_and_replace(&HASHTAG_PATTERN, &text);
            text = stripped;
            counts.insert("hashtags".to_string(), n);
        }

        text = QUOTE_LINE.replace_all(&text, "").to_string();
        text = EDIT_MARKER.replace_all(&text, "").to_string();

        text = expand_contractions(&text);

        text = WHITESPACE.replace_all(&text, " ").trim().to_string();

        text = REPEATED_CHAR.replace_all(&text, "$1$1").to_string();

        text = DISALLOWED_PUNCT.replace_all(&text, "").to_string();

        if config.lowercase {
            text = text.to_lowercase();
        }

        text = WHITESPACE.replace_all(&text, " ").trim().to_string();

        text
    }));

    let cleaned_text = match result {
        Ok(text) => text,
        Err(_) => {
            return ProcessedText {
                cleaned_text: String::new(),
                removed_counts: counts,
                success: false,
                duration: start.elapsed(),
            };
        }
    };

    if cleaned_text.len() < config.min_length {
        return ProcessedText {
            cleaned_text: String::new(),
            removed_counts: counts,
            success: false,
            duration: start.elapsed(),
        };
    }

    let final_text = if cleaned_text.len() > config.max_length {
        intelligent_truncate(&cleaned_text, config.max_length)
    } else {
        cleaned_text
    };

    ProcessedText {
        cleaned_text: final_text,
        removed_counts: counts,
        success: true,
        duration: start.elapsed(),
    }
}

fn count_and_replace(pattern: &Regex, text: &str) -> (String, u32) {
    let count = pattern.find_iter(text).count() as u32;
    (pattern.replace_all(text, " ").to_string(), count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_html_tags() {
        let result = preprocess("<b>Stocks rally</b> after earnings beat expectations today", &PreprocessConfig::default());
        assert!(result.success);
        assert!(!result.cleaned_text.contains('<'));
    }

    #[test]
    fn decodes_html_entities() {
        let result = preprocess(
            "Q2 earnings &amp; revenue beat expectations &#8212; shares surge &#x2019; analysts say",
            &PreprocessConfig::default(),
        );
        assert!(result.success);
        assert!(!result.cleaned_text.contains("&amp;"));
        assert!(!result.cleaned_text.contains("&#"));
    }

    #[test]
    fn strips_urls_and_mentions() {
        let result = preprocess(
            "Great call u/trader123 see https://example.com/x for the earnings details today",
            &PreprocessConfig::default(),
        );
        assert!(result.success);
        assert!(!result.cleaned_text.contains("https://"));
        assert!(!result.cleaned_text.contains("u/trader123"));
    }

    #[test]
    fn expands_contractions() {
        let result = preprocess("It's clear the company won't miss its earnings target", &PreprocessConfig::default());
        assert!(result.success);
        assert!(result.cleaned_text.to_lowercase().contains("it is"));
        assert!(result.cleaned_text.to_lowercase().contains("will not"));
    }

    #[test]
    fn rejects_below_min_length() {
        let result = preprocess("short", &PreprocessConfig::default());
        assert!(!result.success);
        assert!(result.cleaned_text.is_empty());
    }

    #[test]
    fn truncates_long_text_with_separator() {
        let long_text = "word ".repeat(2000);
        let config = PreprocessConfig { max_length: 100, ..Default::default() };
        let result = preprocess(&long_text, &config);
        assert!(result.success);
        assert!(result.cleaned_text.contains(" ... "));
        assert!(result.cleaned_text.len() <= 100 + 10);
    }

    #[test]
    fn squashes_repeated_characters() {
        let result = preprocess("This is sooooo good for the stock market today", &PreprocessConfig::default());
        assert!(result.success);
        assert!(!result.cleaned_text.contains("ooooo"));
    }

    #[test]
    fn never_panics_on_pathological_input() {
        let weird = "\u{0}\u{1}".repeat(5000);
        let result = preprocess(&weird, &PreprocessConfig::default());
        assert!(!result.success || result.cleaned_text.len() <= 5000);
    }
}
