use serde::Serialize;

/// Display-only breakdown of a question. Never sent to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Normalization {
    pub original: String,
    pub lowercased: String,
    pub punctuation_removed: String,
    pub tokens: Vec<String>,
    pub processed: String,
}

pub fn normalize(question: &str) -> Normalization {
    let lowercased = question.to_lowercase();
    let punctuation_removed: String = lowercased
        .chars()
        .filter(|ch| !ch.is_ascii_punctuation())
        .collect();
    let tokens: Vec<String> = punctuation_removed
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let processed = tokens.join(" ");

    Normalization {
        original: question.to_string(),
        lowercased,
        punctuation_removed,
        tokens,
        processed,
    }
}
