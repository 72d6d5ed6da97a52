//! Query tokenization for lexical recall.
//!
//! Splits a natural-language request into identifier tokens and quoted
//! phrases: whitespace split, camelCase / snake_case boundary split, keep
//! alphanumeric tokens of three or more characters, preserve anything the
//! user put in double quotes.

/// Minimum token length kept for lexical recall.
const MIN_TOKEN_CHARS: usize = 3;

/// Tokenized query: OR-able tokens plus exact phrases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryTerms {
    pub tokens: Vec<String>,
    pub phrases: Vec<String>,
}

impl QueryTerms {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.phrases.is_empty()
    }
}

/// Tokenize a query, preserving quoted phrases.
pub fn tokenize_query(query: &str) -> QueryTerms {
    let mut terms = QueryTerms::default();
    let mut remainder = String::with_capacity(query.len());

    // Pull out "quoted phrases" first
    let mut rest = query;
    while let Some(open) = rest.find('"') {
        remainder.push_str(&rest[..open]);
        match rest[open + 1..].find('"') {
            Some(close) => {
                let phrase = &rest[open + 1..open + 1 + close];
                if !phrase.trim().is_empty() {
                    terms.phrases.push(phrase.trim().to_string());
                }
                rest = &rest[open + close + 2..];
            }
            None => {
                remainder.push_str(&rest[open + 1..]);
                rest = "";
            }
        }
    }
    remainder.push_str(rest);

    let mut push = |token: String| {
        if token.chars().count() >= MIN_TOKEN_CHARS
            && token.chars().all(|c| c.is_alphanumeric())
            && !terms.tokens.contains(&token)
        {
            terms.tokens.push(token);
        }
    };

    for word in remainder.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if word.is_empty() {
            continue;
        }
        // The whole identifier (lowercased) matches code indexed verbatim;
        // its camelCase / snake_case parts match the split form.
        let whole: String = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        push(whole);
        for part in split_identifier(word) {
            push(part);
        }
    }

    terms
}

/// Split an identifier on snake_case and camelCase boundaries.
fn split_identifier(word: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for snake_part in word.split('_') {
        let mut current = String::new();
        let chars: Vec<char> = snake_part.chars().collect();
        for (i, &c) in chars.iter().enumerate() {
            let boundary = i > 0
                && c.is_uppercase()
                && (chars[i - 1].is_lowercase()
                    // Acronym end: "HTTPServer" splits before "Server"
                    || chars.get(i + 1).is_some_and(|n| n.is_lowercase()));
            if boundary && !current.is_empty() {
                parts.push(current.to_lowercase());
                current = String::new();
            }
            current.push(c);
        }
        if !current.is_empty() {
            parts.push(current.to_lowercase());
        }
    }
    parts
}
