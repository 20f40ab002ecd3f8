//! Title comparison rules shared by forward resolution and reverse ancestor walks.

const WORD_DELIMITERS: [char; 5] = [':', ';', ',', '_', '-'];

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || WORD_DELIMITERS.contains(&c)
}

/// Collapses whitespace, trims, case-folds and treats ':' as a space.
pub fn normalize_title(title: &str) -> String {
    title
        .replace(':', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn titles_match(a: &str, b: &str) -> bool {
    normalize_title(a) == normalize_title(b)
}

/// Restores a colon the local filesystem replaced: the first run of two or more spaces
/// becomes `": "`. Returns `None` when the segment already has a colon or no such run.
pub fn colon_recovery(segment: &str) -> Option<String> {
    if segment.contains(':') {
        return None;
    }
    let start = segment.find("  ")?;
    let end = segment[start..]
        .find(|c: char| c != ' ')
        .map(|offset| start + offset)
        .unwrap_or(segment.len());
    Some(format!("{}: {}", &segment[..start], &segment[end..]))
}

pub fn has_delimiters(segment: &str) -> bool {
    segment.chars().any(is_delimiter)
}

pub fn word_tokens(title: &str) -> Vec<String> {
    title
        .split(is_delimiter)
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

fn token_chars(tokens: &[String]) -> usize {
    tokens.iter().map(|t| t.chars().count()).sum()
}

/// True when `candidate` has the same amount of word material as `words` and contains every
/// word in order, case-insensitively, not necessarily contiguous.
pub fn word_match(candidate: &str, words: &[String]) -> bool {
    if token_chars(&word_tokens(candidate)) != token_chars(words) {
        return false;
    }
    let haystack = candidate.to_lowercase();
    let mut from = 0;
    for word in words {
        let word = word.to_lowercase();
        match haystack[from..].find(&word) {
            Some(offset) => from += offset + word.len(),
            None => return false,
        }
    }
    true
}
