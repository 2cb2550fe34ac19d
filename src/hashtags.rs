use std::collections::HashSet;

const TRAILING_PUNCTUATION: &[char] = &['.', ',', '!', '?'];

/// Pulls the hashtags out of post text.
///
/// A whitespace-separated word counts when it starts with `#` and, once the
/// leading `#`s and trailing `.,!?` are stripped, is a non-empty run of
/// letters, digits and underscores. Tags are compared exactly, so `#Rust`
/// and `#rust` are two tags. The result carries no ordering.
pub fn extract(content: &str) -> HashSet<String> {
    content
        .split_whitespace()
        .filter(|word| word.starts_with('#'))
        .map(|word| {
            word.trim_start_matches('#')
                .trim_end_matches(TRAILING_PUNCTUATION)
        })
        .filter(|tag| is_valid(tag))
        .map(str::to_string)
        .collect()
}

/// Whether `tag` (without its `#`) is a well-formed hashtag.
pub fn is_valid(tag: &str) -> bool {
    !tag.is_empty() && tag.chars().all(|c| c.is_alphanumeric() || c == '_')
}
