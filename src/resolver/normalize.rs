//! Name normalization and fuzzy name similarity

/// Canonical form used for exact entity matching.
///
/// Case-folds, strips punctuation, trims and collapses internal whitespace,
/// so `"  Lang-Graph! "` and `"langgraph"` compare equal.
pub fn normalize_name(name: &str) -> String {
    let folded: String = name
        .chars()
        .filter(|c| !c.is_ascii_punctuation() && !is_unicode_punctuation(*c))
        .flat_map(|c| c.to_lowercase())
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_unicode_punctuation(c: char) -> bool {
    matches!(
        c,
        '\u{2010}'..='\u{2027}' | '\u{2030}'..='\u{205E}' | '\u{00A1}' | '\u{00A7}' | '\u{00AB}'
            | '\u{00B6}' | '\u{00B7}' | '\u{00BB}' | '\u{00BF}' | '\u{3001}'..='\u{3003}'
    )
}

/// Similarity of two already-normalized names in 0.0..=1.0.
///
/// Jaro-Winkler over the normalized forms, with whitespace removed so
/// `"lang graph"` and `"langgraph"` are not penalized for spacing.
pub fn name_similarity(a: &str, b: &str) -> f32 {
    let a: String = a.split_whitespace().collect();
    let b: String = b.split_whitespace().collect();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    strsim::jaro_winkler(&a, &b) as f32
}

/// Characters `name_similarity` compares: the normalized name without whitespace
pub fn similarity_length(normalized: &str) -> usize {
    normalized.chars().filter(|c| !c.is_whitespace()).count()
}

/// Inclusive range of `similarity_length` values that can still reach
/// `threshold` against a name of `length` characters.
///
/// The Winkler prefix bonus lifts a score by at most `0.4 * (1 - jaro)`,
/// and jaro is at most `(2 + shorter / longer) / 3`, so a high threshold
/// bounds the length ratio.
pub fn similarity_length_window(length: usize, threshold: f32) -> (usize, usize) {
    let min_jaro = ((threshold as f64 - 0.6) / 0.4).max(0.0);
    let min_ratio = 3.0 * min_jaro - 2.0;
    if min_ratio <= 0.0 {
        return (0, usize::MAX);
    }
    let lo = (length as f64 * min_ratio).floor() as usize;
    let hi = (length as f64 / min_ratio).ceil() as usize;
    (lo, hi)
}
