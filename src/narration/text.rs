//! Word segmentation and boundary-offset mapping.
//!
//! Both are whitespace based. Backends may place boundaries on units that are
//! not whitespace words (punctuation, numbers read digit by digit), so the
//! mapping is a best-effort alignment.

/// Splits on whitespace runs; never yields empty tokens
pub fn word_tokens(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_string).collect()
}

/// Index of the word being spoken when the backend reports `char_offset`.
///
/// An offset at the start of word `k` (or in the whitespace before it) maps
/// to `k`; an offset inside a word maps to that word. Offsets past the end
/// clamp to the last word. `None` when the text has no words.
///
/// This differs from counting the words in `text[..char_offset]`: that would
/// give `0` for `("Hello   brave", 5)`, while here the gap already belongs to
/// `brave` and the result is `1`.
pub fn word_index_at(text: &str, char_offset: usize) -> Option<usize> {
    let mut words_before = 0;
    let mut in_word = false;
    let mut last_word = None;

    for (i, c) in text.chars().enumerate() {
        if c.is_whitespace() {
            if in_word {
                words_before += 1;
            }
            in_word = false;
            continue;
        }
        if i >= char_offset {
            return Some(words_before);
        }
        in_word = true;
        last_word = Some(words_before);
    }

    // Offset lands after the last word started (mid-word or trailing space)
    match last_word {
        Some(idx) if in_word => Some(idx),
        Some(_) => Some(words_before - 1),
        None => None,
    }
}
