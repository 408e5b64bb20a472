//! Char-offset splicing over UTF-8 strings.
//!
//! Every position in this crate counts Unicode scalar values, not bytes.
//! Offsets past the end are clamped to the end.

pub fn chars_to_bytes(s: &str, char_pos: usize) -> usize {
    str_indices::chars::to_byte_idx(s, char_pos)
}

pub fn count_chars(s: &str) -> usize {
    str_indices::chars::count(s)
}

/// Insert `content` at `char_pos` (clamped). Returns the char offset used.
pub fn insert_at(text: &mut String, char_pos: usize, content: &str) -> usize {
    let pos = char_pos.min(count_chars(text));
    text.insert_str(chars_to_bytes(text, pos), content);
    pos
}

/// Remove up to `len` chars starting at `char_pos` (clamped).
///
/// Returns `(start, removed)` in chars.
pub fn remove_at(text: &mut String, char_pos: usize, len: usize) -> (usize, usize) {
    let total = count_chars(text);
    let start = char_pos.min(total);
    let removed = len.min(total - start);
    if removed > 0 {
        let from = chars_to_bytes(text, start);
        let to = chars_to_bytes(text, start + removed);
        text.replace_range(from..to, "");
    }
    (start, removed)
}
