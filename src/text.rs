//! Byte-offset helpers that never split a UTF-8 sequence.

use std::collections::HashSet;

use unicode_normalization::UnicodeNormalization;

#[inline]
pub fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[inline]
pub fn ceil_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

#[inline]
pub fn prev_char(s: &str, index: usize) -> Option<char> {
    s[..index].chars().next_back()
}

#[inline]
pub fn next_char(s: &str, index: usize) -> Option<char> {
    s[index..].chars().next()
}

/// Move `index` left until the preceding char is whitespace (or the start).
pub fn expand_to_word_start(s: &str, index: usize) -> usize {
    let mut i = floor_char_boundary(s, index);
    while let Some(c) = prev_char(s, i) {
        if c.is_whitespace() {
            break;
        }
        i -= c.len_utf8();
    }
    i
}

/// Move `index` right until the following char is whitespace (or the end).
pub fn expand_to_word_end(s: &str, index: usize) -> usize {
    let mut i = ceil_char_boundary(s, index);
    while let Some(c) = next_char(s, i) {
        if c.is_whitespace() {
            break;
        }
        i += c.len_utf8();
    }
    i
}

/// Start of the first word at or after `index`, expanded to its real start.
pub fn snap_start(s: &str, index: usize) -> usize {
    let mut i = floor_char_boundary(s, index);
    while let Some(c) = next_char(s, i) {
        if !c.is_whitespace() {
            break;
        }
        i += c.len_utf8();
    }
    expand_to_word_start(s, i)
}

/// End of the last word at or before `index`, expanded to its real end.
pub fn snap_end(s: &str, index: usize) -> usize {
    let mut i = ceil_char_boundary(s, index);
    while let Some(c) = prev_char(s, i) {
        if !c.is_whitespace() {
            break;
        }
        i -= c.len_utf8();
    }
    expand_to_word_end(s, i)
}

/// Shrink `[start, end)` past leading and trailing whitespace.
pub fn trim_span(s: &str, start: usize, end: usize) -> (usize, usize) {
    let slice = &s[start..end];
    let lead = slice.len() - slice.trim_start().len();
    if lead == slice.len() {
        return (start, start);
    }
    let trail = slice.len() - slice.trim_end().len();
    (start + lead, end - trail)
}

/// True when `[start, end)` is bounded by whitespace or the ends of `s`.
pub fn is_whitespace_delimited(s: &str, start: usize, end: usize) -> bool {
    prev_char(s, start).map_or(true, char::is_whitespace)
        && next_char(s, end).map_or(true, char::is_whitespace)
}

/// True when the span begins or ends inside a run of alphanumerics.
pub fn splits_word(s: &str, start: usize, end: usize) -> bool {
    let splits_at = |i: usize| {
        matches!(
            (prev_char(s, i), next_char(s, i)),
            (Some(a), Some(b)) if a.is_alphanumeric() && b.is_alphanumeric()
        )
    };
    splits_at(start) || splits_at(end)
}

/// Start offsets of every occurrence of `needle`, overlapping ones included.
pub fn occurrences<'a>(haystack: &'a str, needle: &'a str) -> impl Iterator<Item = usize> + 'a {
    let step = needle.chars().next().map_or(1, char::len_utf8);
    let mut from = 0;
    std::iter::from_fn(move || {
        if needle.is_empty() {
            return None;
        }
        let at = from + haystack.get(from..)?.find(needle)?;
        from = at + step;
        Some(at)
    })
}

/// Byte offset of the `n`th char of `s` (or `s.len()`).
pub fn byte_offset_of_char(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map_or(s.len(), |(i, _)| i)
}

/// A word found in a larger text, with its canonical token form.
#[derive(Debug, Clone)]
pub struct WordSpan {
    pub start: usize,
    pub end: usize,
    pub token: String,
}

impl WordSpan {
    pub fn char_len(&self) -> usize {
        self.token.chars().count()
    }
}

/// Canonical token form: NFKC, lowercase.
pub fn canonical_token(raw: &str) -> String {
    raw.nfkc().flat_map(char::to_lowercase).collect()
}

/// Alphanumeric runs of `s` with their byte spans.
pub fn words(s: &str) -> Vec<WordSpan> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    for (i, c) in s.char_indices() {
        match (c.is_alphanumeric(), start) {
            (true, None) => start = Some(i),
            (false, Some(st)) => {
                out.push(WordSpan {
                    start: st,
                    end: i,
                    token: canonical_token(&s[st..i]),
                });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(st) = start {
        out.push(WordSpan {
            start: st,
            end: s.len(),
            token: canonical_token(&s[st..]),
        });
    }
    out
}

/// Ordered tokens of `s` longer than `min_chars - 1` chars. Falls back to all
/// tokens when the filter would leave none.
pub fn significant_tokens(s: &str, min_chars: usize) -> Vec<String> {
    let all: Vec<String> = words(s).into_iter().map(|w| w.token).collect();
    let filtered: Vec<String> = all
        .iter()
        .filter(|t| t.chars().count() >= min_chars)
        .cloned()
        .collect();
    if filtered.is_empty() {
        all
    } else {
        filtered
    }
}

pub fn token_set(s: &str, min_chars: usize) -> HashSet<String> {
    significant_tokens(s, min_chars).into_iter().collect()
}
