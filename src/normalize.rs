//! Offset-preserving normalisation.
//!
//! The two representations disagree on typography far more often than on
//! wording: curly vs straight quotes, en-dashes, soft hyphens, words broken
//! across lines, collapsed whitespace. `NormalizedText` folds those
//! differences away while remembering, for every output byte, which source
//! bytes produced it, so a match in normalised space maps back onto the
//! original text.

use unicode_normalization::UnicodeNormalization;

const SOFT_HYPHEN: char = '\u{00AD}';

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedText {
    pub text: String,
    starts: Vec<usize>,
    ends: Vec<usize>,
}

fn is_quote(c: char) -> bool {
    matches!(
        c,
        '"' | '\''
            | '`'
            | '\u{00B4}'
            | '\u{2018}'
            | '\u{2019}'
            | '\u{201A}'
            | '\u{201B}'
            | '\u{201C}'
            | '\u{201D}'
            | '\u{201E}'
            | '\u{201F}'
    )
}

fn is_dash(c: char) -> bool {
    matches!(c, '\u{2010}'..='\u{2015}' | '\u{2212}')
}

fn is_hyphen(c: char) -> bool {
    c == '-' || c == '\u{2010}'
}

impl NormalizedText {
    pub fn new(source: &str) -> Self {
        let chars: Vec<(usize, char)> = source.char_indices().collect();
        let mut out = NormalizedText {
            text: String::with_capacity(source.len()),
            starts: Vec::with_capacity(source.len()),
            ends: Vec::with_capacity(source.len()),
        };
        let mut pending_space: Option<(usize, usize)> = None;

        let mut i = 0;
        while i < chars.len() {
            let (pos, c) = chars[i];
            let end = pos + c.len_utf8();

            if c == SOFT_HYPHEN {
                i += 1;
                continue;
            }

            if is_hyphen(c) {
                if let Some(skip_to) = line_break_hyphenation(&chars, i, &out.text) {
                    i = skip_to;
                    continue;
                }
            }

            if c.is_whitespace() {
                pending_space = Some(match pending_space {
                    Some((s, _)) => (s, end),
                    None => (pos, end),
                });
                i += 1;
                continue;
            }

            if let Some((s, e)) = pending_space.take() {
                if !out.text.is_empty() {
                    out.push(' ', s, e);
                }
            }

            let folded = if is_quote(c) {
                '\''
            } else if is_dash(c) {
                '-'
            } else {
                c
            };
            for composed in std::iter::once(folded).nfkc() {
                for lower in composed.to_lowercase() {
                    out.push(lower, pos, end);
                }
            }
            i += 1;
        }
        out
    }

    fn push(&mut self, c: char, start: usize, end: usize) {
        self.text.push(c);
        for _ in 0..c.len_utf8() {
            self.starts.push(start);
            self.ends.push(end);
        }
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Map a normalised byte range back to the source byte range it covers.
    pub fn to_original(&self, start: usize, end: usize) -> Option<(usize, usize)> {
        if start >= end || end > self.text.len() {
            return None;
        }
        Some((self.starts[start], self.ends[end - 1]))
    }

    /// First normalised offset whose source position is at or after `original`.
    pub fn to_normalized(&self, original: usize) -> usize {
        self.starts.partition_point(|&s| s < original)
    }
}

/// `sug-\ngests` → `suggests`: a hyphen between letters followed by a line
/// break. Returns the index of the char that continues the word.
fn line_break_hyphenation(chars: &[(usize, char)], at: usize, emitted: &str) -> Option<usize> {
    let prev_is_letter = emitted.chars().next_back().map_or(false, char::is_alphabetic);
    if !prev_is_letter {
        return None;
    }
    let mut j = at + 1;
    let mut saw_newline = false;
    while j < chars.len() && chars[j].1.is_whitespace() {
        saw_newline |= chars[j].1 == '\n';
        j += 1;
    }
    let next_is_letter = chars.get(j).map_or(false, |(_, c)| c.is_alphabetic());
    if saw_newline && next_is_letter {
        Some(j)
    } else {
        None
    }
}

/// Normalised form of `s` without the offset maps.
pub fn normalize(s: &str) -> String {
    NormalizedText::new(s).text
}
