//! `$name` tokenizer used to validate and rewrite WCPS expressions.
//!
//! A variable reference starts at `$` and runs up to the first delimiter in
//! [`DELIMITERS`] or the end of the text. Scanning resumes at the delimiter,
//! so every character is visited once.

use std::borrow::Cow;

/// Characters that terminate a variable name.
pub const DELIMITERS: [char; 19] = [
    ' ', ',', '(', ')', '[', ']', '{', '}', ';', '>', '<', '+', '-', '=', '.', '/', '\\', '|',
    '!',
];

/// Returns true if `c` terminates a variable name.
#[must_use]
pub fn is_delimiter(c: char) -> bool {
    DELIMITERS.contains(&c)
}

// Line breaks and tabs also end a token when rewriting; validation folds them
// into spaces before extracting.
fn is_token_boundary(c: char) -> bool {
    is_delimiter(c) || matches!(c, '\n' | '\r' | '\t')
}

/// A `$name` reference and its byte range in the scanned text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Token<'a> {
    name: &'a str,
    start: usize,
    end: usize,
}

struct Tokens<'a> {
    text: &'a str,
    cursor: usize,
    boundary: fn(char) -> bool,
}

impl<'a> Tokens<'a> {
    fn new(text: &'a str, boundary: fn(char) -> bool) -> Self {
        Self {
            text,
            cursor: 0,
            boundary,
        }
    }
}

impl<'a> Iterator for Tokens<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.cursor + self.text[self.cursor..].find('$')?;
        let end = self.text[start..]
            .char_indices()
            .find(|&(_, c)| (self.boundary)(c))
            .map_or(self.text.len(), |(offset, _)| start + offset);

        self.cursor = end;
        Some(Token {
            name: &self.text[start..end],
            start,
            end,
        })
    }
}

/// Extract every `$name` reference from `text`, in order of appearance.
///
/// Returns `None` when the text contains no `$` at all, which callers treat
/// as "no variables referenced".
#[must_use]
pub fn extract_variable_names(text: &str) -> Option<Vec<String>> {
    let names: Vec<String> = Tokens::new(text, is_delimiter)
        .map(|token| token.name.to_string())
        .collect();

    if names.is_empty() {
        None
    } else {
        Some(names)
    }
}

/// Replace line breaks and tabs with single spaces.
#[must_use]
pub fn normalize_whitespace(text: &str) -> Cow<'_, str> {
    if text.contains(['\n', '\r', '\t']) {
        Cow::Owned(text.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(text)
    }
}

/// Rewrite every whole `$name` token for which `subset_of` returns a subset
/// into `$name[subset]`.
///
/// Only complete tokens are rewritten: a subset for `$c` leaves `$cc`
/// untouched. All other text is copied verbatim.
pub fn substitute_tokens<'s, F>(text: &str, subset_of: F) -> String
where
    F: Fn(&str) -> Option<&'s str>,
{
    let mut output = String::with_capacity(text.len());
    let mut copied = 0;

    for token in Tokens::new(text, is_token_boundary) {
        if let Some(subset) = subset_of(token.name) {
            output.push_str(&text[copied..token.end]);
            output.push('[');
            output.push_str(subset);
            output.push(']');
            copied = token.end;
        }
    }

    output.push_str(&text[copied..]);
    output
}
