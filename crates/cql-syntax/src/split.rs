//! Top-level statement splitting.
//!
//! A statement starts with one of the statement keywords at the beginning of
//! a line and runs until the next such line. Keyword lines inside a
//! `/* */` comment do not start a statement.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;

static STATEMENT_START_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(library|using|include|context|define)\b")
        .expect("statement start regex")
});

/// A slice of the source holding one statement (or leading trivia)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk<'a> {
    /// Byte offset of `text` within the library source
    pub offset: usize,
    pub text: &'a str,
}

/// Split `source` into the text before the first statement (possibly
/// empty) followed by one chunk per statement.
pub fn split_statements(source: &str) -> (Chunk<'_>, Vec<Chunk<'_>>) {
    let comments = block_comments(source);
    let starts: Vec<usize> = STATEMENT_START_RE
        .captures_iter(source)
        .filter_map(|cap| cap.get(1).map(|m| m.start()))
        .filter(|start| !comments.iter().any(|range| range.contains(start)))
        .collect();

    let preamble_end = starts.first().copied().unwrap_or(source.len());
    let preamble = Chunk {
        offset: 0,
        text: &source[..preamble_end],
    };

    let chunks = starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(source.len());
            Chunk {
                offset: start,
                text: &source[start..end],
            }
        })
        .collect();

    (preamble, chunks)
}

/// Byte ranges of `/* */` comments, ignoring delimiters inside string
/// literals, quoted identifiers and line comments. An unterminated comment
/// runs to the end of the source.
fn block_comments(source: &str) -> Vec<Range<usize>> {
    let bytes = source.as_bytes();
    let mut ranges = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            quote @ (b'\'' | b'"') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote && bytes[i] != b'\n' {
                    i += 1;
                }
                i += 1;
            }
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let start = i;
                let end = source[i + 2..]
                    .find("*/")
                    .map_or(source.len(), |pos| i + 2 + pos + 2);
                ranges.push(start..end);
                i = end;
            }
            _ => i += 1,
        }
    }
    ranges
}
