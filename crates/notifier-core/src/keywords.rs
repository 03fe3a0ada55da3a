//! Keyword normalisation and line matching.
//!
//! A [`KeywordSet`] is built once from the raw `-search` value and shared
//! read-only by every line check. Matching is case-insensitive and
//! order-dependent: the first keyword in list order that occurs anywhere in
//! the line wins, even if a later keyword occurs earlier in the text.

use crate::error::{NotifierError, Result};

// ── Keyword ───────────────────────────────────────────────────────────────────

/// A single non-empty search term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    /// Trimmed spelling as supplied by the operator.
    original: String,
    /// Lowercased characters used for comparison.
    folded: Vec<char>,
}

impl Keyword {
    fn new(raw: &str) -> Option<Self> {
        let original = raw.trim();
        if original.is_empty() {
            return None;
        }
        Some(Self {
            original: original.to_string(),
            folded: fold(original).collect(),
        })
    }

    /// The keyword as the operator typed it (trimmed).
    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Byte offset of the first case-insensitive occurrence in `text`.
    ///
    /// The offset always lies on a char boundary of `text`.
    pub fn find_in(&self, text: &str) -> Option<usize> {
        text.char_indices()
            .map(|(idx, _)| idx)
            .find(|&idx| starts_with_folded(&text[idx..], &self.folded))
    }
}

impl std::fmt::Display for Keyword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.original)
    }
}

// ── MatchedLine ───────────────────────────────────────────────────────────────

/// Result of a successful line check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedLine<'a> {
    /// The keyword that produced the match.
    pub keyword: &'a Keyword,
    /// Line text from the first character of the match through line end.
    pub body: &'a str,
}

// ── KeywordSet ────────────────────────────────────────────────────────────────

/// Ordered, de-blanked list of keywords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordSet {
    keywords: Vec<Keyword>,
}

impl KeywordSet {
    /// Split `raw` on commas, trim each entry and drop blanks.
    ///
    /// Fails with [`NotifierError::NoKeywords`] when nothing survives.
    pub fn parse(raw: &str) -> Result<Self> {
        let keywords: Vec<Keyword> = raw.split(',').filter_map(Keyword::new).collect();
        if keywords.is_empty() {
            return Err(NotifierError::NoKeywords);
        }
        Ok(Self { keywords })
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keyword> {
        self.keywords.iter()
    }

    /// Check `line` against every keyword in order and return the first hit.
    pub fn find_match<'a>(&'a self, line: &'a str) -> Option<MatchedLine<'a>> {
        self.keywords.iter().find_map(|keyword| {
            keyword.find_in(line).map(|idx| MatchedLine {
                keyword,
                body: &line[idx..],
            })
        })
    }
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn fold(s: &str) -> impl Iterator<Item = char> + '_ {
    s.chars().flat_map(char::to_lowercase)
}

fn starts_with_folded(text: &str, needle: &[char]) -> bool {
    let mut folded = fold(text);
    needle.iter().all(|expected| folded.next() == Some(*expected))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
