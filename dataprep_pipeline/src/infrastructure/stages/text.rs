// /////////////////////////////////////////////////////////////////////////////
// Dataprep Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Text Normalization Helpers
//!
//! Shared text machinery behind the preprocess and scoring stages: markup
//! stripping, whitespace normalization, page and section fencing, sentence
//! splitting, and token counting. All functions are pure; the stages decide
//! which to apply based on the playbook.

/// Removes `<...>` markup tags, keeping the text between them.
///
/// Not an HTML parser: the goal is chunkable prose, not fidelity. Script
/// and style element bodies are dropped entirely.
pub fn strip_markup(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();
    let lower = input.to_ascii_lowercase();
    let mut skip_until: Option<&'static str> = None;

    while let Some((i, c)) = chars.next() {
        if let Some(close) = skip_until {
            if lower[i..].starts_with(close) {
                skip_until = None;
                for _ in 0..close.len() - 1 {
                    chars.next();
                }
            }
            continue;
        }
        if c == '<' {
            if lower[i..].starts_with("<script") {
                skip_until = Some("</script>");
                continue;
            }
            if lower[i..].starts_with("<style") {
                skip_until = Some("</style>");
                continue;
            }
            // Consume to the closing '>'.
            for (_, tc) in chars.by_ref() {
                if tc == '>' {
                    break;
                }
            }
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

/// Collapses runs of spaces and tabs, normalizes line endings, and trims
/// trailing space per line.
pub fn normalize_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for line in input.replace("\r\n", "\n").replace('\r', "\n").lines() {
        let mut last_space = true;
        let mut trimmed = String::with_capacity(line.len());
        for c in line.chars() {
            if c == ' ' || c == '\t' {
                if !last_space {
                    trimmed.push(' ');
                    last_space = true;
                }
            } else {
                trimmed.push(c);
                last_space = false;
            }
        }
        out.push_str(trimmed.trim_end());
        out.push('\n');
    }
    out
}

/// Splits text into pages on form-feed fences; the whole text is page 1
/// when no fence is present.
pub fn split_pages(input: &str) -> Vec<&str> {
    input.split('\u{000C}').collect()
}

/// A fenced span of text with its section heading, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Section<'a> {
    pub heading: Option<String>,
    pub body: Vec<&'a str>,
}

/// Fences lines into sections on markdown-style headings.
pub fn fence_sections(input: &str) -> Vec<Section<'_>> {
    let mut sections: Vec<Section<'_>> = Vec::new();
    let mut current = Section {
        heading: None,
        body: Vec::new(),
    };
    for line in input.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with('#') {
            let heading = trimmed.trim_start_matches('#').trim();
            if !current.body.is_empty() || current.heading.is_some() {
                sections.push(current);
            }
            current = Section {
                heading: if heading.is_empty() {
                    None
                } else {
                    Some(heading.to_string())
                },
                body: Vec::new(),
            };
        } else {
            current.body.push(line);
        }
    }
    if !current.body.is_empty() || current.heading.is_some() {
        sections.push(current);
    }
    sections
}

/// Splits prose into sentences on terminal punctuation followed by
/// whitespace. Abbreviation handling is intentionally minimal; a split too
/// many only moves a chunk boundary.
pub fn split_sentences(input: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        current.push(c);
        if matches!(c, '.' | '!' | '?') {
            if let Some(&next) = chars.peek() {
                if next.is_whitespace() {
                    let sentence = current.trim();
                    if !sentence.is_empty() {
                        sentences.push(sentence.to_string());
                    }
                    current.clear();
                }
            }
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences
}

/// Whitespace token count.
pub fn token_count(input: &str) -> u32 {
    input.split_whitespace().count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_markup_keeps_text() {
        let html = "<html><body><h1>Title</h1><p>Hello <b>world</b>.</p></body></html>";
        let text = strip_markup(html);
        assert!(text.contains("Title"));
        assert!(text.contains("Hello"));
        assert!(text.contains("world"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn test_strip_markup_drops_script_bodies() {
        let html = "before<script>var x = 1;</script>after";
        let text = strip_markup(html);
        assert!(text.contains("before"));
        assert!(text.contains("after"));
        assert!(!text.contains("var x"));
    }

    #[test]
    fn test_normalize_whitespace_collapses_runs() {
        let text = "a  \t b \r\nc   ";
        assert_eq!(normalize_whitespace(text), "a b\nc\n");
    }

    #[test]
    fn test_fence_sections_on_headings() {
        let text = "intro line\n# First\nbody one\n## Second\nbody two";
        let sections = fence_sections(text);
        assert_eq!(sections.len(), 3);
        assert_eq!(sections[0].heading, None);
        assert_eq!(sections[1].heading.as_deref(), Some("First"));
        assert_eq!(sections[2].heading.as_deref(), Some("Second"));
        assert_eq!(sections[2].body, vec!["body two"]);
    }

    #[test]
    fn test_split_sentences() {
        let text = "First sentence. Second one! Third? trailing bit";
        let sentences = split_sentences(text);
        assert_eq!(
            sentences,
            vec![
                "First sentence.",
                "Second one!",
                "Third?",
                "trailing bit"
            ]
        );
    }

    #[test]
    fn test_split_pages_on_form_feed() {
        let text = "page one\u{000C}page two";
        assert_eq!(split_pages(text).len(), 2);
        assert_eq!(split_pages("no fences").len(), 1);
    }

    #[test]
    fn test_token_count() {
        assert_eq!(token_count("three word line"), 3);
        assert_eq!(token_count("  "), 0);
    }
}
