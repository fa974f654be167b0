use regex::Regex;

use crate::text::tokenize;

/// A run of content, flagged when it matches a query token. Concatenating
/// the `text` of every segment reproduces the original content exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub matched: bool,
}

impl Segment {
    fn plain(text: impl Into<String>) -> Self {
        Segment {
            text: text.into(),
            matched: false,
        }
    }

    fn matched(text: impl Into<String>) -> Self {
        Segment {
            text: text.into(),
            matched: true,
        }
    }
}

/// Split content into matched and unmatched runs for a free-text query.
///
/// Every token is regex-escaped before the pattern is built, so queries
/// containing metacharacters (`c++`, `a.b*c`, ...) are matched literally
/// and can never fail to compile. A run is marked only when it equals a
/// token case-insensitively — equality, not containment. The underlying
/// content is never altered.
pub fn highlight(content: &str, query: &str) -> Vec<Segment> {
    if content.is_empty() {
        return vec![];
    }

    let mut tokens = tokenize(query);
    if tokens.is_empty() {
        return vec![Segment::plain(content)];
    }

    // Longest token first so overlapping alternatives ("c++" vs "c")
    // prefer the longer match at the same position.
    tokens.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
    tokens.dedup();

    let pattern = format!(
        "(?i)({})",
        tokens
            .iter()
            .map(|token| regex::escape(token))
            .collect::<Vec<_>>()
            .join("|")
    );

    let regex = match Regex::new(&pattern) {
        Ok(regex) => regex,
        // Escaped literals always compile; if they somehow don't, degrade
        // to an unhighlighted view rather than failing the render.
        Err(_) => return vec![Segment::plain(content)],
    };

    let mut segments = Vec::new();
    let mut cursor = 0;

    for found in regex.find_iter(content) {
        if found.start() > cursor {
            segments.push(Segment::plain(&content[cursor..found.start()]));
        }

        let text = found.as_str();
        if tokens.iter().any(|token| token == &text.to_lowercase()) {
            segments.push(Segment::matched(text));
        } else {
            segments.push(Segment::plain(text));
        }

        cursor = found.end();
    }

    if cursor < content.len() {
        segments.push(Segment::plain(&content[cursor..]));
    }

    segments
}
