use provenance_schemas::Fragment;

/// Ellipsis appended when content is shortened.
const ELLIPSIS: &str = "...";

/// Fraction of the limit a word boundary must clear for the cut to move
/// back to it.
const WORD_CUT_RATIO_PERCENT: usize = 70;

/// Split a free-text query into lowercase tokens. Whitespace-separated,
/// empty tokens dropped.
pub fn tokenize(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|token| token.to_lowercase())
        .collect()
}

/// Free-text filter predicate: every query token must appear, case
/// insensitively, somewhere in the fragment's content, project, or one of
/// its topics. An empty query matches everything.
pub fn matches_text(fragment: &Fragment, query: &str) -> bool {
    let tokens = tokenize(query);
    if tokens.is_empty() {
        return true;
    }

    let content = fragment.content.to_lowercase();
    let project = fragment.project.as_deref().unwrap_or("").to_lowercase();
    let topics: Vec<String> = fragment
        .topics
        .iter()
        .map(|topic| topic.to_lowercase())
        .collect();

    tokens.iter().all(|token| {
        content.contains(token)
            || project.contains(token)
            || topics.iter().any(|topic| topic.contains(token))
    })
}

/// Shorten content for display. Newlines are flattened to spaces first.
/// Within the limit, content is returned unchanged. Over it, the cut
/// prefers the nearest word boundary as long as it sits at or past 70% of
/// `max_len`; otherwise the cut is mid-word. The result (ellipsis
/// included) never exceeds `max_len`, which makes the operation
/// idempotent.
pub fn truncate(content: &str, max_len: usize) -> String {
    let flattened = content.replace('\n', " ");
    let flattened = flattened.trim();
    let chars: Vec<char> = flattened.chars().collect();

    if chars.len() <= max_len {
        return flattened.to_string();
    }

    if max_len <= ELLIPSIS.len() {
        return chars[..max_len].iter().collect();
    }

    let budget = max_len - ELLIPSIS.len();

    // Character indexes throughout: byte offsets would drift on multi-byte
    // content.
    let last_space = chars[..budget].iter().rposition(|&c| c == ' ');
    let cut_at = match last_space {
        Some(space_idx) if space_idx * 100 >= max_len * WORD_CUT_RATIO_PERCENT => space_idx,
        _ => budget,
    };

    let mut result: String = chars[..cut_at].iter().collect();
    let trimmed_len = result.trim_end().len();
    result.truncate(trimmed_len);
    result.push_str(ELLIPSIS);
    result
}
