use colored::Colorize;
use provenance_graph::{highlight, truncate};
use provenance_schemas::{
    Assumption, Decision, LinkType, RelatedFragment, ScoredFragment, SourceType,
};

/// Display width for quoted content lines.
pub const CONTENT_WIDTH: usize = 80;

/// Icon for a capture source. Total over the enum: a new source variant
/// fails to compile here instead of rendering blank.
fn source_icon(source_type: SourceType) -> &'static str {
    match source_type {
        SourceType::QuickCapture => "📝",
        SourceType::Zoom => "🎥",
        SourceType::Teams => "💬",
        SourceType::Notes => "📓",
    }
}

fn source_label(source_type: SourceType) -> &'static str {
    match source_type {
        SourceType::QuickCapture => "Quick Capture",
        SourceType::Zoom => "Zoom",
        SourceType::Teams => "Teams",
        SourceType::Notes => "Notes",
    }
}

pub fn format_source_type(source_type: SourceType) -> String {
    format!("{} {}", source_icon(source_type), source_label(source_type))
}

/// Icon for a link type. Total over the enum, same as `source_icon`.
pub fn link_icon(link_type: LinkType) -> &'static str {
    match link_type {
        LinkType::RelatesTo => "🔗",
        LinkType::References => "📎",
        LinkType::Follows => "➡️",
        LinkType::Contradicts => "⚡",
        LinkType::Invalidates => "❌",
    }
}

/// Date portion of an RFC3339 timestamp, without failing on odd input.
pub fn format_date(date_str: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(date_str) {
        Ok(parsed) => parsed.format("%Y-%m-%d").to_string(),
        Err(_) => date_str.get(..10).unwrap_or(date_str).to_string(),
    }
}

pub fn format_score(score: f64) -> String {
    let score_str = format!("{score:.2}");
    if score >= 0.8 {
        score_str.green().bold().to_string()
    } else if score >= 0.5 {
        score_str.yellow().to_string()
    } else {
        score_str
    }
}

pub fn format_strength(strength: f64) -> String {
    let strength_str = format!("{strength:.2}");
    if strength >= 0.9 {
        strength_str.green().bold().to_string()
    } else if strength >= 0.8 {
        strength_str.green().to_string()
    } else if strength >= 0.75 {
        strength_str.yellow().to_string()
    } else {
        strength_str
    }
}

pub fn format_confidence(confidence: f64) -> String {
    let confidence_str = format!("{confidence:.2}");
    if confidence >= 0.9 {
        confidence_str.green().bold().to_string()
    } else if confidence >= 0.7 {
        confidence_str.green().to_string()
    } else if confidence >= 0.5 {
        confidence_str.yellow().to_string()
    } else {
        confidence_str
    }
}

/// Shorten content and emphasize the query tokens inside what remains.
fn quoted_content(content: &str, query: &str) -> String {
    let shortened = truncate(content, CONTENT_WIDTH);
    let rendered: String = highlight(&shortened, query)
        .into_iter()
        .map(|segment| {
            if segment.matched {
                segment.text.bold().to_string()
            } else {
                segment.text
            }
        })
        .collect();

    format!("   \"{rendered}\"")
}

/// One search result: source, date, score header plus quoted content.
pub fn format_result(result: &ScoredFragment, query: &str) -> String {
    let fragment = &result.fragment;
    let header = format!(
        "{} • {} • Score: {}",
        format_source_type(fragment.source_type),
        format_date(&fragment.captured_at),
        format_score(result.score),
    );

    format!("{header}\n{}", quoted_content(&fragment.content, query))
}

/// One related fragment: link icon, source, date, strength, quoted content.
pub fn format_related(related: &RelatedFragment) -> String {
    let fragment = &related.fragment;
    let header = format!(
        "{} {} • {} • Strength: {}",
        link_icon(related.link_type),
        format_source_type(fragment.source_type),
        format_date(&fragment.captured_at),
        format_strength(related.strength),
    );

    format!("{header}\n{}", quoted_content(&fragment.content, ""))
}

/// One decision line, with the rationale underneath when present.
pub fn format_decision(decision: &Decision) -> String {
    let header = format!(
        "{}{} • {} • {} confidence",
        "✓ ".green().bold(),
        truncate(&decision.what, 60),
        format_date(&decision.created_at),
        format_confidence(decision.confidence),
    );

    if decision.why.is_empty() {
        header
    } else {
        format!("{header}\n  Because: {}", truncate(&decision.why, 70))
    }
}

/// One assumption line with its tri-state validity badge.
pub fn format_assumption(assumption: &Assumption) -> String {
    let (icon, status) = validity_badge(assumption.still_valid);
    let type_indicator = if assumption.explicit {
        "explicit"
    } else {
        "implicit"
    };

    format!(
        "{icon}{} • {} • {type_indicator} {status}",
        truncate(&assumption.statement, 60),
        format_date(&assumption.created_at),
    )
}

pub fn validity_badge(still_valid: Option<bool>) -> (String, String) {
    match still_valid {
        Some(false) => (
            "✗ ".red().bold().to_string(),
            "[INVALID]".red().to_string(),
        ),
        Some(true) => (
            "✓ ".green().bold().to_string(),
            "[VALID]".green().to_string(),
        ),
        None => (
            "? ".yellow().bold().to_string(),
            "[UNCHECKED]".yellow().to_string(),
        ),
    }
}
