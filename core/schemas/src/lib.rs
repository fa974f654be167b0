use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ULID and ID Types
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DecisionId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssumptionId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkId(pub String);

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for AssumptionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Closed Enums
// ============================================================================

/// Where a fragment was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    #[serde(rename = "quick_capture")]
    QuickCapture,
    #[serde(rename = "zoom")]
    Zoom,
    #[serde(rename = "teams")]
    Teams,
    #[serde(rename = "notes")]
    Notes,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::QuickCapture => "quick_capture",
            SourceType::Zoom => "zoom",
            SourceType::Teams => "teams",
            SourceType::Notes => "notes",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "quick_capture" => Some(SourceType::QuickCapture),
            "zoom" => Some(SourceType::Zoom),
            "teams" => Some(SourceType::Teams),
            "notes" => Some(SourceType::Notes),
            _ => None,
        }
    }
}

/// Type of relationship between two fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkType {
    #[serde(rename = "relates_to")]
    RelatesTo,
    #[serde(rename = "references")]
    References,
    #[serde(rename = "follows")]
    Follows,
    #[serde(rename = "contradicts")]
    Contradicts,
    #[serde(rename = "invalidates")]
    Invalidates,
}

impl LinkType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkType::RelatesTo => "relates_to",
            LinkType::References => "references",
            LinkType::Follows => "follows",
            LinkType::Contradicts => "contradicts",
            LinkType::Invalidates => "invalidates",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "relates_to" => Some(LinkType::RelatesTo),
            "references" => Some(LinkType::References),
            "follows" => Some(LinkType::Follows),
            "contradicts" => Some(LinkType::Contradicts),
            "invalidates" => Some(LinkType::Invalidates),
            _ => None,
        }
    }
}

// ============================================================================
// Fragment Schema
// ============================================================================

/// A captured unit of context. The root entity: decisions, assumptions, and
/// links all hang off a fragment id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub id: FragmentId,
    pub content: String,
    pub summary: Option<String>,
    pub source_type: SourceType,
    pub source_ref: Option<String>,
    pub captured_at: String, // RFC3339, set once at creation
    pub participants: Vec<String>,
    pub topics: Vec<String>,
    pub project: Option<String>,
    /// Populated only when fetching a single fragment; empty in list results.
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub assumptions: Vec<Assumption>,
}

/// Payload for creating a fragment. The id and capture timestamp are
/// assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFragment {
    pub content: String,
    pub project: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    pub source_type: SourceType,
    pub source_ref: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    /// Capture timestamp for imported content (RFC3339). Defaults to now.
    /// Set once at creation, immutable afterwards.
    #[serde(default)]
    pub captured_at: Option<String>,
}

impl NewFragment {
    pub fn quick_capture(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            project: None,
            topics: Vec::new(),
            source_type: SourceType::QuickCapture,
            source_ref: None,
            participants: Vec::new(),
            captured_at: None,
        }
    }
}

/// The only mutable fragment metadata. Content, source, and capture
/// timestamp are immutable once written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FragmentUpdate {
    pub project: Option<String>,
    pub topics: Option<Vec<String>>,
    pub summary: Option<String>,
}

// ============================================================================
// Decision Schema
// ============================================================================

/// A decision extracted from exactly one fragment. Immutable after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    pub fragment_id: FragmentId,
    pub what: String,
    pub why: String,
    pub confidence: f64,    // 0.0 to 1.0
    pub created_at: String, // RFC3339
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDecision {
    pub fragment_id: FragmentId,
    pub what: String,
    #[serde(default)]
    pub why: String,
    pub confidence: f64,
}

// ============================================================================
// Assumption Schema
// ============================================================================

/// A stated or inferred premise tied to one fragment. Validity is
/// tri-state: `None` = unchecked, `Some(true)` = valid, `Some(false)` =
/// invalid. Only the invalid state may carry `invalidated_by`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assumption {
    pub id: AssumptionId,
    pub fragment_id: FragmentId,
    pub statement: String,
    pub explicit: bool,
    pub still_valid: Option<bool>,
    pub invalidated_by: Option<FragmentId>,
    pub created_at: String, // RFC3339
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAssumption {
    pub fragment_id: FragmentId,
    pub statement: String,
    pub explicit: bool,
}

// ============================================================================
// Fragment Link Schema
// ============================================================================

/// A directed, typed, weighted edge between two fragments. Links accumulate:
/// parallel edges with the same endpoints and type are all kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentLink {
    pub id: LinkId,
    pub source_id: FragmentId,
    pub target_id: FragmentId,
    pub link_type: LinkType,
    pub strength: f64,      // 0.0 to 1.0
    pub created_at: String, // RFC3339
}

/// A fragment reached through a link, annotated with the edge that got us
/// there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedFragment {
    pub fragment: Fragment,
    pub strength: f64,
    pub link_type: LinkType,
}

// ============================================================================
// Graph View (derived, read-only)
// ============================================================================

/// A fragment as a graph node. `connections` is the degree within the edge
/// set of the same query, recomputed every time and never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: FragmentId,
    pub label: String,
    pub source_type: SourceType,
    pub project: Option<String>,
    pub captured_at: String,
    pub topics: Vec<String>,
    pub connections: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphEdge {
    pub id: LinkId,
    pub source: FragmentId,
    pub target: FragmentId,
    pub link_type: LinkType,
    pub strength: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphData {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

// ============================================================================
// Search Results
// ============================================================================

/// A fragment with a relevance score in [0, 1], highest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredFragment {
    pub fragment: Fragment,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    pub results: Vec<ScoredFragment>,
}

// ============================================================================
// Helper Functions
// ============================================================================

pub fn generate_fragment_id() -> FragmentId {
    FragmentId(format!("frag_{}", ulid::Ulid::new()))
}

pub fn generate_decision_id() -> DecisionId {
    DecisionId(format!("dec_{}", ulid::Ulid::new()))
}

pub fn generate_assumption_id() -> AssumptionId {
    AssumptionId(format!("asm_{}", ulid::Ulid::new()))
}

pub fn generate_link_id() -> LinkId {
    LinkId(format!("link_{}", ulid::Ulid::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_generation() {
        let fragment_id = generate_fragment_id();
        assert!(fragment_id.0.starts_with("frag_"));
        assert_eq!(fragment_id.0.len(), 31); // "frag_" + 26 chars

        let decision_id = generate_decision_id();
        assert!(decision_id.0.starts_with("dec_"));

        let assumption_id = generate_assumption_id();
        assert!(assumption_id.0.starts_with("asm_"));

        let link_id = generate_link_id();
        assert!(link_id.0.starts_with("link_"));
    }

    #[test]
    fn test_source_type_round_trip() {
        for source_type in [
            SourceType::QuickCapture,
            SourceType::Zoom,
            SourceType::Teams,
            SourceType::Notes,
        ] {
            assert_eq!(SourceType::parse(source_type.as_str()), Some(source_type));
        }
        assert_eq!(SourceType::parse("slack"), None);
    }

    #[test]
    fn test_link_type_round_trip() {
        for link_type in [
            LinkType::RelatesTo,
            LinkType::References,
            LinkType::Follows,
            LinkType::Contradicts,
            LinkType::Invalidates,
        ] {
            assert_eq!(LinkType::parse(link_type.as_str()), Some(link_type));
        }
        assert_eq!(LinkType::parse("duplicates"), None);
    }

    #[test]
    fn test_fragment_serialization() {
        let fragment = Fragment {
            id: generate_fragment_id(),
            content: "chose Redis for session storage".to_string(),
            summary: None,
            source_type: SourceType::QuickCapture,
            source_ref: None,
            captured_at: "2025-11-02T18:00:00Z".to_string(),
            participants: vec![],
            topics: vec!["architecture".into()],
            project: Some("billing".into()),
            decisions: vec![],
            assumptions: vec![],
        };

        let json = serde_json::to_string(&fragment).unwrap();
        assert!(json.contains("\"quick_capture\""));
        let deserialized: Fragment = serde_json::from_str(&json).unwrap();
        assert_eq!(fragment.content, deserialized.content);
        assert_eq!(fragment.topics, deserialized.topics);
    }

    #[test]
    fn test_link_serialization() {
        let link = FragmentLink {
            id: generate_link_id(),
            source_id: generate_fragment_id(),
            target_id: generate_fragment_id(),
            link_type: LinkType::Contradicts,
            strength: 0.8,
            created_at: "2025-01-01T00:00:00Z".into(),
        };

        let json = serde_json::to_string(&link).unwrap();
        assert!(json.contains("\"contradicts\""));
        let restored: FragmentLink = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.source_id, link.source_id);
        assert_eq!(restored.link_type, LinkType::Contradicts);
    }

    #[test]
    fn test_assumption_tri_state_serialization() {
        let assumption = Assumption {
            id: generate_assumption_id(),
            fragment_id: generate_fragment_id(),
            statement: "traffic stays under 1k rps".to_string(),
            explicit: false,
            still_valid: None,
            invalidated_by: None,
            created_at: "2025-01-01T00:00:00Z".into(),
        };

        let json = serde_json::to_string(&assumption).unwrap();
        let restored: Assumption = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.still_valid, None);
        assert_eq!(restored.invalidated_by, None);
    }
}
