use chrono::{DateTime, NaiveDate, NaiveDateTime};
use provenance_schemas::SourceType;

use crate::error::StoreError;

/// Filter contract shared by listing, timeline, and graph queries.
///
/// All provided fields combine with logical AND; absent fields impose no
/// constraint. `since`/`until` hold normalized RFC3339 bounds, both
/// inclusive. A fragment with no project never matches a project filter.
#[derive(Debug, Clone, Default)]
pub struct FragmentFilter {
    pub project: Option<String>,
    pub source_type: Option<SourceType>,
    pub since: Option<String>,
    pub until: Option<String>,
}

impl FragmentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn source_type(mut self, source_type: SourceType) -> Self {
        self.source_type = Some(source_type);
        self
    }

    /// Lower bound on capture time. Accepts an RFC3339 timestamp or a bare
    /// date, which expands to the start of that day.
    pub fn since(mut self, input: &str) -> Result<Self, StoreError> {
        self.since = Some(normalize_since(input)?);
        Ok(self)
    }

    /// Upper bound on capture time. A bare date expands to the end of that
    /// day (23:59:59.999), so date-only filters are inclusive of the whole
    /// day.
    pub fn until(mut self, input: &str) -> Result<Self, StoreError> {
        self.until = Some(normalize_until(input)?);
        Ok(self)
    }
}

/// Normalize a `since` bound to an RFC3339 UTC timestamp.
pub fn normalize_since(input: &str) -> Result<String, StoreError> {
    normalize_bound(input, DayEdge::Start)
}

/// Normalize an `until` bound to an RFC3339 UTC timestamp. Date-only input
/// lands on the last millisecond of the day.
pub fn normalize_until(input: &str) -> Result<String, StoreError> {
    normalize_bound(input, DayEdge::End)
}

#[derive(Clone, Copy)]
enum DayEdge {
    Start,
    End,
}

fn normalize_bound(input: &str, edge: DayEdge) -> Result<String, StoreError> {
    let input = input.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(input) {
        return Ok(format_utc(parsed.naive_utc()));
    }

    // Timestamps without an offset are treated as UTC.
    for pattern in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(input, pattern) {
            return Ok(format_utc(parsed));
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        let datetime = match edge {
            DayEdge::Start => date.and_hms_opt(0, 0, 0),
            DayEdge::End => date.and_hms_milli_opt(23, 59, 59, 999),
        };
        if let Some(datetime) = datetime {
            return Ok(format_utc(datetime));
        }
    }

    Err(StoreError::validation(format!(
        "unrecognized timestamp: {input} (expected RFC3339 or YYYY-MM-DD)"
    )))
}

fn format_utc(datetime: NaiveDateTime) -> String {
    datetime.format("%Y-%m-%dT%H:%M:%S%.3f+00:00").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_only_until_expands_to_end_of_day() {
        let bound = normalize_until("2024-01-10").unwrap();
        assert_eq!(bound, "2024-01-10T23:59:59.999+00:00");
    }

    #[test]
    fn test_date_only_since_expands_to_start_of_day() {
        let bound = normalize_since("2024-01-10").unwrap();
        assert_eq!(bound, "2024-01-10T00:00:00.000+00:00");
    }

    #[test]
    fn test_full_timestamp_passes_through() {
        let bound = normalize_until("2024-01-10T12:30:00+00:00").unwrap();
        assert_eq!(bound, "2024-01-10T12:30:00.000+00:00");
    }

    #[test]
    fn test_naive_timestamp_treated_as_utc() {
        let bound = normalize_since("2024-01-10T12:30:00").unwrap();
        assert_eq!(bound, "2024-01-10T12:30:00.000+00:00");
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            normalize_since("last tuesday"),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn test_builder_combines_fields() {
        let filter = FragmentFilter::new()
            .project("payments")
            .source_type(SourceType::Zoom)
            .since("2024-01-01")
            .unwrap()
            .until("2024-01-31")
            .unwrap();

        assert_eq!(filter.project.as_deref(), Some("payments"));
        assert_eq!(filter.source_type, Some(SourceType::Zoom));
        assert!(filter.since.unwrap().starts_with("2024-01-01T00:00:00"));
        assert!(filter.until.unwrap().starts_with("2024-01-31T23:59:59"));
    }
}
