use chrono::Utc;
use provenance_schemas::{
    generate_assumption_id, generate_decision_id, generate_fragment_id, generate_link_id,
    Assumption, AssumptionId, Decision, DecisionId, Fragment, FragmentId, FragmentLink,
    FragmentUpdate, LinkId, LinkType, NewAssumption, NewDecision, NewFragment, RelatedFragment,
    ScoredFragment, SourceType,
};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, ToSql};
use std::path::Path;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::filter::{normalize_since, FragmentFilter};

/// Strength assigned to a link when the caller does not provide one.
pub const DEFAULT_LINK_STRENGTH: f64 = 0.8;

/// Result cap for link and related-fragment queries when unspecified.
pub const DEFAULT_RELATED_LIMIT: usize = 10;

pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;

        let store = Self { conn };
        store.init_schema()?;

        info!("Store initialized");
        Ok(store)
    }

    /// Create all tables, the FTS index, and query indexes.
    fn init_schema(&self) -> Result<(), StoreError> {
        // Fragments table (root entity)
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS fragments (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                summary TEXT,
                source_type TEXT NOT NULL CHECK (
                    source_type IN ('quick_capture', 'zoom', 'teams', 'notes')
                ),
                source_ref TEXT,
                captured_at TEXT NOT NULL,
                participants TEXT NOT NULL DEFAULT '[]',
                topics TEXT NOT NULL DEFAULT '[]',
                project TEXT
            )",
            [],
        )?;

        // Decisions extracted from fragments
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS decisions (
                id TEXT PRIMARY KEY,
                fragment_id TEXT NOT NULL REFERENCES fragments(id) ON DELETE CASCADE,
                what TEXT NOT NULL,
                why TEXT NOT NULL DEFAULT '',
                confidence REAL NOT NULL DEFAULT 0.0,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // Assumptions extracted from fragments. still_valid is tri-state:
        // NULL = unchecked, 1 = valid, 0 = invalid.
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS assumptions (
                id TEXT PRIMARY KEY,
                fragment_id TEXT NOT NULL REFERENCES fragments(id) ON DELETE CASCADE,
                statement TEXT NOT NULL,
                explicit INTEGER NOT NULL DEFAULT 1,
                still_valid INTEGER,
                invalidated_by TEXT REFERENCES fragments(id) ON DELETE SET NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // Directed weighted links between fragments. No uniqueness over
        // (source, target, type): parallel edges accumulate.
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS fragment_links (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL REFERENCES fragments(id) ON DELETE CASCADE,
                target_id TEXT NOT NULL REFERENCES fragments(id) ON DELETE CASCADE,
                link_type TEXT NOT NULL CHECK (
                    link_type IN ('relates_to', 'references', 'follows',
                                  'contradicts', 'invalidates')
                ),
                strength REAL NOT NULL DEFAULT 0.0,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // FTS5 virtual table for full-text search on fragments
        self.conn.execute(
            "CREATE VIRTUAL TABLE IF NOT EXISTS fragments_fts USING fts5(
                content,
                summary,
                topics,
                project,
                content='fragments',
                content_rowid='rowid'
            )",
            [],
        )?;

        // FTS5 triggers to keep index in sync
        self.conn.execute(
            "CREATE TRIGGER IF NOT EXISTS fragments_ai AFTER INSERT ON fragments BEGIN
                INSERT INTO fragments_fts(rowid, content, summary, topics, project)
                VALUES (new.rowid, new.content, new.summary, new.topics, new.project);
            END",
            [],
        )?;

        // External-content FTS tables need the 'delete' command with the
        // old column values; a plain DELETE would leave stale index terms.
        self.conn.execute(
            "CREATE TRIGGER IF NOT EXISTS fragments_ad AFTER DELETE ON fragments BEGIN
                INSERT INTO fragments_fts(fragments_fts, rowid, content, summary, topics, project)
                VALUES ('delete', old.rowid, old.content, old.summary, old.topics, old.project);
            END",
            [],
        )?;

        self.conn.execute(
            "CREATE TRIGGER IF NOT EXISTS fragments_au AFTER UPDATE ON fragments BEGIN
                INSERT INTO fragments_fts(fragments_fts, rowid, content, summary, topics, project)
                VALUES ('delete', old.rowid, old.content, old.summary, old.topics, old.project);
                INSERT INTO fragments_fts(rowid, content, summary, topics, project)
                VALUES (new.rowid, new.content, new.summary, new.topics, new.project);
            END",
            [],
        )?;

        // Indexes for common queries
        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_fragments_captured ON fragments(captured_at DESC)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_fragments_project ON fragments(project)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_fragments_source_type ON fragments(source_type)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_decisions_fragment ON decisions(fragment_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_decisions_created ON decisions(created_at DESC)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_assumptions_fragment ON assumptions(fragment_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_assumptions_valid ON assumptions(still_valid)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_links_source ON fragment_links(source_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_links_target ON fragment_links(target_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_links_type ON fragment_links(link_type)",
            [],
        )?;

        debug!("Store schema initialized");
        Ok(())
    }

    // ========== FRAGMENTS ==========

    /// Insert a new fragment. The id and capture timestamp are assigned
    /// here; a caller-supplied `captured_at` (imported content) is
    /// normalized but otherwise honored.
    pub fn create_fragment(&self, new: &NewFragment) -> Result<Fragment, StoreError> {
        if new.content.trim().is_empty() {
            return Err(StoreError::validation("fragment content must not be empty"));
        }

        let captured_at = match &new.captured_at {
            Some(provided) => normalize_since(provided)?,
            None => now_rfc3339(),
        };

        let fragment = Fragment {
            id: generate_fragment_id(),
            content: new.content.clone(),
            summary: None,
            source_type: new.source_type,
            source_ref: new.source_ref.clone(),
            captured_at,
            participants: new.participants.clone(),
            topics: new.topics.clone(),
            project: new.project.clone(),
            decisions: vec![],
            assumptions: vec![],
        };

        let participants_json = serde_json::to_string(&fragment.participants)?;
        let topics_json = serde_json::to_string(&fragment.topics)?;

        self.conn.execute(
            "INSERT INTO fragments (id, content, summary, source_type, source_ref,
                                    captured_at, participants, topics, project)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                fragment.id.0,
                fragment.content,
                fragment.summary,
                fragment.source_type.as_str(),
                fragment.source_ref,
                fragment.captured_at,
                participants_json,
                topics_json,
                fragment.project,
            ],
        )?;

        debug!("Inserted fragment: {}", fragment.id);
        Ok(fragment)
    }

    /// Get a fragment by id with its decisions and assumptions populated.
    pub fn get_fragment(&self, id: &FragmentId) -> Result<Fragment, StoreError> {
        let mut fragment = self
            .conn
            .query_row(
                "SELECT id, content, summary, source_type, source_ref,
                        captured_at, participants, topics, project
                 FROM fragments WHERE id = ?1",
                params![id.0],
                row_to_fragment,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("fragment", &id.0))?;

        fragment.decisions = self.decisions_for_fragment(id)?;
        fragment.assumptions = self.assumptions_for_fragment(id)?;

        Ok(fragment)
    }

    /// List fragments matching the filter, newest capture first. Decisions
    /// and assumptions are not populated on list results.
    pub fn list_fragments(
        &self,
        filter: &FragmentFilter,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Fragment>, StoreError> {
        let mut query = String::from(
            "SELECT id, content, summary, source_type, source_ref,
                    captured_at, participants, topics, project
             FROM fragments WHERE 1=1",
        );
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(project) = &filter.project {
            query.push_str(" AND project = ?");
            args.push(Box::new(project.clone()));
        }
        if let Some(source_type) = filter.source_type {
            query.push_str(" AND source_type = ?");
            args.push(Box::new(source_type.as_str()));
        }
        if let Some(since) = &filter.since {
            query.push_str(" AND captured_at >= ?");
            args.push(Box::new(since.clone()));
        }
        if let Some(until) = &filter.until {
            query.push_str(" AND captured_at <= ?");
            args.push(Box::new(until.clone()));
        }

        query.push_str(" ORDER BY captured_at DESC LIMIT ? OFFSET ?");
        args.push(Box::new(limit as i64));
        args.push(Box::new(offset as i64));

        let mut stmt = self.conn.prepare(&query)?;
        let fragments = stmt
            .query_map(params_from_iter(args.iter()), row_to_fragment)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(fragments)
    }

    /// Update fragment metadata. Only project, topics, and summary are
    /// mutable; content, source, and capture timestamp never change.
    pub fn update_fragment(
        &self,
        id: &FragmentId,
        update: &FragmentUpdate,
    ) -> Result<Fragment, StoreError> {
        self.require_fragment(id)?;

        if let Some(project) = &update.project {
            self.conn.execute(
                "UPDATE fragments SET project = ?1 WHERE id = ?2",
                params![project, id.0],
            )?;
        }
        if let Some(topics) = &update.topics {
            let topics_json = serde_json::to_string(topics)?;
            self.conn.execute(
                "UPDATE fragments SET topics = ?1 WHERE id = ?2",
                params![topics_json, id.0],
            )?;
        }
        if let Some(summary) = &update.summary {
            self.conn.execute(
                "UPDATE fragments SET summary = ?1 WHERE id = ?2",
                params![summary, id.0],
            )?;
        }

        debug!("Updated fragment metadata: {}", id);
        self.get_fragment(id)
    }

    fn require_fragment(&self, id: &FragmentId) -> Result<(), StoreError> {
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM fragments WHERE id = ?1",
                params![id.0],
                |row| row.get(0),
            )
            .optional()?;

        match exists {
            Some(_) => Ok(()),
            None => Err(StoreError::not_found("fragment", &id.0)),
        }
    }

    // ========== DECISIONS ==========

    /// Record a decision extracted from a fragment. Decisions are immutable
    /// after creation.
    pub fn create_decision(&self, new: &NewDecision) -> Result<Decision, StoreError> {
        if !(0.0..=1.0).contains(&new.confidence) {
            return Err(StoreError::validation(format!(
                "confidence must be within [0.0, 1.0], got {}",
                new.confidence
            )));
        }
        self.require_fragment(&new.fragment_id)?;

        let decision = Decision {
            id: generate_decision_id(),
            fragment_id: new.fragment_id.clone(),
            what: new.what.clone(),
            why: new.why.clone(),
            confidence: new.confidence,
            created_at: now_rfc3339(),
        };

        self.conn.execute(
            "INSERT INTO decisions (id, fragment_id, what, why, confidence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                decision.id.0,
                decision.fragment_id.0,
                decision.what,
                decision.why,
                decision.confidence,
                decision.created_at,
            ],
        )?;

        debug!("Inserted decision: {}", decision.id);
        Ok(decision)
    }

    /// List decisions, newest first. `since` is a normalized RFC3339 bound
    /// (see `filter::normalize_since`).
    pub fn list_decisions(
        &self,
        project: Option<&str>,
        fragment_id: Option<&FragmentId>,
        since: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Decision>, StoreError> {
        let mut query = String::from(
            "SELECT d.id, d.fragment_id, d.what, d.why, d.confidence, d.created_at
             FROM decisions d",
        );
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if project.is_some() {
            query.push_str(" JOIN fragments f ON d.fragment_id = f.id");
        }
        query.push_str(" WHERE 1=1");

        if let Some(project) = project {
            query.push_str(" AND f.project = ?");
            args.push(Box::new(project.to_string()));
        }
        if let Some(fragment_id) = fragment_id {
            query.push_str(" AND d.fragment_id = ?");
            args.push(Box::new(fragment_id.0.clone()));
        }
        if let Some(since) = since {
            query.push_str(" AND d.created_at >= ?");
            args.push(Box::new(since.to_string()));
        }

        query.push_str(" ORDER BY d.created_at DESC LIMIT ?");
        args.push(Box::new(limit as i64));

        let mut stmt = self.conn.prepare(&query)?;
        let decisions = stmt
            .query_map(params_from_iter(args.iter()), row_to_decision)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(decisions)
    }

    fn decisions_for_fragment(&self, id: &FragmentId) -> Result<Vec<Decision>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, fragment_id, what, why, confidence, created_at
             FROM decisions
             WHERE fragment_id = ?1
             ORDER BY created_at DESC",
        )?;

        let decisions = stmt
            .query_map(params![id.0], row_to_decision)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(decisions)
    }

    // ========== ASSUMPTIONS ==========

    /// Record an assumption tied to a fragment. Validity starts unchecked.
    pub fn create_assumption(&self, new: &NewAssumption) -> Result<Assumption, StoreError> {
        self.require_fragment(&new.fragment_id)?;

        let assumption = Assumption {
            id: generate_assumption_id(),
            fragment_id: new.fragment_id.clone(),
            statement: new.statement.clone(),
            explicit: new.explicit,
            still_valid: None,
            invalidated_by: None,
            created_at: now_rfc3339(),
        };

        self.conn.execute(
            "INSERT INTO assumptions (id, fragment_id, statement, explicit,
                                      still_valid, invalidated_by, created_at)
             VALUES (?1, ?2, ?3, ?4, NULL, NULL, ?5)",
            params![
                assumption.id.0,
                assumption.fragment_id.0,
                assumption.statement,
                assumption.explicit as i64,
                assumption.created_at,
            ],
        )?;

        debug!("Inserted assumption: {}", assumption.id);
        Ok(assumption)
    }

    pub fn get_assumption(&self, id: &AssumptionId) -> Result<Assumption, StoreError> {
        self.conn
            .query_row(
                "SELECT id, fragment_id, statement, explicit, still_valid,
                        invalidated_by, created_at
                 FROM assumptions WHERE id = ?1",
                params![id.0],
                row_to_assumption,
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("assumption", &id.0))
    }

    /// List assumptions, newest first. `still_valid = Some(true)` keeps
    /// valid and unchecked entries; `Some(false)` keeps invalid ones only.
    pub fn list_assumptions(
        &self,
        project: Option<&str>,
        fragment_id: Option<&FragmentId>,
        since: Option<&str>,
        still_valid: Option<bool>,
        limit: usize,
    ) -> Result<Vec<Assumption>, StoreError> {
        let mut query = String::from(
            "SELECT a.id, a.fragment_id, a.statement, a.explicit, a.still_valid,
                    a.invalidated_by, a.created_at
             FROM assumptions a",
        );
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if project.is_some() {
            query.push_str(" JOIN fragments f ON a.fragment_id = f.id");
        }
        query.push_str(" WHERE 1=1");

        if let Some(project) = project {
            query.push_str(" AND f.project = ?");
            args.push(Box::new(project.to_string()));
        }
        if let Some(fragment_id) = fragment_id {
            query.push_str(" AND a.fragment_id = ?");
            args.push(Box::new(fragment_id.0.clone()));
        }
        if let Some(since) = since {
            query.push_str(" AND a.created_at >= ?");
            args.push(Box::new(since.to_string()));
        }
        match still_valid {
            Some(true) => query.push_str(" AND (a.still_valid = 1 OR a.still_valid IS NULL)"),
            Some(false) => query.push_str(" AND a.still_valid = 0"),
            None => {}
        }

        query.push_str(" ORDER BY a.created_at DESC LIMIT ?");
        args.push(Box::new(limit as i64));

        let mut stmt = self.conn.prepare(&query)?;
        let assumptions = stmt
            .query_map(params_from_iter(args.iter()), row_to_assumption)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(assumptions)
    }

    fn assumptions_for_fragment(&self, id: &FragmentId) -> Result<Vec<Assumption>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, fragment_id, statement, explicit, still_valid,
                    invalidated_by, created_at
             FROM assumptions
             WHERE fragment_id = ?1
             ORDER BY created_at DESC",
        )?;

        let assumptions = stmt
            .query_map(params![id.0], row_to_assumption)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(assumptions)
    }

    /// Set an assumption's validity directly. Only the invalid state may
    /// carry an invalidating fragment reference.
    pub fn set_assumption_validity(
        &self,
        id: &AssumptionId,
        still_valid: Option<bool>,
        invalidated_by: Option<&FragmentId>,
    ) -> Result<Assumption, StoreError> {
        if invalidated_by.is_some() && still_valid != Some(false) {
            return Err(StoreError::validation(
                "invalidated_by may only be set when marking an assumption invalid",
            ));
        }
        if let Some(invalidating) = invalidated_by {
            self.require_fragment(invalidating)?;
        }

        // Make sure the id exists before writing.
        self.get_assumption(id)?;

        let valid_column = still_valid.map(|valid| valid as i64);
        let invalidated_column = invalidated_by.map(|fragment| fragment.0.clone());

        self.conn.execute(
            "UPDATE assumptions SET still_valid = ?1, invalidated_by = ?2 WHERE id = ?3",
            params![valid_column, invalidated_column, id.0],
        )?;

        debug!("Set assumption {} validity to {:?}", id, still_valid);
        self.get_assumption(id)
    }

    /// Drive the validity toggle: marking from unchecked sets the state;
    /// marking from any set state clears back to unchecked. The opposite
    /// state is therefore only reachable through unchecked, never in one
    /// step. `invalidated_by` applies only when the result is invalid.
    pub fn toggle_assumption_validity(
        &self,
        id: &AssumptionId,
        mark_valid: bool,
        invalidated_by: Option<&FragmentId>,
    ) -> Result<Assumption, StoreError> {
        let current = self.get_assumption(id)?;

        let next = match current.still_valid {
            None => Some(mark_valid),
            Some(_) => None,
        };

        let invalidated = if next == Some(false) {
            invalidated_by
        } else {
            None
        };

        self.set_assumption_validity(id, next, invalidated)
    }

    // ========== FRAGMENT LINKS ==========

    /// Create a directed link between two fragments. Self-links and
    /// out-of-range strengths are rejected before the write; duplicate
    /// edges are allowed and accumulate.
    pub fn add_link(
        &self,
        source_id: &FragmentId,
        target_id: &FragmentId,
        link_type: Option<LinkType>,
        strength: Option<f64>,
    ) -> Result<FragmentLink, StoreError> {
        if source_id == target_id {
            return Err(StoreError::validation(
                "a fragment cannot be linked to itself",
            ));
        }

        let strength = strength.unwrap_or(DEFAULT_LINK_STRENGTH);
        if !(0.0..=1.0).contains(&strength) {
            return Err(StoreError::validation(format!(
                "link strength must be within [0.0, 1.0], got {strength}"
            )));
        }

        self.require_fragment(source_id)?;
        self.require_fragment(target_id)?;

        let link = FragmentLink {
            id: generate_link_id(),
            source_id: source_id.clone(),
            target_id: target_id.clone(),
            link_type: link_type.unwrap_or(LinkType::RelatesTo),
            strength,
            created_at: now_rfc3339(),
        };

        self.conn.execute(
            "INSERT INTO fragment_links (id, source_id, target_id, link_type,
                                         strength, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                link.id.0,
                link.source_id.0,
                link.target_id.0,
                link.link_type.as_str(),
                link.strength,
                link.created_at,
            ],
        )?;

        debug!(
            "Linked {} -> {} ({})",
            link.source_id,
            link.target_id,
            link.link_type.as_str()
        );
        Ok(link)
    }

    /// Links touching a fragment as source or target, strongest first,
    /// ties broken by newest creation.
    pub fn links_for(
        &self,
        fragment_id: &FragmentId,
        link_type: Option<LinkType>,
        limit: usize,
    ) -> Result<Vec<FragmentLink>, StoreError> {
        let mut query = String::from(
            "SELECT id, source_id, target_id, link_type, strength, created_at
             FROM fragment_links
             WHERE (source_id = ?1 OR target_id = ?1)",
        );
        let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(fragment_id.0.clone())];

        if let Some(link_type) = link_type {
            query.push_str(" AND link_type = ?");
            args.push(Box::new(link_type.as_str()));
        }

        query.push_str(" ORDER BY strength DESC, created_at DESC LIMIT ?");
        args.push(Box::new(limit as i64));

        let mut stmt = self.conn.prepare(&query)?;
        let links = stmt
            .query_map(params_from_iter(args.iter()), row_to_link)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(links)
    }

    /// Number of links touching a fragment. Parallel edges each count.
    pub fn degree(&self, fragment_id: &FragmentId) -> Result<usize, StoreError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM fragment_links WHERE source_id = ?1 OR target_id = ?1",
            params![fragment_id.0],
            |row| row.get(0),
        )?;

        Ok(count as usize)
    }

    /// All links, newest first, capped at `limit`.
    pub fn list_links(&self, limit: usize) -> Result<Vec<FragmentLink>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source_id, target_id, link_type, strength, created_at
             FROM fragment_links
             ORDER BY created_at DESC
             LIMIT ?1",
        )?;

        let links = stmt
            .query_map(params![limit as i64], row_to_link)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(links)
    }

    /// Fragments linked to the given fragment in either direction, with the
    /// strength and type of the connecting edge. Strongest first.
    pub fn related_fragments(
        &self,
        fragment_id: &FragmentId,
        link_type: Option<LinkType>,
        limit: usize,
    ) -> Result<Vec<RelatedFragment>, StoreError> {
        self.require_fragment(fragment_id)?;

        let mut query = String::from(
            "SELECT f.id, f.content, f.summary, f.source_type, f.source_ref,
                    f.captured_at, f.participants, f.topics, f.project,
                    fl.strength, fl.link_type
             FROM fragments f
             JOIN fragment_links fl ON (fl.target_id = f.id OR fl.source_id = f.id)
             WHERE (fl.source_id = ?1 OR fl.target_id = ?1) AND f.id != ?1",
        );
        let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(fragment_id.0.clone())];

        if let Some(link_type) = link_type {
            query.push_str(" AND fl.link_type = ?");
            args.push(Box::new(link_type.as_str()));
        }

        query.push_str(" ORDER BY fl.strength DESC, fl.created_at DESC LIMIT ?");
        args.push(Box::new(limit as i64));

        let mut stmt = self.conn.prepare(&query)?;
        let related = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                let fragment = row_to_fragment(row)?;
                let strength: f64 = row.get(9)?;
                let link_type_raw: String = row.get(10)?;

                Ok(RelatedFragment {
                    fragment,
                    strength,
                    link_type: parse_link_type(&link_type_raw),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(related)
    }

    // ========== SEARCH ==========

    /// Full-text search over content, summary, topics, and project. Scores
    /// are derived from the FTS rank and land in [0, 1], highest first.
    pub fn search_fragments(
        &self,
        query: &str,
        limit: usize,
        project: Option<&str>,
    ) -> Result<Vec<ScoredFragment>, StoreError> {
        let expression = match fts_expression(query) {
            Some(expression) => expression,
            None => return Ok(vec![]),
        };

        let mut sql = String::from(
            "SELECT f.id, f.content, f.summary, f.source_type, f.source_ref,
                    f.captured_at, f.participants, f.topics, f.project, rank
             FROM fragments f
             JOIN fragments_fts fts ON f.rowid = fts.rowid
             WHERE fragments_fts MATCH ?",
        );
        let mut args: Vec<Box<dyn ToSql>> = vec![Box::new(expression)];

        if let Some(project) = project {
            sql.push_str(" AND f.project = ?");
            args.push(Box::new(project.to_string()));
        }

        sql.push_str(" ORDER BY rank LIMIT ?");
        args.push(Box::new(limit as i64));

        let mut stmt = self.conn.prepare(&sql)?;
        let results = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                let fragment = row_to_fragment(row)?;
                let rank: f64 = row.get(9)?;
                Ok(ScoredFragment {
                    fragment,
                    score: rank_to_score(rank),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Search for {:?} returned {} results", query, results.len());
        Ok(results)
    }
}

// ========== ROW MAPPING & HELPERS ==========

fn now_rfc3339() -> String {
    // Fixed millisecond precision keeps stored timestamps lexicographically
    // comparable with normalized filter bounds.
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3f+00:00").to_string()
}

fn json_error(err: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(err))
}

fn parse_source_type(raw: &str) -> SourceType {
    SourceType::parse(raw).unwrap_or(SourceType::QuickCapture)
}

fn parse_link_type(raw: &str) -> LinkType {
    LinkType::parse(raw).unwrap_or(LinkType::RelatesTo)
}

fn row_to_fragment(row: &Row) -> rusqlite::Result<Fragment> {
    let participants_json: String = row.get(6)?;
    let topics_json: String = row.get(7)?;

    let participants: Vec<String> =
        serde_json::from_str(&participants_json).map_err(json_error)?;
    let topics: Vec<String> = serde_json::from_str(&topics_json).map_err(json_error)?;

    let source_type_raw: String = row.get(3)?;

    Ok(Fragment {
        id: FragmentId(row.get(0)?),
        content: row.get(1)?,
        summary: row.get(2)?,
        source_type: parse_source_type(&source_type_raw),
        source_ref: row.get(4)?,
        captured_at: row.get(5)?,
        participants,
        topics,
        project: row.get(8)?,
        decisions: vec![],
        assumptions: vec![],
    })
}

fn row_to_decision(row: &Row) -> rusqlite::Result<Decision> {
    Ok(Decision {
        id: DecisionId(row.get(0)?),
        fragment_id: FragmentId(row.get(1)?),
        what: row.get(2)?,
        why: row.get(3)?,
        confidence: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn row_to_assumption(row: &Row) -> rusqlite::Result<Assumption> {
    let still_valid: Option<i64> = row.get(4)?;
    let invalidated_by: Option<String> = row.get(5)?;

    Ok(Assumption {
        id: AssumptionId(row.get(0)?),
        fragment_id: FragmentId(row.get(1)?),
        statement: row.get(2)?,
        explicit: row.get::<_, i64>(3)? != 0,
        still_valid: still_valid.map(|value| value != 0),
        invalidated_by: invalidated_by.map(FragmentId),
        created_at: row.get(6)?,
    })
}

fn row_to_link(row: &Row) -> rusqlite::Result<FragmentLink> {
    let link_type_raw: String = row.get(3)?;

    Ok(FragmentLink {
        id: LinkId(row.get(0)?),
        source_id: FragmentId(row.get(1)?),
        target_id: FragmentId(row.get(2)?),
        link_type: parse_link_type(&link_type_raw),
        strength: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Build an FTS5 MATCH expression from a raw user query. Each token is
/// quoted so FTS operators and punctuation in the query cannot change the
/// expression's meaning; tokens are OR-ed for ranked recall.
fn fts_expression(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|token| format!("\"{}\"", token.replace('"', "\"\"")))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

/// Map an FTS5 bm25 rank (more negative = better) onto [0, 1].
fn rank_to_score(rank: f64) -> f64 {
    let goodness = (-rank).max(0.0);
    goodness / (1.0 + goodness)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fts_expression_quotes_tokens() {
        let expression = fts_expression("c++ is fun").unwrap();
        assert_eq!(expression, "\"c++\" OR \"is\" OR \"fun\"");
    }

    #[test]
    fn test_fts_expression_escapes_quotes() {
        let expression = fts_expression("say \"hi\"").unwrap();
        assert_eq!(expression, "\"say\" OR \"\"\"hi\"\"\"");
    }

    #[test]
    fn test_fts_expression_empty_query() {
        assert_eq!(fts_expression("   "), None);
    }

    #[test]
    fn test_rank_to_score_bounds() {
        assert_eq!(rank_to_score(0.0), 0.0);
        let close = rank_to_score(-50.0);
        assert!(close > 0.9 && close < 1.0);
        // Positive ranks (worse than empty) clamp to zero.
        assert_eq!(rank_to_score(3.0), 0.0);
    }

    #[test]
    fn test_rank_to_score_monotonic() {
        assert!(rank_to_score(-2.0) > rank_to_score(-1.0));
    }
}
