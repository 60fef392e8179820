//! Durable Store (SQLite)
//!
//! Backing storage for reputation records, risk scores, threat records,
//! analyses, group settings and the cache's durable tier. Explicitly
//! constructed and injected - test suites open an isolated in-memory or
//! tempdir instance per case.
//!
//! In-memory detector state remains the source of truth: callers log
//! write failures and keep going (a background retry or the next write
//! re-syncs the row).

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::logic::link_guard::types::LinkReputationRecord;
use crate::logic::risk::types::{RiskScore, RiskStatus};
use crate::logic::threat::types::{ThreatAnalysis, ThreatCategory, ThreatRecord, ThreatSeverity};
use crate::logic::{ActorId, GroupId};

// ============================================================================
// ERRORS
// ============================================================================

/// Store error types
#[derive(Debug)]
pub enum StoreError {
    Sqlite(rusqlite::Error),
    Serialize(serde_json::Error),
    Io(std::io::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "sqlite error: {}", e),
            StoreError::Serialize(e) => write!(f, "serialize error: {}", e),
            StoreError::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialize(e)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

// ============================================================================
// GROUP SETTINGS
// ============================================================================

/// Per-group protection settings row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSettings {
    pub group: GroupId,
    pub protection_level: u8,
    pub link_scan_enabled: bool,
    pub anti_raid_enabled: bool,
    pub behavior_monitoring: bool,
}

impl GroupSettings {
    pub fn defaults(group: GroupId) -> Self {
        Self {
            group,
            protection_level: 2,
            link_scan_enabled: true,
            anti_raid_enabled: true,
            behavior_monitoring: true,
        }
    }
}

// ============================================================================
// STORE
// ============================================================================

/// SQLite-backed durable store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open the store at its default location under the local data
    /// directory.
    pub fn open_default() -> Result<Self, StoreError> {
        let path = crate::constants::default_store_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// In-memory store for tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn init_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS group_settings (
                group_id INTEGER PRIMARY KEY,
                protection_level INTEGER NOT NULL DEFAULT 2,
                link_scan_enabled INTEGER NOT NULL DEFAULT 1,
                anti_raid_enabled INTEGER NOT NULL DEFAULT 1,
                behavior_monitoring INTEGER NOT NULL DEFAULT 1,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS scanned_links (
                url_hash TEXT PRIMARY KEY,
                url TEXT NOT NULL,
                is_malicious INTEGER NOT NULL,
                confidence REAL NOT NULL,
                sources TEXT NOT NULL,
                threat_names TEXT NOT NULL,
                cached_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS danger_scores (
                group_id INTEGER NOT NULL,
                actor_id INTEGER NOT NULL,
                points INTEGER NOT NULL DEFAULT 0,
                total_violations INTEGER NOT NULL DEFAULT 0,
                last_violation_at TEXT,
                status TEXT NOT NULL DEFAULT 'active',
                PRIMARY KEY (group_id, actor_id)
            );
            CREATE TABLE IF NOT EXISTS threats (
                id TEXT PRIMARY KEY,
                group_id INTEGER NOT NULL,
                actor_id INTEGER NOT NULL,
                category TEXT NOT NULL,
                severity TEXT NOT NULL,
                detail TEXT NOT NULL,
                indicators TEXT NOT NULL,
                created_at TEXT NOT NULL,
                resolved_at TEXT
            );
            CREATE TABLE IF NOT EXISTS threat_analyses (
                threat_id TEXT PRIMARY KEY,
                category TEXT NOT NULL,
                severity TEXT NOT NULL,
                confidence REAL NOT NULL,
                related TEXT NOT NULL,
                recommendations TEXT NOT NULL,
                analyzed_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS cache_entries (
                class TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                cached_at TEXT NOT NULL,
                PRIMARY KEY (class, key)
            );
            CREATE INDEX IF NOT EXISTS idx_threats_source ON threats(group_id, actor_id);
            CREATE INDEX IF NOT EXISTS idx_threats_created ON threats(created_at);",
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Group settings
    // ------------------------------------------------------------------

    /// Fetch a group's settings, creating the default row on first access.
    pub fn group_settings(&self, group: GroupId) -> Result<GroupSettings, StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO group_settings
             (group_id, protection_level, link_scan_enabled, anti_raid_enabled,
              behavior_monitoring, updated_at)
             VALUES (?1, 2, 1, 1, 1, ?2)",
            params![group as i64, Utc::now()],
        )?;
        let settings = conn.query_row(
            "SELECT protection_level, link_scan_enabled, anti_raid_enabled,
                    behavior_monitoring
             FROM group_settings WHERE group_id = ?1",
            params![group as i64],
            |row| {
                Ok(GroupSettings {
                    group,
                    protection_level: row.get::<_, i64>(0)? as u8,
                    link_scan_enabled: row.get::<_, i64>(1)? != 0,
                    anti_raid_enabled: row.get::<_, i64>(2)? != 0,
                    behavior_monitoring: row.get::<_, i64>(3)? != 0,
                })
            },
        );
        match settings {
            Ok(s) => Ok(s),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(GroupSettings::defaults(group)),
            Err(e) => Err(e.into()),
        }
    }

    pub fn update_group_settings(&self, settings: &GroupSettings) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO group_settings
             (group_id, protection_level, link_scan_enabled, anti_raid_enabled,
              behavior_monitoring, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(group_id) DO UPDATE SET
               protection_level = excluded.protection_level,
               link_scan_enabled = excluded.link_scan_enabled,
               anti_raid_enabled = excluded.anti_raid_enabled,
               behavior_monitoring = excluded.behavior_monitoring,
               updated_at = excluded.updated_at",
            params![
                settings.group as i64,
                settings.protection_level as i64,
                settings.link_scan_enabled as i64,
                settings.anti_raid_enabled as i64,
                settings.behavior_monitoring as i64,
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Scanned links
    // ------------------------------------------------------------------

    /// Idempotent upsert keyed by the URL hash. Concurrent scans of the
    /// same URL converge on one row.
    pub fn upsert_link(&self, record: &LinkReputationRecord) -> Result<(), StoreError> {
        let sources = serde_json::to_string(&record.sources)?;
        let names = serde_json::to_string(&record.threat_names)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO scanned_links
             (url_hash, url, is_malicious, confidence, sources, threat_names, cached_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(url_hash) DO UPDATE SET
               is_malicious = excluded.is_malicious,
               confidence = excluded.confidence,
               sources = excluded.sources,
               threat_names = excluded.threat_names,
               cached_at = excluded.cached_at",
            params![
                record.url_hash,
                record.url,
                record.is_malicious as i64,
                record.confidence as f64,
                sources,
                names,
                record.cached_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_link(&self, url_hash: &str) -> Result<Option<LinkReputationRecord>, StoreError> {
        let conn = self.conn.lock();
        let rec = conn
            .query_row(
                "SELECT url, is_malicious, confidence, sources, threat_names, cached_at
                 FROM scanned_links WHERE url_hash = ?1",
                params![url_hash],
                |row| {
                    Ok(LinkReputationRecord {
                        url_hash: url_hash.to_string(),
                        url: row.get(0)?,
                        is_malicious: row.get::<_, i64>(1)? != 0,
                        confidence: row.get::<_, f64>(2)? as f32,
                        sources: parse_list(&row.get::<_, String>(3)?),
                        threat_names: parse_list(&row.get::<_, String>(4)?),
                        cached_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(rec)
    }

    // ------------------------------------------------------------------
    // Risk scores
    // ------------------------------------------------------------------

    /// Atomic increment-or-insert of a danger score, capped at `max_points`.
    pub fn increment_risk(
        &self,
        group: GroupId,
        actor: ActorId,
        points: u32,
        max_points: u32,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO danger_scores
             (group_id, actor_id, points, total_violations, last_violation_at, status)
             VALUES (?1, ?2, MIN(?3, ?4), 1, ?5, 'active')
             ON CONFLICT(group_id, actor_id) DO UPDATE SET
               points = MIN(points + ?3, ?4),
               total_violations = total_violations + 1,
               last_violation_at = ?5",
            params![
                group as i64,
                actor as i64,
                points as i64,
                max_points as i64,
                now,
            ],
        )?;
        Ok(())
    }

    /// Full-row upsert; used when decay or a status change re-syncs the row.
    pub fn put_risk(
        &self,
        group: GroupId,
        actor: ActorId,
        score: &RiskScore,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO danger_scores
             (group_id, actor_id, points, total_violations, last_violation_at, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(group_id, actor_id) DO UPDATE SET
               points = excluded.points,
               total_violations = excluded.total_violations,
               last_violation_at = excluded.last_violation_at,
               status = excluded.status",
            params![
                group as i64,
                actor as i64,
                score.points as i64,
                score.total_violations as i64,
                score.last_violation_at,
                score.status.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn get_risk(
        &self,
        group: GroupId,
        actor: ActorId,
    ) -> Result<Option<RiskScore>, StoreError> {
        let conn = self.conn.lock();
        let score = conn
            .query_row(
                "SELECT points, total_violations, last_violation_at, status
                 FROM danger_scores WHERE group_id = ?1 AND actor_id = ?2",
                params![group as i64, actor as i64],
                |row| {
                    Ok(RiskScore {
                        points: row.get::<_, i64>(0)?.max(0) as u32,
                        total_violations: row.get::<_, i64>(1)?.max(0) as u32,
                        last_violation_at: row.get(2)?,
                        status: RiskStatus::from_str(&row.get::<_, String>(3)?),
                    })
                },
            )
            .optional()?;
        Ok(score)
    }

    pub fn reset_risk(&self, group: GroupId, actor: ActorId) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE danger_scores
             SET points = 0, total_violations = 0, status = 'active'
             WHERE group_id = ?1 AND actor_id = ?2",
            params![group as i64, actor as i64],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Threat records (append-only)
    // ------------------------------------------------------------------

    pub fn add_threat(&self, record: &ThreatRecord) -> Result<(), StoreError> {
        let indicators = serde_json::to_string(&record.indicators)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO threats
             (id, group_id, actor_id, category, severity, detail, indicators,
              created_at, resolved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.id.to_string(),
                record.group as i64,
                record.actor as i64,
                record.category.as_str(),
                record.severity.as_str(),
                record.detail,
                indicators,
                record.created_at,
                record.resolved_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_threat(&self, id: Uuid) -> Result<Option<ThreatRecord>, StoreError> {
        let conn = self.conn.lock();
        let rec = conn
            .query_row(
                "SELECT group_id, actor_id, category, severity, detail, indicators,
                        created_at, resolved_at
                 FROM threats WHERE id = ?1",
                params![id.to_string()],
                |row| Self::row_to_threat(id, row),
            )
            .optional()?;
        Ok(rec)
    }

    /// All threats from one source (group + actor) since `since`, newest
    /// first.
    pub fn threats_by_source(
        &self,
        group: GroupId,
        actor: ActorId,
        since: DateTime<Utc>,
    ) -> Result<Vec<ThreatRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, group_id, actor_id, category, severity, detail, indicators,
                    created_at, resolved_at
             FROM threats
             WHERE group_id = ?1 AND actor_id = ?2 AND created_at >= ?3
             ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![group as i64, actor as i64, since], |row| {
            let id: String = row.get(0)?;
            let id = Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil());
            Self::row_to_threat_offset(id, row, 1)
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Recent threats across all sources, newest first, bounded.
    pub fn recent_threats(
        &self,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ThreatRecord>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, group_id, actor_id, category, severity, detail, indicators,
                    created_at, resolved_at
             FROM threats
             WHERE created_at >= ?1
             ORDER BY created_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![since, limit as i64], |row| {
            let id: String = row.get(0)?;
            let id = Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil());
            Self::row_to_threat_offset(id, row, 1)
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn count_threats_by_source(
        &self,
        group: GroupId,
        actor: ActorId,
        since: DateTime<Utc>,
    ) -> Result<u32, StoreError> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM threats
             WHERE group_id = ?1 AND actor_id = ?2 AND created_at >= ?3",
            params![group as i64, actor as i64, since],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u32)
    }

    fn row_to_threat(id: Uuid, row: &rusqlite::Row<'_>) -> Result<ThreatRecord, rusqlite::Error> {
        Self::row_to_threat_offset(id, row, 0)
    }

    fn row_to_threat_offset(
        id: Uuid,
        row: &rusqlite::Row<'_>,
        base: usize,
    ) -> Result<ThreatRecord, rusqlite::Error> {
        Ok(ThreatRecord {
            id,
            group: row.get::<_, i64>(base)? as u64,
            actor: row.get::<_, i64>(base + 1)? as u64,
            category: ThreatCategory::from_str(&row.get::<_, String>(base + 2)?),
            severity: ThreatSeverity::from_str(&row.get::<_, String>(base + 3)?),
            detail: row.get(base + 4)?,
            indicators: parse_list(&row.get::<_, String>(base + 5)?),
            created_at: row.get(base + 6)?,
            resolved_at: row.get(base + 7)?,
        })
    }

    // ------------------------------------------------------------------
    // Threat analyses
    // ------------------------------------------------------------------

    pub fn put_analysis(&self, analysis: &ThreatAnalysis) -> Result<(), StoreError> {
        let related = serde_json::to_string(
            &analysis.related.iter().map(|u| u.to_string()).collect::<Vec<_>>(),
        )?;
        let recs = serde_json::to_string(&analysis.recommendations)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO threat_analyses
             (threat_id, category, severity, confidence, related, recommendations,
              analyzed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(threat_id) DO UPDATE SET
               category = excluded.category,
               severity = excluded.severity,
               confidence = excluded.confidence,
               related = excluded.related,
               recommendations = excluded.recommendations,
               analyzed_at = excluded.analyzed_at",
            params![
                analysis.threat_id.to_string(),
                analysis.category.as_str(),
                analysis.severity.as_str(),
                analysis.confidence as f64,
                related,
                recs,
                analysis.analyzed_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_analysis(&self, threat_id: Uuid) -> Result<Option<ThreatAnalysis>, StoreError> {
        let conn = self.conn.lock();
        let analysis = conn
            .query_row(
                "SELECT category, severity, confidence, related, recommendations,
                        analyzed_at
                 FROM threat_analyses WHERE threat_id = ?1",
                params![threat_id.to_string()],
                |row| {
                    Ok(ThreatAnalysis {
                        threat_id,
                        category: ThreatCategory::from_str(&row.get::<_, String>(0)?),
                        severity: ThreatSeverity::from_str(&row.get::<_, String>(1)?),
                        confidence: row.get::<_, f64>(2)? as f32,
                        related: parse_list(&row.get::<_, String>(3)?)
                            .iter()
                            .filter_map(|s| Uuid::parse_str(s).ok())
                            .collect(),
                        recommendations: parse_list(&row.get::<_, String>(4)?),
                        analyzed_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(analysis)
    }

    // ------------------------------------------------------------------
    // Cache tier
    // ------------------------------------------------------------------

    pub fn cache_put(
        &self,
        class: &str,
        key: &str,
        value: &str,
        cached_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO cache_entries (class, key, value, cached_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(class, key) DO UPDATE SET
               value = excluded.value,
               cached_at = excluded.cached_at",
            params![class, key, value, cached_at],
        )?;
        Ok(())
    }

    pub fn cache_get(
        &self,
        class: &str,
        key: &str,
    ) -> Result<Option<(String, DateTime<Utc>)>, StoreError> {
        let conn = self.conn.lock();
        let entry = conn
            .query_row(
                "SELECT value, cached_at FROM cache_entries
                 WHERE class = ?1 AND key = ?2",
                params![class, key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(entry)
    }

    /// Remove every entry of `class` cached before `cutoff`. Returns the
    /// number of rows removed.
    pub fn cache_evict_before(
        &self,
        class: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let n = conn.execute(
            "DELETE FROM cache_entries WHERE class = ?1 AND cached_at < ?2",
            params![class, cutoff],
        )?;
        Ok(n)
    }
}

fn parse_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    #[test]
    fn test_link_upsert_is_idempotent() {
        let s = store();
        let mut rec = LinkReputationRecord {
            url_hash: "abc".to_string(),
            url: "https://evil.example".to_string(),
            is_malicious: false,
            confidence: 0.4,
            sources: vec!["heuristics".to_string()],
            threat_names: vec![],
            cached_at: Utc::now(),
        };
        s.upsert_link(&rec).unwrap();
        rec.is_malicious = true;
        rec.confidence = 0.9;
        s.upsert_link(&rec).unwrap();

        let loaded = s.get_link("abc").unwrap().unwrap();
        assert!(loaded.is_malicious);
        assert!((loaded.confidence - 0.9).abs() < 0.001);
    }

    #[test]
    fn test_increment_risk_caps_and_counts() {
        let s = store();
        let now = Utc::now();
        for _ in 0..4 {
            s.increment_risk(1, 2, 4, 10, now).unwrap();
        }
        let score = s.get_risk(1, 2).unwrap().unwrap();
        assert_eq!(score.points, 10); // capped
        assert_eq!(score.total_violations, 4);
        assert_eq!(score.status, RiskStatus::Active);
    }

    #[test]
    fn test_reset_risk_keeps_row() {
        let s = store();
        s.increment_risk(1, 2, 6, 10, Utc::now()).unwrap();
        s.reset_risk(1, 2).unwrap();
        let score = s.get_risk(1, 2).unwrap().unwrap();
        assert_eq!(score.points, 0);
        assert_eq!(score.total_violations, 0);
    }

    #[test]
    fn test_threat_roundtrip_and_source_queries() {
        let s = store();
        let now = Utc::now();
        let rec = ThreatRecord {
            id: Uuid::new_v4(),
            group: 10,
            actor: 20,
            category: ThreatCategory::Spam,
            severity: ThreatSeverity::Medium,
            detail: "flooding".to_string(),
            indicators: vec!["spam".to_string(), "flood".to_string()],
            created_at: now,
            resolved_at: None,
        };
        s.add_threat(&rec).unwrap();

        let loaded = s.get_threat(rec.id).unwrap().unwrap();
        assert_eq!(loaded.category, ThreatCategory::Spam);
        assert_eq!(loaded.indicators.len(), 2);

        let by_source = s
            .threats_by_source(10, 20, now - Duration::hours(1))
            .unwrap();
        assert_eq!(by_source.len(), 1);
        assert_eq!(
            s.count_threats_by_source(10, 20, now - Duration::hours(1))
                .unwrap(),
            1
        );
        // Outside the window
        assert_eq!(
            s.count_threats_by_source(10, 20, now + Duration::hours(1))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_cache_tier_eviction() {
        let s = store();
        let now = Utc::now();
        s.cache_put("link_scan", "k1", "{}", now - Duration::hours(2))
            .unwrap();
        s.cache_put("link_scan", "k2", "{}", now).unwrap();

        let evicted = s
            .cache_evict_before("link_scan", now - Duration::hours(1))
            .unwrap();
        assert_eq!(evicted, 1);
        assert!(s.cache_get("link_scan", "k1").unwrap().is_none());
        assert!(s.cache_get("link_scan", "k2").unwrap().is_some());
    }

    #[test]
    fn test_reopen_persists_rows() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("core.db");
        {
            let s = SqliteStore::open(&path).unwrap();
            s.increment_risk(1, 2, 5, 10, Utc::now()).unwrap();
        }
        let s = SqliteStore::open(&path).unwrap();
        assert_eq!(s.get_risk(1, 2).unwrap().unwrap().points, 5);
    }

    #[test]
    fn test_group_settings_default_row() {
        let s = store();
        let settings = s.group_settings(42).unwrap();
        assert_eq!(settings.protection_level, 2);
        assert!(settings.link_scan_enabled);

        let mut updated = settings.clone();
        updated.protection_level = 4;
        s.update_group_settings(&updated).unwrap();
        assert_eq!(s.group_settings(42).unwrap().protection_level, 4);
    }
}
