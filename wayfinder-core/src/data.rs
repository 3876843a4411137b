use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Result, Row, params};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;
use wayfinder_scanner::document::{Impact, PerfSample, Violation};
use wayfinder_scanner::explorer::{NavigationEdge, PageRecord};
use wayfinder_scanner::{
    ActionKind, CanonicalId, DiscoveredFeature, ExplorationState, LedgerEntry, LedgerSink,
    NavigableResource,
};

pub struct Database {
    conn: Connection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Cancelled,
    SessionExpired,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
            RunStatus::SessionExpired => "session_expired",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "cancelled" => Some(RunStatus::Cancelled),
            "session_expired" => Some(RunStatus::SessionExpired),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRow {
    pub id: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub status: RunStatus,
    pub entry_points: Vec<String>,
    pub configuration: Option<String>,
}

fn current_timestamp() -> i64 {
    Utc::now().timestamp()
}

fn conversion_error<E>(column: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e))
}

fn parse_time(column: usize, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e))
}

fn parse_impact(value: &str) -> Impact {
    match value {
        "critical" => Impact::Critical,
        "serious" => Impact::Serious,
        "moderate" => Impact::Moderate,
        _ => Impact::Minor,
    }
}

impl Database {
    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    /// Removes the database file along with its WAL companions.
    pub fn remove(path: &Path) -> io::Result<()> {
        fs::remove_file(path)?;
        for suffix in ["-wal", "-shm"] {
            let companion = path.with_file_name(format!(
                "{}{}",
                path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default(),
                suffix
            ));
            if companion.exists() {
                fs::remove_file(companion)?;
            }
        }
        Ok(())
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = open_connection(path)?;
        let db = Database { conn };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            -- Exploration runs
            CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    start_time INTEGER NOT NULL,
    end_time INTEGER,
    status TEXT NOT NULL CHECK(status IN ('running', 'completed', 'cancelled', 'session_expired', 'failed')),
    entry_points TEXT NOT NULL,   -- JSON array
    configuration TEXT            -- JSON configuration used
);

-- Visited resources, one row per canonical identity
CREATE TABLE IF NOT EXISTS resources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    canonical_id TEXT NOT NULL,
    document_id TEXT NOT NULL,
    raw_location TEXT NOT NULL,
    route_fragment TEXT,
    title TEXT,
    breadcrumb TEXT,
    depth INTEGER NOT NULL,
    section TEXT,
    via TEXT,
    visited_at TEXT NOT NULL,

    FOREIGN KEY(run_id) REFERENCES runs(id) ON DELETE CASCADE,
    UNIQUE(run_id, canonical_id)
);

CREATE INDEX IF NOT EXISTS idx_resources_run ON resources(run_id);
CREATE INDEX IF NOT EXISTS idx_resources_section ON resources(run_id, section);

-- How each resource was reached
CREATE TABLE IF NOT EXISTS edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    source TEXT NOT NULL,
    target TEXT NOT NULL,
    via TEXT NOT NULL,

    FOREIGN KEY(run_id) REFERENCES runs(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_edges_run ON edges(run_id);

-- Append-only action ledger
CREATE TABLE IF NOT EXISTS ledger_entries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    timestamp TEXT NOT NULL,
    kind TEXT NOT NULL CHECK(kind IN ('NAVIGATE', 'CLICK', 'FILL', 'SUBMIT', 'ERROR')),
    target TEXT NOT NULL,
    result_location TEXT,
    success BOOLEAN NOT NULL,
    detail TEXT,

    FOREIGN KEY(run_id) REFERENCES runs(id) ON DELETE CASCADE,
    UNIQUE(run_id, sequence)
);

CREATE INDEX IF NOT EXISTS idx_ledger_run ON ledger_entries(run_id);
CREATE INDEX IF NOT EXISTS idx_ledger_kind ON ledger_entries(run_id, kind);

-- Sections, navigation items, widgets and operations
CREATE TABLE IF NOT EXISTS features (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id TEXT NOT NULL,
    name TEXT NOT NULL,
    kind TEXT NOT NULL CHECK(kind IN ('section', 'navigation', 'widget', 'operation')),
    section TEXT,
    target TEXT,
    operation TEXT,
    payload TEXT NOT NULL,        -- full feature as JSON

    FOREIGN KEY(run_id) REFERENCES runs(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_features_run ON features(run_id);

-- Accessibility violations per resource
CREATE TABLE IF NOT EXISTS violations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    resource_id INTEGER NOT NULL,
    rule TEXT NOT NULL,
    impact TEXT NOT NULL CHECK(impact IN ('minor', 'moderate', 'serious', 'critical')),
    description TEXT NOT NULL,
    help TEXT NOT NULL,
    target TEXT,

    FOREIGN KEY(resource_id) REFERENCES resources(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_violations_resource ON violations(resource_id);
CREATE INDEX IF NOT EXISTS idx_violations_rule ON violations(rule);

-- Performance samples per resource
CREATE TABLE IF NOT EXISTS perf_samples (
    resource_id INTEGER PRIMARY KEY,
    load_time_ms INTEGER NOT NULL,
    transfer_bytes INTEGER NOT NULL,
    element_count INTEGER NOT NULL,
    script_count INTEGER NOT NULL,
    form_count INTEGER NOT NULL,

    FOREIGN KEY(resource_id) REFERENCES resources(id) ON DELETE CASCADE
);
            ",
        )?;
        Ok(())
    }

    // Run management
    pub fn create_run(&self, entry_points: &[String], configuration: Option<&str>) -> Result<String> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let entry_json = serde_json::to_string(entry_points).map_err(|e| conversion_error(0, e))?;

        self.conn.execute(
            "INSERT INTO runs (id, start_time, status, entry_points, configuration) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![&run_id, current_timestamp(), RunStatus::Running.as_str(), entry_json, configuration],
        )?;

        Ok(run_id)
    }

    pub fn finish_run(&self, run_id: &str, status: RunStatus) -> Result<()> {
        self.conn.execute(
            "UPDATE runs SET status = ?1, end_time = ?2 WHERE id = ?3",
            params![status.as_str(), current_timestamp(), run_id],
        )?;
        Ok(())
    }

    pub fn get_run(&self, run_id: &str) -> Result<Option<RunRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, start_time, end_time, status, entry_points, configuration FROM runs WHERE id = ?1",
        )?;
        stmt.query_row(params![run_id], run_from_row).optional()
    }

    pub fn list_runs(&self) -> Result<Vec<RunRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, start_time, end_time, status, entry_points, configuration
             FROM runs ORDER BY start_time DESC, rowid DESC",
        )?;
        let runs = stmt.query_map([], run_from_row)?.collect::<Result<Vec<_>>>()?;
        Ok(runs)
    }

    // Resource operations
    pub fn insert_resource(&self, run_id: &str, page: &PageRecord) -> Result<i64> {
        insert_resource(&self.conn, run_id, page)
    }

    pub fn get_resources(&self, run_id: &str) -> Result<Vec<PageRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, r.canonical_id, r.document_id, r.raw_location, r.route_fragment,
                    r.title, r.breadcrumb, r.depth, r.section, r.via, r.visited_at,
                    p.load_time_ms, p.transfer_bytes, p.element_count, p.script_count, p.form_count
             FROM resources r
             LEFT JOIN perf_samples p ON p.resource_id = r.id
             WHERE r.run_id = ?1
             ORDER BY r.id",
        )?;

        let rows = stmt
            .query_map(params![run_id], |row| {
                let visited_at: String = row.get(10)?;
                let perf = match row.get::<_, Option<i64>>(11)? {
                    Some(load_time_ms) => Some(PerfSample {
                        load_time_ms: load_time_ms as u64,
                        transfer_bytes: row.get::<_, i64>(12)? as usize,
                        element_count: row.get::<_, i64>(13)? as usize,
                        script_count: row.get::<_, i64>(14)? as usize,
                        form_count: row.get::<_, i64>(15)? as usize,
                    }),
                    None => None,
                };
                let record = PageRecord {
                    resource: NavigableResource {
                        canonical_id: CanonicalId::new(row.get::<_, String>(1)?),
                        document_id: CanonicalId::new(row.get::<_, String>(2)?),
                        raw_location: row.get(3)?,
                        route_fragment: row.get(4)?,
                    },
                    title: row.get(5)?,
                    breadcrumb: row.get(6)?,
                    depth: row.get::<_, i64>(7)? as usize,
                    section: row.get(8)?,
                    via: row.get(9)?,
                    violations: Vec::new(),
                    perf,
                    visited_at: parse_time(10, &visited_at)?,
                };
                Ok((row.get::<_, i64>(0)?, record))
            })?
            .collect::<Result<Vec<_>>>()?;

        let mut pages = Vec::with_capacity(rows.len());
        for (resource_id, mut page) in rows {
            page.violations = self.get_violations(resource_id)?;
            pages.push(page);
        }
        Ok(pages)
    }

    pub fn get_violations(&self, resource_id: i64) -> Result<Vec<Violation>> {
        let mut stmt = self.conn.prepare(
            "SELECT rule, impact, description, help, target FROM violations WHERE resource_id = ?1 ORDER BY id",
        )?;
        let violations = stmt
            .query_map(params![resource_id], |row| {
                Ok(Violation {
                    rule: row.get(0)?,
                    impact: parse_impact(&row.get::<_, String>(1)?),
                    description: row.get(2)?,
                    help: row.get(3)?,
                    target: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(violations)
    }

    // Edge operations
    pub fn insert_edge(&self, run_id: &str, edge: &NavigationEdge) -> Result<i64> {
        insert_edge(&self.conn, run_id, edge)
    }

    pub fn get_edges(&self, run_id: &str) -> Result<Vec<NavigationEdge>> {
        let mut stmt = self
            .conn
            .prepare("SELECT source, target, via FROM edges WHERE run_id = ?1 ORDER BY id")?;
        let edges = stmt
            .query_map(params![run_id], |row| {
                Ok(NavigationEdge {
                    from: CanonicalId::new(row.get::<_, String>(0)?),
                    to: CanonicalId::new(row.get::<_, String>(1)?),
                    via: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(edges)
    }

    // Feature operations
    pub fn insert_feature(&self, run_id: &str, feature: &DiscoveredFeature) -> Result<i64> {
        insert_feature(&self.conn, run_id, feature)
    }

    pub fn get_features(&self, run_id: &str) -> Result<Vec<DiscoveredFeature>> {
        let mut stmt = self
            .conn
            .prepare("SELECT payload FROM features WHERE run_id = ?1 ORDER BY id")?;
        let features = stmt
            .query_map(params![run_id], |row| {
                let payload: String = row.get(0)?;
                serde_json::from_str(&payload).map_err(|e| conversion_error(0, e))
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(features)
    }

    pub fn get_feature_count_by_kind(&self, run_id: &str) -> Result<Vec<(String, i64)>> {
        let mut stmt = self.conn.prepare(
            "SELECT kind, COUNT(*) FROM features WHERE run_id = ?1 GROUP BY kind ORDER BY kind",
        )?;
        let counts = stmt
            .query_map(params![run_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>>>()?;
        Ok(counts)
    }

    // Ledger operations
    pub fn insert_ledger_entry(&self, run_id: &str, entry: &LedgerEntry) -> Result<()> {
        insert_ledger_entry(&self.conn, run_id, entry)
    }

    pub fn get_ledger_entries(&self, run_id: &str) -> Result<Vec<LedgerEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT sequence, timestamp, kind, target, result_location, success, detail
             FROM ledger_entries WHERE run_id = ?1 ORDER BY sequence",
        )?;
        let entries = stmt
            .query_map(params![run_id], |row| {
                let timestamp: String = row.get(1)?;
                let kind: String = row.get(2)?;
                Ok(LedgerEntry {
                    sequence: row.get::<_, i64>(0)? as u64,
                    timestamp: parse_time(1, &timestamp)?,
                    kind: kind
                        .parse::<ActionKind>()
                        .map_err(|e| conversion_error(2, io::Error::other(e)))?,
                    target: row.get(3)?,
                    result_location: row.get(4)?,
                    success: row.get(5)?,
                    detail: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>>>()?;
        Ok(entries)
    }

    pub fn count_ledger_entries(&self, run_id: &str, kind: ActionKind) -> Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM ledger_entries WHERE run_id = ?1 AND kind = ?2",
            params![run_id, kind.as_str()],
            |row| row.get(0),
        )
    }

    /// Stores pages, edges and features of a finished exploration in one
    /// transaction. Ledger entries are written as they happen by
    /// [`DatabaseSink`] and are not repeated here.
    pub fn save_exploration(&mut self, run_id: &str, state: &ExplorationState) -> Result<()> {
        let tx = self.conn.transaction()?;
        for page in &state.pages {
            insert_resource(&tx, run_id, page)?;
        }
        for edge in &state.edges {
            insert_edge(&tx, run_id, edge)?;
        }
        for feature in &state.features {
            insert_feature(&tx, run_id, feature)?;
        }
        tx.commit()
    }

    pub fn get_connection(&self) -> &Connection {
        &self.conn
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| conversion_error(0, e))?;
    }
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_secs(5))?;

    // Ledger entries must survive a crash
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = FULL;
        PRAGMA cache_size = -64000;  -- 64MB cache
        PRAGMA temp_store = MEMORY;
        PRAGMA foreign_keys = ON;
        ",
    )?;
    Ok(conn)
}

fn run_from_row(row: &Row<'_>) -> Result<RunRow> {
    let status: String = row.get(3)?;
    let entry_points: String = row.get(4)?;
    Ok(RunRow {
        id: row.get(0)?,
        start_time: row.get(1)?,
        end_time: row.get(2)?,
        status: RunStatus::parse(&status).unwrap_or(RunStatus::Failed),
        entry_points: serde_json::from_str(&entry_points).map_err(|e| conversion_error(4, e))?,
        configuration: row.get(5)?,
    })
}

fn insert_resource(conn: &Connection, run_id: &str, page: &PageRecord) -> Result<i64> {
    let resource = &page.resource;
    conn.execute(
        "INSERT INTO resources (
            run_id, canonical_id, document_id, raw_location, route_fragment,
            title, breadcrumb, depth, section, via, visited_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            run_id,
            resource.canonical_id.as_str(),
            resource.document_id.as_str(),
            &resource.raw_location,
            &resource.route_fragment,
            &page.title,
            &page.breadcrumb,
            page.depth as i64,
            &page.section,
            &page.via,
            page.visited_at.to_rfc3339(),
        ],
    )?;
    let resource_id = conn.last_insert_rowid();

    for violation in &page.violations {
        conn.execute(
            "INSERT INTO violations (resource_id, rule, impact, description, help, target)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                resource_id,
                &violation.rule,
                violation.impact.to_string(),
                &violation.description,
                &violation.help,
                &violation.target,
            ],
        )?;
    }

    if let Some(perf) = &page.perf {
        conn.execute(
            "INSERT INTO perf_samples (resource_id, load_time_ms, transfer_bytes, element_count, script_count, form_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                resource_id,
                perf.load_time_ms as i64,
                perf.transfer_bytes as i64,
                perf.element_count as i64,
                perf.script_count as i64,
                perf.form_count as i64,
            ],
        )?;
    }

    Ok(resource_id)
}

fn insert_edge(conn: &Connection, run_id: &str, edge: &NavigationEdge) -> Result<i64> {
    conn.execute(
        "INSERT INTO edges (run_id, source, target, via) VALUES (?1, ?2, ?3, ?4)",
        params![run_id, edge.from.as_str(), edge.to.as_str(), &edge.via],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_feature(conn: &Connection, run_id: &str, feature: &DiscoveredFeature) -> Result<i64> {
    let payload = serde_json::to_string(feature).map_err(|e| conversion_error(6, e))?;
    let operation = feature
        .operation
        .map(|op| format!("{:?}", op).to_lowercase());

    conn.execute(
        "INSERT INTO features (run_id, name, kind, section, target, operation, payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            run_id,
            &feature.name,
            feature.kind.to_string(),
            &feature.section,
            &feature.target,
            operation,
            payload,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_ledger_entry(conn: &Connection, run_id: &str, entry: &LedgerEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO ledger_entries (run_id, sequence, timestamp, kind, target, result_location, success, detail)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            run_id,
            entry.sequence as i64,
            entry.timestamp.to_rfc3339(),
            entry.kind.as_str(),
            &entry.target,
            &entry.result_location,
            entry.success,
            &entry.detail,
        ],
    )?;
    Ok(())
}

/// Ledger sink writing each entry to the run store before the ledger accepts it.
pub struct DatabaseSink {
    conn: Connection,
    run_id: String,
}

impl DatabaseSink {
    pub fn open(path: &Path, run_id: impl Into<String>) -> Result<Self> {
        Ok(Self {
            conn: open_connection(path)?,
            run_id: run_id.into(),
        })
    }
}

impl LedgerSink for DatabaseSink {
    fn persist(&mut self, entry: &LedgerEntry) -> io::Result<()> {
        insert_ledger_entry(&self.conn, &self.run_id, entry).map_err(io::Error::other)
    }
}
