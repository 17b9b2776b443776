use chrono::{DateTime, Local};
use rusqlite::{params, Connection, Result};
use serde::Serialize;
use std::io;
use std::path::Path;

use crate::app_dirs::AppDirs;
use crate::engine::SessionSummary;
use crate::session::GameType;
use crate::util::mean;

/// One completed session as stored in the history database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub finished_at: DateTime<Local>,
    pub game_type: GameType,
    pub n_back: usize,
    pub number_of_events: usize,
    pub score: u32,
    pub total_matches: u32,
}

impl From<&SessionSummary> for SessionRecord {
    fn from(summary: &SessionSummary) -> Self {
        Self {
            finished_at: summary.finished_at,
            game_type: summary.game_type,
            n_back: summary.n_back,
            number_of_events: summary.number_of_events,
            score: summary.score,
            total_matches: summary.total_matches,
        }
    }
}

/// Completed-session log backed by SQLite
#[derive(Debug)]
pub struct History {
    conn: Connection,
}

impl History {
    /// Open (or create) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(format!("Failed to create directory: {}", e)),
                )
            })?;
        }
        Self::init(Connection::open(path)?)
    }

    /// Open the database under $HOME/.local/state/nback
    pub fn open_default() -> Result<Self> {
        Self::open(AppDirs::history_path())
    }

    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                finished_at TEXT NOT NULL,
                game_type TEXT NOT NULL,
                n_back INTEGER NOT NULL,
                number_of_events INTEGER NOT NULL,
                score INTEGER NOT NULL,
                total_matches INTEGER NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_sessions_mode ON sessions(game_type, n_back)",
            [],
        )?;

        Ok(History { conn })
    }

    pub fn record(&self, record: &SessionRecord) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO sessions
            (finished_at, game_type, n_back, number_of_events, score, total_matches)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                record.finished_at.to_rfc3339(),
                record.game_type.to_string(),
                record.n_back as i64,
                record.number_of_events as i64,
                record.score,
                record.total_matches,
            ],
        )?;
        tracing::debug!(score = record.score, game_type = %record.game_type, "session recorded");
        Ok(())
    }

    pub fn record_summary(&self, summary: &SessionSummary) -> Result<()> {
        self.record(&SessionRecord::from(summary))
    }

    /// Most recent sessions first
    pub fn recent(&self, limit: usize) -> Result<Vec<SessionRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT finished_at, game_type, n_back, number_of_events, score, total_matches
            FROM sessions
            ORDER BY finished_at DESC, id DESC
            LIMIT ?1
            "#,
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map([limit], |row| {
            let finished_at: String = row.get(0)?;
            let finished_at = DateTime::parse_from_rfc3339(&finished_at)
                .map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        0,
                        "finished_at".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?
                .with_timezone(&Local);
            let game_type: String = row.get(1)?;
            let game_type = parse_game_type(&game_type).ok_or_else(|| {
                rusqlite::Error::InvalidColumnType(
                    1,
                    "game_type".to_string(),
                    rusqlite::types::Type::Text,
                )
            })?;

            Ok(SessionRecord {
                finished_at,
                game_type,
                n_back: row.get::<_, i64>(2)? as usize,
                number_of_events: row.get::<_, i64>(3)? as usize,
                score: row.get(4)?,
                total_matches: row.get(5)?,
            })
        })?;

        let mut records = Vec::new();
        for record in rows {
            records.push(record?);
        }
        Ok(records)
    }

    /// Highest score recorded for a mode
    pub fn best_score(&self, game_type: GameType, n_back: usize) -> Result<Option<u32>> {
        self.conn.query_row(
            "SELECT MAX(score) FROM sessions WHERE game_type = ?1 AND n_back = ?2",
            params![game_type.to_string(), n_back as i64],
            |row| row.get(0),
        )
    }

    pub fn average_score(&self, game_type: GameType) -> Result<Option<f64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT score FROM sessions WHERE game_type = ?1")?;
        let scores = stmt
            .query_map([game_type.to_string()], |row| row.get::<_, f64>(0))?
            .collect::<Result<Vec<_>>>()?;
        Ok(mean(&scores))
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM sessions", [])?;
        Ok(())
    }
}

fn parse_game_type(name: &str) -> Option<GameType> {
    match name {
        "Audio" => Some(GameType::Audio),
        "Visual" => Some(GameType::Visual),
        "AudioVisual" => Some(GameType::AudioVisual),
        _ => None,
    }
}

/// Write `records` as CSV with a header row.
pub fn write_csv<W: io::Write>(writer: W, records: &[SessionRecord]) -> csv::Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}
