use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

use crate::models::{LedgerEntry, StatusFlag};

/// Durable per-link status store used for de-duplication across runs.
///
/// Reads fail open: if the backing file cannot be read the ledger answers
/// "nothing seen". Writes never fail open and surface the error instead.
pub struct Ledger {
    conn: Option<Mutex<Connection>>,
    path: PathBuf,
}

impl Ledger {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create ledger directory {}", parent.display()))?;
        }

        let conn = match Connection::open(path) {
            Ok(conn) => match Self::init(&conn) {
                Ok(()) => Some(Mutex::new(conn)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "ledger unreadable, treating every job as unseen");
                    None
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ledger could not be opened, treating every job as unseen");
                None
            }
        };

        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn default_path(output_dir: &Path) -> PathBuf {
        output_dir.join("ledger.db")
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn is_degraded(&self) -> bool {
        self.conn.is_none()
    }

    fn init(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS ledger (
                link TEXT PRIMARY KEY,
                first_seen_at TEXT NOT NULL DEFAULT (datetime('now')),
                seen_at TEXT,
                applied_success_at TEXT,
                skipped_low_score_at TEXT,
                skipped_low_salary_at TEXT,
                skipped_blacklist_at TEXT,
                failed_application_at TEXT
            );

            CREATE TABLE IF NOT EXISTS job_scores (
                link TEXT PRIMARY KEY,
                score REAL,
                salary_estimate REAL,
                recorded_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| anyhow!("Ledger at {} is unavailable", self.path.display()))?;
        Ok(conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    // --- Status operations ---

    /// Sets `flag` for `link`. Setting an already-set flag keeps its original timestamp.
    pub fn record_status(&self, link: &str, flag: StatusFlag) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO ledger (link) VALUES (?1) ON CONFLICT(link) DO NOTHING",
            [link],
        )
        .with_context(|| format!("Failed to record {} for {}", flag.label(), link))?;

        let column = flag.as_column();
        let sql = format!(
            "UPDATE ledger SET {column} = COALESCE({column}, datetime('now')) WHERE link = ?1"
        );
        conn.execute(&sql, [link])
            .with_context(|| format!("Failed to record {} for {}", flag.label(), link))?;
        debug!(link, flag = flag.label(), "ledger updated");
        Ok(())
    }

    pub fn has_seen(&self, link: &str) -> bool {
        self.flag_set(link, StatusFlag::Seen)
    }

    pub fn is_skipped_low_score(&self, link: &str) -> bool {
        self.flag_set(link, StatusFlag::SkippedLowScore)
    }

    pub fn is_skipped_low_salary(&self, link: &str) -> bool {
        self.flag_set(link, StatusFlag::SkippedLowSalary)
    }

    pub fn is_applied_successfully(&self, link: &str) -> bool {
        self.flag_set(link, StatusFlag::AppliedSuccess)
    }

    pub fn is_skipped_blacklist(&self, link: &str) -> bool {
        self.flag_set(link, StatusFlag::SkippedBlacklist)
    }

    pub fn is_failed_application(&self, link: &str) -> bool {
        self.flag_set(link, StatusFlag::FailedApplication)
    }

    /// First terminal flag recorded for `link`, checked in the order the filter uses.
    pub fn terminal_flag(&self, link: &str) -> Option<StatusFlag> {
        [
            StatusFlag::Seen,
            StatusFlag::AppliedSuccess,
            StatusFlag::SkippedLowScore,
            StatusFlag::SkippedLowSalary,
            StatusFlag::SkippedBlacklist,
            StatusFlag::FailedApplication,
        ]
        .into_iter()
        .find(|flag| self.flag_set(link, *flag))
    }

    fn flag_set(&self, link: &str, flag: StatusFlag) -> bool {
        let Ok(conn) = self.lock() else {
            return false;
        };
        let sql = format!(
            "SELECT {} IS NOT NULL FROM ledger WHERE link = ?1",
            flag.as_column()
        );
        match conn.query_row(&sql, [link], |row| row.get::<_, bool>(0)) {
            Ok(set) => set,
            Err(rusqlite::Error::QueryReturnedNoRows) => false,
            Err(e) => {
                warn!(link, error = %e, "ledger read failed, treating job as unseen");
                false
            }
        }
    }

    pub fn entry(&self, link: &str) -> Result<Option<LedgerEntry>> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT link, first_seen_at, seen_at, applied_success_at, skipped_low_score_at,
                    skipped_low_salary_at, skipped_blacklist_at, failed_application_at
             FROM ledger WHERE link = ?1",
            [link],
            Self::row_to_entry,
        )
        .optional()
        .context("Failed to read ledger entry")
    }

    pub fn recent(&self, limit: usize) -> Result<Vec<LedgerEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT link, first_seen_at, seen_at, applied_success_at, skipped_low_score_at,
                    skipped_low_salary_at, skipped_blacklist_at, failed_application_at
             FROM ledger ORDER BY first_seen_at DESC, link LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit as i64], Self::row_to_entry)?;
        rows.collect::<Result<Vec<_>, _>>()
            .context("Failed to list ledger entries")
    }

    pub fn stats(&self) -> Result<Vec<(StatusFlag, i64)>> {
        let conn = self.lock()?;
        let mut stats = Vec::new();
        for flag in StatusFlag::ALL {
            let sql = format!("SELECT COUNT({}) FROM ledger", flag.as_column());
            let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
            stats.push((flag, count));
        }
        Ok(stats)
    }

    fn row_to_entry(row: &rusqlite::Row) -> rusqlite::Result<LedgerEntry> {
        Ok(LedgerEntry {
            link: row.get(0)?,
            first_seen_at: row.get(1)?,
            seen_at: row.get(2)?,
            applied_success_at: row.get(3)?,
            skipped_low_score_at: row.get(4)?,
            skipped_low_salary_at: row.get(5)?,
            skipped_blacklist_at: row.get(6)?,
            failed_application_at: row.get(7)?,
        })
    }

    // --- Score cache ---

    pub fn record_score(&self, link: &str, score: f64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO job_scores (link, score) VALUES (?1, ?2)
             ON CONFLICT(link) DO UPDATE SET score = excluded.score, recorded_at = datetime('now')",
            params![link, score],
        )
        .context("Failed to record job score")?;
        Ok(())
    }

    pub fn record_salary(&self, link: &str, salary: f64) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO job_scores (link, salary_estimate) VALUES (?1, ?2)
             ON CONFLICT(link) DO UPDATE SET salary_estimate = excluded.salary_estimate, recorded_at = datetime('now')",
            params![link, salary],
        )
        .context("Failed to record salary estimate")?;
        Ok(())
    }

    pub fn cached_score(&self, link: &str) -> Option<f64> {
        self.cached_number(link, "score")
    }

    pub fn cached_salary(&self, link: &str) -> Option<f64> {
        self.cached_number(link, "salary_estimate")
    }

    fn cached_number(&self, link: &str, column: &str) -> Option<f64> {
        let conn = self.lock().ok()?;
        let sql = format!("SELECT {column} FROM job_scores WHERE link = ?1");
        match conn.query_row(&sql, [link], |row| row.get::<_, Option<f64>>(0)) {
            Ok(value) => value,
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => {
                warn!(link, error = %e, "score cache read failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINK: &str = "https://www.linkedin.com/jobs/view/4000000001/";

    fn temp_ledger() -> (tempfile::TempDir, Ledger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Ledger::open(&Ledger::default_path(dir.path())).unwrap();
        (dir, ledger)
    }

    #[test]
    fn test_record_status_is_idempotent() {
        let (_dir, ledger) = temp_ledger();
        assert!(!ledger.has_seen(LINK));

        ledger.record_status(LINK, StatusFlag::Seen).unwrap();
        let first = ledger.entry(LINK).unwrap().unwrap().seen_at;
        ledger.record_status(LINK, StatusFlag::Seen).unwrap();
        let second = ledger.entry(LINK).unwrap().unwrap().seen_at;

        assert!(ledger.has_seen(LINK));
        assert_eq!(first, second);
        assert_eq!(ledger.recent(10).unwrap().len(), 1);
    }

    #[test]
    fn test_flags_accumulate_and_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = Ledger::default_path(dir.path());
        {
            let ledger = Ledger::open(&path).unwrap();
            ledger.record_status(LINK, StatusFlag::AppliedSuccess).unwrap();
            ledger.record_status(LINK, StatusFlag::Seen).unwrap();
        }

        let ledger = Ledger::open(&path).unwrap();
        assert!(ledger.is_applied_successfully(LINK));
        assert!(ledger.has_seen(LINK));
        assert!(!ledger.is_skipped_low_score(LINK));
        assert!(!ledger.is_skipped_blacklist(LINK));

        let flags = ledger.entry(LINK).unwrap().unwrap().flags();
        assert_eq!(flags, vec![StatusFlag::Seen, StatusFlag::AppliedSuccess]);
        assert_eq!(ledger.terminal_flag(LINK), Some(StatusFlag::Seen));
    }

    #[test]
    fn test_stats_counts_each_flag() {
        let (_dir, ledger) = temp_ledger();
        ledger.record_status("a", StatusFlag::Seen).unwrap();
        ledger.record_status("b", StatusFlag::Seen).unwrap();
        ledger.record_status("b", StatusFlag::SkippedLowSalary).unwrap();

        let stats = ledger.stats().unwrap();
        let count = |flag| stats.iter().find(|(f, _)| *f == flag).map(|(_, c)| *c).unwrap();
        assert_eq!(count(StatusFlag::Seen), 2);
        assert_eq!(count(StatusFlag::SkippedLowSalary), 1);
        assert_eq!(count(StatusFlag::AppliedSuccess), 0);
    }

    #[test]
    fn test_score_cache() {
        let (_dir, ledger) = temp_ledger();
        assert_eq!(ledger.cached_score(LINK), None);

        ledger.record_score(LINK, 7.5).unwrap();
        ledger.record_salary(LINK, 120000.0).unwrap();

        assert_eq!(ledger.cached_score(LINK), Some(7.5));
        assert_eq!(ledger.cached_salary(LINK), Some(120000.0));
    }

    #[test]
    fn test_corrupt_store_fails_open_on_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = Ledger::default_path(dir.path());
        std::fs::write(&path, vec![b'x'; 4096]).unwrap();

        let ledger = Ledger::open(&path).unwrap();
        assert!(ledger.is_degraded());
        assert!(!ledger.has_seen(LINK));
        assert_eq!(ledger.terminal_flag(LINK), None);
        assert!(ledger.record_status(LINK, StatusFlag::Seen).is_err());
    }
}
