use crate::config::Config;
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// SQLite's CURRENT_TIMESTAMP strings are UTC without a timezone marker.
pub fn parse_sqlite_utc(ts: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(ts, "%Y-%m-%d %H:%M:%S").ok()?;
    Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone)]
pub struct KeywordRecord {
    pub pattern: String,
    pub description: Option<String>,
    pub enabled: bool,
    pub trigger_count: i64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct QaRecord {
    pub user_name: String,
    pub question: String,
    pub answer: String,
    pub has_image: bool,
    pub response_time: Option<f64>,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub error_type: String,
    pub error_message: String,
    pub user_id: Option<String>,
    pub channel_id: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct SystemStats {
    pub total_questions: i64,
    pub today_questions: i64,
    pub total_users: i64,
    pub total_images: i64,
    pub avg_response_time: f64,
}

#[derive(Debug, Clone)]
pub struct UserStats {
    pub user_name: String,
    pub total_questions: i64,
    pub total_images: i64,
    pub avg_response_time: f64,
    pub first_question_at: Option<String>,
    pub last_question_at: Option<String>,
}

impl Database {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        if config.database_path != ":memory:" {
            if let Some(parent) = std::path::Path::new(&config.database_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&config.database_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Runs a database closure off the async runtime's worker threads.
    pub async fn run_blocking<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        let sql = "
            CREATE TABLE IF NOT EXISTS qa_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                user_name TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                guild_id TEXT,
                question TEXT NOT NULL,
                answer TEXT NOT NULL,
                has_image BOOLEAN DEFAULT FALSE,
                response_time REAL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_qa_user ON qa_records (user_id);
            CREATE INDEX IF NOT EXISTS idx_qa_created ON qa_records (created_at);

            CREATE TABLE IF NOT EXISTS user_stats (
                user_id TEXT PRIMARY KEY,
                user_name TEXT NOT NULL,
                total_questions INTEGER DEFAULT 0,
                total_images INTEGER DEFAULT 0,
                avg_response_time REAL DEFAULT 0,
                first_question_at DATETIME,
                last_question_at DATETIME
            );

            CREATE TABLE IF NOT EXISTS keyword_triggers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                keyword TEXT NOT NULL,
                message_content TEXT NOT NULL,
                triggered_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS regex_keywords (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pattern TEXT NOT NULL UNIQUE,
                description TEXT,
                enabled BOOLEAN DEFAULT TRUE,
                trigger_count INTEGER DEFAULT 0,
                created_by TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS error_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                error_type TEXT NOT NULL,
                error_message TEXT NOT NULL,
                user_id TEXT,
                channel_id TEXT,
                detail TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_errors_created ON error_logs (created_at);

            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sender_id TEXT NOT NULL,
                message TEXT NOT NULL,
                channel_count INTEGER DEFAULT 0,
                sent_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );
        ";
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(sql)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    // --- QA records & user statistics ---

    pub fn record_qa(
        &self,
        user_id: &str,
        user_name: &str,
        channel_id: &str,
        guild_id: Option<&str>,
        question: &str,
        answer: &str,
        has_image: bool,
        response_time: Option<f64>,
    ) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO qa_records (user_id, user_name, channel_id, guild_id, question, answer, has_image, response_time)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            (user_id, user_name, channel_id, guild_id, question, answer, has_image, response_time),
        )?;
        let record_id = conn.last_insert_rowid();
        drop(conn);

        self.update_user_stats(user_id, user_name, has_image, response_time)?;
        debug!("Database: QA record {} saved for user {}", record_id, user_id);
        Ok(record_id)
    }

    fn update_user_stats(
        &self,
        user_id: &str,
        user_name: &str,
        has_image: bool,
        response_time: Option<f64>,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        let existing: Option<(i64, i64, f64)> = conn
            .query_row(
                "SELECT total_questions, total_images, avg_response_time FROM user_stats WHERE user_id = ?1",
                [user_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match existing {
            Some((questions, images, avg)) => {
                let new_questions = questions + 1;
                let new_images = images + if has_image { 1 } else { 0 };
                let new_avg = match response_time {
                    Some(rt) if avg > 0.0 => (avg * questions as f64 + rt) / new_questions as f64,
                    Some(rt) => rt,
                    None => avg,
                };
                conn.execute(
                    "UPDATE user_stats SET user_name = ?1, total_questions = ?2, total_images = ?3,
                         avg_response_time = ?4, last_question_at = CURRENT_TIMESTAMP
                     WHERE user_id = ?5",
                    (user_name, new_questions, new_images, new_avg, user_id),
                )?;
            }
            None => {
                conn.execute(
                    "INSERT INTO user_stats (user_id, user_name, total_questions, total_images,
                         avg_response_time, first_question_at, last_question_at)
                     VALUES (?1, ?2, 1, ?3, ?4, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
                    (user_id, user_name, if has_image { 1 } else { 0 }, response_time.unwrap_or(0.0)),
                )?;
            }
        }
        Ok(())
    }

    pub fn get_user_stats(&self, user_id: &str) -> anyhow::Result<Option<UserStats>> {
        let conn = self.conn.lock().unwrap();
        let stats = conn
            .query_row(
                "SELECT user_name, total_questions, total_images, avg_response_time,
                        first_question_at, last_question_at
                 FROM user_stats WHERE user_id = ?1",
                [user_id],
                |row| {
                    Ok(UserStats {
                        user_name: row.get(0)?,
                        total_questions: row.get(1)?,
                        total_images: row.get(2)?,
                        avg_response_time: row.get(3)?,
                        first_question_at: row.get(4)?,
                        last_question_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(stats)
    }

    pub fn get_recent_questions(&self, limit: usize, hours: i64) -> anyhow::Result<Vec<QaRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT user_name, question, answer, has_image, response_time, created_at
             FROM qa_records
             WHERE created_at >= datetime('now', ?1)
             ORDER BY created_at DESC
             LIMIT ?2",
        )?;
        let rows = stmt.query_map((format!("-{hours} hours"), limit), |row| {
            Ok(QaRecord {
                user_name: row.get(0)?,
                question: row.get(1)?,
                answer: row.get(2)?,
                has_image: row.get(3)?,
                response_time: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn get_system_stats(&self) -> anyhow::Result<SystemStats> {
        let conn = self.conn.lock().unwrap();
        let total_questions: i64 =
            conn.query_row("SELECT COUNT(*) FROM qa_records", [], |row| row.get(0))?;
        let today_questions: i64 = conn.query_row(
            "SELECT COUNT(*) FROM qa_records WHERE DATE(created_at) = DATE('now')",
            [],
            |row| row.get(0),
        )?;
        let total_users: i64 =
            conn.query_row("SELECT COUNT(*) FROM user_stats", [], |row| row.get(0))?;
        let total_images: i64 = conn.query_row(
            "SELECT COUNT(*) FROM qa_records WHERE has_image = TRUE",
            [],
            |row| row.get(0),
        )?;
        let avg_response_time: f64 = conn
            .query_row(
                "SELECT AVG(response_time) FROM qa_records WHERE response_time IS NOT NULL",
                [],
                |row| row.get::<_, Option<f64>>(0),
            )?
            .unwrap_or(0.0);

        Ok(SystemStats {
            total_questions,
            today_questions,
            total_users,
            total_images,
            avg_response_time,
        })
    }

    // --- Keyword triggers & dynamic patterns ---

    pub fn record_keyword_trigger(
        &self,
        user_id: &str,
        channel_id: &str,
        keyword: &str,
        message_content: &str,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO keyword_triggers (user_id, channel_id, keyword, message_content)
             VALUES (?1, ?2, ?3, ?4)",
            (user_id, channel_id, keyword, message_content),
        )?;
        Ok(())
    }

    /// Returns false when the pattern already exists.
    pub fn add_regex_keyword(
        &self,
        pattern: &str,
        description: Option<&str>,
        created_by: &str,
    ) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO regex_keywords (pattern, description, created_by)
             VALUES (?1, ?2, ?3)",
            (pattern, description, created_by),
        )?;
        Ok(inserted == 1)
    }

    pub fn remove_regex_keyword(&self, pattern: &str) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute("DELETE FROM regex_keywords WHERE pattern = ?1", [pattern])?;
        Ok(removed == 1)
    }

    /// Flips a pattern's enabled flag; `None` when the pattern is unknown.
    pub fn toggle_regex_keyword(&self, pattern: &str) -> anyhow::Result<Option<bool>> {
        let conn = self.conn.lock().unwrap();
        let current: Option<bool> = conn
            .query_row(
                "SELECT enabled FROM regex_keywords WHERE pattern = ?1",
                [pattern],
                |row| row.get(0),
            )
            .optional()?;

        let Some(enabled) = current else {
            return Ok(None);
        };
        conn.execute(
            "UPDATE regex_keywords SET enabled = ?1 WHERE pattern = ?2",
            (!enabled, pattern),
        )?;
        Ok(Some(!enabled))
    }

    pub fn list_regex_keywords(&self, enabled_only: bool) -> anyhow::Result<Vec<KeywordRecord>> {
        let conn = self.conn.lock().unwrap();
        let sql = if enabled_only {
            "SELECT pattern, description, enabled, trigger_count, created_at
             FROM regex_keywords WHERE enabled = TRUE ORDER BY id"
        } else {
            "SELECT pattern, description, enabled, trigger_count, created_at
             FROM regex_keywords ORDER BY id"
        };
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], |row| {
            Ok(KeywordRecord {
                pattern: row.get(0)?,
                description: row.get(1)?,
                enabled: row.get(2)?,
                trigger_count: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn increment_keyword_trigger(&self, pattern: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE regex_keywords SET trigger_count = trigger_count + 1 WHERE pattern = ?1",
            [pattern],
        )?;
        Ok(())
    }

    // --- Error logs & notifications ---

    pub fn log_error(
        &self,
        error_type: &str,
        error_message: &str,
        user_id: Option<u64>,
        channel_id: Option<u64>,
        detail: Option<&str>,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO error_logs (error_type, error_message, user_id, channel_id, detail)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            (
                error_type,
                error_message,
                user_id.map(|id| id.to_string()),
                channel_id.map(|id| id.to_string()),
                detail,
            ),
        )?;
        Ok(())
    }

    pub fn get_recent_errors(&self, limit: usize) -> anyhow::Result<Vec<ErrorRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT error_type, error_message, user_id, channel_id, created_at
             FROM error_logs ORDER BY created_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map([limit], |row| {
            Ok(ErrorRecord {
                error_type: row.get(0)?,
                error_message: row.get(1)?,
                user_id: row.get(2)?,
                channel_id: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    pub fn record_notification(
        &self,
        sender_id: &str,
        message: &str,
        channel_count: usize,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO notifications (sender_id, message, channel_count) VALUES (?1, ?2, ?3)",
            (sender_id, message, channel_count),
        )?;
        Ok(())
    }

    /// Removes QA records, trigger events and error logs older than `days`.
    /// Returns the deleted counts in that order.
    pub fn cleanup_old_records(&self, days: u64) -> anyhow::Result<(usize, usize, usize)> {
        let cutoff = format!("-{days} days");
        let conn = self.conn.lock().unwrap();
        let qa = conn.execute(
            "DELETE FROM qa_records WHERE created_at < datetime('now', ?1)",
            [&cutoff],
        )?;
        let triggers = conn.execute(
            "DELETE FROM keyword_triggers WHERE triggered_at < datetime('now', ?1)",
            [&cutoff],
        )?;
        let errors = conn.execute(
            "DELETE FROM error_logs WHERE created_at < datetime('now', ?1)",
            [&cutoff],
        )?;

        info!(
            "Database cleanup: removed {} QA records, {} trigger events, {} error logs",
            qa, triggers, errors
        );
        Ok((qa, triggers, errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;

    fn test_db() -> Database {
        let db = Database::new(&test_config()).unwrap();
        db.execute_init().unwrap();
        db
    }

    #[test]
    fn test_record_qa_and_user_stats() {
        let db = test_db();

        db.record_qa("u1", "Ada", "c1", Some("g1"), "q1", "a1", false, Some(2.0))
            .unwrap();
        db.record_qa("u1", "Ada", "c1", Some("g1"), "q2", "a2", true, Some(4.0))
            .unwrap();

        let stats = db.get_user_stats("u1").unwrap().unwrap();
        assert_eq!(stats.user_name, "Ada");
        assert_eq!(stats.total_questions, 2);
        assert_eq!(stats.total_images, 1);
        assert!((stats.avg_response_time - 3.0).abs() < f64::EPSILON);
        assert!(stats.first_question_at.is_some());

        assert!(db.get_user_stats("nobody").unwrap().is_none());
    }

    #[test]
    fn test_system_stats() {
        let db = test_db();
        db.record_qa("u1", "Ada", "c1", None, "q", "a", true, Some(1.0))
            .unwrap();
        db.record_qa("u2", "Bob", "c1", None, "q", "a", false, Some(3.0))
            .unwrap();

        let stats = db.get_system_stats().unwrap();
        assert_eq!(stats.total_questions, 2);
        assert_eq!(stats.today_questions, 2);
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.total_images, 1);
        assert!((stats.avg_response_time - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_regex_keyword_crud() {
        let db = test_db();

        assert!(db
            .add_regex_keyword("chatgpt.*error", Some("ChatGPT errors"), "42")
            .unwrap());
        // Duplicate insert is reported, not an error.
        assert!(!db.add_regex_keyword("chatgpt.*error", None, "42").unwrap());

        assert!(db.add_regex_keyword(r"api.*limit", None, "42").unwrap());

        let all = db.list_regex_keywords(false).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].pattern, "chatgpt.*error");
        assert_eq!(all[0].description.as_deref(), Some("ChatGPT errors"));
        assert!(all[0].enabled);

        // Toggle off: hidden from the enabled-only listing.
        assert_eq!(db.toggle_regex_keyword("chatgpt.*error").unwrap(), Some(false));
        let enabled = db.list_regex_keywords(true).unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].pattern, r"api.*limit");

        assert_eq!(db.toggle_regex_keyword("chatgpt.*error").unwrap(), Some(true));
        assert_eq!(db.toggle_regex_keyword("missing").unwrap(), None);

        assert!(db.remove_regex_keyword(r"api.*limit").unwrap());
        assert!(!db.remove_regex_keyword(r"api.*limit").unwrap());
        assert_eq!(db.list_regex_keywords(false).unwrap().len(), 1);
    }

    #[test]
    fn test_trigger_counter_increments() {
        let db = test_db();
        db.add_regex_keyword("p1", None, "1").unwrap();

        db.increment_keyword_trigger("p1").unwrap();
        db.increment_keyword_trigger("p1").unwrap();
        // Unknown pattern is a no-op, not an error.
        db.increment_keyword_trigger("ghost").unwrap();

        let all = db.list_regex_keywords(false).unwrap();
        assert_eq!(all[0].trigger_count, 2);
    }

    #[test]
    fn test_error_logging_and_listing() {
        let db = test_db();
        db.log_error("keyword_trigger", "boom", Some(1), Some(2), Some("trace"))
            .unwrap();
        db.log_error("image_analysis", "bang", None, None, None)
            .unwrap();

        let errors = db.get_recent_errors(10).unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].error_type, "image_analysis");
        assert_eq!(errors[1].user_id.as_deref(), Some("1"));
    }

    #[test]
    fn test_cleanup_removes_only_old_rows() {
        let db = test_db();
        {
            let conn = db.conn.lock().unwrap();
            conn.execute(
                "INSERT INTO qa_records (user_id, user_name, channel_id, question, answer, created_at)
                 VALUES ('u', 'U', 'c', 'q', 'a', datetime('now', '-40 days'))",
                [],
            )
            .unwrap();
            conn.execute(
                "INSERT INTO qa_records (user_id, user_name, channel_id, question, answer)
                 VALUES ('u', 'U', 'c', 'q', 'a')",
                [],
            )
            .unwrap();
        }

        let (qa, triggers, errors) = db.cleanup_old_records(30).unwrap();
        assert_eq!((qa, triggers, errors), (1, 0, 0));
        assert_eq!(db.get_system_stats().unwrap().total_questions, 1);
    }

    #[test]
    fn test_parse_sqlite_utc() {
        let parsed = parse_sqlite_utc("2026-08-04 12:30:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2026-08-04T12:30:00+00:00");
        assert!(parse_sqlite_utc("not a timestamp").is_none());
    }

    #[test]
    fn test_notifications_recorded() {
        let db = test_db();
        db.record_notification("9", "maintenance window tonight", 3)
            .unwrap();

        let conn = db.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM notifications", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
