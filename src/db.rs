use chrono::Utc;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Result, SeedError};
use crate::models::{
    Chapter, ChapterInput, ChapterKey, ChapterStatus, ChapterSummary, ContentTopic, NewQuestion,
    SearchHit, StatusCount, UpdateFields, UpsertOutcome, Visualization,
};

/// Columns forming the natural key of `chapter_content`. Both the unique index
/// and the upsert conflict target are built from this list.
pub const CHAPTER_NATURAL_KEY: [&str; 3] = ["subject", "class_level", "chapter_number"];

pub const CHAPTER_KEY_INDEX: &str = "chapter_content_subject_class_chapter_idx";

/// Every table the schema declares, in reporting order.
pub const TABLES: [&str; 7] = [
    "chapter_content",
    "content_topics",
    "questions",
    "users",
    "bookings",
    "mock_tests",
    "subscription_plans",
];

const CHAPTER_COLUMNS: &str = r#"
    id, subject, class_level, chapter_number, chapter_title, introduction, detailed_notes,
    key_concepts, important_formulas, formulas, learning_objectives, prerequisites,
    important_topics, mnemonics, visualizations, ncert_chapter_ref, difficulty_level,
    estimated_study_minutes, status, version, created_at, updated_at
"#;

const CHAPTER_CONTENT_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS chapter_content (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        subject TEXT NOT NULL CHECK(length(trim(subject)) > 0),
        class_level TEXT NOT NULL CHECK(length(trim(class_level)) > 0),
        chapter_number INTEGER NOT NULL CHECK(chapter_number > 0),
        chapter_title TEXT NOT NULL,
        introduction TEXT NOT NULL,
        detailed_notes TEXT NOT NULL,
        key_concepts TEXT NOT NULL DEFAULT '[]',
        important_formulas TEXT NOT NULL DEFAULT '[]',
        formulas TEXT NOT NULL DEFAULT '[]',
        learning_objectives TEXT NOT NULL DEFAULT '[]',
        prerequisites TEXT NOT NULL DEFAULT '[]',
        important_topics TEXT NOT NULL DEFAULT '[]',
        mnemonics TEXT NOT NULL DEFAULT '[]',
        visualizations TEXT NOT NULL DEFAULT '[]',
        ncert_chapter_ref TEXT,
        difficulty_level INTEGER NOT NULL DEFAULT 3 CHECK(difficulty_level BETWEEN 1 AND 5),
        estimated_study_minutes INTEGER NOT NULL DEFAULT 180 CHECK(estimated_study_minutes > 0),
        status TEXT NOT NULL DEFAULT 'draft' CHECK(status IN ('draft', 'in_review', 'published', 'archived')),
        version INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL DEFAULT (datetime('now')),
        updated_at TEXT NOT NULL DEFAULT (datetime('now'))
    );
"#;

// Only present in tables created with the natural-key checks.
const CHAPTER_KEY_CHECK: &str = "CHECK(chapter_number > 0)";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref()).map_err(SeedError::Connection)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        debug!(path = %path.as_ref().display(), "opened database");
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'student' CHECK(role IN ('student', 'mentor', 'admin')),
                current_level INTEGER NOT NULL DEFAULT 1,
                total_points INTEGER NOT NULL DEFAULT 0,
                study_streak INTEGER NOT NULL DEFAULT 0,
                is_admin INTEGER NOT NULL DEFAULT 0,
                is_paid_user INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS content_topics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                subject TEXT NOT NULL,
                class_level TEXT NOT NULL,
                topic_name TEXT NOT NULL,
                ncert_chapter TEXT,
                reference_books TEXT NOT NULL DEFAULT '[]',
                UNIQUE (subject, class_level, topic_name)
            );

            CREATE TABLE IF NOT EXISTS questions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                topic_id INTEGER NOT NULL,
                question_text TEXT NOT NULL,
                options TEXT NOT NULL,
                correct_answer TEXT NOT NULL,
                solution_detail TEXT NOT NULL,
                solution_steps TEXT NOT NULL DEFAULT '[]',
                difficulty_level INTEGER NOT NULL,
                source_type TEXT NOT NULL,
                related_topics TEXT NOT NULL DEFAULT '[]',
                pyq_year INTEGER,
                FOREIGN KEY (topic_id) REFERENCES content_topics(id)
            );

            CREATE TABLE IF NOT EXISTS bookings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                student_id TEXT NOT NULL,
                mentor_id TEXT NOT NULL,
                start_at TEXT NOT NULL,
                end_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'requested' CHECK(status IN ('requested', 'confirmed', 'completed', 'cancelled')),
                payment_status TEXT NOT NULL DEFAULT 'pending' CHECK(payment_status IN ('pending', 'paid', 'refunded')),
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                FOREIGN KEY (student_id) REFERENCES users(id),
                FOREIGN KEY (mentor_id) REFERENCES users(id)
            );

            CREATE TABLE IF NOT EXISTS mock_tests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                test_type TEXT NOT NULL,
                title TEXT NOT NULL,
                questions_list TEXT NOT NULL DEFAULT '[]',
                duration_minutes INTEGER NOT NULL,
                subject TEXT,
                passing_percentage INTEGER DEFAULT 40,
                instructions TEXT,
                is_published INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS subscription_plans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                description TEXT,
                plan_type TEXT NOT NULL DEFAULT 'premium' CHECK(plan_type IN ('free', 'premium', 'organization')),
                price_monthly_cents INTEGER NOT NULL,
                price_yearly_cents INTEGER,
                currency TEXT NOT NULL DEFAULT 'INR',
                billing_interval TEXT NOT NULL DEFAULT 'monthly' CHECK(billing_interval IN ('monthly', 'yearly', 'one_time')),
                features TEXT NOT NULL DEFAULT '[]',
                trial_days INTEGER DEFAULT 0,
                is_active INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_content_topics_subject_class ON content_topics(subject, class_level);
            CREATE INDEX IF NOT EXISTS idx_questions_topic ON questions(topic_id);
            CREATE INDEX IF NOT EXISTS idx_bookings_status ON bookings(status);
            "#,
        )?;

        self.conn.execute_batch(CHAPTER_CONTENT_TABLE)?;

        // Run migrations for existing databases
        self.migrate()?;

        self.conn.execute_batch(&format!(
            r#"
            CREATE INDEX IF NOT EXISTS idx_chapter_content_status ON chapter_content(status);
            CREATE UNIQUE INDEX IF NOT EXISTS {} ON chapter_content({});
            "#,
            CHAPTER_KEY_INDEX,
            CHAPTER_NATURAL_KEY.join(", ")
        ))?;

        Ok(())
    }

    // Databases created before revisions and visualizations were tracked
    fn migrate(&self) -> Result<()> {
        let has_version = self
            .conn
            .prepare("SELECT version FROM chapter_content LIMIT 1")
            .is_ok();

        if !has_version {
            info!("adding version column to chapter_content");
            self.conn.execute_batch(
                "ALTER TABLE chapter_content ADD COLUMN version INTEGER NOT NULL DEFAULT 1;",
            )?;
        }

        let has_visualizations = self
            .conn
            .prepare("SELECT visualizations FROM chapter_content LIMIT 1")
            .is_ok();

        if !has_visualizations {
            info!("adding visualizations column to chapter_content");
            self.conn.execute_batch(
                "ALTER TABLE chapter_content ADD COLUMN visualizations TEXT NOT NULL DEFAULT '[]';",
            )?;
        }

        let table_sql: String = self.conn.query_row(
            "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = 'chapter_content'",
            [],
            |row| row.get(0),
        )?;

        if !table_sql.contains(CHAPTER_KEY_CHECK) {
            self.rebuild_chapter_table()?;
        }

        Ok(())
    }

    // SQLite cannot add a CHECK to an existing table, so rows move into a
    // freshly created one. Rows that break the checks abort the rebuild.
    fn rebuild_chapter_table(&self) -> Result<()> {
        info!("rebuilding chapter_content with natural-key checks");

        let legacy_columns: Vec<String> = {
            let mut stmt = self.conn.prepare("PRAGMA table_info(chapter_content)")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        let columns = CHAPTER_COLUMNS
            .split(',')
            .map(str::trim)
            .filter(|c| legacy_columns.iter().any(|l| l == c))
            .collect::<Vec<_>>()
            .join(", ");

        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch("ALTER TABLE chapter_content RENAME TO chapter_content_legacy;")?;
        tx.execute_batch(CHAPTER_CONTENT_TABLE)?;
        tx.execute_batch(&format!(
            r#"
            INSERT INTO chapter_content ({0}) SELECT {0} FROM chapter_content_legacy;
            DROP TABLE chapter_content_legacy;
            "#,
            columns
        ))?;
        tx.commit()?;

        Ok(())
    }

    /// Fails with `NotInitialized` when the schema has never been created.
    pub fn ensure_initialized(&self) -> Result<()> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'chapter_content')",
            [],
            |row| row.get(0),
        )?;

        if exists {
            Ok(())
        } else {
            Err(SeedError::NotInitialized)
        }
    }

    // Chapter operations

    /// Inserts the chapter, or, when a row with the same natural key exists,
    /// overwrites only the columns in `fields` (plus `updated_at`) and bumps
    /// `version`. The row id never changes.
    pub fn upsert_chapter(&self, input: &ChapterInput, fields: &UpdateFields) -> Result<UpsertOutcome> {
        let now = Utc::now().to_rfc3339();
        let key = &input.key;

        let (id, version): (i64, i32) = self.conn.query_row(
            &upsert_chapter_sql(fields),
            params![
                key.subject,
                key.class_level,
                key.chapter_number,
                input.chapter_title,
                input.introduction,
                input.detailed_notes,
                serde_json::to_string(&input.key_concepts)?,
                serde_json::to_string(&input.important_formulas)?,
                serde_json::to_string(&input.formulas)?,
                serde_json::to_string(&input.learning_objectives)?,
                serde_json::to_string(&input.prerequisites)?,
                serde_json::to_string(&input.important_topics)?,
                serde_json::to_string(&input.mnemonics)?,
                serde_json::to_string(&input.visualizations)?,
                input.ncert_chapter_ref,
                input.difficulty_level,
                input.estimated_study_minutes,
                input.status.as_str(),
                now,
            ],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let outcome = UpsertOutcome {
            id,
            version,
            inserted: version == 1,
        };
        debug!(%key, id, version, inserted = outcome.inserted, "upserted chapter");
        Ok(outcome)
    }

    pub fn get_chapter(&self, key: &ChapterKey) -> Result<Option<Chapter>> {
        let sql = format!(
            "SELECT {} FROM chapter_content WHERE subject = ?1 AND class_level = ?2 AND chapter_number = ?3",
            CHAPTER_COLUMNS
        );

        let chapter = self.conn.query_row(
            &sql,
            params![key.subject, key.class_level, key.chapter_number],
            row_to_chapter,
        );

        match chapter {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Full chapter records for a subject, matched case-insensitively.
    pub fn chapters_for_subject(&self, subject: &str) -> Result<Vec<Chapter>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM chapter_content
            WHERE lower(subject) = lower(?1)
            ORDER BY class_level, chapter_number
            "#,
            CHAPTER_COLUMNS
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![subject], row_to_chapter)?;
        let chapters = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(chapters)
    }

    pub fn list_chapters(
        &self,
        subject: Option<&str>,
        class_level: Option<&str>,
    ) -> Result<Vec<ChapterSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, subject, class_level, chapter_number, chapter_title, status,
                   difficulty_level, estimated_study_minutes, version, updated_at
            FROM chapter_content
            WHERE (?1 IS NULL OR lower(subject) = lower(?1))
              AND (?2 IS NULL OR class_level = ?2)
            ORDER BY subject, class_level, chapter_number
            "#,
        )?;

        let rows = stmt.query_map(params![subject, class_level], |row| {
            let status: String = row.get(5)?;
            Ok(ChapterSummary {
                id: row.get(0)?,
                key: ChapterKey {
                    subject: row.get(1)?,
                    class_level: row.get(2)?,
                    chapter_number: row.get(3)?,
                },
                chapter_title: row.get(4)?,
                status: ChapterStatus::from_str(&status).unwrap_or_default(),
                difficulty_level: row.get(6)?,
                estimated_study_minutes: row.get(7)?,
                version: row.get(8)?,
                updated_at: row.get(9)?,
            })
        })?;
        let chapters = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(chapters)
    }

    /// Case-insensitive substring search over chapter titles and topic names.
    pub fn search(&self, pattern: &str) -> Result<Vec<SearchHit>> {
        let like = format!("%{}%", escape_like(pattern));

        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, subject, class_level, chapter_title
            FROM chapter_content
            WHERE chapter_title LIKE ?1 ESCAPE '\'
            ORDER BY subject, class_level, chapter_number
            "#,
        )?;
        let rows = stmt.query_map(params![like], |row| {
            Ok(SearchHit {
                kind: "chapter",
                id: row.get(0)?,
                subject: row.get(1)?,
                class_level: row.get(2)?,
                label: row.get(3)?,
            })
        })?;
        let mut hits = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, subject, class_level, topic_name
            FROM content_topics
            WHERE topic_name LIKE ?1 ESCAPE '\'
            ORDER BY subject, class_level, topic_name
            "#,
        )?;
        let rows = stmt.query_map(params![like], |row| {
            Ok(SearchHit {
                kind: "topic",
                id: row.get(0)?,
                subject: row.get(1)?,
                class_level: row.get(2)?,
                label: row.get(3)?,
            })
        })?;
        hits.extend(rows.collect::<rusqlite::Result<Vec<_>>>()?);

        Ok(hits)
    }

    /// Published chapters whose `visualizations` array is empty.
    pub fn published_chapters_without_visualizations(&self) -> Result<Vec<Chapter>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM chapter_content
            WHERE status = 'published' AND visualizations = '[]'
            ORDER BY subject, class_level, chapter_number
            "#,
            CHAPTER_COLUMNS
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], row_to_chapter)?;
        let chapters = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(chapters)
    }

    /// Replaces a chapter's visualizations and bumps its version. Returns
    /// false when no row has that id.
    pub fn set_visualizations(&self, id: i64, visualizations: &[Visualization]) -> Result<bool> {
        let updated = self.conn.execute(
            r#"
            UPDATE chapter_content
            SET visualizations = ?1, updated_at = ?2, version = version + 1
            WHERE id = ?3
            "#,
            params![serde_json::to_string(visualizations)?, Utc::now().to_rfc3339(), id],
        )?;
        Ok(updated > 0)
    }

    // Topic and question operations

    /// Returns the id of the topic, creating it first if needed.
    pub fn ensure_topic(
        &self,
        subject: &str,
        class_level: &str,
        topic_name: &str,
        ncert_chapter: Option<&str>,
        reference_books: &[String],
    ) -> Result<i64> {
        let created = self.conn.execute(
            r#"
            INSERT INTO content_topics (subject, class_level, topic_name, ncert_chapter, reference_books)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (subject, class_level, topic_name) DO NOTHING
            "#,
            params![
                subject,
                class_level,
                topic_name,
                ncert_chapter,
                serde_json::to_string(reference_books)?
            ],
        )?;

        let id: i64 = self.conn.query_row(
            "SELECT id FROM content_topics WHERE subject = ?1 AND class_level = ?2 AND topic_name = ?3",
            params![subject, class_level, topic_name],
            |row| row.get(0),
        )?;

        if created > 0 {
            debug!(id, subject, class_level, topic_name, "created topic");
        }
        Ok(id)
    }

    pub fn get_topic(&self, id: i64) -> Result<Option<ContentTopic>> {
        let topic = self
            .conn
            .query_row(
                r#"
                SELECT id, subject, class_level, topic_name, ncert_chapter, reference_books
                FROM content_topics
                WHERE id = ?1
                "#,
                params![id],
                |row| {
                    Ok(ContentTopic {
                        id: row.get(0)?,
                        subject: row.get(1)?,
                        class_level: row.get(2)?,
                        topic_name: row.get(3)?,
                        ncert_chapter: row.get(4)?,
                        reference_books: json_column(row, 5)?,
                    })
                },
            )
            .optional()?;

        Ok(topic)
    }

    pub fn count_questions(&self, topic_id: i64) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM questions WHERE topic_id = ?1",
            params![topic_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Inserts all questions for a topic in one transaction.
    pub fn insert_questions(&self, topic_id: i64, questions: &[NewQuestion]) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;

        for q in questions {
            tx.execute(
                r#"
                INSERT INTO questions (topic_id, question_text, options, correct_answer, solution_detail,
                                       solution_steps, difficulty_level, source_type, related_topics, pyq_year)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
                params![
                    topic_id,
                    q.question_text,
                    serde_json::to_string(&q.options)?,
                    q.correct_answer,
                    q.solution_detail,
                    serde_json::to_string(&q.solution_steps)?,
                    q.difficulty_level,
                    q.source_type,
                    serde_json::to_string(&q.related_topics)?,
                    q.pyq_year,
                ],
            )?;
        }

        tx.commit()?;
        Ok(questions.len())
    }

    // Diagnostics

    pub fn table_counts(&self) -> Result<Vec<(&'static str, i64)>> {
        TABLES
            .iter()
            .map(|table| -> Result<(&'static str, i64)> {
                let count: i64 = self.conn.query_row(
                    &format!("SELECT COUNT(*) FROM {}", table),
                    [],
                    |row| row.get(0),
                )?;
                Ok((*table, count))
            })
            .collect()
    }

    pub fn chapter_status_counts(&self) -> Result<Vec<StatusCount>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT subject, status, COUNT(*)
            FROM chapter_content
            GROUP BY subject, status
            ORDER BY subject, status
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            let status: String = row.get(1)?;
            Ok(StatusCount {
                subject: row.get(0)?,
                status: ChapterStatus::from_str(&status).unwrap_or_default(),
                count: row.get(2)?,
            })
        })?;
        let counts = rows.collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(counts)
    }
}

fn upsert_chapter_sql(fields: &UpdateFields) -> String {
    let mut assignments: Vec<String> = fields
        .iter()
        .map(|f| format!("{0} = excluded.{0}", f.column()))
        .collect();
    assignments.push("updated_at = excluded.updated_at".to_string());
    assignments.push("version = chapter_content.version + 1".to_string());

    format!(
        r#"
        INSERT INTO chapter_content (
            subject, class_level, chapter_number, chapter_title, introduction, detailed_notes,
            key_concepts, important_formulas, formulas, learning_objectives, prerequisites,
            important_topics, mnemonics, visualizations, ncert_chapter_ref, difficulty_level,
            estimated_study_minutes, status, created_at, updated_at
        )
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?19)
        ON CONFLICT ({}) DO UPDATE SET {}
        RETURNING id, version
        "#,
        CHAPTER_NATURAL_KEY.join(", "),
        assignments.join(", ")
    )
}

fn row_to_chapter(row: &Row) -> rusqlite::Result<Chapter> {
    let status: String = row.get(18)?;
    Ok(Chapter {
        id: row.get(0)?,
        content: ChapterInput {
            key: ChapterKey {
                subject: row.get(1)?,
                class_level: row.get(2)?,
                chapter_number: row.get(3)?,
            },
            chapter_title: row.get(4)?,
            introduction: row.get(5)?,
            detailed_notes: row.get(6)?,
            key_concepts: json_column(row, 7)?,
            important_formulas: json_column(row, 8)?,
            formulas: json_column(row, 9)?,
            learning_objectives: json_column(row, 10)?,
            prerequisites: json_column(row, 11)?,
            important_topics: json_column(row, 12)?,
            mnemonics: json_column(row, 13)?,
            visualizations: json_column(row, 14)?,
            ncert_chapter_ref: row.get(15)?,
            difficulty_level: row.get(16)?,
            estimated_study_minutes: row.get(17)?,
            status: ChapterStatus::from_str(&status).unwrap_or_default(),
        },
        version: row.get(19)?,
        created_at: row.get(20)?,
        updated_at: row.get(21)?,
    })
}

fn json_column<T: DeserializeOwned>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn escape_like(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
