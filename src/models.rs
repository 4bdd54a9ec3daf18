use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a chapter, independent of its surrogate row id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterKey {
    pub subject: String,
    pub class_level: String,
    pub chapter_number: i32,
}

impl ChapterKey {
    pub fn new(subject: impl Into<String>, class_level: impl Into<String>, chapter_number: i32) -> Self {
        Self {
            subject: subject.into(),
            class_level: class_level.into(),
            chapter_number,
        }
    }
}

impl fmt::Display for ChapterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} class {} chapter {}",
            self.subject, self.class_level, self.chapter_number
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterStatus {
    #[default]
    Draft,
    InReview,
    Published,
    Archived,
}

impl ChapterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChapterStatus::Draft => "draft",
            ChapterStatus::InReview => "in_review",
            ChapterStatus::Published => "published",
            ChapterStatus::Archived => "archived",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "draft" => Some(ChapterStatus::Draft),
            "in_review" | "in-review" | "review" => Some(ChapterStatus::InReview),
            "published" => Some(ChapterStatus::Published),
            "archived" => Some(ChapterStatus::Archived),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ChapterStatus::Draft => "Draft",
            ChapterStatus::InReview => "In Review",
            ChapterStatus::Published => "Published",
            ChapterStatus::Archived => "Archived",
        }
    }
}

/// Older content files list key concepts as bare strings such as
/// `"Cohesion: H-bonding between water molecules"`; those are split on the
/// first colon into title and description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawKeyConcept")]
pub struct KeyConcept {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawKeyConcept {
    Full {
        title: String,
        description: String,
        #[serde(default)]
        formula: Option<String>,
    },
    Plain(String),
}

impl From<RawKeyConcept> for KeyConcept {
    fn from(raw: RawKeyConcept) -> Self {
        match raw {
            RawKeyConcept::Full {
                title,
                description,
                formula,
            } => KeyConcept {
                title,
                description,
                formula,
            },
            RawKeyConcept::Plain(text) => {
                let (title, description) = match text.split_once(':') {
                    Some((title, rest)) => (title.trim().to_string(), rest.trim().to_string()),
                    None => (text.trim().to_string(), String::new()),
                };
                KeyConcept {
                    title,
                    description,
                    formula: None,
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportantFormula {
    pub name: String,
    pub formula: String,
    pub variables: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mnemonic {
    pub topic: String,
    pub mnemonic: String,
}

/// Descriptor for a diagram or simulation the client renders next to the notes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visualization {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Value>,
}

fn default_difficulty() -> i32 {
    3
}

fn default_study_minutes() -> i32 {
    180
}

/// A complete chapter record as authored by a seeder. JSON-array fields
/// default to empty when absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterInput {
    #[serde(flatten)]
    pub key: ChapterKey,
    pub chapter_title: String,
    pub introduction: String,
    pub detailed_notes: String,
    #[serde(default)]
    pub key_concepts: Vec<KeyConcept>,
    #[serde(default)]
    pub important_formulas: Vec<ImportantFormula>,
    #[serde(default)]
    pub formulas: Vec<String>,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    #[serde(default)]
    pub important_topics: Vec<String>,
    #[serde(default)]
    pub mnemonics: Vec<Mnemonic>,
    #[serde(default)]
    pub visualizations: Vec<Visualization>,
    #[serde(default)]
    pub ncert_chapter_ref: Option<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty_level: i32,
    #[serde(default = "default_study_minutes")]
    pub estimated_study_minutes: i32,
    #[serde(default)]
    pub status: ChapterStatus,
}

impl ChapterInput {
    pub fn new(
        key: ChapterKey,
        chapter_title: impl Into<String>,
        introduction: impl Into<String>,
        detailed_notes: impl Into<String>,
    ) -> Self {
        Self {
            key,
            chapter_title: chapter_title.into(),
            introduction: introduction.into(),
            detailed_notes: detailed_notes.into(),
            key_concepts: vec![],
            important_formulas: vec![],
            formulas: vec![],
            learning_objectives: vec![],
            prerequisites: vec![],
            important_topics: vec![],
            mnemonics: vec![],
            visualizations: vec![],
            ncert_chapter_ref: None,
            difficulty_level: default_difficulty(),
            estimated_study_minutes: default_study_minutes(),
            status: ChapterStatus::default(),
        }
    }
}

/// A stored chapter row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: i64,
    #[serde(flatten)]
    pub content: ChapterInput,
    pub version: i32,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterSummary {
    pub id: i64,
    #[serde(flatten)]
    pub key: ChapterKey,
    pub chapter_title: String,
    pub status: ChapterStatus,
    pub difficulty_level: i32,
    pub estimated_study_minutes: i32,
    pub version: i32,
    pub updated_at: String,
}

/// A column the upsert may overwrite when the natural key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateField {
    ChapterTitle,
    Introduction,
    DetailedNotes,
    KeyConcepts,
    ImportantFormulas,
    Formulas,
    LearningObjectives,
    Prerequisites,
    ImportantTopics,
    Mnemonics,
    Visualizations,
    NcertChapterRef,
    DifficultyLevel,
    EstimatedStudyMinutes,
    Status,
}

impl UpdateField {
    pub const ALL: [UpdateField; 15] = [
        UpdateField::ChapterTitle,
        UpdateField::Introduction,
        UpdateField::DetailedNotes,
        UpdateField::KeyConcepts,
        UpdateField::ImportantFormulas,
        UpdateField::Formulas,
        UpdateField::LearningObjectives,
        UpdateField::Prerequisites,
        UpdateField::ImportantTopics,
        UpdateField::Mnemonics,
        UpdateField::Visualizations,
        UpdateField::NcertChapterRef,
        UpdateField::DifficultyLevel,
        UpdateField::EstimatedStudyMinutes,
        UpdateField::Status,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            UpdateField::ChapterTitle => "chapter_title",
            UpdateField::Introduction => "introduction",
            UpdateField::DetailedNotes => "detailed_notes",
            UpdateField::KeyConcepts => "key_concepts",
            UpdateField::ImportantFormulas => "important_formulas",
            UpdateField::Formulas => "formulas",
            UpdateField::LearningObjectives => "learning_objectives",
            UpdateField::Prerequisites => "prerequisites",
            UpdateField::ImportantTopics => "important_topics",
            UpdateField::Mnemonics => "mnemonics",
            UpdateField::Visualizations => "visualizations",
            UpdateField::NcertChapterRef => "ncert_chapter_ref",
            UpdateField::DifficultyLevel => "difficulty_level",
            UpdateField::EstimatedStudyMinutes => "estimated_study_minutes",
            UpdateField::Status => "status",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        match normalized.as_str() {
            "title" | "chapter_title" => Some(UpdateField::ChapterTitle),
            "introduction" | "intro" => Some(UpdateField::Introduction),
            "detailed_notes" | "notes" => Some(UpdateField::DetailedNotes),
            "key_concepts" => Some(UpdateField::KeyConcepts),
            "important_formulas" => Some(UpdateField::ImportantFormulas),
            "formulas" => Some(UpdateField::Formulas),
            "learning_objectives" | "objectives" => Some(UpdateField::LearningObjectives),
            "prerequisites" => Some(UpdateField::Prerequisites),
            "important_topics" => Some(UpdateField::ImportantTopics),
            "mnemonics" => Some(UpdateField::Mnemonics),
            "visualizations" => Some(UpdateField::Visualizations),
            "ncert_chapter_ref" | "ncert" => Some(UpdateField::NcertChapterRef),
            "difficulty_level" | "difficulty" => Some(UpdateField::DifficultyLevel),
            "estimated_study_minutes" | "minutes" => Some(UpdateField::EstimatedStudyMinutes),
            "status" => Some(UpdateField::Status),
            _ => None,
        }
    }
}

/// The set of columns a seeder overwrites on conflict. `updated_at` and
/// `version` are always touched and are not part of the set.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateFields(BTreeSet<UpdateField>);

impl UpdateFields {
    pub fn all() -> Self {
        Self(UpdateField::ALL.into_iter().collect())
    }

    /// Title, body text, difficulty, study time and status.
    pub fn standard() -> Self {
        Self::only([
            UpdateField::ChapterTitle,
            UpdateField::Introduction,
            UpdateField::DetailedNotes,
            UpdateField::DifficultyLevel,
            UpdateField::EstimatedStudyMinutes,
            UpdateField::Status,
        ])
    }

    pub fn only(fields: impl IntoIterator<Item = UpdateField>) -> Self {
        Self(fields.into_iter().collect())
    }

    /// Parses a comma-separated list such as `title,status,difficulty`.
    pub fn parse(list: &str) -> Result<Self, String> {
        match list.trim().to_lowercase().as_str() {
            "all" => return Ok(Self::all()),
            "standard" => return Ok(Self::standard()),
            _ => {}
        }

        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| UpdateField::from_str(s).ok_or_else(|| format!("unknown field '{}'", s)))
            .collect::<Result<BTreeSet<_>, _>>()
            .map(Self)
    }

    pub fn contains(&self, field: UpdateField) -> bool {
        self.0.contains(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = UpdateField> + '_ {
        self.0.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn columns(&self) -> Vec<&'static str> {
        self.iter().map(|f| f.column()).collect()
    }
}

impl fmt::Display for UpdateFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "-");
        }
        write!(f, "{}", self.columns().join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertOutcome {
    pub id: i64,
    pub version: i32,
    pub inserted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentTopic {
    pub id: i64,
    pub subject: String,
    pub class_level: String,
    pub topic_name: String,
    pub ncert_chapter: Option<String>,
    pub reference_books: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOption {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuestion {
    pub question_text: String,
    pub options: Vec<QuestionOption>,
    pub correct_answer: String,
    pub solution_detail: String,
    pub solution_steps: Vec<String>,
    pub difficulty_level: i32,
    pub source_type: String,
    pub related_topics: Vec<String>,
    pub pyq_year: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub kind: &'static str,
    pub id: i64,
    pub subject: String,
    pub class_level: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub subject: String,
    pub status: ChapterStatus,
    pub count: i64,
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
