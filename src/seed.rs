use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::db::Database;
use crate::error::{Result, SeedError};
use crate::models::{ChapterInput, ChapterKey, UpdateField, UpdateFields, UpsertOutcome};

/// An embedded content file and the columns it overwrites when its chapter
/// already exists.
pub struct Seeder {
    pub name: &'static str,
    source: &'static str,
    update: &'static [UpdateField],
}

// Seeder catalog

const TRANSPORT_IN_PLANTS_FIELDS: &[UpdateField] = &[
    UpdateField::ChapterTitle,
    UpdateField::Introduction,
    UpdateField::DetailedNotes,
    UpdateField::KeyConcepts,
    UpdateField::Formulas,
    UpdateField::LearningObjectives,
    UpdateField::Prerequisites,
    UpdateField::ImportantTopics,
    UpdateField::NcertChapterRef,
    UpdateField::EstimatedStudyMinutes,
    UpdateField::DifficultyLevel,
    UpdateField::Status,
    UpdateField::Visualizations,
];

// Revisions of this chapter only ever retune its metadata.
const RESPIRATION_IN_PLANTS_FIELDS: &[UpdateField] = &[
    UpdateField::ChapterTitle,
    UpdateField::EstimatedStudyMinutes,
    UpdateField::DifficultyLevel,
    UpdateField::Status,
];

pub const CATALOG: &[Seeder] = &[
    Seeder {
        name: "biology-11-ch11-transport-in-plants",
        source: include_str!("../content/biology-11-ch11-transport-in-plants.json"),
        update: TRANSPORT_IN_PLANTS_FIELDS,
    },
    Seeder {
        name: "biology-11-ch14-respiration-in-plants",
        source: include_str!("../content/biology-11-ch14-respiration-in-plants.json"),
        update: RESPIRATION_IN_PLANTS_FIELDS,
    },
    Seeder {
        name: "chemistry-11-ch9-hydrogen",
        source: include_str!("../content/chemistry-11-ch9-hydrogen.json"),
        update: &UpdateField::ALL,
    },
];

impl Seeder {
    pub fn fields(&self) -> UpdateFields {
        UpdateFields::only(self.update.iter().copied())
    }

    pub fn chapter(&self) -> Result<ChapterInput> {
        parse_chapter(self.source, self.name)
    }

    pub fn run(&self, db: &Database) -> Result<SeedReport> {
        info!(seeder = self.name, "seeding chapter");
        let input = self.chapter()?;
        let outcome = seed_chapter(db, &input, &self.fields())?;
        Ok(SeedReport::new(self.name, input.key, outcome))
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedReport {
    pub seeder: String,
    pub key: ChapterKey,
    #[serde(flatten)]
    pub outcome: UpsertOutcome,
}

impl SeedReport {
    fn new(seeder: impl Into<String>, key: ChapterKey, outcome: UpsertOutcome) -> Self {
        Self {
            seeder: seeder.into(),
            key,
            outcome,
        }
    }
}

// Running seeders

pub fn find(name: &str) -> Result<&'static Seeder> {
    CATALOG
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| SeedError::UnknownSeeder(name.to_string()))
}

/// Looks up every name before anything runs, so a typo cannot leave a batch
/// half applied.
pub fn resolve(names: &[String]) -> Result<Vec<&'static Seeder>> {
    names.iter().map(|name| find(name)).collect()
}

/// Upserts one chapter and logs the outcome.
pub fn seed_chapter(db: &Database, input: &ChapterInput, fields: &UpdateFields) -> Result<UpsertOutcome> {
    let outcome = db.upsert_chapter(input, fields)?;
    info!(
        key = %input.key,
        id = outcome.id,
        version = outcome.version,
        action = if outcome.inserted { "inserted" } else { "updated" },
        "seeded {}",
        input.chapter_title
    );
    Ok(outcome)
}

/// Runs seeders in order and stops at the first failure. Chapters written
/// before the failure stay written.
pub fn run_batch(db: &Database, seeders: &[&Seeder]) -> Result<Vec<SeedReport>> {
    let mut reports = Vec::with_capacity(seeders.len());
    for seeder in seeders {
        reports.push(seeder.run(db)?);
    }

    let inserted = reports.iter().filter(|r| r.outcome.inserted).count();
    info!(
        total = reports.len(),
        inserted,
        updated = reports.len() - inserted,
        "seeding completed"
    );
    Ok(reports)
}

/// Upserts a chapter authored outside the built-in catalog.
pub fn seed_file(db: &Database, path: &Path, fields: &UpdateFields) -> Result<SeedReport> {
    info!(path = %path.display(), %fields, "seeding chapter file");
    let raw = fs::read_to_string(path)?;
    let input = parse_chapter(&raw, &path.display().to_string())?;
    let outcome = seed_chapter(db, &input, fields)?;
    Ok(SeedReport::new(path.display().to_string(), input.key, outcome))
}

fn parse_chapter(raw: &str, origin: &str) -> Result<ChapterInput> {
    serde_json::from_str(raw).map_err(|e| SeedError::InvalidContent(format!("{}: {}", origin, e)))
}
