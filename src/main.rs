mod db;
mod error;
mod models;
mod questions;
mod seed;
mod visualize;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use db::Database;
use error::SeedError;
use models::{ChapterKey, JsonOutput, UpdateFields};

const DEFAULT_DB_NAME: &str = "syllabus.db";
const DB_ENV: &str = "SYLLABUS_DB";
const LOG_ENV: &str = "SYLLABUS_LOG";

#[derive(Parser)]
#[command(name = "syllabus")]
#[command(about = "Seed and inspect NEET chapter content")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Database file (overrides SYLLABUS_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or migrate the schema
    Init,

    /// Upsert chapter content
    Seed {
        /// Built-in seeders to run, in order
        names: Vec<String>,

        /// Run every built-in seeder
        #[arg(long, conflicts_with_all = ["names", "file"])]
        all: bool,

        /// Seed a chapter from a JSON file
        #[arg(long, short, conflicts_with = "names")]
        file: Option<PathBuf>,

        /// Columns to overwrite when the chapter exists: "all", "standard" or a comma-separated list
        #[arg(long, requires = "file")]
        fields: Option<String>,
    },

    /// List built-in seeders
    Seeders,

    /// Ensure every chapter of a subject has a topic and enough questions
    Questions {
        /// Subject to top up
        #[arg(long, short, default_value = "Biology")]
        subject: String,

        /// Minimum questions per chapter topic
        #[arg(long, default_value_t = questions::MIN_QUESTIONS_PER_TOPIC)]
        min: usize,
    },

    /// Add visualizations to published chapters that have none
    Visualize,

    /// Show row counts for every table
    Check,

    /// List chapters
    Chapters {
        /// Filter by subject
        #[arg(long, short)]
        subject: Option<String>,

        /// Filter by class level
        #[arg(long, short)]
        class: Option<String>,
    },

    /// Search chapter titles and topic names
    Find {
        /// Case-insensitive substring
        pattern: String,
    },

    /// Show one chapter
    Show {
        subject: String,
        class: String,
        chapter: i32,
    },
}

fn get_db_path(flag: Option<PathBuf>) -> PathBuf {
    if let Some(path) = flag {
        return path;
    }

    if let Ok(path) = std::env::var(DB_ENV) {
        return PathBuf::from(path);
    }

    let data_dir = dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("syllabus");

    std::fs::create_dir_all(&data_dir).ok();
    data_dir.join(DEFAULT_DB_NAME)
}

fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    init_logging();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let db_path = get_db_path(cli.db);

    match cli.command {
        Commands::Init => {
            open_for_write(&db_path)?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::<()>::ok(()))?);
            } else {
                println!("Database initialized at: {}", db_path.display());
            }
        }

        Commands::Seed {
            names,
            all,
            file,
            fields,
        } => {
            if fields.is_some() && file.is_none() {
                return Err(
                    "--fields only applies to --file; built-in seeders use their own field sets".into(),
                );
            }

            let db = open_for_write(&db_path)?;

            let reports = if let Some(path) = file {
                let fields = match fields {
                    Some(list) => UpdateFields::parse(&list)?,
                    None => UpdateFields::standard(),
                };
                vec![seed::seed_file(&db, &path, &fields)?]
            } else if all {
                let seeders: Vec<_> = seed::CATALOG.iter().collect();
                seed::run_batch(&db, &seeders)?
            } else if !names.is_empty() {
                let seeders = seed::resolve(&names)?;
                seed::run_batch(&db, &seeders)?
            } else {
                return Err("nothing to seed: pass seeder names, --all or --file".into());
            };

            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&reports))?);
            } else {
                for report in &reports {
                    println!(
                        "{} {} (id {}, version {})",
                        if report.outcome.inserted { "Inserted" } else { "Updated" },
                        report.key,
                        report.outcome.id,
                        report.outcome.version
                    );
                }
            }
        }

        Commands::Seeders => {
            if cli.json {
                let list: Vec<_> = seed::CATALOG
                    .iter()
                    .map(|s| {
                        serde_json::json!({
                            "name": s.name,
                            "fields": s.fields().columns(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string(&JsonOutput::ok(list))?);
            } else {
                println!("{:<40} OVERWRITES", "NAME");
                println!("{}", "-".repeat(80));
                for seeder in seed::CATALOG {
                    println!("{:<40} {}", seeder.name, seeder.fields());
                }
            }
        }

        Commands::Questions { subject, min } => {
            let db = open_for_write(&db_path)?;
            let report = questions::top_up_questions(&db, &subject, min)?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&report))?);
            } else {
                println!(
                    "{} chapters checked, {} already complete, {} questions inserted.",
                    report.chapters, report.chapters_skipped, report.questions_inserted
                );
            }
        }

        Commands::Visualize => {
            let db = open_for_write(&db_path)?;
            let report = visualize::enhance_visualizations(&db)?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&report))?);
            } else {
                println!(
                    "{} published chapters missing visualizations, {} enhanced, {} failed.",
                    report.missing, report.enhanced, report.failed
                );
            }
        }

        Commands::Check => {
            let db = open_for_read(&db_path)?;
            let counts = db.table_counts()?;
            let by_status = db.chapter_status_counts()?;
            if cli.json {
                let tables: serde_json::Map<String, serde_json::Value> = counts
                    .iter()
                    .map(|(table, count)| (table.to_string(), (*count).into()))
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string(&JsonOutput::ok(serde_json::json!({
                        "tables": tables,
                        "chapters": by_status,
                    })))?
                );
            } else {
                println!("=== Database: {} ===", db_path.display());
                for (table, count) in &counts {
                    println!("{:<20} {}", table, count);
                }
                if !by_status.is_empty() {
                    println!();
                    println!("{:<15} {:<12} CHAPTERS", "SUBJECT", "STATUS");
                    println!("{}", "-".repeat(40));
                    for row in &by_status {
                        println!("{:<15} {:<12} {}", row.subject, row.status.label(), row.count);
                    }
                }
            }
        }

        Commands::Chapters { subject, class } => {
            let db = open_for_read(&db_path)?;
            let chapters = db.list_chapters(subject.as_deref(), class.as_deref())?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&chapters))?);
            } else if chapters.is_empty() {
                println!("No chapters found.");
            } else {
                println!(
                    "{:<5} {:<12} {:<6} {:<4} {:<40} STATUS",
                    "ID", "SUBJECT", "CLASS", "CH", "TITLE"
                );
                println!("{}", "-".repeat(85));
                for c in chapters {
                    println!(
                        "{:<5} {:<12} {:<6} {:<4} {:<40} {}",
                        c.id,
                        truncate(&c.key.subject, 12),
                        c.key.class_level,
                        c.key.chapter_number,
                        truncate(&c.chapter_title, 38),
                        c.status.label()
                    );
                }
            }
        }

        Commands::Find { pattern } => {
            let db = open_for_read(&db_path)?;
            let hits = db.search(&pattern)?;
            if cli.json {
                println!("{}", serde_json::to_string(&JsonOutput::ok(&hits))?);
            } else if hits.is_empty() {
                println!("Nothing matches '{}'.", pattern);
            } else {
                for hit in hits {
                    println!(
                        "{:<8} {:<5} {} {}: {}",
                        hit.kind, hit.id, hit.subject, hit.class_level, hit.label
                    );
                }
            }
        }

        Commands::Show {
            subject,
            class,
            chapter,
        } => {
            let db = open_for_read(&db_path)?;
            let key = ChapterKey::new(subject, class, chapter);
            print_chapter(&db, &key, cli.json)?;
        }
    }

    Ok(())
}

// Write commands create or migrate the schema first.
fn open_for_write(path: &Path) -> Result<Database, Box<dyn std::error::Error>> {
    let db = Database::open(path)?;
    db.init()?;
    Ok(db)
}

// Read-only commands never create the file or the schema.
fn open_for_read(path: &Path) -> Result<Database, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(SeedError::NotInitialized.into());
    }
    let db = Database::open(path)?;
    db.ensure_initialized()?;
    Ok(db)
}

fn print_chapter(db: &Database, key: &ChapterKey, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let Some(chapter) = db.get_chapter(key)? else {
        if json {
            println!(
                "{}",
                serde_json::to_string(&JsonOutput::<()>::err("Chapter not found"))?
            );
        } else {
            println!("Chapter not found.");
        }
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string(&JsonOutput::ok(&chapter))?);
        return Ok(());
    }

    let c = &chapter.content;
    println!("{}", c.chapter_title);
    println!("{} (ID: {}, version {})", c.key, chapter.id, chapter.version);
    println!("Status: {}", c.status.label());
    println!(
        "Difficulty: {}/5, about {} minutes",
        c.difficulty_level, c.estimated_study_minutes
    );
    if let Some(reference) = &c.ncert_chapter_ref {
        println!("NCERT: {}", reference);
    }
    println!("Updated: {}", chapter.updated_at);
    println!();
    println!("{}", c.introduction);

    if !c.key_concepts.is_empty() {
        println!();
        println!("--- Key concepts ---");
        for concept in &c.key_concepts {
            if concept.description.is_empty() {
                println!("- {}", concept.title);
            } else {
                println!("- {}: {}", concept.title, concept.description);
            }
        }
    }

    if !c.formulas.is_empty() {
        println!();
        println!("--- Formulas ---");
        for formula in &c.formulas {
            println!("- {}", formula);
        }
    }

    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    mod truncate_tests {
        use super::*;

        #[test]
        fn truncate_short_string() {
            assert_eq!(truncate("hello", 10), "hello");
        }

        #[test]
        fn truncate_exact_length() {
            assert_eq!(truncate("hello", 5), "hello");
        }

        #[test]
        fn truncate_long_string() {
            assert_eq!(truncate("hello world", 8), "hello...");
        }

        #[test]
        fn truncate_counts_characters_not_bytes() {
            assert_eq!(truncate("Ψw = Ψs + Ψp", 7), "Ψw =...");
        }
    }

    mod cli_parsing_tests {
        use super::*;

        #[test]
        fn parse_init_command() {
            let cli = Cli::try_parse_from(["syllabus", "init"]).unwrap();
            assert!(!cli.json);
            assert!(cli.db.is_none());
            assert!(matches!(cli.command, Commands::Init));
        }

        #[test]
        fn parse_global_flags() {
            let cli =
                Cli::try_parse_from(["syllabus", "check", "--json", "--db", "/tmp/x.db"]).unwrap();
            assert!(cli.json);
            assert_eq!(cli.db, Some(PathBuf::from("/tmp/x.db")));
            assert!(matches!(cli.command, Commands::Check));
        }

        #[test]
        fn parse_seed_names() {
            let cli = Cli::try_parse_from([
                "syllabus",
                "seed",
                "biology-11-ch11-transport-in-plants",
                "chemistry-11-ch9-hydrogen",
            ])
            .unwrap();
            match cli.command {
                Commands::Seed { names, all, file, fields } => {
                    assert_eq!(names.len(), 2);
                    assert!(!all);
                    assert!(file.is_none());
                    assert!(fields.is_none());
                }
                _ => panic!("Expected Seed command"),
            }
        }

        #[test]
        fn parse_seed_file_with_fields() {
            let cli = Cli::try_parse_from([
                "syllabus",
                "seed",
                "--file",
                "chapter.json",
                "--fields",
                "title,status",
            ])
            .unwrap();
            match cli.command {
                Commands::Seed { file, fields, .. } => {
                    assert_eq!(file, Some(PathBuf::from("chapter.json")));
                    assert_eq!(fields, Some("title,status".to_string()));
                }
                _ => panic!("Expected Seed command"),
            }
        }

        #[test]
        fn seed_all_conflicts_with_names() {
            let result = Cli::try_parse_from(["syllabus", "seed", "--all", "chemistry-11-ch9-hydrogen"]);
            assert!(result.is_err());
        }

        #[test]
        fn parse_questions_defaults() {
            let cli = Cli::try_parse_from(["syllabus", "questions"]).unwrap();
            match cli.command {
                Commands::Questions { subject, min } => {
                    assert_eq!(subject, "Biology");
                    assert_eq!(min, questions::MIN_QUESTIONS_PER_TOPIC);
                }
                _ => panic!("Expected Questions command"),
            }
        }

        #[test]
        fn parse_chapters_filters() {
            let cli = Cli::try_parse_from(["syllabus", "chapters", "-s", "Biology", "-c", "12"]).unwrap();
            match cli.command {
                Commands::Chapters { subject, class } => {
                    assert_eq!(subject, Some("Biology".to_string()));
                    assert_eq!(class, Some("12".to_string()));
                }
                _ => panic!("Expected Chapters command"),
            }
        }

        #[test]
        fn parse_show() {
            let cli = Cli::try_parse_from(["syllabus", "show", "Biology", "11", "11"]).unwrap();
            match cli.command {
                Commands::Show { subject, class, chapter } => {
                    assert_eq!(subject, "Biology");
                    assert_eq!(class, "11");
                    assert_eq!(chapter, 11);
                }
                _ => panic!("Expected Show command"),
            }
        }

        #[test]
        fn parse_missing_required_arg_fails() {
            assert!(Cli::try_parse_from(["syllabus", "find"]).is_err());
            assert!(Cli::try_parse_from(["syllabus", "show", "Biology", "11"]).is_err());
            assert!(Cli::try_parse_from(["syllabus", "show", "Biology", "11", "eleven"]).is_err());
        }
    }

    mod db_path_tests {
        use super::*;
        use std::env;
        use std::path::Path;

        // One test so the env var is not raced by parallel tests.
        #[test]
        fn flag_then_env_then_default() {
            env::set_var(DB_ENV, "/tmp/from_env.db");
            let path = get_db_path(Some(PathBuf::from("/tmp/from_flag.db")));
            assert_eq!(path, PathBuf::from("/tmp/from_flag.db"));
            assert_eq!(get_db_path(None), PathBuf::from("/tmp/from_env.db"));

            env::remove_var(DB_ENV);
            let path = get_db_path(None);
            assert!(path.ends_with(Path::new("syllabus").join(DEFAULT_DB_NAME)));
        }
    }

    mod run_tests {
        use super::*;
        use std::path::Path;

        fn cli(db: &Path, args: &[&str]) -> Cli {
            let mut argv = vec!["syllabus", "--json", "--db", db.to_str().unwrap()];
            argv.extend_from_slice(args);
            Cli::try_parse_from(argv).unwrap()
        }

        #[test]
        fn seed_twice_then_inspect() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("content.db");

            run(cli(&path, &["seed", "--all"])).unwrap();
            run(cli(&path, &["seed", "chemistry-11-ch9-hydrogen"])).unwrap();
            run(cli(&path, &["questions", "--subject", "Biology"])).unwrap();
            run(cli(&path, &["check"])).unwrap();
            run(cli(&path, &["show", "Chemistry", "11", "9"])).unwrap();

            let db = Database::open(&path).unwrap();
            assert_eq!(db.list_chapters(None, None).unwrap().len(), seed::CATALOG.len());
            let hydrogen = db.get_chapter(&ChapterKey::new("Chemistry", "11", 9)).unwrap().unwrap();
            assert_eq!(hydrogen.version, 2);
        }

        #[test]
        fn seed_without_target_fails() {
            let dir = tempfile::tempdir().unwrap();
            let result = run(cli(&dir.path().join("content.db"), &["seed"]));
            assert!(result.is_err());
        }

        #[test]
        fn unknown_seeder_fails_without_writing() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("content.db");

            let result = run(cli(&path, &["seed", "chemistry-11-ch9-hydrogen", "no-such-seeder"]));
            assert!(result.is_err());

            let db = Database::open(&path).unwrap();
            assert!(db.list_chapters(None, None).unwrap().is_empty());
        }

        #[test]
        fn unreachable_database_fails() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("missing").join("content.db");
            assert!(run(cli(&path, &["init"])).is_err());
        }

        #[test]
        fn fields_without_file_are_rejected() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("content.db");
            run(cli(&path, &["seed", "chemistry-11-ch9-hydrogen"])).unwrap();

            let err = run(cli(&path, &["seed", "chemistry-11-ch9-hydrogen", "--fields", "title"]))
                .unwrap_err();
            assert!(err.to_string().contains("--fields"));
            assert!(run(cli(&path, &["seed", "--all", "--fields", "title"])).is_err());

            let db = Database::open(&path).unwrap();
            let hydrogen = db.get_chapter(&ChapterKey::new("Chemistry", "11", 9)).unwrap().unwrap();
            assert_eq!(hydrogen.version, 1);
            assert_eq!(db.list_chapters(None, None).unwrap().len(), 1);
        }

        #[test]
        fn file_seed_honours_fields() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("content.db");
            run(cli(&path, &["seed", "chemistry-11-ch9-hydrogen"])).unwrap();

            let db = Database::open(&path).unwrap();
            let mut edited = db
                .get_chapter(&ChapterKey::new("Chemistry", "11", 9))
                .unwrap()
                .unwrap()
                .content;
            let original_notes = edited.detailed_notes.clone();
            edited.chapter_title = "Hydrogen (Revised)".to_string();
            edited.detailed_notes = "Rewritten".to_string();

            let file = dir.path().join("hydrogen.json");
            std::fs::write(&file, serde_json::to_string(&edited).unwrap()).unwrap();
            run(cli(
                &path,
                &["seed", "--file", file.to_str().unwrap(), "--fields", "title"],
            ))
            .unwrap();

            let stored = db.get_chapter(&edited.key).unwrap().unwrap();
            assert_eq!(stored.content.chapter_title, "Hydrogen (Revised)");
            assert_eq!(stored.content.detailed_notes, original_notes);
        }

        #[test]
        fn read_commands_require_initialized_database() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("content.db");

            let err = run(cli(&path, &["check"])).unwrap_err();
            assert!(err.to_string().contains("syllabus init"));
            assert!(!path.exists());

            Database::open(&path).unwrap();
            assert!(run(cli(&path, &["chapters"])).is_err());
            assert!(run(cli(&path, &["find", "plants"])).is_err());
            assert!(run(cli(&path, &["show", "Biology", "11", "11"])).is_err());

            run(cli(&path, &["init"])).unwrap();
            run(cli(&path, &["check"])).unwrap();
            run(cli(&path, &["chapters"])).unwrap();
        }

        #[test]
        fn seeders_does_not_touch_the_database() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("content.db");
            run(cli(&path, &["seeders"])).unwrap();
            assert!(!path.exists());
        }

        #[test]
        fn visualize_fills_published_chapters() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("content.db");
            run(cli(&path, &["seed", "--all"])).unwrap();
            run(cli(&path, &["visualize"])).unwrap();

            let db = Database::open(&path).unwrap();
            assert!(db.published_chapters_without_visualizations().unwrap().is_empty());
        }
    }
}
