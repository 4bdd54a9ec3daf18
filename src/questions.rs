use serde::Serialize;
use tracing::{debug, info, warn};

use crate::db::Database;
use crate::error::Result;
use crate::models::{ChapterInput, KeyConcept, NewQuestion, QuestionOption};

pub const MIN_QUESTIONS_PER_TOPIC: usize = 2;

const OPTION_IDS: [&str; 4] = ["A", "B", "C", "D"];

const FALLBACK_WRONG_TITLES: [&str; 4] = [
    "Chemical bonding basics",
    "Newton's laws of motion",
    "Thermodynamics overview",
    "Organic reaction types",
];

const FALLBACK_WRONG_DESCRIPTIONS: [&str; 4] = [
    "Study of forces and motion in physics",
    "Periodic trends and atomic structure",
    "Heat transfer and changes of state",
    "Functional group reactions in organic chemistry",
];

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpReport {
    pub chapters: usize,
    pub chapters_skipped: usize,
    pub questions_inserted: usize,
}

/// Makes sure every chapter of `subject` has a topic row and at least
/// `minimum` practice questions built from its key concepts.
pub fn top_up_questions(db: &Database, subject: &str, minimum: usize) -> Result<TopUpReport> {
    info!(subject, minimum, "topping up chapter questions");

    let chapters = db.chapters_for_subject(subject)?;
    let pool: Vec<&KeyConcept> = chapters
        .iter()
        .flat_map(|c| c.content.key_concepts.iter())
        .filter(|c| is_usable(c))
        .collect();

    let mut report = TopUpReport {
        chapters: chapters.len(),
        ..Default::default()
    };

    for chapter in &chapters {
        let content = &chapter.content;
        let key = &content.key;
        let topic_id = db.ensure_topic(
            &key.subject,
            &key.class_level,
            &content.chapter_title,
            Some(&format!("Chapter {}", key.chapter_number)),
            &[format!("NCERT {}", key.subject)],
        )?;

        let existing = db.count_questions(topic_id)? as usize;
        if existing >= minimum {
            debug!(%key, existing, "chapter already has enough questions");
            report.chapters_skipped += 1;
            continue;
        }

        if !content.key_concepts.iter().any(is_usable) {
            warn!(%key, "no usable key concepts, using generic questions");
        }

        let payload = build_questions(content, &pool, minimum - existing);
        let inserted = db.insert_questions(topic_id, &payload)?;
        info!(%key, inserted, "inserted questions");
        report.questions_inserted += inserted;
    }

    info!(
        chapters = report.chapters,
        skipped = report.chapters_skipped,
        inserted = report.questions_inserted,
        "question top-up completed"
    );
    Ok(report)
}

fn is_usable(concept: &KeyConcept) -> bool {
    !concept.title.trim().is_empty() && !concept.description.trim().is_empty()
}

/// Builds `count` questions for a chapter. Concepts with a title and a
/// description become matching questions, alternating between "which concept
/// is described" and "which statement describes"; distractors come from
/// `pool` and then from fixed fallbacks. The correct answer is always `A`.
pub fn build_questions(chapter: &ChapterInput, pool: &[&KeyConcept], count: usize) -> Vec<NewQuestion> {
    let related_topics = vec![
        chapter.chapter_title.clone(),
        format!("Chapter {}", chapter.key.chapter_number),
    ];

    let concept_questions = chapter
        .key_concepts
        .iter()
        .filter(|c| is_usable(c))
        .enumerate()
        .map(|(i, concept)| {
            if i % 2 == 0 {
                title_question(concept, pool)
            } else {
                description_question(concept, pool)
            }
        });

    let fallback_questions = (0..).map(|i| fallback_question(&chapter.chapter_title, i));

    concept_questions
        .chain(fallback_questions)
        .take(count)
        .map(|(question_text, options, solution_detail, step)| NewQuestion {
            question_text,
            options,
            correct_answer: OPTION_IDS[0].to_string(),
            solution_detail,
            solution_steps: vec![step.to_string()],
            difficulty_level: 1,
            source_type: "custom".to_string(),
            related_topics: related_topics.clone(),
            pyq_year: None,
        })
        .collect()
}

type Draft = (String, Vec<QuestionOption>, String, &'static str);

fn title_question(concept: &KeyConcept, pool: &[&KeyConcept]) -> Draft {
    let titles = pool.iter().map(|c| c.title.as_str());
    (
        format!("Which concept matches: \"{}\"?", concept.description),
        options(&concept.title, titles, &FALLBACK_WRONG_TITLES),
        format!("The description refers to {}.", concept.title),
        "Match the description to the correct concept title.",
    )
}

fn description_question(concept: &KeyConcept, pool: &[&KeyConcept]) -> Draft {
    let descriptions = pool.iter().map(|c| c.description.as_str());
    (
        format!("Which statement best describes \"{}\"?", concept.title),
        options(&concept.description, descriptions, &FALLBACK_WRONG_DESCRIPTIONS),
        format!("The correct description matches {}.", concept.title),
        "Identify the option that matches the concept definition.",
    )
}

fn fallback_question(chapter_title: &str, i: usize) -> Draft {
    let (text, correct) = if i % 2 == 0 {
        (
            format!("The chapter \"{}\" mainly focuses on:", chapter_title),
            format!("Core concepts and definitions in {}", chapter_title),
        )
    } else {
        (
            format!("Which option is most closely associated with {}?", chapter_title),
            format!("Key terms from {}", chapter_title),
        )
    };
    (
        text,
        options(&correct, std::iter::empty(), &FALLBACK_WRONG_TITLES),
        format!("The correct option refers to {} directly.", chapter_title),
        "Eliminate unrelated topics and pick the closest match.",
    )
}

/// Correct answer first, then up to three distinct distractors.
fn options<'a>(
    correct: &str,
    candidates: impl Iterator<Item = &'a str>,
    fallbacks: &'a [&'a str],
) -> Vec<QuestionOption> {
    let mut texts: Vec<&str> = vec![correct];
    for text in candidates.chain(fallbacks.iter().copied()) {
        if texts.len() == OPTION_IDS.len() {
            break;
        }
        if !text.trim().is_empty() && !texts.contains(&text) {
            texts.push(text);
        }
    }

    OPTION_IDS
        .iter()
        .zip(texts)
        .map(|(id, text)| QuestionOption {
            id: id.to_string(),
            text: text.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChapterKey, UpdateFields};

    fn setup_db() -> Database {
        let db = Database::open(":memory:").expect("Failed to create in-memory database");
        db.init().expect("Failed to initialize database");
        db
    }

    fn concept(title: &str, description: &str) -> KeyConcept {
        KeyConcept {
            title: title.to_string(),
            description: description.to_string(),
            formula: None,
        }
    }

    fn chapter(class_level: &str, number: i32, title: &str, concepts: Vec<KeyConcept>) -> ChapterInput {
        let mut input = ChapterInput::new(
            ChapterKey::new("Biology", class_level, number),
            title,
            "Introduction",
            "Notes",
        );
        input.key_concepts = concepts;
        input
    }

    mod build_tests {
        use super::*;

        #[test]
        fn concept_questions_come_first() {
            let xylem = concept("Xylem", "Conducts water and minerals");
            let phloem = concept("Phloem", "Conducts food");
            let input = chapter("11", 11, "Transport in Plants", vec![xylem.clone(), phloem.clone()]);
            let pool = vec![&xylem, &phloem];

            let questions = build_questions(&input, &pool, 2);

            assert_eq!(questions.len(), 2);
            assert_eq!(
                questions[0].question_text,
                "Which concept matches: \"Conducts water and minerals\"?"
            );
            assert_eq!(questions[0].options[0].text, "Xylem");
            assert_eq!(questions[0].options[1].text, "Phloem");
            assert_eq!(questions[1].question_text, "Which statement best describes \"Phloem\"?");
            assert_eq!(questions[1].options[0].text, "Conducts food");
            assert!(questions.iter().all(|q| q.correct_answer == "A"));
            assert_eq!(
                questions[0].related_topics,
                vec!["Transport in Plants".to_string(), "Chapter 11".to_string()]
            );
        }

        #[test]
        fn options_are_padded_and_distinct() {
            let only = concept("Osmosis", "Water movement across a membrane");
            let input = chapter("11", 11, "Transport in Plants", vec![only.clone()]);
            let pool = vec![&only, &only];

            let questions = build_questions(&input, &pool, 1);
            let texts: Vec<&str> = questions[0].options.iter().map(|o| o.text.as_str()).collect();

            assert_eq!(texts.len(), 4);
            assert_eq!(texts[0], "Osmosis");
            assert_eq!(&texts[1..], &FALLBACK_WRONG_TITLES[..3]);
            let ids: Vec<&str> = questions[0].options.iter().map(|o| o.id.as_str()).collect();
            assert_eq!(ids, OPTION_IDS.to_vec());
        }

        #[test]
        fn falls_back_without_usable_concepts() {
            let input = chapter("11", 1, "The Living World", vec![concept("Taxonomy", "")]);

            let questions = build_questions(&input, &[], 3);

            assert_eq!(questions.len(), 3);
            assert_eq!(
                questions[0].question_text,
                "The chapter \"The Living World\" mainly focuses on:"
            );
            assert_eq!(
                questions[1].question_text,
                "Which option is most closely associated with The Living World?"
            );
            assert_eq!(questions[0].options.len(), 4);
        }

        #[test]
        fn zero_count_builds_nothing() {
            let input = chapter("11", 1, "The Living World", vec![]);
            assert!(build_questions(&input, &[], 0).is_empty());
        }
    }

    mod top_up_tests {
        use super::*;

        #[test]
        fn creates_topics_and_minimum_questions() {
            let db = setup_db();
            db.upsert_chapter(
                &chapter("11", 11, "Transport in Plants", vec![concept("Xylem", "Conducts water")]),
                &UpdateFields::all(),
            )
            .unwrap();
            db.upsert_chapter(&chapter("12", 5, "Principles of Inheritance", vec![]), &UpdateFields::all())
                .unwrap();

            let report = top_up_questions(&db, "biology", MIN_QUESTIONS_PER_TOPIC).unwrap();

            assert_eq!(report.chapters, 2);
            assert_eq!(report.chapters_skipped, 0);
            assert_eq!(report.questions_inserted, 4);

            let hits = db.search("Transport in Plants").unwrap();
            let topic = hits.iter().find(|h| h.kind == "topic").unwrap();
            assert_eq!(db.count_questions(topic.id).unwrap(), 2);

            let stored = db.get_topic(topic.id).unwrap().unwrap();
            assert_eq!(stored.ncert_chapter, Some("Chapter 11".to_string()));
            assert_eq!(stored.reference_books, vec!["NCERT Biology".to_string()]);
        }

        #[test]
        fn rerun_never_exceeds_minimum() {
            let db = setup_db();
            db.upsert_chapter(&chapter("11", 11, "Transport in Plants", vec![]), &UpdateFields::all())
                .unwrap();

            top_up_questions(&db, "Biology", 2).unwrap();
            let report = top_up_questions(&db, "Biology", 2).unwrap();

            assert_eq!(report.chapters_skipped, 1);
            assert_eq!(report.questions_inserted, 0);
            assert_eq!(db.table_counts().unwrap()[1], ("content_topics", 1));
            assert_eq!(db.table_counts().unwrap()[2], ("questions", 2));
        }

        #[test]
        fn raising_minimum_inserts_only_the_difference() {
            let db = setup_db();
            db.upsert_chapter(&chapter("11", 11, "Transport in Plants", vec![]), &UpdateFields::all())
                .unwrap();

            top_up_questions(&db, "Biology", 2).unwrap();
            let report = top_up_questions(&db, "Biology", 3).unwrap();

            assert_eq!(report.questions_inserted, 1);
            assert_eq!(db.table_counts().unwrap()[2], ("questions", 3));
        }

        #[test]
        fn other_subjects_are_untouched() {
            let db = setup_db();
            let mut hydrogen = chapter("11", 9, "Hydrogen", vec![]);
            hydrogen.key.subject = "Chemistry".to_string();
            db.upsert_chapter(&hydrogen, &UpdateFields::all()).unwrap();

            let report = top_up_questions(&db, "Biology", 2).unwrap();

            assert_eq!(report.chapters, 0);
            assert_eq!(db.table_counts().unwrap()[1], ("content_topics", 0));
        }
    }
}
