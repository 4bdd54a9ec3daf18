use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::db::Database;
use crate::error::Result;
use crate::models::{ChapterInput, Visualization};

// Curated visualizations per (subject family, chapter number)
const CHAPTER_VISUALIZATIONS: &[(&str, i32, &[&str])] = &[
    ("physics", 1, &["vernier-caliper", "screw-gauge"]),
    ("physics", 2, &["motion-graphs", "position-velocity-graph"]),
    ("physics", 3, &["projectile-motion"]),
    ("physics", 4, &["block-on-ramp", "collision-lab"]),
    ("physics", 5, &["spring-energy-bar", "collision-lab"]),
    ("physics", 6, &["angular-momentum", "torque-wrench"]),
    ("physics", 7, &["planetary-orbit"]),
    ("physics", 8, &["planetary-orbit", "angular-momentum"]),
    ("physics", 9, &["stress-strain-curve", "venturi-tube"]),
    ("physics", 10, &["carnot-cycle", "calorimetry"]),
    ("physics", 11, &["photoelectric-effect", "compton-effect", "atomic-spectrum"]),
    ("physics", 12, &["gas-molecules", "avogadro-jar"]),
    ("physics", 13, &["simple-pendulum-phase", "standing-wave", "resonance-tube"]),
    ("physics", 14, &["electric-field-3d", "parallel-plate-capacitor"]),
    ("physics", 15, &["parallel-plate-capacitor", "electric-field-3d"]),
    ("physics", 16, &["wheatstone-circuit", "metre-bridge", "ac-circuit"]),
    ("physics", 17, &["magnetic-field-lines", "faraday-induction", "transformer-3d"]),
    ("physics", 18, &["magnetic-field-lines", "hysteresis-curve"]),
    ("physics", 19, &["faraday-induction", "transformer-3d", "ac-circuit"]),
    ("physics", 20, &["ray-optics", "lens-maker-formula", "compound-microscope"]),
    ("physics", 21, &["ac-circuit", "transformer-3d"]),
    ("physics", 22, &["em-wave", "polarization-light"]),
    ("physics", 23, &["photoelectric-effect", "compton-effect"]),
    ("physics", 24, &["pn-junction", "logic-gates"]),
    ("chemistry", 1, &["avogadro-jar"]),
    ("chemistry", 2, &["atomic-spectrum"]),
    ("chemistry", 4, &["molecular-orbital", "crystal-lattice"]),
    ("chemistry", 5, &["gas-molecules"]),
    ("chemistry", 6, &["carnot-cycle", "calorimetry"]),
    ("chemistry", 7, &["ph-curve"]),
    ("chemistry", 17, &["crystal-lattice"]),
    ("chemistry", 18, &["molecular-orbital"]),
    ("chemistry", 19, &["molecular-orbital"]),
    ("biology", 1, &["cell-structure", "mitosis-meiosis"]),
    ("biology", 2, &["mitosis-meiosis"]),
    ("biology", 3, &["plant-cell"]),
    ("biology", 4, &["plant-kingdom"]),
    ("biology", 5, &["morphology-flowering-plants"]),
    ("biology", 6, &["anatomy-flowering-plants"]),
    ("biology", 7, &["animal-tissues"]),
    ("biology", 8, &["cell-structure"]),
    ("biology", 9, &["biomolecules"]),
    ("biology", 10, &["mitosis-meiosis"]),
    ("biology", 11, &["transport-in-plants"]),
    ("biology", 12, &["mineral-nutrition"]),
    ("biology", 13, &["photosynthesis"]),
    ("biology", 14, &["respiration"]),
    ("biology", 15, &["plant-growth"]),
    ("biology", 16, &["digestion"]),
    ("biology", 17, &["respiration"]),
    ("biology", 18, &["heart-circulation"]),
    ("biology", 19, &["kidney-function"]),
    ("biology", 20, &["muscle-contraction"]),
    ("biology", 21, &["neuron-impulse"]),
    ("biology", 22, &["hormone-action"]),
];

// Concept titles copied into a subject default's config
const MAX_CONFIG_CONCEPTS: usize = 3;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizeReport {
    pub missing: usize,
    pub enhanced: usize,
    pub failed: usize,
}

/// Fills in visualizations for every published chapter that has none. A
/// chapter that cannot be updated is logged and counted as failed; the rest
/// still run.
pub fn enhance_visualizations(db: &Database) -> Result<VisualizeReport> {
    let chapters = db.published_chapters_without_visualizations()?;
    info!(missing = chapters.len(), "auditing published chapters for visualizations");

    let mut report = VisualizeReport {
        missing: chapters.len(),
        ..Default::default()
    };

    for chapter in &chapters {
        let key = &chapter.content.key;
        let visualizations = generate_visualizations(&chapter.content);

        match db.set_visualizations(chapter.id, &visualizations) {
            Ok(true) => {
                info!(%key, count = visualizations.len(), "added visualizations");
                report.enhanced += 1;
            }
            Ok(false) => {
                warn!(%key, id = chapter.id, "chapter disappeared before update");
                report.failed += 1;
            }
            Err(e) => {
                error!(%key, error = %e, "failed to add visualizations");
                report.failed += 1;
            }
        }
    }

    info!(
        missing = report.missing,
        enhanced = report.enhanced,
        failed = report.failed,
        "visualization back-fill completed"
    );
    Ok(report)
}

/// Curated visualizations when the chapter has a mapping, otherwise one
/// default for its subject. Never empty.
pub fn generate_visualizations(chapter: &ChapterInput) -> Vec<Visualization> {
    let family = subject_family(&chapter.key.subject);
    let mapped = CHAPTER_VISUALIZATIONS
        .iter()
        .find(|(subject, number, _)| *subject == family && *number == chapter.key.chapter_number)
        .map(|(_, _, names)| *names)
        .unwrap_or_default();

    if mapped.is_empty() {
        return vec![subject_default(chapter, &family)];
    }

    mapped
        .iter()
        .map(|name| Visualization {
            kind: visualization_kind(name).to_string(),
            title: visualization_title(name),
            description: visualization_description(name, &chapter.chapter_title),
            config: Some(json!({
                "visualizationName": name,
                "subject": chapter.key.subject,
                "chapterNumber": chapter.key.chapter_number,
            })),
        })
        .collect()
}

// Botany and zoology chapters share the biology mapping.
fn subject_family(subject: &str) -> String {
    let lower = subject.trim().to_lowercase();
    if lower.contains("botany") || lower.contains("zoology") {
        "biology".to_string()
    } else {
        lower
    }
}

fn subject_default(chapter: &ChapterInput, family: &str) -> Visualization {
    let title = &chapter.chapter_title;
    let (kind, heading, description, subject) = if family.contains("physics") {
        (
            "wave",
            "Physics Concept Visualization",
            format!("Interactive visualization to help understand concepts in {}", title),
            "physics",
        )
    } else if family.contains("chemistry") {
        (
            "molecule",
            "Chemical Structure Visualization",
            format!("Interactive molecular visualization for {}", title),
            "chemistry",
        )
    } else if family.contains("biology") {
        (
            "cell",
            "Biological Structure Visualization",
            format!("Interactive biological visualization for {}", title),
            "biology",
        )
    } else {
        (
            "default",
            "Chapter Visualization",
            format!("Interactive visualization to enhance understanding of {}", title),
            chapter.key.subject.as_str(),
        )
    };

    let concepts: Vec<&str> = chapter
        .key_concepts
        .iter()
        .map(|c| c.title.as_str())
        .filter(|t| !t.trim().is_empty())
        .take(MAX_CONFIG_CONCEPTS)
        .collect();

    Visualization {
        kind: kind.to_string(),
        title: heading.to_string(),
        description,
        config: Some(json!({
            "subject": subject,
            "chapterNumber": chapter.key.chapter_number,
            "keyConcepts": concepts,
        })),
    }
}

fn visualization_kind(name: &str) -> &'static str {
    match name {
        "motion-graphs" | "position-velocity-graph" | "spring-energy-bar" | "stress-strain-curve"
        | "carnot-cycle" | "em-wave" | "polarization-light" | "standing-wave"
        | "hysteresis-curve" | "ray-optics" | "lens-maker-formula" | "ph-curve" => "wave",
        "projectile-motion" => "projectile",
        "simple-pendulum-phase" => "pendulum",
        "photoelectric-effect" | "compton-effect" | "atomic-spectrum" => "atom",
        "electric-field-3d" | "parallel-plate-capacitor" | "wheatstone-circuit" | "metre-bridge"
        | "ac-circuit" | "magnetic-field-lines" | "faraday-induction" | "transformer-3d"
        | "pn-junction" | "logic-gates" => "circuit",
        "gas-molecules" | "molecular-orbital" | "biomolecules" | "mineral-nutrition"
        | "muscle-contraction" | "hormone-action" => "molecule",
        "cell-structure" | "photosynthesis" | "respiration" | "mitosis-meiosis" | "plant-cell"
        | "anatomy-flowering-plants" | "animal-tissues" | "transport-in-plants"
        | "neuron-impulse" => "cell",
        "morphology-flowering-plants" | "digestion" | "heart-circulation" | "kidney-function" => {
            "organ"
        }
        _ => "default",
    }
}

fn visualization_title(name: &str) -> String {
    match name {
        "motion-graphs" => "Motion Graphs".to_string(),
        "position-velocity-graph" => "Position-Velocity Graph".to_string(),
        "projectile-motion" => "Projectile Motion Simulation".to_string(),
        "electric-field-3d" => "3D Electric Field Visualization".to_string(),
        "cell-structure" => "Cell Structure".to_string(),
        _ => {
            let words: Vec<String> = name.split('-').map(capitalize).collect();
            format!("{} Visualization", words.join(" "))
        }
    }
}

fn visualization_description(name: &str, chapter_title: &str) -> String {
    match name {
        "motion-graphs" => {
            "Interactive graphs showing position, velocity, and acceleration over time".to_string()
        }
        "projectile-motion" => {
            "Simulate projectile motion with adjustable initial velocity and angle".to_string()
        }
        "electric-field-3d" => "3D visualization of electric field lines and potential".to_string(),
        "cell-structure" => "Detailed view of cell organelles and their functions".to_string(),
        _ => format!("Interactive visualization related to {}", chapter_title),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
