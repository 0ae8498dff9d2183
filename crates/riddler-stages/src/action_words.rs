//! Present/past tense labels shown while a session is paused.

use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

const GENERIC: &[&str] = &[
    "analyzing",
    "processing",
    "computing",
    "evaluating",
    "calculating",
    "resolving",
    "executing",
    "interpreting",
    "synthesizing",
    "deliberating",
    "examining",
    "inspecting",
    "reviewing",
    "assessing",
    "scanning",
    "parsing",
    "validating",
    "optimizing",
];

const RIDDLE_THEMED: &[&str] = &[
    "deciphering",
    "unraveling",
    "puzzling",
    "contemplating",
    "riddling",
    "mystifying",
    "pondering",
    "solving",
    "unveiling",
    "scrutinizing",
    "investigating",
    "deducing",
    "sleuthing",
    "detecting",
    "uncovering",
    "probing",
    "discovering",
    "revealing",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionWords {
    pub present_tense: String,
    pub past_tense: String,
}

impl ActionWords {
    pub fn new(present: impl Into<String>, past: impl Into<String>) -> Self {
        Self {
            present_tense: present.into(),
            past_tense: past.into(),
        }
    }
}

/// Phases of the riddle workflow that carry their own labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Classification,
    Search,
    Generation,
    Assembly,
}

/// Fixed labels for a phase.
pub fn phase_words(phase: Phase, is_riddle: bool) -> ActionWords {
    match (phase, is_riddle) {
        (Phase::Classification, true) => ActionWords::new("deciphering", "deciphered"),
        (Phase::Classification, false) => ActionWords::new("analyzing", "analyzed"),
        (Phase::Search, _) => ActionWords::new("searching knowledge", "found results"),
        (Phase::Generation, true) => ActionWords::new("providing answer", "answered"),
        (Phase::Generation, false) => ActionWords::new("crafting riddle", "created riddle"),
        (Phase::Assembly, _) => ActionWords::new("finalizing response", "completed"),
    }
}

/// What is known about the input when picking a label.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputTraits<'a> {
    pub text: &'a str,
    pub input_type: &'a str,
    pub is_riddle: bool,
    pub needs_search: bool,
}

/// Label for the input, most specific trait first, otherwise a random word.
pub fn contextual_words(traits: InputTraits<'_>) -> ActionWords {
    if traits.is_riddle {
        ActionWords::new("deciphering", "deciphered")
    } else if traits.needs_search {
        ActionWords::new("investigating", "investigated")
    } else if traits.input_type == "url" {
        ActionWords::new("exploring", "explored")
    } else if traits.input_type == "procedural" {
        ActionWords::new("processing", "processed")
    } else {
        random_words(traits.text)
    }
}

/// A random word, suffixed with what kind of input it describes.
pub fn random_words(text: &str) -> ActionWords {
    let lower = text.to_lowercase();
    let (pool, suffix) = if lower.contains("riddle") {
        (RIDDLE_THEMED, " riddle")
    } else if lower.contains("search") {
        (GENERIC, " query")
    } else {
        (GENERIC, " input")
    };

    let word = pool
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("processing");
    ActionWords::new(format!("{word}{suffix}"), format!("{}{suffix}", past_tense(word)))
}

/// `"analyzing"` becomes `"analyzed"`; anything else passes through.
pub fn past_tense(word: &str) -> String {
    match word.strip_suffix("ing") {
        Some(stem) => format!("{stem}ed"),
        None => word.to_string(),
    }
}
