use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

use super::model::Triplet;

pub const FALLBACK_PREDICATE: &str = "related_to";

const MAX_ENTITY_CHARS: usize = 200;
const MIN_ENTITY_CHARS: usize = 2;
const MAX_PREDICATE_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TripletRejection {
    #[error("Subject is empty")]
    SubjectEmpty,
    #[error("Predicate is empty")]
    PredicateEmpty,
    #[error("Object is empty")]
    ObjectEmpty,
    #[error("Subject too long ({0} chars, max {MAX_ENTITY_CHARS})")]
    SubjectTooLong(usize),
    #[error("Object too long ({0} chars, max {MAX_ENTITY_CHARS})")]
    ObjectTooLong(usize),
    #[error("Predicate too long ({0} chars, max {MAX_PREDICATE_CHARS})")]
    PredicateTooLong(usize),
    #[error("Subject too short ({0} chars, min {MIN_ENTITY_CHARS})")]
    SubjectTooShort(usize),
    #[error("Object too short ({0} chars, min {MIN_ENTITY_CHARS})")]
    ObjectTooShort(usize),
    #[error("Confidence score {0} outside [0, 1]")]
    ConfidenceOutOfRange(f64),
}

/// A candidate that did not survive validation, reported next to the
/// accepted ones.
#[derive(Debug, Clone, Serialize)]
pub struct TripletError {
    pub index: usize,
    pub reason: String,
    pub triplet: Triplet,
}

/// Lowercase snake_case form of a predicate, limited to `[a-z0-9_]`.
pub fn normalize_predicate(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        let mapped = if ch.is_whitespace() || ch == '-' {
            '_'
        } else {
            ch.to_ascii_lowercase()
        };
        if !(mapped.is_ascii_lowercase() || mapped.is_ascii_digit() || mapped == '_') {
            continue;
        }
        if mapped == '_' && out.ends_with('_') {
            continue;
        }
        out.push(mapped);
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        FALLBACK_PREDICATE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Returns a cleaned copy; the input is left untouched.
pub fn sanitize(triplet: &Triplet) -> Triplet {
    let mut clean = triplet.clone();
    clean.subject = triplet.subject.trim().to_string();
    clean.object = triplet.object.trim().to_string();
    clean.predicate = if triplet.predicate.trim().is_empty() {
        String::new()
    } else {
        normalize_predicate(&triplet.predicate)
    };
    clean.original_text = triplet
        .original_text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string);
    clean.subject_types = clean_types(&triplet.subject_types);
    clean.object_types = clean_types(&triplet.object_types);
    clean.relationship_significance = triplet.relationship_significance.map(clamp_significance);
    clean.subject_significance = triplet.subject_significance.map(clamp_significance);
    clean.object_significance = triplet.object_significance.map(clamp_significance);
    clean.page_number = triplet.page_number.filter(|page| *page > 0);
    clean
}

pub fn validate(triplet: &Triplet) -> Result<(), TripletRejection> {
    let subject_len = triplet.subject.chars().count();
    let predicate_len = triplet.predicate.chars().count();
    let object_len = triplet.object.chars().count();

    if subject_len == 0 {
        return Err(TripletRejection::SubjectEmpty);
    }
    if predicate_len == 0 {
        return Err(TripletRejection::PredicateEmpty);
    }
    if object_len == 0 {
        return Err(TripletRejection::ObjectEmpty);
    }
    if subject_len > MAX_ENTITY_CHARS {
        return Err(TripletRejection::SubjectTooLong(subject_len));
    }
    if object_len > MAX_ENTITY_CHARS {
        return Err(TripletRejection::ObjectTooLong(object_len));
    }
    if predicate_len > MAX_PREDICATE_CHARS {
        return Err(TripletRejection::PredicateTooLong(predicate_len));
    }
    if subject_len < MIN_ENTITY_CHARS {
        return Err(TripletRejection::SubjectTooShort(subject_len));
    }
    if object_len < MIN_ENTITY_CHARS {
        return Err(TripletRejection::ObjectTooShort(object_len));
    }
    if let Some(confidence) = triplet.confidence_score {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(TripletRejection::ConfidenceOutOfRange(confidence));
        }
    }
    Ok(())
}

/// Sanitizes and validates each candidate independently.
pub fn validate_and_sanitize_triplets(triplets: &[Triplet]) -> (Vec<Triplet>, Vec<TripletError>) {
    let mut valid = Vec::with_capacity(triplets.len());
    let mut errors = Vec::new();

    for (index, raw) in triplets.iter().enumerate() {
        let clean = sanitize(raw);
        match validate(&clean) {
            Ok(()) => valid.push(clean),
            Err(rejection) => errors.push(TripletError {
                index,
                reason: rejection.to_string(),
                triplet: raw.clone(),
            }),
        }
    }

    (valid, errors)
}

/// Drops repeats of a case-insensitive (subject, predicate, object), keeping
/// the first occurrence in input order.
pub fn deduplicate_triplets(triplets: Vec<Triplet>) -> Vec<Triplet> {
    let mut seen = HashSet::new();
    triplets
        .into_iter()
        .filter(|triplet| seen.insert(triplet.identity()))
        .collect()
}

fn clean_types(types: &[String]) -> Vec<String> {
    let cleaned: Vec<String> = types
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    if cleaned.is_empty() {
        vec![super::model::DEFAULT_ENTITY_TYPE.to_string()]
    } else {
        cleaned
    }
}

fn clamp_significance(value: u8) -> u8 {
    value.clamp(1, 5)
}
