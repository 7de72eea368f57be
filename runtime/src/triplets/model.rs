use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_ENTITY_TYPE: &str = "Concept";

/// Candidate subject-predicate-object unit as produced by the extraction
/// collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triplet {
    pub subject: String,
    pub predicate: String,
    pub object: String,

    #[serde(
        default = "default_types",
        alias = "subject_type",
        deserialize_with = "one_or_many"
    )]
    pub subject_types: Vec<String>,
    #[serde(
        default = "default_types",
        alias = "object_type",
        deserialize_with = "one_or_many"
    )]
    pub object_types: Vec<String>,

    #[serde(default)]
    pub confidence_score: Option<f64>,
    #[serde(default)]
    pub original_text: Option<String>,
    #[serde(default)]
    pub extracted_by: Option<String>,

    #[serde(default)]
    pub relationship_significance: Option<u8>,
    #[serde(default)]
    pub subject_significance: Option<u8>,
    #[serde(default)]
    pub object_significance: Option<u8>,

    #[serde(default)]
    pub page_number: Option<u32>,
}

impl Triplet {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
            subject_types: default_types(),
            object_types: default_types(),
            confidence_score: None,
            original_text: None,
            extracted_by: None,
            relationship_significance: None,
            subject_significance: None,
            object_significance: None,
            page_number: None,
        }
    }

    /// Classification used as the entity merge key. The first label wins.
    pub fn subject_type(&self) -> &str {
        primary_type(&self.subject_types)
    }

    pub fn object_type(&self) -> &str {
        primary_type(&self.object_types)
    }

    pub fn polarity(&self) -> Polarity {
        Polarity::from_predicate(&self.predicate)
    }

    /// Case-insensitive identity used for deduplication.
    pub fn identity(&self) -> (String, String, String) {
        (
            self.subject.to_lowercase(),
            self.predicate.to_lowercase(),
            self.object.to_lowercase(),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Positive,
    Negative,
}

impl Polarity {
    pub fn from_predicate(predicate: &str) -> Self {
        if predicate.starts_with("does_not_") {
            Polarity::Negative
        } else {
            Polarity::Positive
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Polarity::Positive => "positive",
            Polarity::Negative => "negative",
        }
    }
}

fn primary_type(types: &[String]) -> &str {
    types
        .iter()
        .map(|t| t.trim())
        .find(|t| !t.is_empty())
        .unwrap_or(DEFAULT_ENTITY_TYPE)
}

fn default_types() -> Vec<String> {
    vec![DEFAULT_ENTITY_TYPE.to_string()]
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
    Missing(()),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let types = match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(single) => vec![single],
        OneOrMany::Many(many) => many,
        OneOrMany::Missing(()) => Vec::new(),
    };
    if types.iter().all(|t| t.trim().is_empty()) {
        Ok(default_types())
    } else {
        Ok(types)
    }
}
