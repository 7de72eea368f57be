use serde::Deserialize;
use serde_json::{Value, json};

use crate::triplets::Triplet;

/// Controlled vocabulary offered to the model for entity labels. `Concept`
/// is the catch-all.
pub const ENTITY_TYPE_VARIANTS: [&str; 38] = [
    "Researcher",
    "Clinician",
    "Patient / Participant",
    "Institution / Organization",
    "Funding Agency",
    "Gene",
    "Protein",
    "RNA",
    "Cell",
    "Tissue",
    "Organ",
    "Organism / Species",
    "Disease / Disorder",
    "Syndrome",
    "Symptom / Phenotype",
    "Pathway",
    "Drug / Compound / Chemical Substance",
    "Biomarker",
    "Reagent",
    "Material",
    "Method / Technique / Assay / Protocol",
    "Equipment / Instrument",
    "Sample / Specimen",
    "Control / Variable",
    "Measurement / Metric",
    "Dataset",
    "Model (computational, statistical, or biological)",
    "Hypothesis / Objective",
    "Result / Observation / Finding",
    "Theory / Concept",
    "Parameter",
    "Clinical Trial",
    "Project / Study",
    "Ethical Approval / Consent",
    "Time / Duration / Temporal Stage",
    "Location",
    "Publication / Reference",
    "Concept",
];

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractedTriplets {
    #[serde(default)]
    pub triplets: Vec<Triplet>,
}

fn nullable(kind: &str, description: &str) -> Value {
    json!({ "type": [kind, "null"], "description": description })
}

fn entity_type(description: &str) -> Value {
    json!({
        "type": "string",
        "enum": ENTITY_TYPE_VARIANTS.iter().copied().collect::<Vec<_>>(),
        "description": description
    })
}

fn significance(description: &str) -> Value {
    json!({
        "type": ["integer", "null"],
        "minimum": 1,
        "maximum": 5,
        "description": description
    })
}

/// Strict response schema for triplet extraction. Every property is listed
/// as required; optional values are expressed as nullable.
pub fn triplets_schema(max_triplets: usize) -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "properties": {
            "triplets": {
                "type": "array",
                "maxItems": max_triplets,
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "subject": {
                            "type": "string",
                            "description": "Entity the statement is about. Use the most specific name found in the text and keep naming consistent across triplets."
                        },
                        "predicate": {
                            "type": "string",
                            "description": "Relationship in snake_case, e.g. `targets`, `inhibits`, `associated_with`. Prefix with `does_not_` when the text explicitly negates the relationship."
                        },
                        "object": {
                            "type": "string",
                            "description": "Entity the subject relates to. Keep naming consistent with other triplets."
                        },
                        "subject_type": entity_type("Category of the subject. Use `Concept` when nothing else applies."),
                        "object_type": entity_type("Category of the object. Use `Concept` when nothing else applies."),
                        "confidence_score": {
                            "type": ["number", "null"],
                            "minimum": 0,
                            "maximum": 1,
                            "description": "How strongly the text supports the statement, from 0 to 1."
                        },
                        "original_text": nullable("string", "Verbatim sentence the statement was taken from."),
                        "relationship_significance": significance("Importance of the relationship to the document, 1 (peripheral) to 5 (central)."),
                        "subject_significance": significance("Importance of the subject to the document, 1 to 5."),
                        "object_significance": significance("Importance of the object to the document, 1 to 5."),
                        "page_number": nullable("integer", "1-based page the statement appears on, when page markers are present.")
                    },
                    "required": [
                        "subject",
                        "predicate",
                        "object",
                        "subject_type",
                        "object_type",
                        "confidence_score",
                        "original_text",
                        "relationship_significance",
                        "subject_significance",
                        "object_significance",
                        "page_number"
                    ]
                }
            }
        },
        "required": ["triplets"]
    })
}
