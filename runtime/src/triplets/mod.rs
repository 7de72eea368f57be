//! Candidate knowledge triplets and the pure sanitize/validate/deduplicate stage
//! that runs before anything touches the graph.

pub mod model;
pub mod validator;

pub use model::{DEFAULT_ENTITY_TYPE, Polarity, Triplet};
pub use validator::{
    FALLBACK_PREDICATE, TripletError, TripletRejection, deduplicate_triplets, normalize_predicate,
    sanitize, validate, validate_and_sanitize_triplets,
};
