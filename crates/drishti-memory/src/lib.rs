//! Case memory — similarity-queryable store of prior-case chart signatures.

pub mod features;
pub mod store;

pub use features::build_feature_set;
pub use store::{
    format_similarity_context, CaseMemory, CaseRecord, CaseUpdate, DEFAULT_MIN_SIMILARITY,
    DEFAULT_SIMILAR_LIMIT,
};
