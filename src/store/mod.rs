mod storage;
mod types;

pub use storage::Store;
pub use types::{AnalysisUpdate, Comment, Post, SavedAnalysis};
