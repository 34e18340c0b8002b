pub mod chain;
pub mod indexer;
pub mod memory;
pub mod store;


pub use chain::RagChain;
pub use indexer::{IndexReport, IndexingPipeline};
pub use memory::MemoryVectorStore;
pub use store::{ScoredPage, VectorStore};
