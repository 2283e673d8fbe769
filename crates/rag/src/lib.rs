//! Retrieval plumbing: embeddings, the vector store client, document
//! chunking/parsing, and the policy question-answering engine built on top
//! of them.

pub mod chunking;
pub mod embed;
pub mod parsers;
pub mod policy;
pub mod vector;

pub use chunking::{ChunkMetadata, ChunkingService, DocumentChunk};
pub use embed::{EmbedError, Embedder, EmbedderInfo, HashEmbedder, HttpEmbedder, batch_similarity, similarity};
pub use parsers::{FileType, detect_file_type, parse_document};
pub use policy::{Confidence, PolicyAnswer, PolicyRagEngine};
pub use vector::{
    IndexHealth, MemoryVectorStore, MetadataFilter, RetrievalHit, VectorBackend, VectorPoint,
    VectorStoreClient, VectorStoreError,
};
