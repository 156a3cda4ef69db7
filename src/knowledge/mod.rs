//! Knowledge 모듈 - 하이브리드 RAG 검색 코어
//!
//! - Hasher: SHA-256 콘텐츠/문서 해시 (변경 감지)
//! - Chunker: 글자 단위 슬라이딩 윈도우 분할
//! - Store: 청크 + 임베딩 저장소 (SQLite, FTS5 키워드 검색)
//! - Hybrid: 벡터 + 키워드 가중 퓨전
//! - Rerank: 쿼리/엔티티 일치 부스트
//! - Sync: 콘텐츠 소스와 저장소 동기화

pub mod hasher;
mod chunker;
mod store;
mod sqlite;
mod hybrid;
mod rerank;
mod query;
mod sync;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use chunker::{
    Chunker, ChunkConfig, WindowChunker, WindowChunks,
    default_chunker, window_chunker,
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
};
pub use store::{
    Chunk, ChunkMetadata, DocumentStore, NewChunk, SearchResult, StoreStats, StoredChunk,
    composite_source_id,
};
pub use sqlite::SqliteDocumentStore;
pub use hybrid::{
    fuse, HybridRetriever, SearchMethod, SearchOptions,
    AGREEMENT_BONUS, KEYWORD_WEIGHT, SEMANTIC_WEIGHT,
};
pub use rerank::rerank;
pub use query::{analyze, extract_entities, extract_keywords, QueryAnalysis};
pub use sync::{ChangeLogEntry, SyncAction, SyncEngine, SyncFailure, SyncOptions, SyncResult};
