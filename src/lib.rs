//! folio-rag - 포트폴리오 챗봇용 RAG 검색 코어
//!
//! 콘텐츠 소스(Sanity CMS, 트랜스크립트 폴더)를 청킹/임베딩해
//! SQLite 에 저장하고, 벡터 + FTS5 키워드 하이브리드 검색으로
//! 질의에 맞는 청크를 찾습니다.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod source;

// Re-exports
pub use config::{get_data_dir, RagConfig};
pub use embedding::{
    cosine_similarity, create_embedder, get_api_key, has_api_key, DisabledEmbedding,
    EmbeddingProvider, GeminiEmbedding,
};
pub use error::{RagError, Result};
pub use knowledge::{
    analyze, rerank, ChunkConfig, DocumentStore, HybridRetriever, QueryAnalysis, SearchOptions,
    SearchResult, SqliteDocumentStore, SyncEngine, SyncOptions, SyncResult, WindowChunker,
};
pub use source::{
    Category, ContentDocument, ContentFetcher, DirectoryFetcher, SanityConfig, SanityFetcher,
};
