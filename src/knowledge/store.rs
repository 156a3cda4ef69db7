//! Document Store - 청크/임베딩 저장소 트레이트 및 데이터 모델
//!
//! 저장소는 StoredChunk 영속화를 전담합니다.
//! Sync Engine만 쓰기 연산을 호출하고, Hybrid Retriever는 읽기만 합니다.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::source::{Category, ContentDocument};

// ============================================================================
// Types
// ============================================================================

/// 청크 메타데이터 (부모 문서에서 상속 + 청크 고유 필드)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// 소스 레이블 (sanity, transcript, faq ...)
    pub source: String,
    /// 부모 문서 source_id
    pub parent_source_id: String,
    pub category: Category,
    pub title: String,
    pub url: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

/// 임베딩 단위 청크
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub content: String,
    /// 부모 문서 내 위치 (0-based)
    pub index: usize,
    /// 형제 청크 수
    pub total_chunks: usize,
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// 문서와 청크 텍스트 목록에서 Chunk 생성
    pub fn from_document(doc: &ContentDocument, pieces: Vec<String>) -> Vec<Chunk> {
        let total_chunks = pieces.len();

        pieces
            .into_iter()
            .enumerate()
            .map(|(index, content)| Chunk {
                content,
                index,
                total_chunks,
                metadata: ChunkMetadata {
                    source: doc.source.clone(),
                    parent_source_id: doc.source_id.clone(),
                    category: doc.category.clone(),
                    title: doc.title.clone(),
                    url: doc.url.clone(),
                    updated_at: doc.updated_at,
                    chunk_index: index,
                    total_chunks,
                },
            })
            .collect()
    }

    /// 복합 키 `<parentSourceId>_chunk_<index>`
    pub fn source_id(&self) -> String {
        composite_source_id(&self.metadata.parent_source_id, self.index)
    }
}

/// 저장 요청용 청크 (임베딩 + 해시 포함)
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    /// 청크 텍스트 해시
    pub content_hash: String,
    /// 부모 문서(콘텐츠 + 메타데이터) 해시
    pub document_hash: String,
}

/// 저장된 청크
#[derive(Debug, Clone)]
pub struct StoredChunk {
    pub id: i64,
    /// 복합 키 (유일)
    pub source_id: String,
    pub chunk: Chunk,
    pub embedding: Vec<f32>,
    pub content_hash: String,
    pub document_hash: String,
    pub last_synced: DateTime<Utc>,
}

impl StoredChunk {
    pub fn parent_source_id(&self) -> &str {
        &self.chunk.metadata.parent_source_id
    }
}

/// 검색 결과 (쿼리마다 생성, 저장하지 않음)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    /// 복합 키 (퓨전 시 구조적 중복 제거 키)
    pub source_id: String,
    pub content: String,
    pub metadata: ChunkMetadata,
    /// 벡터 검색 유사도
    pub similarity: Option<f32>,
    /// 키워드 검색 순위 점수
    pub text_rank: Option<f32>,
    /// 퓨전 점수
    pub combined_score: f32,
    /// 리랭커 점수
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank_score: Option<f32>,
}

impl SearchResult {
    /// 정렬용 최종 점수 (리랭크 후에는 rank_score)
    pub fn score(&self) -> f32 {
        self.rank_score.unwrap_or(self.combined_score)
    }
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub chunk_count: usize,
    pub document_count: usize,
    pub total_content_bytes: usize,
    pub db_path: Option<PathBuf>,
}

/// 복합 source_id 생성
pub fn composite_source_id(parent_source_id: &str, index: usize) -> String {
    format!("{}_chunk_{}", parent_source_id, index)
}

// ============================================================================
// DocumentStore Trait
// ============================================================================

/// 문서 저장소 트레이트 (async)
///
/// 모든 쓰기 연산은 호출 단위로 원자적입니다.
/// 실패한 배치는 일부만 저장된 채 성공으로 처리되지 않습니다.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// 벡터 유사도 검색
    ///
    /// `threshold` 이상만, 유사도 내림차순, 최대 `limit` 개.
    async fn vector_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>>;

    /// 키워드 검색
    ///
    /// 정확한 부분 문자열 일치가 먼저, 토큰 기반 검색이 그 뒤에 옵니다.
    async fn keyword_search(
        &self,
        query_text: &str,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<SearchResult>>;

    /// 청크 배치 삽입
    async fn insert_many(&self, chunks: &[NewChunk]) -> Result<Vec<StoredChunk>>;

    /// 부모 source_id 의 모든 청크 조회 (index 순)
    async fn find_by_source_id(&self, parent_source_id: &str) -> Result<Vec<StoredChunk>>;

    /// 부모 source_id 의 모든 청크 삭제
    async fn delete_by_source_id(&self, parent_source_id: &str) -> Result<usize>;

    /// 부모 문서의 청크 세트를 한 번에 교체 (삭제 + 삽입)
    async fn replace_source(
        &self,
        parent_source_id: &str,
        chunks: &[NewChunk],
    ) -> Result<Vec<StoredChunk>>;

    /// 저장된 부모 source_id 목록
    async fn list_source_ids(&self) -> Result<Vec<String>>;

    /// 전체 삭제 (전체 재수집 전용)
    async fn delete_all(&self) -> Result<usize>;

    /// 저장소 통계
    async fn stats(&self) -> Result<StoreStats>;
}
