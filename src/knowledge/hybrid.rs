//! 하이브리드 검색 - 벡터 + 키워드 가중 퓨전
//!
//! 벡터 검색과 키워드 검색을 동시에 실행한 뒤 가중 합으로 통합합니다.
//!
//! - 시맨틱 유사도 × 0.7 (주 신호)
//! - 키워드 text_rank × 0.3 (정확한 구문/FAQ 질의 보강)
//! - 양쪽 모두에서 찾은 청크는 (합) × 1.2 합의 보너스
//!
//! 한쪽 검색이 실패하면 경고를 남기고 빈 결과로 취급합니다.
//! 양쪽 모두 실패한 경우에만 `RetrievalFailed` 를 반환합니다.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

use super::query::analyze;
use super::rerank::rerank;
use super::store::{DocumentStore, SearchResult};

// ============================================================================
// Constants
// ============================================================================

/// 시맨틱 점수 가중치
pub const SEMANTIC_WEIGHT: f32 = 0.7;
/// 키워드 점수 가중치
pub const KEYWORD_WEIGHT: f32 = 0.3;
/// 양쪽 검색 합의 보너스
pub const AGREEMENT_BONUS: f32 = 1.2;
/// 구조적 키가 없을 때 사용하는 콘텐츠 접두사 길이
const PREFIX_KEY_CHARS: usize = 100;

// ============================================================================
// Types
// ============================================================================

/// 검색 옵션
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchOptions {
    /// 최대 결과 수
    pub top_k: usize,
    /// 벡터 검색 최소 유사도
    pub threshold: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 30,
            threshold: 0.25,
        }
    }
}

/// 결과를 찾은 검색 방법
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMethod {
    /// 벡터 검색만
    Vector,
    /// 키워드 검색만
    Keyword,
    /// 양쪽 모두
    Hybrid,
}

impl SearchMethod {
    pub fn of(result: &SearchResult) -> Self {
        match (result.similarity.is_some(), result.text_rank.is_some()) {
            (true, true) => SearchMethod::Hybrid,
            (false, true) => SearchMethod::Keyword,
            _ => SearchMethod::Vector,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SearchMethod::Vector => "VEC",
            SearchMethod::Keyword => "KEY",
            SearchMethod::Hybrid => "HYB",
        }
    }
}

/// 퓨전 중복 제거 키
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FusionKey {
    /// 복합 source_id (`<parent>_chunk_<index>`)
    Structural(String),
    /// 콘텐츠 앞 100자
    Prefix(String),
}

impl FusionKey {
    fn of(result: &SearchResult) -> Self {
        if result.source_id.is_empty() {
            FusionKey::Prefix(result.content.chars().take(PREFIX_KEY_CHARS).collect())
        } else {
            FusionKey::Structural(result.source_id.clone())
        }
    }
}

// ============================================================================
// HybridRetriever
// ============================================================================

/// 하이브리드 검색기 (읽기 전용)
pub struct HybridRetriever {
    store: Arc<dyn DocumentStore>,
}

impl HybridRetriever {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// 하이브리드 검색
    ///
    /// # Arguments
    /// * `query_embedding` - 쿼리 임베딩 (호출자가 생성)
    /// * `query_text` - 원본 쿼리 텍스트
    /// * `keywords` - 추가 키워드
    /// * `options` - top_k / threshold
    ///
    /// # Returns
    /// combined_score 내림차순, 최대 top_k 개
    pub async fn search(
        &self,
        query_embedding: &[f32],
        query_text: &str,
        keywords: &[String],
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        // 두 검색은 서로 독립이므로 동시에 실행
        let (vector, keyword) = tokio::join!(
            self.store
                .vector_search(query_embedding, options.top_k, options.threshold),
            self.store.keyword_search(query_text, keywords, options.top_k),
        );

        let (vector_results, keyword_results) = match (vector, keyword) {
            (Err(v), Err(k)) => {
                tracing::error!("Both search paths failed: vector={}, keyword={}", v, k);
                return Err(RagError::RetrievalFailed(format!(
                    "vector search: {}; keyword search: {}",
                    v, k
                )));
            }
            (vector, keyword) => (degrade("vector", vector), degrade("keyword", keyword)),
        };

        tracing::debug!(
            "Hybrid search: {} vector, {} keyword candidates",
            vector_results.len(),
            keyword_results.len()
        );

        let mut fused = fuse(&vector_results, &keyword_results);
        fused.truncate(options.top_k);
        Ok(fused)
    }

    /// 쿼리 텍스트에서 리랭크된 컨텍스트까지 한 번에 조회
    ///
    /// 쿼리 분석 → 쿼리 임베딩 → 하이브리드 검색 → 리랭크
    pub async fn retrieve(
        &self,
        embedder: &dyn EmbeddingProvider,
        query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>> {
        let analysis = analyze(query);
        let embedding = embedder.embed_query(query).await?;

        let results = self
            .search(&embedding, query, &analysis.keywords, options)
            .await?;

        Ok(rerank(results, query, &analysis.entities))
    }
}

/// 실패한 검색 경로를 빈 결과로 대체
fn degrade(path: &str, result: Result<Vec<SearchResult>>) -> Vec<SearchResult> {
    match result {
        Ok(results) => results,
        Err(e) => {
            tracing::warn!("{} search failed, continuing without it: {}", path, e);
            Vec::new()
        }
    }
}

/// 벡터/키워드 결과 퓨전
///
/// 입력이 같으면 항상 같은 결과를 반환합니다.
/// 같은 키가 키워드 결과에 여러 번 나와도 점수는 한 번만 반영됩니다.
pub fn fuse(vector_results: &[SearchResult], keyword_results: &[SearchResult]) -> Vec<SearchResult> {
    let mut fused: Vec<SearchResult> = Vec::with_capacity(vector_results.len() + keyword_results.len());
    let mut index: HashMap<FusionKey, usize> = HashMap::new();

    for result in vector_results {
        let key = FusionKey::of(result);
        if index.contains_key(&key) {
            continue;
        }

        let similarity = result.similarity.unwrap_or(0.0);
        let mut entry = result.clone();
        entry.text_rank = None;
        entry.combined_score = similarity * SEMANTIC_WEIGHT;
        index.insert(key, fused.len());
        fused.push(entry);
    }

    let mut keyword_seen: HashSet<FusionKey> = HashSet::new();

    for result in keyword_results {
        let key = FusionKey::of(result);
        if !keyword_seen.insert(key.clone()) {
            continue;
        }

        let text_rank = result.text_rank.unwrap_or(0.0);
        let keyword_score = text_rank * KEYWORD_WEIGHT;

        match index.get(&key) {
            Some(&i) => {
                let existing = &mut fused[i];
                existing.combined_score = (existing.combined_score + keyword_score) * AGREEMENT_BONUS;
                existing.text_rank = Some(text_rank);
            }
            None => {
                let mut entry = result.clone();
                entry.similarity = None;
                entry.text_rank = Some(text_rank);
                entry.combined_score = keyword_score;
                index.insert(key, fused.len());
                fused.push(entry);
            }
        }
    }

    fused.sort_by(|a, b| {
        b.combined_score
            .partial_cmp(&a.combined_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused
}

// ============================================================================
// Tests
// ============================================================================
