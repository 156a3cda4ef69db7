//! 테스트 공용 더블 (결정적 임베더, 메모리 수집기, 고정 응답 저장소)

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::source::{Category, ContentDocument, ContentFetcher};

use super::store::{ChunkMetadata, DocumentStore, NewChunk, SearchResult, StoreStats, StoredChunk};

// ============================================================================
// Fixtures
// ============================================================================

pub fn document(source_id: &str, title: &str, content: &str) -> ContentDocument {
    ContentDocument {
        source_id: source_id.to_string(),
        title: title.to_string(),
        category: Category::Project,
        raw_content: content.to_string(),
        updated_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        source: "sanity".to_string(),
        url: None,
    }
}

pub fn result(source_id: &str, content: &str) -> SearchResult {
    let parent = source_id
        .rsplit_once("_chunk_")
        .map(|(p, _)| p)
        .unwrap_or(source_id)
        .to_string();

    SearchResult {
        source_id: source_id.to_string(),
        content: content.to_string(),
        metadata: ChunkMetadata {
            source: "sanity".to_string(),
            parent_source_id: parent,
            category: Category::Page,
            title: "Fixture".to_string(),
            url: None,
            updated_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            chunk_index: 0,
            total_chunks: 1,
        },
        similarity: None,
        text_rank: None,
        combined_score: 0.0,
        rank_score: None,
    }
}

// ============================================================================
// HashEmbedder
// ============================================================================

/// 단어 해시 버킷 기반 결정적 임베더
pub struct HashEmbedder {
    dimension: usize,
    /// 이 문자열이 포함된 텍스트는 임베딩 실패
    fail_marker: Option<String>,
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail_marker: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(marker: &str) -> Self {
        Self {
            fail_marker: Some(marker.to_string()),
            ..Self::new(32)
        }
    }

    /// embed/embed_batch 호출 수
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vectorize(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(marker) = &self.fail_marker {
            if text.contains(marker.as_str()) {
                return Err(RagError::Embedding(format!("refused text containing {}", marker)));
            }
        }

        let mut vector = vec![0.0f32; self.dimension];
        for word in text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty()) {
            let bucket = word
                .to_lowercase()
                .bytes()
                .fold(2166136261u32, |h, b| (h ^ b as u32).wrapping_mul(16777619));
            vector[bucket as usize % self.dimension] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        Ok(vector)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.vectorize(text)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        texts.iter().map(|t| self.vectorize(t)).collect()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "hash"
    }
}

// ============================================================================
// MemoryFetcher
// ============================================================================

/// 메모리 문서 목록 수집기
#[derive(Default)]
pub struct MemoryFetcher {
    documents: Mutex<HashMap<String, ContentDocument>>,
    fail: AtomicBool,
}

impl MemoryFetcher {
    pub fn new(documents: Vec<ContentDocument>) -> Self {
        let fetcher = Self::default();
        for doc in documents {
            fetcher.upsert(doc);
        }
        fetcher
    }

    pub fn upsert(&self, doc: ContentDocument) {
        self.documents
            .lock()
            .unwrap()
            .insert(doc.source_id.clone(), doc);
    }

    pub fn remove(&self, source_id: &str) {
        self.documents.lock().unwrap().remove(source_id);
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl ContentFetcher for MemoryFetcher {
    async fn fetch_all(&self) -> Result<Vec<ContentDocument>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(RagError::transport("memory", "source unavailable"));
        }
        let mut docs: Vec<ContentDocument> =
            self.documents.lock().unwrap().values().cloned().collect();
        docs.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(docs)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// StaticStore
// ============================================================================

/// 검색 결과가 고정된 읽기 전용 저장소
///
/// `None` 인 검색 경로는 항상 실패합니다.
pub struct StaticStore {
    vector: Option<Vec<SearchResult>>,
    keyword: Option<Vec<SearchResult>>,
}

impl StaticStore {
    pub fn new(vector: Vec<SearchResult>, keyword: Vec<SearchResult>) -> Self {
        Self {
            vector: Some(vector),
            keyword: Some(keyword),
        }
    }

    pub fn vector_fails(keyword: Vec<SearchResult>) -> Self {
        Self {
            vector: None,
            keyword: Some(keyword),
        }
    }

    pub fn both_fail() -> Self {
        Self {
            vector: None,
            keyword: None,
        }
    }

    fn read_only<T>() -> Result<T> {
        Err(RagError::InvalidInput("static store is read-only".to_string()))
    }
}

#[async_trait]
impl DocumentStore for StaticStore {
    async fn vector_search(&self, _embedding: &[f32], limit: usize, _threshold: f32) -> Result<Vec<SearchResult>> {
        let results = self
            .vector
            .clone()
            .ok_or_else(|| RagError::transport("vector", "index offline"))?;
        Ok(results.into_iter().take(limit).collect())
    }

    async fn keyword_search(&self, _query: &str, _keywords: &[String], limit: usize) -> Result<Vec<SearchResult>> {
        let results = self
            .keyword
            .clone()
            .ok_or_else(|| RagError::transport("keyword", "index offline"))?;
        Ok(results.into_iter().take(limit).collect())
    }

    async fn insert_many(&self, _chunks: &[NewChunk]) -> Result<Vec<StoredChunk>> {
        Self::read_only()
    }

    async fn find_by_source_id(&self, _source_id: &str) -> Result<Vec<StoredChunk>> {
        Ok(Vec::new())
    }

    async fn delete_by_source_id(&self, _source_id: &str) -> Result<usize> {
        Self::read_only()
    }

    async fn replace_source(&self, _source_id: &str, _chunks: &[NewChunk]) -> Result<Vec<StoredChunk>> {
        Self::read_only()
    }

    async fn list_source_ids(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn delete_all(&self) -> Result<usize> {
        Self::read_only()
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(StoreStats {
            chunk_count: 0,
            document_count: 0,
            total_content_bytes: 0,
            db_path: None,
        })
    }
}
