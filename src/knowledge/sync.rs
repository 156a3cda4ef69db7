//! Sync Engine - 콘텐츠 소스와 저장소 동기화
//!
//! 문서마다 해시를 비교해 변경된 문서만 다시 청킹/임베딩합니다.
//!
//! | 상태 | 조건 | 동작 |
//! |------|------|------|
//! | Added | 저장된 청크 없음 | 청킹 + 임베딩 + 삽입 |
//! | Updated | 문서 해시 불일치 | 청킹 + 임베딩 + 청크 세트 교체 |
//! | Unchanged | 문서 해시 일치 | 쓰기 없음 |
//! | Deleted | 소스에서 사라짐 | 청크 삭제 |
//! | Skipped | 청킹할 텍스트 없음 | 기존 청크만 삭제 |
//!
//! 문서 하나의 실패는 `failures` 에 기록하고 다음 문서로 넘어갑니다.
//! 소스 조회 자체가 실패하면 전체 실행이 중단됩니다.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::source::{ContentDocument, ContentFetcher};

use super::chunker::WindowChunker;
use super::hasher::{hash, hash_document, hashes_match};
use super::store::{Chunk, DocumentStore, NewChunk};

// ============================================================================
// Types
// ============================================================================

/// 문서별 동기화 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Added,
    Updated,
    Unchanged,
    Deleted,
    Skipped,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SyncAction::Added => "added",
            SyncAction::Updated => "updated",
            SyncAction::Unchanged => "unchanged",
            SyncAction::Deleted => "deleted",
            SyncAction::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

/// 변경 로그 항목
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeLogEntry {
    pub source_id: String,
    pub title: String,
    pub action: SyncAction,
    pub chunk_count: usize,
}

/// 문서별 실패 기록
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncFailure {
    pub source_id: String,
    pub title: String,
    pub error: String,
}

/// 동기화 실행 요약
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub skipped: usize,
    /// 이번 실행에서 쓴 청크 수
    pub total_chunks: usize,
    pub changes: Vec<ChangeLogEntry>,
    pub failures: Vec<SyncFailure>,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncResult {
    fn new(dry_run: bool) -> Self {
        let now = Utc::now();
        Self {
            added: 0,
            updated: 0,
            deleted: 0,
            unchanged: 0,
            skipped: 0,
            total_chunks: 0,
            changes: Vec::new(),
            failures: Vec::new(),
            dry_run,
            started_at: now,
            finished_at: now,
        }
    }

    fn record(&mut self, source_id: &str, title: &str, action: SyncAction, chunk_count: usize) {
        match action {
            SyncAction::Added => {
                self.added += 1;
                self.total_chunks += chunk_count;
            }
            SyncAction::Updated => {
                self.updated += 1;
                self.total_chunks += chunk_count;
            }
            SyncAction::Unchanged => self.unchanged += 1,
            SyncAction::Deleted => self.deleted += 1,
            SyncAction::Skipped => self.skipped += 1,
        }

        self.changes.push(ChangeLogEntry {
            source_id: source_id.to_string(),
            title: title.to_string(),
            action,
            chunk_count,
        });
    }

    fn record_failure(&mut self, source_id: &str, title: &str, error: &RagError) {
        tracing::warn!("Sync failed for {} ({}): {}", source_id, title, error);
        self.failures.push(SyncFailure {
            source_id: source_id.to_string(),
            title: title.to_string(),
            error: error.to_string(),
        });
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }

    /// 처리한 문서 수 (실패 제외)
    pub fn processed(&self) -> usize {
        self.changes.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Added/Updated/Deleted/Skipped 항목만
    pub fn effective_changes(&self) -> impl Iterator<Item = &ChangeLogEntry> {
        self.changes
            .iter()
            .filter(|c| c.action != SyncAction::Unchanged)
    }
}

/// 동기화 옵션
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// 소스에 없는 저장 문서 삭제
    pub prune_missing: bool,
    /// 분류만 하고 저장소/임베딩 API는 호출하지 않음
    pub dry_run: bool,
}

// ============================================================================
// SyncEngine
// ============================================================================

/// 동기화 엔진 (저장소의 유일한 쓰기 주체)
pub struct SyncEngine {
    fetcher: Arc<dyn ContentFetcher>,
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chunker: WindowChunker,
}

impl SyncEngine {
    pub fn new(
        fetcher: Arc<dyn ContentFetcher>,
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            fetcher,
            store,
            embedder,
            chunker: WindowChunker::with_defaults(),
        }
    }

    pub fn with_chunker(mut self, chunker: WindowChunker) -> Self {
        self.chunker = chunker;
        self
    }

    /// 전체 동기화
    pub async fn full_sync(&self, options: &SyncOptions) -> Result<SyncResult> {
        tracing::info!("Full sync from {}", self.fetcher.name());
        let documents = self.fetcher.fetch_all().await?;
        self.sync_documents(documents, options).await
    }

    /// 단일 문서 동기화
    pub async fn sync_one(&self, source_id: &str) -> Result<SyncResult> {
        self.sync_one_with(source_id, &SyncOptions::default()).await
    }

    /// 단일 문서 동기화 (옵션 지정)
    ///
    /// 소스에서 문서가 사라졌고 저장된 청크가 있으면 Deleted 로 처리합니다.
    pub async fn sync_one_with(&self, source_id: &str, options: &SyncOptions) -> Result<SyncResult> {
        let mut result = SyncResult::new(options.dry_run);

        match self.fetcher.fetch_one(source_id).await? {
            Some(doc) => match self.sync_document(&doc, options.dry_run).await {
                Ok((action, count)) => result.record(&doc.source_id, &doc.title, action, count),
                Err(e) => result.record_failure(&doc.source_id, &doc.title, &e),
            },
            None => match self.delete_document(source_id, options.dry_run).await {
                Ok(Some((title, count))) => {
                    result.record(source_id, &title, SyncAction::Deleted, count)
                }
                Ok(None) => tracing::info!("{} not found in source or store", source_id),
                Err(e) => result.record_failure(source_id, "", &e),
            },
        }

        Ok(result.finish())
    }

    /// 전체 재수집 (모든 청크 삭제 후 전체 동기화)
    ///
    /// 소스 조회가 성공한 뒤에만 기존 데이터를 지웁니다.
    pub async fn reingest_all(&self) -> Result<SyncResult> {
        let documents = self.fetcher.fetch_all().await?;

        let removed = self.store.delete_all().await?;
        tracing::info!("Cleared {} chunks for full reingestion", removed);

        self.sync_documents(documents, &SyncOptions::default()).await
    }

    async fn sync_documents(
        &self,
        documents: Vec<ContentDocument>,
        options: &SyncOptions,
    ) -> Result<SyncResult> {
        let mut result = SyncResult::new(options.dry_run);
        let mut fetched: HashSet<&str> = HashSet::with_capacity(documents.len());

        for doc in &documents {
            fetched.insert(doc.source_id.as_str());

            match self.sync_document(doc, options.dry_run).await {
                Ok((action, count)) => result.record(&doc.source_id, &doc.title, action, count),
                Err(e) => result.record_failure(&doc.source_id, &doc.title, &e),
            }
        }

        if options.prune_missing {
            let stored = self.store.list_source_ids().await?;

            for source_id in stored.iter().filter(|id| !fetched.contains(id.as_str())) {
                match self.delete_document(source_id, options.dry_run).await {
                    Ok(Some((title, count))) => {
                        result.record(source_id, &title, SyncAction::Deleted, count)
                    }
                    Ok(None) => {}
                    Err(e) => result.record_failure(source_id, "", &e),
                }
            }
        }

        let result = result.finish();
        tracing::info!(
            "Sync complete: {} added, {} updated, {} unchanged, {} deleted, {} skipped, {} failed ({} chunks)",
            result.added,
            result.updated,
            result.unchanged,
            result.deleted,
            result.skipped,
            result.failures.len(),
            result.total_chunks
        );
        Ok(result)
    }

    /// 문서 하나 동기화
    ///
    /// 임베딩이 모두 성공한 뒤에만 저장소에 씁니다.
    async fn sync_document(&self, doc: &ContentDocument, dry_run: bool) -> Result<(SyncAction, usize)> {
        let existing = self.store.find_by_source_id(&doc.source_id).await?;
        let document_hash = self.document_hash(doc);

        let pieces: Vec<String> = self
            .chunker
            .chunks(&doc.raw_content)
            .map(str::to_string)
            .collect();

        if pieces.is_empty() {
            if !existing.is_empty() && !dry_run {
                self.store.delete_by_source_id(&doc.source_id).await?;
            }
            tracing::debug!("{} has no chunkable text", doc.source_id);
            return Ok((SyncAction::Skipped, 0));
        }

        let action = match existing.first() {
            None => SyncAction::Added,
            Some(first)
                if hashes_match(&first.document_hash, &document_hash)
                    && existing.len() == first.chunk.total_chunks =>
            {
                return Ok((SyncAction::Unchanged, existing.len()));
            }
            Some(_) => SyncAction::Updated,
        };

        if dry_run {
            return Ok((action, pieces.len()));
        }

        let chunks = Chunk::from_document(doc, pieces);
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        if embeddings.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings, got {}",
                chunks.len(),
                embeddings.len()
            )));
        }

        let new_chunks: Vec<NewChunk> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| NewChunk {
                content_hash: hash(&chunk.content),
                chunk,
                embedding,
                document_hash: document_hash.clone(),
            })
            .collect();

        let stored = match action {
            SyncAction::Added => self.store.insert_many(&new_chunks).await?,
            _ => self.store.replace_source(&doc.source_id, &new_chunks).await?,
        };

        tracing::debug!("{} {} ({} chunks)", action, doc.source_id, stored.len());
        Ok((action, stored.len()))
    }

    /// 문서 해시 (콘텐츠 + 메타데이터 + 인덱싱 설정)
    ///
    /// 청크 크기/겹침이나 임베딩 모델/차원이 바뀌면 모든 문서가 Updated 가 됩니다.
    fn document_hash(&self, doc: &ContentDocument) -> String {
        let config = self.chunker.config();
        let metadata = serde_json::json!({
            "document": doc.hash_metadata(),
            "index": {
                "chunk_size": config.size(),
                "chunk_overlap": config.overlap(),
                "embedder": self.embedder.name(),
                "dimension": self.embedder.dimension(),
            },
        });
        hash_document(&doc.raw_content, &metadata)
    }

    /// 저장된 문서 삭제, 없으면 None
    async fn delete_document(&self, source_id: &str, dry_run: bool) -> Result<Option<(String, usize)>> {
        let existing = self.store.find_by_source_id(source_id).await?;
        let Some(first) = existing.first() else {
            return Ok(None);
        };
        let title = first.chunk.metadata.title.clone();

        let count = if dry_run {
            existing.len()
        } else {
            self.store.delete_by_source_id(source_id).await?
        };

        Ok(Some((title, count)))
    }
}

// ============================================================================
// Tests
// ============================================================================
