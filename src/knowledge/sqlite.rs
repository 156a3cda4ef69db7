//! SQLite Document Store - rusqlite 기반 청크/임베딩 저장소
//!
//! - 청크 텍스트, 메타데이터(JSON), 해시, 임베딩(f32 LE BLOB) 저장
//! - FTS5 키워드 검색 (트리거로 동기화, 없으면 LIKE 폴백)
//! - 벡터 검색은 전체 스캔 코사인 유사도 (포트폴리오 규모에 충분)
//!
//! 저장 위치: ~/.folio-rag/knowledge.db

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, Row, Transaction};

use super::store::{
    ChunkMetadata, DocumentStore, NewChunk, SearchResult, StoreStats, StoredChunk, Chunk,
};
use crate::embedding::cosine_similarity;
use crate::error::{RagError, Result};

/// 정확한 부분 문자열 일치의 text_rank
const EXACT_MATCH_RANK: f32 = 1.0;
/// LIKE 폴백 토큰 검색의 최대 text_rank
const LIKE_FALLBACK_MAX_RANK: f32 = 0.5;

const CHUNK_COLUMNS: &str = "id, source_id, chunk_index, total_chunks, content, metadata, \
                             embedding, content_hash, document_hash, last_synced";

// ============================================================================
// SqliteDocumentStore
// ============================================================================

/// SQLite 문서 저장소
pub struct SqliteDocumentStore {
    conn: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
    fts_enabled: bool,
}

impl SqliteDocumentStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Self::initialize(conn, Some(path.to_path_buf()))
    }

    /// 메모리 DB (테스트/일회성 인덱스용)
    pub fn open_in_memory() -> Result<Self> {
        Self::initialize(Connection::open_in_memory()?, None)
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// FTS5 사용 가능 여부
    pub fn fts_enabled(&self) -> bool {
        self.fts_enabled
    }

    /// 스키마 초기화
    fn initialize(conn: Connection, db_path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id TEXT NOT NULL UNIQUE,
                parent_source_id TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                total_chunks INTEGER NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL,
                embedding BLOB NOT NULL,
                content_hash TEXT NOT NULL,
                document_hash TEXT NOT NULL,
                last_synced TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_chunks_parent ON chunks(parent_source_id);",
        )?;

        // FTS5 가상 테이블 (키워드 검색용)
        // source: https://www.sqlite.org/fts5.html
        let fts_result = conn.execute(
            "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                title,
                content,
                content=chunks,
                content_rowid=id
            )",
            [],
        );

        let fts_enabled = match fts_result {
            Ok(_) => {
                conn.execute_batch(
                    r#"
                    CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
                        INSERT INTO chunks_fts(rowid, title, content)
                        VALUES (new.id, new.title, new.content);
                    END;

                    CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
                        INSERT INTO chunks_fts(chunks_fts, rowid, title, content)
                        VALUES('delete', old.id, old.title, old.content);
                    END;

                    CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
                        INSERT INTO chunks_fts(chunks_fts, rowid, title, content)
                        VALUES('delete', old.id, old.title, old.content);
                        INSERT INTO chunks_fts(rowid, title, content)
                        VALUES (new.id, new.title, new.content);
                    END;
                    "#,
                )?;
                true
            }
            Err(e) => {
                tracing::warn!("FTS5 not available, falling back to LIKE search: {}", e);
                false
            }
        };

        tracing::debug!("Document store initialized at {:?}", db_path);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
            fts_enabled,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RagError::Lock(e.to_string()))
    }

    /// FTS5 인덱스 리빌드
    pub fn rebuild_fts_index(&self) -> Result<()> {
        if !self.fts_enabled {
            return Ok(());
        }
        let conn = self.lock()?;
        conn.execute("INSERT INTO chunks_fts(chunks_fts) VALUES('rebuild')", [])?;
        tracing::info!("Rebuilt FTS5 index");
        Ok(())
    }

    /// 정확한 부분 문자열 검색 (대소문자 무시)
    fn search_exact(conn: &Connection, query: &str, limit: usize) -> Result<Vec<(i64, SearchResult)>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM chunks
             WHERE instr(lower(content), lower(?1)) > 0
             ORDER BY id
             LIMIT ?2",
            CHUNK_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![query, limit as i64], |row| {
                let stored = row_to_stored(row)?;
                Ok((stored.id, to_search_result(stored, None, Some(EXACT_MATCH_RANK))))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    /// FTS5 토큰 검색 (BM25)
    fn search_fts(conn: &Connection, terms: &[String], limit: usize) -> Result<Vec<(i64, SearchResult)>> {
        let match_query = fts5_or_query(terms);
        if match_query.is_empty() {
            return Ok(vec![]);
        }

        let mut stmt = conn.prepare(
            "SELECT c.id, c.source_id, c.chunk_index, c.total_chunks, c.content, c.metadata,
                    c.embedding, c.content_hash, c.document_hash, c.last_synced,
                    bm25(chunks_fts) AS score
             FROM chunks_fts
             JOIN chunks c ON c.id = chunks_fts.rowid
             WHERE chunks_fts MATCH ?1
             ORDER BY bm25(chunks_fts)
             LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![match_query, limit as i64], |row| {
                let stored = row_to_stored(row)?;
                let bm25: f64 = row.get(10)?;
                // BM25 스코어 정규화 (음수 -> 0~1)
                let rank = (1.0 / (1.0 + bm25.abs())) as f32;
                Ok((stored.id, to_search_result(stored, None, Some(rank))))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    /// LIKE 토큰 검색 (FTS5 사용 불가 시 폴백)
    fn search_like(conn: &Connection, terms: &[String], limit: usize) -> Result<Vec<(i64, SearchResult)>> {
        if terms.is_empty() {
            return Ok(vec![]);
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM chunks WHERE LOWER(content) LIKE ?1 OR LOWER(title) LIKE ?1",
            CHUNK_COLUMNS
        ))?;

        let mut hits: HashMap<i64, (usize, StoredChunk)> = HashMap::new();
        for term in terms {
            let pattern = format!("%{}%", term.to_lowercase());
            let rows = stmt
                .query_map(params![pattern], row_to_stored)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            for stored in rows {
                hits.entry(stored.id).or_insert((0, stored)).0 += 1;
            }
        }

        let total = terms.len() as f32;
        let mut results: Vec<(i64, SearchResult)> = hits
            .into_values()
            .map(|(count, stored)| {
                let rank = LIKE_FALLBACK_MAX_RANK * count as f32 / total;
                (stored.id, to_search_result(stored, None, Some(rank)))
            })
            .collect();

        results.sort_by(|a, b| {
            b.1.text_rank
                .partial_cmp(&a.1.text_rank)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        results.truncate(limit);
        Ok(results)
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn vector_search(
        &self,
        query_embedding: &[f32],
        limit: usize,
        threshold: f32,
    ) -> Result<Vec<SearchResult>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!("SELECT {} FROM chunks", CHUNK_COLUMNS))?;
        let rows = stmt
            .query_map([], row_to_stored)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut results = Vec::new();
        for stored in rows {
            let similarity = cosine_similarity(query_embedding, &stored.embedding)?;
            if similarity >= threshold {
                results.push(to_search_result(stored, Some(similarity), None));
            }
        }

        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        Ok(results)
    }

    async fn keyword_search(
        &self,
        query_text: &str,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<SearchResult>> {
        let conn = self.lock()?;
        let query = query_text.trim();

        let mut results = Vec::new();
        let mut seen = HashSet::new();

        // 1. 정확한 부분 문자열 일치 (최우선)
        if !query.is_empty() {
            for (id, result) in Self::search_exact(&conn, query, limit)? {
                if seen.insert(id) {
                    results.push(result);
                }
            }
        }

        // 2. 토큰 기반 검색 (쿼리 토큰 + 키워드)
        let terms = search_terms(query, keywords);
        let token_hits = if self.fts_enabled {
            Self::search_fts(&conn, &terms, limit)?
        } else {
            Self::search_like(&conn, &terms, limit)?
        };

        for (id, result) in token_hits {
            if seen.insert(id) {
                results.push(result);
            }
        }

        results.truncate(limit);
        Ok(results)
    }

    async fn insert_many(&self, chunks: &[NewChunk]) -> Result<Vec<StoredChunk>> {
        if chunks.is_empty() {
            return Ok(vec![]);
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let stored = insert_chunks(&tx, chunks)?;
        tx.commit()?;

        tracing::info!("Inserted {} chunks", stored.len());
        Ok(stored)
    }

    async fn find_by_source_id(&self, parent_source_id: &str) -> Result<Vec<StoredChunk>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM chunks WHERE parent_source_id = ?1 ORDER BY chunk_index",
            CHUNK_COLUMNS
        ))?;

        let rows = stmt
            .query_map(params![parent_source_id], row_to_stored)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }

    async fn delete_by_source_id(&self, parent_source_id: &str) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM chunks WHERE parent_source_id = ?1",
            params![parent_source_id],
        )?;
        tx.commit()?;

        tracing::debug!("Deleted {} chunks for {}", deleted, parent_source_id);
        Ok(deleted)
    }

    async fn replace_source(
        &self,
        parent_source_id: &str,
        chunks: &[NewChunk],
    ) -> Result<Vec<StoredChunk>> {
        if let Some(foreign) = chunks
            .iter()
            .find(|c| c.chunk.metadata.parent_source_id != parent_source_id)
        {
            return Err(RagError::InvalidInput(format!(
                "chunk {} does not belong to {}",
                foreign.chunk.source_id(),
                parent_source_id
            )));
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM chunks WHERE parent_source_id = ?1",
            params![parent_source_id],
        )?;
        let stored = insert_chunks(&tx, chunks)?;
        tx.commit()?;

        tracing::info!(
            "Replaced chunks for {} ({} removed, {} inserted)",
            parent_source_id,
            deleted,
            stored.len()
        );
        Ok(stored)
    }

    async fn list_source_ids(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT DISTINCT parent_source_id FROM chunks ORDER BY parent_source_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    async fn delete_all(&self) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let deleted = tx.execute("DELETE FROM chunks", [])?;
        tx.commit()?;

        tracing::warn!("Deleted all {} chunks", deleted);
        Ok(deleted)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;

        let (chunk_count, document_count, total_bytes): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT parent_source_id), COALESCE(SUM(LENGTH(CAST(content AS BLOB))), 0)
             FROM chunks",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(StoreStats {
            chunk_count: chunk_count as usize,
            document_count: document_count as usize,
            total_content_bytes: total_bytes as usize,
            db_path: self.db_path.clone(),
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 트랜잭션 안에서 청크 삽입
///
/// 하나라도 실패하면 에러를 반환하고, 커밋되지 않은 트랜잭션은 drop 시 롤백됩니다.
fn insert_chunks(tx: &Transaction<'_>, chunks: &[NewChunk]) -> Result<Vec<StoredChunk>> {
    let now = Utc::now();
    let mut stmt = tx.prepare(
        "INSERT INTO chunks (source_id, parent_source_id, chunk_index, total_chunks, title,
                             content, metadata, embedding, content_hash, document_hash, last_synced)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;

    let mut stored = Vec::with_capacity(chunks.len());
    for new in chunks {
        let chunk = &new.chunk;
        let source_id = chunk.source_id();
        let metadata = serde_json::to_string(&chunk.metadata)?;

        stmt.execute(params![
            source_id,
            chunk.metadata.parent_source_id,
            chunk.index as i64,
            chunk.total_chunks as i64,
            chunk.metadata.title,
            chunk.content,
            metadata,
            encode_embedding(&new.embedding),
            new.content_hash,
            new.document_hash,
            now.to_rfc3339(),
        ])?;

        stored.push(StoredChunk {
            id: tx.last_insert_rowid(),
            source_id,
            chunk: chunk.clone(),
            embedding: new.embedding.clone(),
            content_hash: new.content_hash.clone(),
            document_hash: new.document_hash.clone(),
            last_synced: now,
        });
    }

    Ok(stored)
}

/// `CHUNK_COLUMNS` 순서의 행을 StoredChunk로 변환
fn row_to_stored(row: &Row<'_>) -> rusqlite::Result<StoredChunk> {
    let metadata_json: String = row.get(5)?;
    let metadata: ChunkMetadata = serde_json::from_str(&metadata_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    let embedding: Vec<u8> = row.get(6)?;

    Ok(StoredChunk {
        id: row.get(0)?,
        source_id: row.get(1)?,
        chunk: Chunk {
            index: row.get::<_, i64>(2)? as usize,
            total_chunks: row.get::<_, i64>(3)? as usize,
            content: row.get(4)?,
            metadata,
        },
        embedding: decode_embedding(&embedding),
        content_hash: row.get(7)?,
        document_hash: row.get(8)?,
        last_synced: parse_datetime(9, &row.get::<_, String>(9)?)?,
    })
}

fn to_search_result(
    stored: StoredChunk,
    similarity: Option<f32>,
    text_rank: Option<f32>,
) -> SearchResult {
    SearchResult {
        source_id: stored.source_id,
        content: stored.chunk.content,
        metadata: stored.chunk.metadata,
        similarity,
        text_rank,
        combined_score: 0.0,
        rank_score: None,
    }
}

/// f32 벡터 -> little-endian 바이트
fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// little-endian 바이트 -> f32 벡터
fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(column: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

/// 쿼리 토큰 + 키워드를 검색어 목록으로 정리
///
/// 특수 문자를 제거하고 소문자로 통일하며 중복은 제거합니다.
fn search_terms(query: &str, keywords: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();

    query
        .split_whitespace()
        .chain(keywords.iter().flat_map(|k| k.split_whitespace()))
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// FTS5 OR 쿼리 생성 (각 토큰을 따옴표로 감싸 구문 연산자 무력화)
/// source: https://www.sqlite.org/fts5.html#full_text_query_syntax
fn fts5_or_query(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| format!("\"{}\"", t.replace('"', "")))
        .collect::<Vec<_>>()
        .join(" OR ")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::hasher;
    use crate::source::Category;
    use tempfile::TempDir;

    fn create_test_store() -> (TempDir, SqliteDocumentStore) {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("test.db");
        let store = SqliteDocumentStore::open(&db_path).unwrap();
        (dir, store)
    }

    fn new_chunk(parent: &str, index: usize, total: usize, content: &str, embedding: Vec<f32>) -> NewChunk {
        NewChunk {
            chunk: Chunk {
                content: content.to_string(),
                index,
                total_chunks: total,
                metadata: ChunkMetadata {
                    source: "sanity".to_string(),
                    parent_source_id: parent.to_string(),
                    category: Category::Project,
                    title: format!("Title {}", parent),
                    url: None,
                    updated_at: Utc::now(),
                    chunk_index: index,
                    total_chunks: total,
                },
            },
            embedding,
            content_hash: hasher::hash(content),
            document_hash: hasher::hash(parent),
        }
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let (_dir, store) = create_test_store();

        let stored = store
            .insert_many(&[
                new_chunk("doc-a", 0, 2, "first chunk", vec![1.0, 0.0]),
                new_chunk("doc-a", 1, 2, "second chunk", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[1].source_id, "doc-a_chunk_1");

        let found = store.find_by_source_id("doc-a").await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].chunk.content, "first chunk");
        assert_eq!(found[1].embedding, vec![0.0, 1.0]);
        assert_eq!(found[0].parent_source_id(), "doc-a");
        assert_eq!(found[0].content_hash, hasher::hash("first chunk"));

        assert!(store.find_by_source_id("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_batch_is_rolled_back() {
        let (_dir, store) = create_test_store();
        store
            .insert_many(&[new_chunk("doc-a", 0, 1, "existing", vec![1.0])])
            .await
            .unwrap();

        // doc-b_chunk_0 은 새 행이지만 doc-a_chunk_0 이 UNIQUE 위반
        let result = store
            .insert_many(&[
                new_chunk("doc-b", 0, 1, "fresh", vec![1.0]),
                new_chunk("doc-a", 0, 1, "duplicate", vec![1.0]),
            ])
            .await;

        assert!(matches!(result, Err(RagError::Store(_))));
        assert!(store.find_by_source_id("doc-b").await.unwrap().is_empty());
        assert_eq!(store.stats().await.unwrap().chunk_count, 1);
    }

    #[tokio::test]
    async fn test_delete_and_replace() {
        let (_dir, store) = create_test_store();
        store
            .insert_many(&[
                new_chunk("doc-a", 0, 2, "a0", vec![1.0]),
                new_chunk("doc-a", 1, 2, "a1", vec![1.0]),
                new_chunk("doc-b", 0, 1, "b0", vec![1.0]),
            ])
            .await
            .unwrap();

        let replaced = store
            .replace_source("doc-a", &[new_chunk("doc-a", 0, 1, "a0 v2", vec![0.5])])
            .await
            .unwrap();
        assert_eq!(replaced.len(), 1);

        let found = store.find_by_source_id("doc-a").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].chunk.content, "a0 v2");

        assert_eq!(store.delete_by_source_id("doc-b").await.unwrap(), 1);
        assert_eq!(store.delete_by_source_id("doc-b").await.unwrap(), 0);
        assert_eq!(store.list_source_ids().await.unwrap(), vec!["doc-a".to_string()]);

        assert_eq!(store.delete_all().await.unwrap(), 1);
        assert_eq!(store.stats().await.unwrap().chunk_count, 0);
    }

    #[tokio::test]
    async fn test_replace_rejects_foreign_chunks() {
        let (_dir, store) = create_test_store();
        let result = store
            .replace_source("doc-a", &[new_chunk("doc-b", 0, 1, "b0", vec![1.0])])
            .await;
        assert!(matches!(result, Err(RagError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_vector_search_threshold_and_order() {
        let (_dir, store) = create_test_store();
        store
            .insert_many(&[
                new_chunk("exact", 0, 1, "exact", vec![1.0, 0.0]),
                new_chunk("close", 0, 1, "close", vec![0.9, 0.1]),
                new_chunk("orthogonal", 0, 1, "orthogonal", vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let results = store.vector_search(&[1.0, 0.0], 10, 0.25).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source_id, "exact_chunk_0");
        assert_eq!(results[1].source_id, "close_chunk_0");
        assert!(results[0].similarity >= results[1].similarity);
        assert!(results.iter().all(|r| r.similarity.unwrap() >= 0.25));

        let limited = store.vector_search(&[1.0, 0.0], 1, 0.0).await.unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_vector_search_dimension_mismatch() {
        let (_dir, store) = create_test_store();
        store
            .insert_many(&[new_chunk("doc", 0, 1, "x", vec![1.0, 0.0])])
            .await
            .unwrap();
        let result = store.vector_search(&[1.0, 0.0, 0.0], 10, 0.0).await;
        assert!(matches!(result, Err(RagError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_keyword_search_exact_before_tokens() {
        let (_dir, store) = create_test_store();
        store
            .insert_many(&[
                new_chunk("tokens", 0, 1, "Bonita is pretty and Casa means house", vec![1.0]),
                new_chunk("exact", 0, 1, "The Casa Bonita restoration project", vec![1.0]),
                new_chunk("none-1", 0, 1, "Unrelated text about databases", vec![1.0]),
                new_chunk("none-2", 0, 1, "Notes on async Rust services", vec![1.0]),
                new_chunk("none-3", 0, 1, "A design system for portfolios", vec![1.0]),
                new_chunk("none-4", 0, 1, "Interview transcript about hiring", vec![1.0]),
            ])
            .await
            .unwrap();

        let results = store.keyword_search("casa bonita", &[], 10).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source_id, "exact_chunk_0");
        assert_eq!(results[0].text_rank, Some(EXACT_MATCH_RANK));
        assert_eq!(results[1].source_id, "tokens_chunk_0");
        assert!(results[1].text_rank.unwrap() < EXACT_MATCH_RANK);
    }

    #[tokio::test]
    async fn test_keyword_search_uses_keywords() {
        let (_dir, store) = create_test_store();
        store
            .insert_many(&[new_chunk("db", 0, 1, "Postgres migration notes", vec![1.0])])
            .await
            .unwrap();

        let results = store
            .keyword_search("what did you do with", &["postgres".to_string()], 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].similarity.is_none());
    }

    #[tokio::test]
    async fn test_keyword_search_empty_query() {
        let (_dir, store) = create_test_store();
        store
            .insert_many(&[new_chunk("doc", 0, 1, "anything", vec![1.0])])
            .await
            .unwrap();
        assert!(store.keyword_search("  ", &[], 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_like_fallback_ranks_by_term_hits() {
        let store = SqliteDocumentStore::open_in_memory().unwrap();
        store
            .insert_many(&[
                new_chunk("one", 0, 1, "casa only", vec![1.0]),
                new_chunk("two", 0, 1, "casa and bonita", vec![1.0]),
            ])
            .await
            .unwrap();

        let conn = store.lock().unwrap();
        let terms = vec!["casa".to_string(), "bonita".to_string()];
        let results = SqliteDocumentStore::search_like(&conn, &terms, 10).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].1.source_id, "two_chunk_0");
        assert_eq!(results[0].1.text_rank, Some(LIKE_FALLBACK_MAX_RANK));
    }

    #[tokio::test]
    async fn test_stats() {
        let (_dir, store) = create_test_store();
        store
            .insert_many(&[
                new_chunk("doc-a", 0, 2, "12345", vec![1.0]),
                new_chunk("doc-a", 1, 2, "67890", vec![1.0]),
            ])
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.chunk_count, 2);
        assert_eq!(stats.document_count, 1);
        assert_eq!(stats.total_content_bytes, 10);
        assert!(stats.db_path.is_some());
        assert!(store.fts_enabled());
        store.rebuild_fts_index().unwrap();
    }

    #[tokio::test]
    async fn test_corrupt_last_synced_is_an_error() {
        let (_dir, store) = create_test_store();
        store
            .insert_many(&[new_chunk("doc-a", 0, 1, "body", vec![1.0])])
            .await
            .unwrap();

        {
            let conn = store.lock().unwrap();
            conn.execute("UPDATE chunks SET last_synced = 'yesterday-ish'", [])
                .unwrap();
        }

        let result = store.find_by_source_id("doc-a").await;
        assert!(matches!(
            result,
            Err(RagError::Store(rusqlite::Error::FromSqlConversionFailure(9, _, _)))
        ));
    }

    #[test]
    fn test_embedding_encoding() {
        let v = vec![0.25, -1.5, 3.0];
        assert_eq!(decode_embedding(&encode_embedding(&v)), v);
    }

    #[test]
    fn test_search_terms() {
        let terms = search_terms("Casa Bonita: casa?", &["Trey Parker".to_string()]);
        assert_eq!(terms, vec!["casa", "bonita", "trey", "parker"]);
    }

    #[test]
    fn test_fts5_or_query() {
        let terms = vec!["casa".to_string(), "bon\"ita".to_string()];
        assert_eq!(fts5_or_query(&terms), "\"casa\" OR \"bonita\"");
        assert_eq!(fts5_or_query(&[]), "");
    }
}
