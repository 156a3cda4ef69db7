//! 설정 - 환경변수 기반 런타임 설정
//!
//! 모든 값은 기본값을 가지며, 환경변수로 덮어쓸 수 있습니다.
//!
//! | 환경변수 | 기본값 |
//! |----------|--------|
//! | `FOLIO_RAG_DATA_DIR` | `<data_local_dir>/.folio-rag` |
//! | `FOLIO_RAG_CHUNK_SIZE` | 500 |
//! | `FOLIO_RAG_CHUNK_OVERLAP` | 50 |
//! | `FOLIO_RAG_TOP_K` | 30 |
//! | `FOLIO_RAG_THRESHOLD` | 0.25 |
//! | `FOLIO_RAG_EMBED_DIMENSION` | 768 |

use std::path::PathBuf;
use std::str::FromStr;

use crate::embedding::DEFAULT_DIMENSION;
use crate::error::{RagError, Result};
use crate::knowledge::{ChunkConfig, SearchOptions};

/// 데이터 디렉토리 경로 (~/.folio-rag/)
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("FOLIO_RAG_DATA_DIR") {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".folio-rag")
}

/// 런타임 설정
#[derive(Debug, Clone)]
pub struct RagConfig {
    /// 데이터 디렉토리 (SQLite 파일 위치)
    pub data_dir: PathBuf,
    /// 청킹 설정
    pub chunk: ChunkConfig,
    /// 검색 기본값
    pub search: SearchOptions,
    /// 임베딩 차원
    pub embed_dimension: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            chunk: ChunkConfig::default(),
            search: SearchOptions::default(),
            embed_dimension: DEFAULT_DIMENSION,
        }
    }
}

impl RagConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let chunk_size = env_or("FOLIO_RAG_CHUNK_SIZE", defaults.chunk.size())?;
        let overlap = env_or("FOLIO_RAG_CHUNK_OVERLAP", defaults.chunk.overlap())?;
        let chunk = ChunkConfig::new(chunk_size, overlap)?;

        let search = SearchOptions {
            top_k: env_or("FOLIO_RAG_TOP_K", defaults.search.top_k)?,
            threshold: env_or("FOLIO_RAG_THRESHOLD", defaults.search.threshold)?,
        };

        Ok(Self {
            data_dir: defaults.data_dir,
            chunk,
            search,
            embed_dimension: env_or("FOLIO_RAG_EMBED_DIMENSION", defaults.embed_dimension)?,
        })
    }

    /// SQLite DB 파일 경로
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("knowledge.db")
    }
}

/// 환경변수를 파싱하고, 없으면 기본값 사용
fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| RagError::Config(format!("{}={:?}: {}", key, raw, e))),
        _ => Ok(default),
    }
}
