//! Text Chunking Module
//!
//! 고정 크기 윈도우를 겹치게 이동하며 텍스트를 분할합니다.
//! 크기와 오버랩은 문자(char) 단위이며 UTF-8 경계를 넘지 않습니다.

use crate::error::{RagError, Result};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 기본 청크 크기 (문자 수)
pub const DEFAULT_CHUNK_SIZE: usize = 500;
/// 기본 오버랩 크기 (문자 수)
pub const DEFAULT_CHUNK_OVERLAP: usize = 50;

/// 청킹 설정
///
/// `overlap < size` 가 보장된 값만 생성할 수 있습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    size: usize,
    overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkConfig {
    /// 설정 생성 (검증 포함)
    ///
    /// `size == 0` 이거나 `overlap >= size` 이면 윈도우가 전진하지 못하므로 거부합니다.
    pub fn new(size: usize, overlap: usize) -> Result<Self> {
        if size == 0 {
            return Err(RagError::InvalidInput(
                "chunk size must be greater than zero".to_string(),
            ));
        }
        if overlap >= size {
            return Err(RagError::InvalidInput(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                overlap, size
            )));
        }
        Ok(Self { size, overlap })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// 윈도우 이동 폭 (size - overlap, 항상 1 이상)
    pub fn step(&self) -> usize {
        self.size - self.overlap
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// WindowChunker
// ============================================================================

/// 고정 크기 슬라이딩 윈도우 청커
///
/// 1. offset 0에서 시작해 `[start, start + size)` 를 잘라냅니다.
/// 2. trim 후 비어 있으면 버립니다.
/// 3. `size - overlap` 만큼 전진합니다.
/// 4. 윈도우가 텍스트 끝에 닿으면 종료합니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowChunker {
    config: ChunkConfig,
}

impl WindowChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 기본 설정(500/50)으로 생성
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// 지연 평가 청크 이터레이터
    ///
    /// 호출할 때마다 처음부터 다시 시작하는 새 이터레이터를 반환합니다.
    pub fn chunks<'a>(&self, text: &'a str) -> WindowChunks<'a> {
        WindowChunks {
            text,
            pos: 0,
            size: self.config.size,
            step: self.config.step(),
            done: false,
        }
    }
}

impl Chunker for WindowChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        self.chunks(text).map(str::to_string).collect()
    }

    fn name(&self) -> &'static str {
        "WindowChunker"
    }
}

/// [`WindowChunker::chunks`] 가 반환하는 이터레이터
#[derive(Debug, Clone)]
pub struct WindowChunks<'a> {
    text: &'a str,
    /// 다음 윈도우 시작 (바이트 오프셋)
    pos: usize,
    size: usize,
    step: usize,
    done: bool,
}

impl<'a> Iterator for WindowChunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        while !self.done {
            let rest = &self.text[self.pos..];
            if rest.is_empty() {
                self.done = true;
                break;
            }

            let end = char_offset(rest, self.size);
            let window = &rest[..end];

            if end == rest.len() {
                // 마지막 윈도우: 남은 텍스트는 모두 이 윈도우 안에 있음
                self.done = true;
            } else {
                self.pos += char_offset(rest, self.step);
            }

            let trimmed = window.trim();
            if !trimmed.is_empty() {
                return Some(trimmed);
            }
        }
        None
    }
}

impl std::iter::FusedIterator for WindowChunks<'_> {}

// ============================================================================
// Helper Functions
// ============================================================================

/// `n` 번째 문자의 바이트 오프셋 (문자열보다 길면 문자열 길이)
#[inline]
fn char_offset(s: &str, n: usize) -> usize {
    s.char_indices().nth(n).map(|(i, _)| i).unwrap_or(s.len())
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(WindowChunker::with_defaults())
}

/// 윈도우 청커 생성 (설정 지정)
pub fn window_chunker(config: ChunkConfig) -> Box<dyn Chunker> {
    Box::new(WindowChunker::new(config))
}

// ============================================================================
// Tests
// ============================================================================
