//! 에러 타입
//!
//! 라이브러리 계층은 `RagError`를 반환하고, CLI 계층은 anyhow로 감싸서
//! 컨텍스트를 덧붙입니다.

use thiserror::Error;

/// RAG 코어 에러
#[derive(Error, Debug)]
pub enum RagError {
    /// 외부 서비스 호출 실패 (CMS, 임베딩 API 등)
    #[error("Transport error ({service}): {message}")]
    Transport {
        service: &'static str,
        message: String,
    },

    /// 임베딩 생성 실패 (원인 메시지 포함)
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// 순수 함수에 대한 잘못된 입력
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 설정 누락 또는 잘못된 설정
    #[error("Configuration error: {0}")]
    Config(String),

    /// SQLite 저장소 에러
    #[error("Store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Lock error: {0}")]
    Lock(String),

    /// 벡터/키워드 검색이 모두 실패
    #[error("Could not retrieve context: {0}")]
    RetrievalFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// Transport 에러 생성 헬퍼
    pub fn transport(service: &'static str, cause: impl std::fmt::Display) -> Self {
        Self::Transport {
            service,
            message: cause.to_string(),
        }
    }
}

/// RAG 코어 Result 별칭
pub type Result<T> = std::result::Result<T, RagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_message_carries_cause() {
        let err = RagError::transport("sanity", "connection refused");
        assert_eq!(
            err.to_string(),
            "Transport error (sanity): connection refused"
        );
    }

    #[test]
    fn test_retrieval_failed_is_distinct() {
        let err = RagError::RetrievalFailed("both paths failed".to_string());
        assert!(err.to_string().starts_with("Could not retrieve context"));
    }
}
