//! 콘텐츠 소스 모듈 - 동기화 대상 원본 콘텐츠 수집
//!
//! - `ContentFetcher`: 원본 문서를 평문으로 가져오는 경계 인터페이스
//! - `DirectoryFetcher`: 로컬 트랜스크립트/마크다운 폴더
//! - `SanityFetcher`: Sanity CMS HTTP API (포터블 텍스트 평탄화)

mod directory;
mod sanity;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use directory::{DirectoryConfig, DirectoryFetcher};
pub use sanity::{flatten_portable_text, SanityConfig, SanityFetcher};

// ============================================================================
// Types
// ============================================================================

/// 콘텐츠 카테고리
///
/// CMS 문서 타입이나 폴더 이름을 태그로 정규화합니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Project,
    CaseStudy,
    Experience,
    Faq,
    Transcript,
    Page,
    Other(String),
}

impl Category {
    /// 레이블(문서 타입, 폴더명 등)에서 카테고리 결정
    pub fn from_label(label: &str) -> Self {
        let normalized: String = label
            .trim()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c.to_ascii_lowercase() })
            .collect();

        match normalized.as_str() {
            "project" | "projects" => Category::Project,
            "case_study" | "case_studies" | "casestudy" => Category::CaseStudy,
            "experience" | "experiences" | "job" | "jobs" => Category::Experience,
            "faq" | "faqs" => Category::Faq,
            "transcript" | "transcripts" => Category::Transcript,
            "page" | "pages" => Category::Page,
            _ => Category::Other(normalized),
        }
    }

    /// 저장/표시용 레이블
    pub fn as_str(&self) -> &str {
        match self {
            Category::Project => "project",
            Category::CaseStudy => "case_study",
            Category::Experience => "experience",
            Category::Faq => "faq",
            Category::Transcript => "transcript",
            Category::Page => "page",
            Category::Other(label) => label,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 원본 콘텐츠 문서
///
/// 동기화마다 새로 가져오며 자체는 저장하지 않습니다 (파생 청크만 저장).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentDocument {
    /// 외부 안정 식별자
    pub source_id: String,
    pub title: String,
    pub category: Category,
    /// 평문으로 평탄화된 본문
    pub raw_content: String,
    pub updated_at: DateTime<Utc>,
    /// 소스 레이블 (sanity, transcript, faq ...)
    pub source: String,
    pub url: Option<String>,
}

impl ContentDocument {
    /// 변경 감지에 포함되는 메타데이터
    ///
    /// `updated_at` 은 포함하지 않습니다. 내용이 같으면 재임베딩하지 않습니다.
    pub fn hash_metadata(&self) -> serde_json::Value {
        serde_json::json!({
            "title": self.title,
            "category": self.category.as_str(),
            "source": self.source,
            "url": self.url,
        })
    }
}

// ============================================================================
// ContentFetcher Trait
// ============================================================================

/// 콘텐츠 수집기 트레이트
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// 현재 존재하는 모든 문서
    async fn fetch_all(&self) -> Result<Vec<ContentDocument>>;

    /// 단일 문서 조회 (기본 구현: fetch_all 후 필터)
    async fn fetch_one(&self, source_id: &str) -> Result<Option<ContentDocument>> {
        Ok(self
            .fetch_all()
            .await?
            .into_iter()
            .find(|d| d.source_id == source_id))
    }

    /// 수집기 이름
    fn name(&self) -> &str;
}
