//! Sanity CMS 콘텐츠 수집기
//!
//! GROQ 쿼리로 문서를 가져와 포터블 텍스트를 평문으로 평탄화합니다.
//! ref: https://www.sanity.io/docs/http-query
//!
//! 설정은 환경변수에서 읽습니다:
//! - `SANITY_PROJECT_ID` (필수)
//! - `SANITY_DATASET` (기본값: production)
//! - `SANITY_API_TOKEN` (선택, 비공개 데이터셋)
//! - `SANITY_API_VERSION` (기본값: 2023-05-03)

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use url::Url;

use super::{Category, ContentDocument, ContentFetcher};
use crate::error::{RagError, Result};

/// 기본 동기화 대상 문서 타입
const DEFAULT_TYPES: &[&str] = &["project", "caseStudy", "experience", "faq", "page"];

/// 평탄화에서 제외할 필드 (링크, 이미지 등 비텍스트 데이터)
const SKIP_FIELDS: &[&str] = &[
    "slug", "asset", "href", "url", "color", "icon", "image", "mainImage", "crop", "hotspot",
    "metadata", "marks", "markDefs", "style", "listItem", "level",
];

/// Sanity 접속 설정
#[derive(Debug, Clone)]
pub struct SanityConfig {
    pub project_id: String,
    pub dataset: String,
    pub api_version: String,
    pub token: Option<String>,
    /// 동기화할 `_type` 목록
    pub types: Vec<String>,
}

impl SanityConfig {
    /// 환경변수에서 설정 로드
    ///
    /// `SANITY_PROJECT_ID` 가 없으면 첫 요청이 아니라 여기서 실패합니다.
    pub fn from_env() -> Result<Self> {
        let project_id = std::env::var("SANITY_PROJECT_ID")
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                RagError::Config(
                    "SANITY_PROJECT_ID not set.\n\
                     Set: export SANITY_PROJECT_ID=your-project-id"
                        .to_string(),
                )
            })?;

        let env_or = |key: &str, default: &str| {
            std::env::var(key)
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            project_id,
            dataset: env_or("SANITY_DATASET", "production"),
            api_version: env_or("SANITY_API_VERSION", "2023-05-03"),
            token: std::env::var("SANITY_API_TOKEN").ok().filter(|v| !v.is_empty()),
            types: DEFAULT_TYPES.iter().map(|t| t.to_string()).collect(),
        })
    }

    /// 쿼리 엔드포인트 URL
    fn query_url(&self, query: &str, params: &[(&str, Value)]) -> Result<Url> {
        let base = format!(
            "https://{}.api.sanity.io/v{}/data/query/{}",
            self.project_id, self.api_version, self.dataset
        );
        let mut url = Url::parse(&base)
            .map_err(|e| RagError::Config(format!("Invalid Sanity URL {}: {}", base, e)))?;

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("query", query);
            for (name, value) in params {
                // GROQ 파라미터는 JSON 인코딩 값
                pairs.append_pair(&format!("${}", name), &value.to_string());
            }
        }

        Ok(url)
    }
}

/// 게시된 문서 전체 (초안 제외)
const FETCH_ALL_QUERY: &str = r#"*[_type in $types && !(_id in path("drafts.**"))]"#;

/// 게시된 단일 문서 (초안 제외)
const FETCH_ONE_QUERY: &str =
    r#"*[_id == $id && _type in $types && !(_id in path("drafts.**"))][0]"#;

/// Sanity 쿼리 응답
#[derive(Debug, Deserialize)]
struct QueryResponse {
    result: Value,
}

/// Sanity CMS ContentFetcher
pub struct SanityFetcher {
    config: SanityConfig,
    client: reqwest::Client,
}

impl SanityFetcher {
    pub fn new(config: SanityConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    /// 환경변수 설정으로 생성
    pub fn from_env() -> Result<Self> {
        Self::new(SanityConfig::from_env()?)
    }

    async fn query(&self, groq: &str, params: &[(&str, Value)]) -> Result<Value> {
        let url = self.config.query_url(groq, params)?;

        let mut request = self.client.get(url);
        if let Some(ref token) = self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RagError::transport("sanity", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::transport(
                "sanity",
                format!("HTTP {}: {}", status, body),
            ));
        }

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| RagError::transport("sanity", format!("invalid response: {}", e)))?;

        Ok(parsed.result)
    }

    fn types_param(&self) -> Value {
        Value::from(self.config.types.clone())
    }
}

#[async_trait]
impl ContentFetcher for SanityFetcher {
    async fn fetch_all(&self) -> Result<Vec<ContentDocument>> {
        let result = self
            .query(FETCH_ALL_QUERY, &[("types", self.types_param())])
            .await?;

        let documents: Vec<ContentDocument> = result
            .as_array()
            .map(|docs| docs.iter().filter_map(to_content_document).collect())
            .unwrap_or_default();

        tracing::info!("Fetched {} documents from Sanity", documents.len());
        Ok(documents)
    }

    async fn fetch_one(&self, source_id: &str) -> Result<Option<ContentDocument>> {
        let result = self
            .query(
                FETCH_ONE_QUERY,
                &[("id", Value::from(source_id)), ("types", self.types_param())],
            )
            .await?;

        Ok(to_content_document(&result))
    }

    fn name(&self) -> &str {
        "sanity"
    }
}

// ============================================================================
// Portable Text Flattening
// ============================================================================

/// Sanity 문서 JSON -> ContentDocument
///
/// `_id` 나 `_type` 이 없으면 None.
fn to_content_document(value: &Value) -> Option<ContentDocument> {
    let map = value.as_object()?;
    let source_id = map.get("_id")?.as_str()?.to_string();
    let doc_type = map.get("_type")?.as_str()?;
    let category = Category::from_label(doc_type);

    let title = ["title", "name", "question"]
        .iter()
        .find_map(|k| map.get(*k).and_then(Value::as_str))
        .unwrap_or(source_id.as_str())
        .to_string();

    let updated_at = map
        .get("_updatedAt")
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    let url = map
        .get("slug")
        .and_then(|s| s.get("current"))
        .and_then(Value::as_str)
        .map(|slug| format!("/{}", slug));

    // 제목은 메타데이터로 따로 저장하므로 본문에서 제외 (FAQ 질문은 Q: 형식으로 유지)
    let mut body = map.clone();
    body.remove("title");

    let source = if category == Category::Faq { "faq" } else { "sanity" };

    Some(ContentDocument {
        source_id,
        title,
        category,
        raw_content: flatten_portable_text(&Value::Object(body)),
        updated_at,
        source: source.to_string(),
        url,
    })
}

/// 포터블 텍스트(및 임의 JSON)를 평문으로 평탄화
///
/// - `block` 객체: 자식 span 의 `text` 를 이어 붙임
/// - `question`/`answer` 쌍: `Q: ...` / `A: ...` 형식
/// - 그 외 객체: `_` 로 시작하지 않는 필드를 재귀 수집
///
/// 단락은 빈 줄로 구분합니다.
pub fn flatten_portable_text(value: &Value) -> String {
    let mut parts = Vec::new();
    collect_text(value, &mut parts);
    parts.join("\n\n")
}

fn collect_text(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_text(item, out);
            }
        }
        Value::Object(map) => collect_object(map, out),
        _ => {}
    }
}

fn collect_object(map: &Map<String, Value>, out: &mut Vec<String>) {
    if map.get("_type").and_then(Value::as_str) == Some("block") {
        let text: String = map
            .get("children")
            .and_then(Value::as_array)
            .map(|children| {
                children
                    .iter()
                    .filter_map(|c| c.get("text").and_then(Value::as_str))
                    .collect()
            })
            .unwrap_or_default();

        let text = text.trim();
        if !text.is_empty() {
            out.push(text.to_string());
        }
        return;
    }

    if let (Some(question), Some(answer)) = (map.get("question"), map.get("answer")) {
        let q = flatten_portable_text(question);
        let a = flatten_portable_text(answer);
        if !q.is_empty() || !a.is_empty() {
            out.push(format!("Q: {}\nA: {}", q, a));
        }
    }

    for (key, child) in map {
        if key.starts_with('_')
            || key == "question"
            || key == "answer"
            || SKIP_FIELDS.contains(&key.as_str())
        {
            continue;
        }
        collect_text(child, out);
    }
}

// ============================================================================
// Tests
// ============================================================================
