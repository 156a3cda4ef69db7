//! 임베딩 모듈 - Gemini API를 통한 텍스트 벡터화
//!
//! 청크와 쿼리를 고정 차원 벡터로 변환합니다.
//! 모든 전송/API 실패는 `RagError::Embedding` 으로 감싸서 반환하며,
//! 개수나 차원이 맞지 않는 응답은 부분 결과로 넘기지 않고 에러로 처리합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = GeminiEmbedding::from_env()?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{RagError, Result};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    ///
    /// 출력의 i 번째 벡터는 입력의 i 번째 텍스트에 대응합니다.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 검색 쿼리 임베딩 (기본 구현: `embed`)
    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed(query).await
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// Gemini 임베딩 모델
const GEMINI_MODEL: &str = "models/gemini-embedding-001";
/// 프로바이더 이름 (문서 해시에 포함)
pub const GEMINI_MODEL_NAME: &str = "gemini-embedding-001";

/// 단일 임베딩 엔드포인트
/// source: https://ai.google.dev/gemini-api/docs/embeddings
const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent";

/// 배치 임베딩 엔드포인트
const GEMINI_BATCH_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:batchEmbedContents";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// 배치 요청당 최대 텍스트 수
const MAX_BATCH_SIZE: usize = 100;

/// Rate Limiter 설정 (Gemini 무료 티어: 60 RPM)
const RATE_LIMIT_RPM: u32 = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// 호출 간 최소 딜레이 (1000ms = 60 RPM 준수)
const MIN_DELAY_MS: u64 = 1000;
/// 429 에러 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

/// Gemini 태스크 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskType {
    /// 저장할 문서 청크
    RetrievalDocument,
    /// 검색 쿼리
    RetrievalQuery,
}

impl TaskType {
    fn as_str(self) -> &'static str {
        match self {
            TaskType::RetrievalDocument => "RETRIEVAL_DOCUMENT",
            TaskType::RetrievalQuery => "RETRIEVAL_QUERY",
        }
    }
}

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

/// Rate Limiter with minimum delay between requests
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay: Duration::from_millis(MIN_DELAY_MS),
            last_request: None,
        }
    }

    /// 요청 가능 여부 확인 및 대기
    async fn acquire(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        let now = Instant::now();
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

impl GeminiEmbedding {
    /// 새 Gemini 임베딩 인스턴스 생성
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_dimension(api_key, DEFAULT_DIMENSION)
    }

    /// 차원을 지정하여 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `dimension` - 임베딩 차원 (768, 1536, 3072 중 선택)
    pub fn with_dimension(api_key: String, dimension: usize) -> Result<Self> {
        if ![768, 1536, 3072].contains(&dimension) {
            return Err(RagError::Config(format!(
                "Invalid dimension: {}. Must be 768, 1536, or 3072",
                dimension
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RagError::Config(format!("Failed to create HTTP client: {}", e)))?;

        let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(
            RATE_LIMIT_RPM,
            RATE_LIMIT_WINDOW,
        )));

        Ok(Self {
            api_key,
            client,
            dimension,
            rate_limiter,
        })
    }

    /// 환경변수에서 API 키를 읽어 생성
    pub fn from_env() -> Result<Self> {
        Self::new(get_api_key()?)
    }

    /// 환경변수에서 API 키를 읽어 차원 지정하여 생성
    pub fn from_env_with_dimension(dimension: usize) -> Result<Self> {
        Self::with_dimension(get_api_key()?, dimension)
    }

    fn single_request(&self, text: &str, task_type: TaskType) -> EmbedRequest {
        EmbedRequest {
            model: GEMINI_MODEL.to_string(),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            task_type: task_type.as_str().to_string(),
            output_dimensionality: Some(self.dimension),
        }
    }

    /// 응답 벡터의 차원 검증
    fn check_dimension(&self, values: &[f32]) -> Result<()> {
        if values.len() != self.dimension {
            return Err(RagError::Embedding(format!(
                "Expected {}-dimensional vector, got {}",
                self.dimension,
                values.len()
            )));
        }
        Ok(())
    }

    /// 재시도/레이트 리밋을 포함한 POST 호출
    ///
    /// 성공 시 응답 본문을 반환합니다.
    async fn post_with_retry<B: Serialize + Sync>(&self, url: &str, body: &B) -> Result<String> {
        let mut last_error: Option<String> = None;

        for attempt in 0..=MAX_RETRIES {
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
            }

            // API 키는 URL이 아닌 헤더로 전송
            let response = match self
                .client
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(body)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(format!("Failed to send embedding request: {}", e));
                    if attempt < MAX_RETRIES {
                        let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            "Request failed, retrying in {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| RagError::Embedding(format!("Failed to read response body: {}", e)))?;

            if status.is_success() {
                return Ok(body);
            }

            if status.as_u16() == 429 {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                tracing::warn!(
                    "Rate limit hit (429), backing off {:?} (attempt {}/{})",
                    backoff,
                    attempt + 1,
                    MAX_RETRIES
                );
                last_error = Some("Rate limit exceeded (429)".to_string());

                if attempt < MAX_RETRIES {
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            } else {
                return Err(RagError::Embedding(describe_api_error(status, &body)));
            }
        }

        Err(RagError::Embedding(last_error.unwrap_or_else(|| {
            format!("Embedding failed after {} retries", MAX_RETRIES)
        })))
    }

    async fn embed_with_task(&self, text: &str, task_type: TaskType) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RagError::InvalidInput(
                "cannot embed empty text".to_string(),
            ));
        }

        let request = self.single_request(text, task_type);
        let body = self.post_with_retry(GEMINI_EMBED_URL, &request).await?;

        let response: EmbedResponse = serde_json::from_str(&body)
            .map_err(|e| RagError::Embedding(format!("Failed to parse embedding response: {}", e)))?;

        self.check_dimension(&response.embedding.values)?;
        Ok(response.embedding.values)
    }
}

/// Gemini API 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: String,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

/// 배치 요청 본문
#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

/// Gemini API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

/// 배치 응답 (요청 순서와 동일)
#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

fn describe_api_error(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<GeminiError>(body) {
        Ok(error) => format!(
            "Gemini API error ({}): {}",
            error.error.status, error.error.message
        ),
        Err(_) => format!("Gemini API error ({}): {}", status, body),
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_with_task(text, TaskType::RetrievalDocument).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if let Some(i) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(RagError::InvalidInput(format!(
                "cannot embed empty text at batch index {}",
                i
            )));
        }

        let mut results = Vec::with_capacity(texts.len());

        for (n, batch) in texts.chunks(MAX_BATCH_SIZE).enumerate() {
            tracing::debug!(
                "Embedding batch {} ({} texts, {} total)",
                n + 1,
                batch.len(),
                texts.len()
            );

            let request = BatchEmbedRequest {
                requests: batch
                    .iter()
                    .map(|t| self.single_request(t, TaskType::RetrievalDocument))
                    .collect(),
            };

            let body = self.post_with_retry(GEMINI_BATCH_EMBED_URL, &request).await?;
            let response: BatchEmbedResponse = serde_json::from_str(&body).map_err(|e| {
                RagError::Embedding(format!("Failed to parse batch embedding response: {}", e))
            })?;

            if response.embeddings.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "Batch returned {} vectors for {} texts",
                    response.embeddings.len(),
                    batch.len()
                )));
            }

            for embedding in response.embeddings {
                self.check_dimension(&embedding.values)?;
                results.push(embedding.values);
            }
        }

        Ok(results)
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        self.embed_with_task(query, TaskType::RetrievalQuery).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        GEMINI_MODEL_NAME
    }
}

// ============================================================================
// DisabledEmbedding
// ============================================================================

/// 호출되면 실패하는 임베딩 프로바이더 (dry-run 전용)
///
/// 문서 해시에 들어가는 이름/차원은 대신하는 프로바이더와 같아야 합니다.
pub struct DisabledEmbedding {
    name: String,
    dimension: usize,
}

impl DisabledEmbedding {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
        }
    }

    /// Gemini 프로바이더를 대신하는 인스턴스
    pub fn gemini(dimension: usize) -> Self {
        Self::new(GEMINI_MODEL_NAME, dimension)
    }

    fn disabled(&self) -> RagError {
        RagError::Config(format!("embedding provider {} is disabled", self.name))
    }
}

#[async_trait]
impl EmbeddingProvider for DisabledEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(self.disabled())
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(self.disabled())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// Vector Math
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르면 `InvalidInput` 에러,
/// 어느 한쪽의 크기가 0이면 0.0을 반환합니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    if a.len() != b.len() {
        return Err(RagError::InvalidInput(format!(
            "vector length mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    // 부동소수점 오차로 범위를 살짝 벗어나는 경우 보정
    Ok((dot_product / (norm_a * norm_b)).clamp(-1.0, 1.0))
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Result<String> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    Err(RagError::Config(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
            .to_string(),
    ))
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

// ============================================================================
// Factory Function
// ============================================================================

/// 차원을 지정하여 임베딩 프로바이더 생성
///
/// 키가 없으면 첫 호출 시점이 아니라 생성 시점에 설정 에러를 반환합니다.
pub fn create_embedder(dimension: usize) -> Result<GeminiEmbedding> {
    let embedder = GeminiEmbedding::from_env_with_dimension(dimension)?;
    tracing::info!(
        "Using Gemini API embedding (dimension: {})",
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a).unwrap() - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).unwrap().abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d).unwrap() + 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        let zero = vec![0.0, 0.0, 0.0];
        let v = vec![0.3, -0.2, 0.9];
        let sim = cosine_similarity(&zero, &v).unwrap();
        assert_eq!(sim, 0.0);
        assert!(!sim.is_nan());
        assert_eq!(cosine_similarity(&[], &[]).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch() {
        let result = cosine_similarity(&[1.0, 2.0], &[1.0]);
        assert!(matches!(result, Err(RagError::InvalidInput(_))));
    }

    #[test]
    fn test_cosine_similarity_bounds() {
        let vectors = [
            vec![0.1, 0.2, 0.3],
            vec![-5.0, 4.0, 0.0],
            vec![1e-3, -1e-3, 7.0],
            vec![100.0, 100.0, 100.0],
        ];
        for a in &vectors {
            for b in &vectors {
                let sim = cosine_similarity(a, b).unwrap();
                assert!((-1.0..=1.0).contains(&sim));
            }
        }
    }

    #[test]
    fn test_invalid_dimension() {
        let result = GeminiEmbedding::with_dimension("fake_key".to_string(), 999);
        assert!(matches!(result, Err(RagError::Config(ref m)) if m.contains("Invalid dimension")));
    }

    #[test]
    fn test_valid_dimensions() {
        for dim in [768, 1536, 3072] {
            let embedder = GeminiEmbedding::with_dimension("fake_key".to_string(), dim).unwrap();
            assert_eq!(EmbeddingProvider::dimension(&embedder), dim);
        }
    }

    #[tokio::test]
    async fn test_empty_text_rejected_before_io() {
        let embedder = GeminiEmbedding::new("fake_key".to_string()).unwrap();
        let result = embedder.embed("   ").await;
        assert!(matches!(result, Err(RagError::InvalidInput(_))));

        let batch = vec!["ok".to_string(), "".to_string()];
        let result = embedder.embed_batch(&batch).await;
        assert!(matches!(result, Err(RagError::InvalidInput(ref m)) if m.contains("index 1")));
    }

    #[tokio::test]
    async fn test_disabled_embedding_mirrors_gemini_identity() {
        let gemini = GeminiEmbedding::new("fake_key".to_string()).unwrap();
        let disabled = DisabledEmbedding::gemini(gemini.dimension());
        assert_eq!(disabled.name(), gemini.name());
        assert_eq!(disabled.dimension(), DEFAULT_DIMENSION);

        assert!(matches!(disabled.embed("text").await, Err(RagError::Config(_))));
        assert!(matches!(
            disabled.embed_batch(&["text".to_string()]).await,
            Err(RagError::Config(_))
        ));
        assert!(disabled.embed_query("text").await.is_err());
    }

    #[test]
    fn test_batch_request_serialization() {
        let embedder = GeminiEmbedding::new("fake_key".to_string()).unwrap();
        let request = BatchEmbedRequest {
            requests: vec![embedder.single_request("hello", TaskType::RetrievalQuery)],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["requests"][0]["model"], GEMINI_MODEL);
        assert_eq!(json["requests"][0]["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(json["requests"][0]["outputDimensionality"], 768);
        assert_eq!(json["requests"][0]["content"]["parts"][0]["text"], "hello");
    }

    #[test]
    fn test_describe_api_error() {
        let body = r#"{"error": {"message": "API key not valid", "status": "INVALID_ARGUMENT"}}"#;
        let msg = describe_api_error(reqwest::StatusCode::BAD_REQUEST, body);
        assert_eq!(msg, "Gemini API error (INVALID_ARGUMENT): API key not valid");

        let msg = describe_api_error(reqwest::StatusCode::BAD_GATEWAY, "oops");
        assert!(msg.contains("502"));
    }
}
