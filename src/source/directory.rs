//! 로컬 폴더 콘텐츠 수집기
//!
//! 트랜스크립트나 마크다운 파일을 ContentDocument로 변환합니다.
//! .gitignore 패턴을 존중하고, 지원하는 확장자만 수집합니다.
//!
//! - source_id: 루트 기준 상대 경로 (구분자 `/`, 확장자 제거)
//! - title: 첫 `# ` 헤더, 없으면 파일 이름
//! - category: 첫 번째 하위 폴더 이름

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ignore::WalkBuilder;

use super::{Category, ContentDocument, ContentFetcher};
use crate::error::{RagError, Result};

/// 지원 확장자
const TEXT_EXTENSIONS: &[&str] = &["md", "markdown", "txt"];

/// 폴더 수집기 설정
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
    /// 소스 레이블
    pub source_label: String,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 10 * 1024 * 1024, // 10MB
            source_label: "transcript".to_string(),
        }
    }
}

/// 폴더 기반 ContentFetcher
///
/// `fetch_all` 과 `fetch_one` 은 같은 탐색 결과로 source_id 를 해석합니다.
pub struct DirectoryFetcher {
    root: PathBuf,
    config: DirectoryConfig,
}

/// 수집 대상 파일
#[derive(Debug, Clone)]
struct Candidate {
    source_id: String,
    path: PathBuf,
}

impl DirectoryFetcher {
    pub fn new(root: impl Into<PathBuf>, config: DirectoryConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// 기본 설정으로 생성
    pub fn with_defaults(root: impl Into<PathBuf>) -> Self {
        Self::new(root, DirectoryConfig::default())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 수집 대상 파일 목록 (경로 순)
    ///
    /// 확장자만 다른 파일이 같은 source_id 를 가지면 경로 순으로 먼저 나온 파일만 사용합니다.
    fn candidates(&self) -> Result<Vec<Candidate>> {
        if !self.root.is_dir() {
            return Err(RagError::Config(format!(
                "Not a directory: {}",
                self.root.display()
            )));
        }

        let walker = WalkBuilder::new(&self.root)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .require_git(false)
            .sort_by_file_path(|a, b| a.cmp(b))
            .build();

        let mut claimed: HashMap<String, PathBuf> = HashMap::new();
        let mut candidates = Vec::new();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            let path = entry.path();
            if !is_text_file(path) {
                continue;
            }

            if self.config.max_file_size > 0 {
                if let Ok(metadata) = entry.metadata() {
                    if metadata.len() > self.config.max_file_size {
                        tracing::debug!("Skipping large file: {:?} ({} bytes)", path, metadata.len());
                        continue;
                    }
                }
            }

            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let source_id = relative_source_id(relative);

            if let Some(first) = claimed.get(&source_id) {
                tracing::warn!(
                    "Skipping {:?}: source_id '{}' already taken by {:?}",
                    path,
                    source_id,
                    first
                );
                continue;
            }

            claimed.insert(source_id.clone(), path.to_path_buf());
            candidates.push(Candidate {
                source_id,
                path: path.to_path_buf(),
            });
        }

        Ok(candidates)
    }

    /// 파일 하나를 ContentDocument로 변환
    fn read_document(&self, candidate: &Candidate) -> Result<ContentDocument> {
        let path = candidate.path.as_path();
        let metadata = std::fs::metadata(path)?;
        let content = std::fs::read_to_string(path)?;
        let relative = path.strip_prefix(&self.root).unwrap_or(path);

        let title = extract_title(&content).unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("untitled")
                .to_string()
        });

        // 하위 폴더가 있으면 첫 번째 폴더명, 없으면 소스 레이블
        let category = if relative.components().count() > 1 {
            relative
                .components()
                .next()
                .and_then(|c| c.as_os_str().to_str())
                .map(Category::from_label)
                .unwrap_or(Category::Transcript)
        } else {
            Category::from_label(&self.config.source_label)
        };

        let updated_at: DateTime<Utc> = metadata
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        Ok(ContentDocument {
            source_id: candidate.source_id.clone(),
            title,
            category,
            raw_content: content,
            updated_at,
            source: self.config.source_label.clone(),
            url: None,
        })
    }
}

#[async_trait]
impl ContentFetcher for DirectoryFetcher {
    async fn fetch_all(&self) -> Result<Vec<ContentDocument>> {
        let mut documents = Vec::new();

        for candidate in self.candidates()? {
            match self.read_document(&candidate) {
                Ok(doc) => documents.push(doc),
                Err(e) => tracing::warn!("Failed to read {:?}: {}", candidate.path, e),
            }
        }

        tracing::info!(
            "Collected {} documents from {:?}",
            documents.len(),
            self.root
        );
        Ok(documents)
    }

    async fn fetch_one(&self, source_id: &str) -> Result<Option<ContentDocument>> {
        validate_source_id(source_id)?;

        match self
            .candidates()?
            .into_iter()
            .find(|c| c.source_id == source_id)
        {
            Some(candidate) => self.read_document(&candidate).map(Some),
            None => Ok(None),
        }
    }

    fn name(&self) -> &str {
        "directory"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.iter().any(|t| t.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

/// 루트 밖을 가리키는 source_id 거부
fn validate_source_id(source_id: &str) -> Result<()> {
    let path = Path::new(source_id);
    let relative = path.components().all(|c| matches!(c, Component::Normal(_)));

    if source_id.is_empty() || !relative {
        return Err(RagError::InvalidInput(format!(
            "source_id must be a relative path inside the root: {:?}",
            source_id
        )));
    }
    Ok(())
}

/// 상대 경로 -> source_id (구분자 정규화, 확장자 제거)
fn relative_source_id(relative: &Path) -> String {
    let without_ext = relative.with_extension("");
    without_ext
        .components()
        .filter_map(|c| c.as_os_str().to_str())
        .collect::<Vec<_>>()
        .join("/")
}

/// 첫 번째 `# ` 헤더를 제목으로 사용
fn extract_title(content: &str) -> Option<String> {
    content
        .lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

// ============================================================================
// Tests
// ============================================================================
