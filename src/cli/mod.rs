//! CLI 모듈
//!
//! folio-rag CLI 명령어 정의 및 구현

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use crate::config::RagConfig;
use crate::embedding::{create_embedder, has_api_key, DisabledEmbedding, EmbeddingProvider};
use crate::knowledge::{
    DocumentStore, HybridRetriever, SearchMethod, SearchOptions, SqliteDocumentStore, SyncEngine,
    SyncOptions, SyncResult, WindowChunker,
};
use crate::source::{ContentFetcher, DirectoryFetcher, SanityFetcher};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "folio-rag")]
#[command(version, about = "포트폴리오 챗봇용 하이브리드 RAG 검색 코어", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 콘텐츠 소스 선택
#[derive(Args, Debug, Clone)]
#[group(required = true, multiple = false)]
pub struct SourceArgs {
    /// 트랜스크립트/마크다운 폴더
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// Sanity CMS (SANITY_* 환경변수)
    #[arg(long)]
    sanity: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 콘텐츠 소스를 지식베이스에 동기화
    Sync {
        #[command(flatten)]
        source: SourceArgs,

        /// 단일 문서만 동기화
        #[arg(long)]
        id: Option<String>,

        /// 소스에 없는 문서 삭제
        #[arg(long)]
        prune: bool,

        /// 분류만 하고 쓰지 않음
        #[arg(long)]
        dry_run: bool,
    },

    /// 전체 삭제 후 재수집
    Reindex {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// 지식베이스 검색
    Query {
        /// 검색 쿼리
        query: String,

        /// 최대 결과 수
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// 벡터 검색 최소 유사도
        #[arg(short, long)]
        threshold: Option<f32>,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = RagConfig::from_env().context("설정 로드 실패")?;

    match cli.command {
        Commands::Sync {
            source,
            id,
            prune,
            dry_run,
        } => {
            let options = SyncOptions {
                prune_missing: prune,
                dry_run,
            };
            cmd_sync(&config, &source, id.as_deref(), &options).await
        }
        Commands::Reindex { source } => cmd_reindex(&config, &source).await,
        Commands::Query {
            query,
            top_k,
            threshold,
        } => {
            let options = SearchOptions {
                top_k: top_k.unwrap_or(config.search.top_k),
                threshold: threshold.unwrap_or(config.search.threshold),
            };
            cmd_query(&config, &query, &options).await
        }
        Commands::Status => cmd_status(&config).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 동기화 명령어 (sync)
async fn cmd_sync(
    config: &RagConfig,
    source: &SourceArgs,
    id: Option<&str>,
    options: &SyncOptions,
) -> Result<()> {
    let engine = build_engine(config, source, options.dry_run)?;

    if options.dry_run {
        println!("[*] dry-run: 저장소와 임베딩 API를 호출하지 않습니다");
    }

    let result = match id {
        Some(source_id) => {
            println!("[*] 문서 동기화 중: {}", source_id);
            engine
                .sync_one_with(source_id, options)
                .await
                .context("문서 동기화 실패")?
        }
        None => {
            println!("[*] 전체 동기화 중...");
            engine.full_sync(options).await.context("전체 동기화 실패")?
        }
    };

    print_sync_result(&result);
    Ok(())
}

/// 재수집 명령어 (reindex)
async fn cmd_reindex(config: &RagConfig, source: &SourceArgs) -> Result<()> {
    let engine = build_engine(config, source, false)?;

    println!("[*] 기존 청크를 모두 삭제하고 재수집합니다...");
    let result = engine.reingest_all().await.context("재수집 실패")?;

    print_sync_result(&result);
    Ok(())
}

/// 검색 명령어 (query)
///
/// 쿼리 분석 → 임베딩 → 하이브리드 검색 → 리랭크
async fn cmd_query(config: &RagConfig, query: &str, options: &SearchOptions) -> Result<()> {
    require_api_key()?;

    println!("[*] 검색 중: \"{}\"", query);

    let store = open_store(config)?;
    let embedder =
        create_embedder(config.embed_dimension).context("임베딩 클라이언트 생성 실패")?;
    let retriever = HybridRetriever::new(store);

    let results = retriever
        .retrieve(&embedder, query, options)
        .await
        .context("검색 실패")?;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [{}] [점수: {:.4}] {}",
            i + 1,
            SearchMethod::of(result).label(),
            result.score(),
            result.source_id
        );
        println!(
            "   제목: {} ({})",
            result.metadata.title, result.metadata.category
        );
        if let Some(ref url) = result.metadata.url {
            println!("   URL: {}", url);
        }
        println!("   내용: {}", truncate_text(&result.content, 200));
        println!();
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: &RagConfig) -> Result<()> {
    println!("folio-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    println!(
        "[*] 청크: {}자 / 겹침 {}자, 검색: top_k {} / threshold {}",
        config.chunk.size(),
        config.chunk.overlap(),
        config.search.top_k,
        config.search.threshold
    );

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    match SqliteDocumentStore::open(&config.db_path()) {
        Ok(store) => {
            if !store.fts_enabled() {
                println!("[!] FTS5 비활성: 키워드 검색은 LIKE 로 대체됩니다");
            }
            match store.stats().await {
                Ok(stats) => {
                    println!("[OK] 저장된 문서: {} 건", stats.document_count);
                    println!("     청크: {} 개", stats.chunk_count);
                    println!(
                        "     총 콘텐츠: {}",
                        format_bytes(stats.total_content_bytes)
                    );
                }
                Err(e) => println!("[!] 통계 조회 실패: {}", e),
            }
        }
        Err(e) => println!("[!] 저장소 열기 실패: {}", e),
    }

    Ok(())
}

// ============================================================================
// Wiring
// ============================================================================

fn require_api_key() -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }
    Ok(())
}

fn open_store(config: &RagConfig) -> Result<Arc<dyn DocumentStore>> {
    let path = config.db_path();
    let store = SqliteDocumentStore::open(&path)
        .with_context(|| format!("저장소 열기 실패: {}", path.display()))?;
    Ok(Arc::new(store))
}

fn open_fetcher(source: &SourceArgs) -> Result<Arc<dyn ContentFetcher>> {
    match (&source.dir, source.sanity) {
        (Some(dir), _) => Ok(Arc::new(DirectoryFetcher::with_defaults(dir.clone()))),
        (None, true) => {
            let fetcher = SanityFetcher::from_env().context("Sanity 설정 실패")?;
            Ok(Arc::new(fetcher))
        }
        (None, false) => bail!("--dir 또는 --sanity 중 하나를 지정해야 합니다"),
    }
}

/// 동기화 엔진 구성
///
/// dry-run 은 임베딩을 호출하지 않으므로 API 키 없이 비활성 프로바이더를 사용합니다.
fn build_engine(config: &RagConfig, source: &SourceArgs, dry_run: bool) -> Result<SyncEngine> {
    let embedder: Arc<dyn EmbeddingProvider> = if dry_run {
        Arc::new(DisabledEmbedding::gemini(config.embed_dimension))
    } else {
        require_api_key()?;
        Arc::new(create_embedder(config.embed_dimension).context("임베딩 클라이언트 생성 실패")?)
    };

    let fetcher = open_fetcher(source)?;
    let store = open_store(config)?;

    Ok(SyncEngine::new(fetcher, store, embedder).with_chunker(WindowChunker::new(config.chunk)))
}

fn print_sync_result(result: &SyncResult) {
    println!();
    for change in result.effective_changes() {
        println!(
            "  [{}] {} - {} ({} 청크)",
            change.action, change.source_id, change.title, change.chunk_count
        );
    }

    for failure in &result.failures {
        println!(
            "  [!] {} - {}: {}",
            failure.source_id, failure.title, failure.error
        );
    }

    let elapsed = result.finished_at - result.started_at;
    println!();
    println!(
        "[OK] 완료: 추가 {}, 갱신 {}, 유지 {}, 삭제 {}, 건너뜀 {}, 실패 {} (청크 {}, {:.1}초)",
        result.added,
        result.updated,
        result.unchanged,
        result.deleted,
        result.skipped,
        result.failures.len(),
        result.total_chunks,
        elapsed.num_milliseconds() as f64 / 1000.0
    );
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("Casa Bonita", 20), "Casa Bonita");
        assert_eq!(truncate_text("Q: timeline?\nA: two years", 12), "Q: timeline?...");
    }

    #[test]
    fn test_truncate_unicode() {
        assert_eq!(truncate_text("포트폴리오 챗봇", 5), "포트폴리오...");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(900), "900 B");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1048576), "3.00 MB");
    }

    #[test]
    fn test_parse_sync_args() {
        let cli = Cli::try_parse_from(["folio-rag", "sync", "--dir", "notes", "--prune"]).unwrap();
        match cli.command {
            Commands::Sync {
                source,
                id,
                prune,
                dry_run,
            } => {
                assert_eq!(source.dir, Some(PathBuf::from("notes")));
                assert!(!source.sanity);
                assert!(id.is_none());
                assert!(prune);
                assert!(!dry_run);
            }
            _ => panic!("expected sync"),
        }
    }

    #[test]
    fn test_source_is_required_and_exclusive() {
        assert!(Cli::try_parse_from(["folio-rag", "sync"]).is_err());
        assert!(Cli::try_parse_from(["folio-rag", "reindex", "--dir", "x", "--sanity"]).is_err());
    }

    #[tokio::test]
    async fn test_dry_run_sync_without_api_key_client() {
        let data = tempfile::TempDir::new().unwrap();
        let content = tempfile::TempDir::new().unwrap();
        std::fs::write(content.path().join("about.md"), "# About\n\nPortfolio intro").unwrap();

        let config = RagConfig {
            data_dir: data.path().to_path_buf(),
            ..RagConfig::default()
        };
        let source = SourceArgs {
            dir: Some(content.path().to_path_buf()),
            sanity: false,
        };

        let engine = build_engine(&config, &source, true).unwrap();
        let options = SyncOptions {
            prune_missing: false,
            dry_run: true,
        };
        let result = engine.full_sync(&options).await.unwrap();
        assert_eq!(result.added, 1);
        assert!(result.failures.is_empty());
    }

    #[test]
    fn test_parse_query_args() {
        let cli = Cli::try_parse_from(["folio-rag", "query", "Casa Bonita", "-k", "5"]).unwrap();
        match cli.command {
            Commands::Query { query, top_k, threshold } => {
                assert_eq!(query, "Casa Bonita");
                assert_eq!(top_k, Some(5));
                assert!(threshold.is_none());
            }
            _ => panic!("expected query"),
        }
    }
}
