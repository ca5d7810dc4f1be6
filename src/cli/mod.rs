//! CLI 모듈
//!
//! agenthub CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use crate::agent::{AgentRunOutcome, AgentTask, Domain, Row, RunStatus};
use crate::config::{AppConfig, EmbeddingBackend, LlmBackend};
use crate::embedding::has_api_key;
use crate::hub::{build_orchestrator, AgentHub};
use crate::llm::{create_gateway, generate_with_domain};
use crate::rag::RagStrategy;
use crate::retrieval::SearchMethod;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "agenthub")]
#[command(version, about = "하이브리드 RAG + 자기교정 에이전트 파이프라인", long_about = None)]
pub struct Cli {
    /// 설정 파일 경로 (미지정 시 기본 위치)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 파일, 폴더, 또는 텍스트를 지식베이스에 추가
    Ingest {
        /// 수집할 파일/폴더 경로 (폴더는 재귀)
        paths: Vec<PathBuf>,

        /// 직접 입력할 텍스트
        #[arg(short, long)]
        text: Option<String>,

        /// 텍스트의 문서 ID
        #[arg(long, requires = "text")]
        doc_id: Option<String>,

        /// 문서 태그 (반복 또는 쉼표 구분)
        #[arg(long = "tag", value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// 지식베이스 기반 질의응답
    Ask {
        /// 질문
        question: String,

        /// 벡터 검색만 사용
        #[arg(long, conflicts_with = "hybrid")]
        vector_only: bool,

        /// 하이브리드 검색 강제
        #[arg(long)]
        hybrid: bool,

        /// 최종 결과 수
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// 답변 도메인
        #[arg(short, long, value_enum, default_value_t = Domain::General)]
        domain: Domain,

        /// 답변 방식 (standard, graph)
        #[arg(long, value_enum, default_value_t = RagStrategy::Standard)]
        strategy: RagStrategy,
    },

    /// 최근 질문과 비슷한 문서 추천
    Recommend {
        /// 최근 질문 (여러 개 가능)
        #[arg(required = true)]
        queries: Vec<String>,

        /// 선호 태그 (하나라도 겹치면 포함)
        #[arg(long = "tag", value_delimiter = ',')]
        tags: Vec<String>,

        /// 추천 개수
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,

        /// 결과를 JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 검색 없이 LLM에 직접 프롬프트 전달
    Prompt {
        /// 사용자 프롬프트
        prompt: String,

        /// 시스템 프롬프트 (미지정 시 도메인 기본값)
        #[arg(long)]
        system: Option<String>,

        /// 도메인
        #[arg(short, long, value_enum, default_value_t = Domain::General)]
        domain: Domain,

        /// 샘플링 온도 (설정값 덮어쓰기)
        #[arg(long)]
        temperature: Option<f32>,

        /// 최대 생성 토큰 (설정값 덮어쓰기)
        #[arg(long)]
        max_tokens: Option<u32>,
    },

    /// 텍스트 임베딩 (선택적으로 지식베이스에 저장)
    Embed {
        /// 임베딩할 텍스트 (여러 개 가능)
        #[arg(required = true)]
        texts: Vec<String>,

        /// 텍스트마다 문서 하나로 저장
        #[arg(long)]
        store: bool,

        /// 벡터 전체를 JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 자기교정 에이전트 파이프라인 실행
    Agent {
        /// 작업 설명
        task: String,

        /// 입력 데이터 (JSON 객체 배열 파일)
        #[arg(long)]
        data: PathBuf,

        /// 데이터 도메인
        #[arg(short, long, value_enum, default_value_t = Domain::General)]
        domain: Domain,

        /// 시작일 (YYYY-MM-DD, 포함)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// 종료일 (YYYY-MM-DD, 포함)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// 결과를 JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 저장된 문서 목록
    List {
        /// 결과 개수 제한
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// 문서 삭제 (벡터 + 키워드 인덱스)
    Delete {
        /// 삭제할 문서 ID
        doc_id: String,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = match cli.config.as_deref() {
        Some(path) => AppConfig::load_from(&[path]),
        None => AppConfig::load(),
    }?;

    match cli.command {
        Commands::Ingest {
            paths,
            text,
            doc_id,
            tags,
        } => cmd_ingest(config, paths, text, doc_id, tags).await,
        Commands::Ask {
            question,
            vector_only,
            hybrid,
            top_k,
            domain,
            strategy,
        } => {
            let use_hybrid = match (vector_only, hybrid) {
                (true, _) => Some(false),
                (_, true) => Some(true),
                _ => None,
            };
            cmd_ask(config, &question, use_hybrid, top_k, domain, strategy).await
        }
        Commands::Recommend {
            queries,
            tags,
            top_k,
            json,
        } => cmd_recommend(config, &queries, &tags, top_k, json).await,
        Commands::Prompt {
            prompt,
            system,
            domain,
            temperature,
            max_tokens,
        } => {
            cmd_prompt(
                config,
                &prompt,
                system.as_deref(),
                domain,
                temperature,
                max_tokens,
            )
            .await
        }
        Commands::Embed { texts, store, json } => cmd_embed(config, &texts, store, json).await,
        Commands::Agent {
            task,
            data,
            domain,
            from,
            to,
            json,
        } => cmd_agent(config, task, &data, domain, from, to, json).await,
        Commands::List { limit } => cmd_list(config, limit).await,
        Commands::Delete { doc_id } => cmd_delete(config, &doc_id).await,
        Commands::Status => cmd_status(config).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 문서 수집 명령어 (ingest)
async fn cmd_ingest(
    config: AppConfig,
    paths: Vec<PathBuf>,
    text: Option<String>,
    doc_id: Option<String>,
    tags: Vec<String>,
) -> Result<()> {
    if paths.is_empty() && text.is_none() {
        bail!("수집할 경로 또는 --text 중 하나를 지정해야 합니다");
    }

    let hub = AgentHub::open(config).await?;
    let ingestor = hub
        .ingestor()
        .context("Ingestor 초기화 실패")?
        .with_tags(&tags);

    if let Some(text) = text {
        let doc_id = doc_id.unwrap_or_else(|| format!("text-{}", uuid::Uuid::new_v4()));
        println!("[*] 텍스트 수집 중: {}", doc_id);
        let chunks = ingestor
            .ingest_text(&doc_id, &text)
            .await
            .context("텍스트 수집 실패")?;
        println!("[OK] {} 저장 완료 ({} 청크)", doc_id, chunks);
    }

    if !paths.is_empty() {
        println!("[*] {} 개 경로 수집 중...", paths.len());
        let report = ingestor.ingest_paths(&paths).await;

        println!();
        println!("[OK] 수집 완료");
        println!("     성공: {} 파일", report.success_count);
        println!("     청크: {} 개", report.chunk_count);
        if !report.failed_files.is_empty() {
            println!("     실패: {} 파일", report.failed_files.len());
            for file in report.failed_files.iter().take(10) {
                println!("       - {}", file);
            }
            if report.failed_files.len() > 10 {
                println!("       ... 외 {} 개", report.failed_files.len() - 10);
            }
        }
    }

    Ok(())
}

/// 질의응답 명령어 (ask)
async fn cmd_ask(
    config: AppConfig,
    question: &str,
    use_hybrid: Option<bool>,
    top_k: Option<usize>,
    domain: Domain,
    strategy: RagStrategy,
) -> Result<()> {
    ensure_embedding_key(&config)?;

    println!("[*] 검색 중: \"{}\"", question);

    let hub = AgentHub::open(config).await?;
    let rag = hub
        .rag()
        .context("RAG 서비스 초기화 실패")?
        .with_domain(domain)
        .with_strategy(strategy);
    let answer = rag.ask(question, use_hybrid, top_k).await?;

    for note in &answer.degraded {
        println!("[!] {}", note);
    }

    println!("\n[OK] 답변 ({}, {}):\n", answer.strategy, answer.model);
    println!("{}", answer.answer);

    if !answer.sources.is_empty() {
        println!("\n출처 ({} 건):", answer.sources.len());
        for (i, source) in answer.sources.iter().enumerate() {
            let context_mark = if source.in_context { "" } else { " (컨텍스트 제외)" };
            println!(
                "{}. [{}] [점수: {:.4}] {}{}",
                i + 1,
                method_label(source.method),
                source.score,
                source.chunk_id,
                context_mark
            );
            if !source.snippet.is_empty() {
                println!("   {}", truncate_text(&source.snippet, 120));
            }
        }
    }

    Ok(())
}

/// 추천 명령어 (recommend)
async fn cmd_recommend(
    config: AppConfig,
    queries: &[String],
    tags: &[String],
    top_k: usize,
    json: bool,
) -> Result<()> {
    ensure_embedding_key(&config)?;

    let hub = AgentHub::open(config).await?;
    let recommender = hub.recommender().context("추천기 초기화 실패")?;
    let items = recommender.recommend(queries, tags, top_k).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if items.is_empty() {
        println!("[!] 추천할 문서가 없습니다.");
        return Ok(());
    }

    println!("[OK] 추천 문서 ({} 건):\n", items.len());
    for (i, item) in items.iter().enumerate() {
        println!("{}. [점수: {:.4}] {}", i + 1, item.score, item.title);
        println!("   문서: {}", truncate_text(&item.doc_id, 70));
        if !item.tags.is_empty() {
            println!("   태그: {}", item.tags.join(", "));
        }
        if !item.snippet.is_empty() {
            println!("   {}", truncate_text(&item.snippet, 120));
        }
    }

    Ok(())
}

/// 직접 프롬프트 명령어 (prompt)
async fn cmd_prompt(
    mut config: AppConfig,
    prompt: &str,
    system: Option<&str>,
    domain: Domain,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
) -> Result<()> {
    if let Some(temperature) = temperature {
        config.llm.temperature = temperature;
    }
    if let Some(max_tokens) = max_tokens {
        config.llm.max_tokens = max_tokens;
    }
    config.llm.validate()?;

    let llm = create_gateway(&config.llm).context("LLM 초기화 실패")?;
    let result = generate_with_domain(llm.as_ref(), prompt, domain, system).await?;

    println!("[OK] 응답 ({}):\n", result.model);
    println!("{}", result.output);
    Ok(())
}

/// 임베딩 명령어 (embed)
async fn cmd_embed(config: AppConfig, texts: &[String], store: bool, json: bool) -> Result<()> {
    ensure_embedding_key(&config)?;

    let hub = AgentHub::open(config).await?;
    let ingestor = hub.ingestor().context("Ingestor 초기화 실패")?;
    let results = ingestor.embed_texts(texts, store).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    println!("[OK] {} 개 텍스트 임베딩 완료\n", results.len());
    for (i, result) in results.iter().enumerate() {
        let head: Vec<String> = result.vector.iter().take(4).map(|v| format!("{:.4}", v)).collect();
        println!(
            "{}. {} ({}차원) [{}, ...]",
            i + 1,
            truncate_text(&result.text, 60),
            result.dimension,
            head.join(", ")
        );
        if let Some(ref chunk_id) = result.chunk_id {
            println!("   저장됨: {}", chunk_id);
        }
    }

    Ok(())
}

/// 에이전트 명령어 (agent)
///
/// Ctrl-C를 누르면 다음 단계 경계에서 실행을 취소합니다.
async fn cmd_agent(
    config: AppConfig,
    description: String,
    data: &Path,
    domain: Domain,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    json: bool,
) -> Result<()> {
    let raw = tokio::fs::read_to_string(data)
        .await
        .with_context(|| format!("데이터 파일 읽기 실패: {}", data.display()))?;
    let rows = parse_rows(&raw)?;

    let task = AgentTask::new(description, domain, rows)?.with_date_range(from, to)?;
    let orchestrator = build_orchestrator(&config).context("파이프라인 초기화 실패")?;

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling pipeline run");
            token.cancel();
        }
    });

    if !json {
        println!(
            "[*] 파이프라인 실행 중 ({} 도메인, {} 행)",
            task.domain(),
            task.raw_data().len()
        );
    }

    let outcome = orchestrator.run(&task, &cancel).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome);
    }

    Ok(())
}

fn print_outcome(outcome: &AgentRunOutcome) {
    println!();
    for step in &outcome.steps {
        println!("  [{}] {}", step.name, truncate_text(&step.summary, 100));
    }
    println!();

    match outcome.status {
        RunStatus::Accepted => println!(
            "[OK] 채택 (점수 {}, 시도 {}회, {} ms)",
            outcome.best_score.unwrap_or_default(),
            outcome.attempts,
            outcome.elapsed_ms
        ),
        RunStatus::Rejected => println!(
            "[!] 반려 - 품질 기준 미달 (최고 점수 {}, 시도 {}회)",
            outcome
                .best_score
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string()),
            outcome.attempts
        ),
    }

    if let Some(ref rec) = outcome.recommendation {
        println!();
        println!("  실행안: {}", rec.action);
        println!("  근거:   {}", rec.rationale);
        println!("  효과:   {}", rec.expected_impact);
        if !rec.targets.is_empty() {
            println!("  대상:   {}", rec.targets.join(", "));
        }
    }

    if !outcome.final_reasons.is_empty() {
        println!();
        println!("  Judge 사유:");
        for reason in &outcome.final_reasons {
            println!("    - {}", reason);
        }
    }
}

/// 목록 명령어 (list)
async fn cmd_list(config: AppConfig, limit: usize) -> Result<()> {
    let hub = AgentHub::open(config).await?;
    let docs = hub
        .chunks()
        .list_documents(limit)
        .context("문서 목록 조회 실패")?;

    if docs.is_empty() {
        println!("[!] 저장된 문서가 없습니다.");
        return Ok(());
    }

    println!("[OK] 저장된 문서 ({} 건):\n", docs.len());

    for doc in docs {
        println!("  {}", truncate_text(&doc.doc_id, 70));
        println!(
            "        {} | {} 청크 | {} chars",
            doc.updated_at.format("%Y-%m-%d %H:%M"),
            doc.chunk_count,
            doc.total_chars
        );
        println!();
    }

    Ok(())
}

/// 삭제 명령어 (delete)
async fn cmd_delete(config: AppConfig, doc_id: &str) -> Result<()> {
    let hub = AgentHub::open(config).await?;
    let (vectors, chunks) = hub.delete_document(doc_id).await?;

    if vectors == 0 && chunks == 0 {
        println!("[!] 삭제할 문서를 찾을 수 없습니다: {}", doc_id);
    } else {
        println!(
            "[OK] {} 삭제됨 (벡터 {} 개, 청크 {} 개)",
            doc_id, vectors, chunks
        );
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: AppConfig) -> Result<()> {
    println!("agenthub v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir().display());

    match config.llm.backend {
        LlmBackend::Openai if config.llm.api_key.is_some() => {
            println!("[OK] LLM: {} (API 키 설정됨)", config.llm.model)
        }
        LlmBackend::Openai => {
            println!("[!] LLM: {} (API 키 미설정)", config.llm.model);
            println!("    설정: export LLM_API_KEY=your-key");
        }
        LlmBackend::Local => println!(
            "[OK] LLM: 로컬 {} ({})",
            config.llm.local_model, config.llm.local_base_url
        ),
    }

    if config.embedding.backend == EmbeddingBackend::Gemini {
        if has_api_key() {
            println!("[OK] 임베딩 API 키: 설정됨");
        } else {
            println!("[!] 임베딩 API 키: 미설정");
            println!("    설정: export GEMINI_API_KEY=your-key");
        }
    }

    println!(
        "[*] 파이프라인: 기준 {}점, 최대 {}회 시도",
        config.pipeline.judge_threshold, config.pipeline.retry_budget
    );

    match AgentHub::open(config).await {
        Ok(hub) => match hub.status().await {
            Ok(status) => {
                println!(
                    "[OK] 저장된 문서: {} 건 ({} 청크)",
                    status.store.document_count, status.store.chunk_count
                );
                println!(
                    "     총 콘텐츠: {}",
                    format_bytes(status.store.total_content_bytes)
                );
                println!(
                    "[OK] 벡터 인덱스: {} 청크 ({}차원)",
                    status.vector_count, status.embedding_dimension
                );
            }
            Err(e) => {
                println!("[!] 통계 조회 실패: {}", e);
            }
        },
        Err(e) => {
            println!("[!] 저장소 열기 실패: {:#}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Gemini 임베딩은 API 키가 있어야 함
fn ensure_embedding_key(config: &AppConfig) -> Result<()> {
    if config.embedding.backend == EmbeddingBackend::Gemini && !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\
             설정: export GEMINI_API_KEY=your-key"
        );
    }
    Ok(())
}

/// 입력 데이터 파싱 - JSON 객체 배열만 허용
fn parse_rows(raw: &str) -> Result<Vec<Row>> {
    let value: serde_json::Value =
        serde_json::from_str(raw).context("데이터 파일이 올바른 JSON이 아닙니다")?;

    let serde_json::Value::Array(items) = value else {
        bail!("데이터는 JSON 객체 배열이어야 합니다");
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            serde_json::Value::Object(row) => Ok(row),
            other => bail!("{}번째 항목이 객체가 아닙니다: {}", i, other),
        })
        .collect()
}

fn method_label(method: SearchMethod) -> &'static str {
    match method {
        SearchMethod::Vector => "VEC",
        SearchMethod::Lexical => "FTS",
        SearchMethod::Hybrid => "HYB",
    }
}

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
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("hello\nworld", 20), "hello world");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_truncate_unicode() {
        let korean = "안녕하세요 세계";
        let truncated = truncate_text(korean, 5);
        assert_eq!(truncated, "안녕하세요...");
    }

    #[test]
    fn test_parse_rows() {
        let rows = parse_rows(r#"[{"campaign": "a", "clicks": 3}, {"campaign": "b"}]"#).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["campaign"], "a");

        assert!(parse_rows(r#"{"campaign": "a"}"#).is_err());
        assert!(parse_rows(r#"[{"a": 1}, 3]"#).is_err());
        assert!(parse_rows("not json").is_err());
        assert!(parse_rows("[]").unwrap().is_empty());
    }

    #[test]
    fn test_cli_parses_agent_command() {
        let cli = Cli::try_parse_from([
            "agenthub", "agent", "reduce cpa", "--data", "rows.json", "--domain", "ads",
            "--from", "2024-01-01", "--to", "2024-01-31",
        ])
        .unwrap();

        match cli.command {
            Commands::Agent {
                domain, from, to, json, ..
            } => {
                assert_eq!(domain, Domain::Ads);
                assert_eq!(from, NaiveDate::from_ymd_opt(2024, 1, 1));
                assert_eq!(to, NaiveDate::from_ymd_opt(2024, 1, 31));
                assert!(!json);
            }
            _ => panic!("expected agent command"),
        }
    }

    #[test]
    fn test_cli_parses_ask_strategy() {
        let cli = Cli::try_parse_from(["agenthub", "ask", "q", "--strategy", "graph"]).unwrap();
        match cli.command {
            Commands::Ask { strategy, .. } => assert_eq!(strategy, RagStrategy::Graph),
            _ => panic!("expected ask command"),
        }

        let cli = Cli::try_parse_from(["agenthub", "ask", "q"]).unwrap();
        match cli.command {
            Commands::Ask { strategy, .. } => assert_eq!(strategy, RagStrategy::Standard),
            _ => panic!("expected ask command"),
        }
    }

    #[test]
    fn test_cli_parses_recommend_command() {
        let cli = Cli::try_parse_from([
            "agenthub", "recommend", "first question", "second question", "--tag", "rust,rag",
            "--tag", "cli", "-k", "3",
        ])
        .unwrap();

        match cli.command {
            Commands::Recommend {
                queries, tags, top_k, json,
            } => {
                assert_eq!(queries, vec!["first question", "second question"]);
                assert_eq!(tags, vec!["rust", "rag", "cli"]);
                assert_eq!(top_k, 3);
                assert!(!json);
            }
            _ => panic!("expected recommend command"),
        }

        assert!(Cli::try_parse_from(["agenthub", "recommend"]).is_err());
    }

    #[test]
    fn test_cli_parses_prompt_overrides() {
        let cli = Cli::try_parse_from([
            "agenthub", "prompt", "summarize this", "--system", "be brief", "-d", "finance",
            "--temperature", "0.7", "--max-tokens", "256",
        ])
        .unwrap();

        match cli.command {
            Commands::Prompt {
                prompt,
                system,
                domain,
                temperature,
                max_tokens,
            } => {
                assert_eq!(prompt, "summarize this");
                assert_eq!(system.as_deref(), Some("be brief"));
                assert_eq!(domain, Domain::Finance);
                assert_eq!(temperature, Some(0.7));
                assert_eq!(max_tokens, Some(256));
            }
            _ => panic!("expected prompt command"),
        }
    }

    #[test]
    fn test_cli_parses_embed_and_ingest_tags() {
        let cli = Cli::try_parse_from(["agenthub", "embed", "a", "b", "--store"]).unwrap();
        match cli.command {
            Commands::Embed { texts, store, json } => {
                assert_eq!(texts, vec!["a", "b"]);
                assert!(store);
                assert!(!json);
            }
            _ => panic!("expected embed command"),
        }

        let cli =
            Cli::try_parse_from(["agenthub", "ingest", "docs", "--tag", "guide"]).unwrap();
        match cli.command {
            Commands::Ingest { tags, .. } => assert_eq!(tags, vec!["guide"]),
            _ => panic!("expected ingest command"),
        }
    }

    #[test]
    fn test_cli_rejects_conflicting_search_modes() {
        let result = Cli::try_parse_from(["agenthub", "ask", "q", "--vector-only", "--hybrid"]);
        assert!(result.is_err());
    }
}
