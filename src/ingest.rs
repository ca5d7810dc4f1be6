//! 문서 수집 - 청크 분할 후 두 인덱스에 기록
//!
//! 파일 또는 폴더(재귀)의 텍스트 파일을 읽어 단어 단위 청크로 나누고,
//! 임베딩과 함께 벡터 인덱스에, 원문은 키워드 인덱스에 저장합니다.
//! 청크 ID는 `{doc_id}#{chunk_index}` 형식입니다.
//!
//! 파일 하나의 실패는 전체를 멈추지 않고 `failed_files`에 모입니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::config::IngestConfig;
use crate::embedding::EmbeddingProvider;
use crate::knowledge::{chunk_text, LexicalIndex, VectorEntry, VectorIndex};
use crate::retrieval::{normalize_tags, set_tags, Metadata, INGESTED_AT_KEY, TITLE_KEY};

/// 텍스트로 읽을 확장자
const TEXT_EXTENSIONS: &[&str] = &[
    "md", "markdown", "txt", "rst", "csv", "json", "toml", "yaml", "yml", "html", "xml", "rs",
    "py", "ts", "js", "go", "java", "sql", "sh",
];

/// 건너뛸 디렉토리
const SKIP_DIRS: &[&str] = &[".git", "node_modules", "target", "__pycache__", ".venv"];

// ============================================================================
// Types
// ============================================================================

/// 수집 결과
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// 성공한 파일(문서) 수
    pub success_count: usize,
    /// 기록된 청크 수
    pub chunk_count: usize,
    /// 실패한 파일 경로
    pub failed_files: Vec<String>,
}

/// 임베딩 결과 (`embed` 명령)
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddedText {
    pub text: String,
    pub dimension: usize,
    pub vector: Vec<f32>,
    /// 저장한 경우 청크 ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
}

// ============================================================================
// Ingestor
// ============================================================================

/// 문서 수집기
pub struct Ingestor {
    embedder: Arc<dyn EmbeddingProvider>,
    vector: Arc<dyn VectorIndex>,
    lexical: Arc<dyn LexicalIndex>,
    config: IngestConfig,
    tags: Vec<String>,
}

impl Ingestor {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        vector: Arc<dyn VectorIndex>,
        lexical: Arc<dyn LexicalIndex>,
        config: IngestConfig,
    ) -> Self {
        Self {
            embedder,
            vector,
            lexical,
            config,
            tags: Vec::new(),
        }
    }

    /// 수집하는 모든 청크에 붙일 태그
    pub fn with_tags<S: AsRef<str>>(mut self, tags: &[S]) -> Self {
        self.tags = normalize_tags(tags);
        self
    }

    /// 청크 공통 메타데이터
    fn chunk_metadata(&self, doc_id: &str, index: usize) -> Metadata {
        let mut metadata = Metadata::new();
        metadata.insert("doc_id".to_string(), doc_id.to_string());
        metadata.insert("chunk_index".to_string(), index.to_string());
        metadata.insert(TITLE_KEY.to_string(), title_of(doc_id));
        metadata.insert(INGESTED_AT_KEY.to_string(), Utc::now().to_rfc3339());
        set_tags(&mut metadata, &self.tags);
        metadata
    }

    /// 텍스트 하나를 문서로 수집
    ///
    /// 같은 doc_id가 있으면 기존 청크를 지우고 새로 씁니다.
    /// 기록된 청크 수를 반환합니다.
    pub async fn ingest_text(&self, doc_id: &str, text: &str) -> Result<usize> {
        let chunks = chunk_text(text, self.config.chunk_size, self.config.overlap);
        if chunks.is_empty() {
            anyhow::bail!("Document {} has no text", doc_id);
        }

        let embeddings = self
            .embedder
            .embed_batch(&chunks)
            .await
            .with_context(|| format!("Failed to embed chunks of {}", doc_id))?;

        if embeddings.len() != chunks.len() {
            anyhow::bail!(
                "Embedding count mismatch for {}: {} chunks, {} embeddings",
                doc_id,
                chunks.len(),
                embeddings.len()
            );
        }

        self.delete_document(doc_id).await?;

        let mut entries = Vec::with_capacity(chunks.len());
        for (index, (text, embedding)) in chunks.into_iter().zip(embeddings).enumerate() {
            let chunk_id = format!("{}#{}", doc_id, index);
            let metadata = self.chunk_metadata(doc_id, index);

            self.lexical
                .index(&chunk_id, &text, &metadata)
                .await
                .with_context(|| format!("Failed to index chunk {}", chunk_id))?;

            entries.push(VectorEntry {
                chunk_id,
                doc_id: doc_id.to_string(),
                text,
                embedding,
                metadata,
            });
        }

        let written = self
            .vector
            .upsert_batch(entries)
            .await
            .with_context(|| format!("Failed to write vectors of {}", doc_id))?;

        tracing::info!("Ingested {} ({} chunks)", doc_id, written);
        Ok(written)
    }

    /// 파일/폴더 목록 수집
    ///
    /// 폴더는 재귀로 텍스트 파일을 찾습니다. 문서 ID는 파일 경로입니다.
    pub async fn ingest_paths(&self, paths: &[PathBuf]) -> IngestReport {
        let mut report = IngestReport::default();

        for path in paths {
            let files = match collect_files(path) {
                Ok(files) => files,
                Err(e) => {
                    tracing::warn!("Failed to collect {}: {:#}", path.display(), e);
                    report.failed_files.push(path.display().to_string());
                    continue;
                }
            };

            for file in files {
                match self.ingest_file(&file).await {
                    Ok(chunks) => {
                        report.success_count += 1;
                        report.chunk_count += chunks;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to ingest {}: {:#}", file.display(), e);
                        report.failed_files.push(file.display().to_string());
                    }
                }
            }
        }

        tracing::info!(
            "Ingest finished: {} succeeded, {} failed, {} chunks",
            report.success_count,
            report.failed_files.len(),
            report.chunk_count
        );
        report
    }

    async fn ingest_file(&self, path: &Path) -> Result<usize> {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        self.ingest_text(&path.display().to_string(), &text).await
    }

    /// 텍스트 목록 임베딩
    ///
    /// `store`이면 텍스트마다 `embed-{uuid}` 문서(청크 하나)로 두 인덱스에 기록합니다.
    /// 청크 분할은 하지 않습니다.
    pub async fn embed_texts(&self, texts: &[String], store: bool) -> Result<Vec<EmbeddedText>> {
        if texts.is_empty() {
            anyhow::bail!("No texts to embed");
        }
        if let Some(pos) = texts.iter().position(|t| t.trim().is_empty()) {
            anyhow::bail!("Text #{} is empty", pos);
        }

        let vectors = self
            .embedder
            .embed_batch(texts)
            .await
            .context("Failed to embed texts")?;
        if vectors.len() != texts.len() {
            anyhow::bail!(
                "Embedding count mismatch: {} texts, {} embeddings",
                texts.len(),
                vectors.len()
            );
        }

        let mut results = Vec::with_capacity(texts.len());
        for (text, vector) in texts.iter().zip(vectors) {
            let chunk_id = if store {
                let doc_id = format!("embed-{}", Uuid::new_v4());
                let chunk_id = format!("{}#0", doc_id);
                let metadata = self.chunk_metadata(&doc_id, 0);

                self.lexical
                    .index(&chunk_id, text, &metadata)
                    .await
                    .with_context(|| format!("Failed to index chunk {}", chunk_id))?;
                self.vector
                    .upsert(VectorEntry {
                        chunk_id: chunk_id.clone(),
                        doc_id,
                        text: text.clone(),
                        embedding: vector.clone(),
                        metadata,
                    })
                    .await
                    .with_context(|| format!("Failed to write vector {}", chunk_id))?;
                Some(chunk_id)
            } else {
                None
            };

            results.push(EmbeddedText {
                text: text.clone(),
                dimension: vector.len(),
                vector,
                chunk_id,
            });
        }

        tracing::info!(
            "Embedded {} texts (stored: {})",
            results.len(),
            store
        );
        Ok(results)
    }

    /// 두 인덱스에서 문서 삭제 - (벡터, 키워드) 삭제 수
    pub async fn delete_document(&self, doc_id: &str) -> Result<(usize, usize)> {
        let vectors = self
            .vector
            .delete_document(doc_id)
            .await
            .context("Failed to delete vectors")?;
        let chunks = self
            .lexical
            .delete_document(doc_id)
            .await
            .context("Failed to delete chunks")?;
        Ok((vectors, chunks))
    }
}

// ============================================================================
// File Collection
// ============================================================================

/// 문서 ID에서 제목 (경로면 파일 이름)
pub fn title_of(doc_id: &str) -> String {
    Path::new(doc_id)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(doc_id)
        .to_string()
}

/// 텍스트 파일 여부 (확장자 기준)
pub fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| TEXT_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// 경로에서 수집할 파일 목록 (정렬됨)
///
/// 파일을 직접 지정하면 확장자와 관계없이 포함합니다.
pub fn collect_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        anyhow::bail!("Path not found: {}", path.display());
    }

    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| {
            !(e.file_type().is_dir()
                && e.depth() > 0
                && e.file_name()
                    .to_str()
                    .map(|name| SKIP_DIRS.contains(&name))
                    .unwrap_or(false))
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_text_file(e.path()))
        .map(|e| e.into_path())
        .collect();

    files.sort();
    Ok(files)
}

// ============================================================================
// Tests
// ============================================================================
