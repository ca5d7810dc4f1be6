//! Chunk Store - rusqlite 기반 청크 저장소
//!
//! 청크 원문을 저장하고 FTS5 키워드 검색(BM25)을 제공합니다.
//! 키워드 인덱스이자 백필용 콘텐츠 저장소입니다.
//! 저장 위치: ~/.agenthub-rag/knowledge.db

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OpenFlags};
use serde::Serialize;

use super::lexical::{ContentStore, LexicalIndex};
use crate::retrieval::{HitSource, Metadata, RetrievalHit};

// ============================================================================
// Types
// ============================================================================

/// 저장된 문서 요약 (청크 묶음)
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub doc_id: String,
    pub chunk_count: usize,
    pub total_chars: usize,
    pub updated_at: DateTime<Utc>,
}

/// 저장소 통계
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub document_count: usize,
    pub chunk_count: usize,
    pub total_content_bytes: usize,
    pub db_path: PathBuf,
}

// ============================================================================
// ChunkStore
// ============================================================================

/// Chunk Store - 동기 SQLite 저장소
pub struct ChunkStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl ChunkStore {
    /// 저장소 열기 (없으면 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create database directory")?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to open SQLite database")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS chunks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                chunk_id TEXT NOT NULL UNIQUE,
                doc_id TEXT NOT NULL,
                text TEXT NOT NULL,
                metadata TEXT NOT NULL DEFAULT '{}',
                updated_at TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create chunks table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_chunks_doc_id ON chunks(doc_id)",
            [],
        )
        .context("Failed to create doc_id index")?;

        // FTS5 가상 테이블 (external content)
        // source: https://www.sqlite.org/fts5.html
        conn.execute(
            "CREATE VIRTUAL TABLE IF NOT EXISTS chunks_fts USING fts5(
                text,
                content=chunks,
                content_rowid=id
            )",
            [],
        )
        .context("FTS5 is required for lexical search")?;

        // FTS5 동기화 트리거 (upsert는 UPDATE 트리거로 반영됨)
        conn.execute_batch(
            r#"
            CREATE TRIGGER IF NOT EXISTS chunks_ai AFTER INSERT ON chunks BEGIN
                INSERT INTO chunks_fts(rowid, text) VALUES (new.id, new.text);
            END;

            CREATE TRIGGER IF NOT EXISTS chunks_ad AFTER DELETE ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, text) VALUES('delete', old.id, old.text);
            END;

            CREATE TRIGGER IF NOT EXISTS chunks_au AFTER UPDATE ON chunks BEGIN
                INSERT INTO chunks_fts(chunks_fts, rowid, text) VALUES('delete', old.id, old.text);
                INSERT INTO chunks_fts(rowid, text) VALUES (new.id, new.text);
            END;
            "#,
        )
        .context("Failed to create FTS5 triggers")?;

        tracing::debug!("Chunk store initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 청크 저장 (chunk_id가 같으면 갱신)
    pub fn put_chunk(&self, chunk_id: &str, text: &str, metadata: &Metadata) -> Result<()> {
        let conn = self.lock()?;
        let doc_id = metadata
            .get("doc_id")
            .cloned()
            .unwrap_or_else(|| doc_id_of(chunk_id).to_string());
        let metadata_json =
            serde_json::to_string(metadata).context("Failed to serialize chunk metadata")?;

        conn.execute(
            "INSERT INTO chunks (chunk_id, doc_id, text, metadata, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(chunk_id) DO UPDATE SET
                doc_id = excluded.doc_id,
                text = excluded.text,
                metadata = excluded.metadata,
                updated_at = excluded.updated_at",
            params![chunk_id, doc_id, text, metadata_json, Utc::now().to_rfc3339()],
        )
        .context("Failed to upsert chunk")?;

        Ok(())
    }

    /// 문서 목록 (문서 단위로 청크 집계)
    pub fn list_documents(&self, limit: usize) -> Result<Vec<DocumentSummary>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT doc_id, COUNT(*), COALESCE(SUM(LENGTH(text)), 0), MAX(updated_at)
             FROM chunks
             GROUP BY doc_id
             ORDER BY MAX(updated_at) DESC
             LIMIT ?1",
        )?;

        let docs = stmt
            .query_map(params![limit as i64], |row| {
                Ok(DocumentSummary {
                    doc_id: row.get(0)?,
                    chunk_count: row.get::<_, i64>(1)? as usize,
                    total_chars: row.get::<_, i64>(2)? as usize,
                    updated_at: parse_datetime(row.get::<_, String>(3)?),
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(docs)
    }

    /// 문서의 모든 청크 삭제
    pub fn delete_document(&self, doc_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM chunks WHERE doc_id = ?1", params![doc_id])?;
        Ok(rows)
    }

    /// 연결 잠금과 쿼리를 blocking 풀에서 실행
    ///
    /// 잠금 대기나 느린 쿼리가 런타임 워커를 막지 않으므로
    /// 호출자의 타임아웃이 제때 동작합니다.
    async fn run_blocking<T, F>(&self, task: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
            task(&*guard)
        })
        .await
        .context("Chunk store task failed")?
    }

    /// 저장소 통계
    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;

        let (chunks, docs, bytes): (i64, i64, i64) = conn
            .query_row(
                "SELECT COUNT(*), COUNT(DISTINCT doc_id), COALESCE(SUM(LENGTH(text)), 0) FROM chunks",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap_or((0, 0, 0));

        Ok(StoreStats {
            document_count: docs as usize,
            chunk_count: chunks as usize,
            total_content_bytes: bytes as usize,
            db_path: self.db_path.clone(),
        })
    }
}

#[async_trait]
impl LexicalIndex for ChunkStore {
    async fn search(&self, query_text: &str, top_k: usize) -> Result<Vec<RetrievalHit>> {
        let query = query_text.to_string();
        self.run_blocking(move |conn| query_fts(conn, &query, top_k)).await
    }

    async fn index(&self, chunk_id: &str, text: &str, metadata: &Metadata) -> Result<()> {
        self.put_chunk(chunk_id, text, metadata)
    }

    async fn delete_document(&self, doc_id: &str) -> Result<usize> {
        ChunkStore::delete_document(self, doc_id)
    }
}

#[async_trait]
impl ContentStore for ChunkStore {
    async fn batch_get(&self, chunk_ids: &BTreeSet<String>) -> Result<HashMap<String, String>> {
        let chunk_ids = chunk_ids.clone();
        self.run_blocking(move |conn| select_texts(conn, &chunk_ids)).await
    }
}

// ============================================================================
// Queries
// ============================================================================

/// FTS5 키워드 검색
///
/// BM25 스코어는 낮을수록 관련도가 높으므로 부호를 뒤집어
/// `raw_score`가 높을수록 좋도록 맞춥니다.
/// 결과의 텍스트는 비워 두고 스니펫만 메타데이터에 담습니다 (백필 대상).
/// source: https://www.sqlite.org/fts5.html#the_bm25_function
fn query_fts(conn: &Connection, query: &str, limit: usize) -> Result<Vec<RetrievalHit>> {
    let escaped_query = escape_fts5_query(query);
    if escaped_query.is_empty() {
        return Ok(vec![]);
    }

    let mut stmt = conn.prepare(
        r#"
        SELECT
            c.chunk_id,
            c.doc_id,
            snippet(chunks_fts, 0, '<b>', '</b>', '...', 32) AS snippet,
            bm25(chunks_fts) AS bm25_score
        FROM chunks_fts
        JOIN chunks c ON c.id = chunks_fts.rowid
        WHERE chunks_fts MATCH ?1
        ORDER BY bm25(chunks_fts), c.chunk_id
        LIMIT ?2
        "#,
    )?;

    let hits = stmt
        .query_map(params![escaped_query, limit as i64], |row| {
            let chunk_id: String = row.get(0)?;
            let doc_id: String = row.get(1)?;
            let snippet: String = row.get(2)?;
            let bm25: f64 = row.get(3)?;

            let mut metadata = Metadata::new();
            metadata.insert("doc_id".to_string(), doc_id);
            metadata.insert("snippet".to_string(), snippet);

            Ok(RetrievalHit::unranked(chunk_id, HitSource::Lexical, -bm25, None, metadata))
        })?
        .filter_map(|r| r.ok())
        .collect::<Vec<_>>();

    Ok(RetrievalHit::rank_in_order(hits))
}

/// chunk_id 배치로 텍스트 조회 (쿼리 1회, 찾은 것만 반환)
fn select_texts(conn: &Connection, chunk_ids: &BTreeSet<String>) -> Result<HashMap<String, String>> {
    if chunk_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders = vec!["?"; chunk_ids.len()].join(", ");
    let sql = format!(
        "SELECT chunk_id, text FROM chunks WHERE chunk_id IN ({})",
        placeholders
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(chunk_ids.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .filter_map(|r| r.ok())
        .collect();

    Ok(rows)
}

// ============================================================================
// Helper Functions
// ============================================================================

/// `{doc_id}#{chunk_index}` 형태에서 doc_id 추출
pub fn doc_id_of(chunk_id: &str) -> &str {
    chunk_id
        .rsplit_once('#')
        .map(|(doc, _)| doc)
        .unwrap_or(chunk_id)
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// FTS5 쿼리 이스케이프
///
/// 특수 문자를 제거하고 단어를 OR로 묶습니다 (BM25 매칭은 어느 단어든 허용).
/// source: https://www.sqlite.org/fts5.html#full_text_query_syntax
fn escape_fts5_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|w| {
            w.chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .collect::<String>()
        })
        .filter(|w| !w.is_empty())
        .map(|w| format!("\"{}\"", w))
        .collect::<Vec<_>>()
        .join(" OR ")
}

// ============================================================================
// Tests
// ============================================================================

/// 다른 스레드에서 연결 잠금을 1초간 잡아 둠
///
/// 잠금을 잡은 뒤에 반환합니다.
#[cfg(test)]
pub(crate) fn hold_connection(store: &ChunkStore) -> std::thread::JoinHandle<()> {
    let conn = store.conn.clone();
    let (locked_tx, locked_rx) = std::sync::mpsc::channel();
    let handle = std::thread::spawn(move || {
        let _guard = conn.lock().unwrap();
        locked_tx.send(()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1000));
    });
    locked_rx.recv().unwrap();
    handle
}
