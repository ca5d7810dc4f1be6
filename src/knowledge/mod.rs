//! Knowledge 모듈 - 검색 백엔드 저장소
//!
//! - LanceDB: 벡터 검색 (ANN)
//! - SQLite: 청크 원문 저장 + FTS5 키워드 검색 + 백필 조회
//!
//! 검색 파이프라인은 트레이트(`VectorIndex`, `LexicalIndex`, `ContentStore`)만
//! 알고 있어 테스트에서 가짜 구현으로 바꿀 수 있습니다.

mod lance;
mod lexical;
mod store;
mod vector;

// Re-exports
pub use lance::LanceVectorIndex;
pub use lexical::{ContentStore, LexicalIndex};
pub use store::{doc_id_of, ChunkStore, DocumentSummary, StoreStats};
#[cfg(test)]
pub(crate) use store::hold_connection;
pub use vector::{chunk_text, VectorEntry, VectorIndex};
