//! Retrieval 모듈 - 하이브리드 검색 결과 통합
//!
//! 벡터 검색과 키워드 검색 결과를 RRF(Reciprocal Rank Fusion)로 합치고,
//! 텍스트가 빠진 결과를 콘텐츠 저장소에서 채운 뒤,
//! 문자 예산 안에서 프롬프트 컨텍스트를 조립합니다.
//!
//! ## 흐름
//! ```text
//! question ─┬─> VectorIndex  ─┐
//!           └─> LexicalIndex ─┴─> fuse ─> backfill ─> assemble ─> Context
//! ```

mod context;
mod fusion;
mod retriever;
mod types;

pub use context::{assemble, Context, ContextBlock};
pub use fusion::{backfill, fuse, BackfillReport, DEFAULT_RRF_CONSTANT};
pub use retriever::{HybridRetriever, Retrieval, RetrievalRequest};
pub use types::{
    normalize_tags, set_tags, tags_of, FusedHit, HitSource, Metadata, RetrievalHit, SearchMethod,
    INGESTED_AT_KEY, TAGS_KEY, TITLE_KEY,
};
