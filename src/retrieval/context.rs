//! Context Assembler - 프롬프트 컨텍스트 조립
//!
//! 통합 순위대로 청크를 통째로 받아들이다가 다음 청크가 예산을
//! 넘기면 멈춥니다. 청크 중간을 자르지 않습니다.

use serde::Serialize;

use super::types::FusedHit;

/// 컨텍스트 블록 (청크 하나)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextBlock {
    pub chunk_id: String,
    pub text: String,
    pub fused_score: f64,
}

/// 조립된 컨텍스트
///
/// `size()`는 블록 텍스트의 문자 수 합이며 항상 예산 이하입니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Context {
    blocks: Vec<ContextBlock>,
    size: usize,
    budget: usize,
}

impl Context {
    pub fn blocks(&self) -> &[ContextBlock] {
        &self.blocks
    }

    /// 블록 텍스트 문자 수 합
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// 프롬프트용 텍스트 (번호 + chunk_id 라벨)
    pub fn render(&self) -> String {
        self.blocks
            .iter()
            .enumerate()
            .map(|(i, block)| format!("[{}] ({})\n{}", i + 1, block.chunk_id, block.text))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// 통합 결과를 예산 안에서 컨텍스트로 조립
///
/// - 텍스트가 없는 결과(백필 실패)는 건너뜀
/// - 예산을 넘기는 첫 블록에서 멈춤 (낮은 점수부터 잘림)
/// - 같은 입력과 예산이면 항상 같은 결과
///
/// # Arguments
/// * `fused` - fused_score 내림차순 결과
/// * `budget` - 최대 문자 수
pub fn assemble(fused: &[FusedHit], budget: usize) -> Context {
    let mut blocks = Vec::new();
    let mut size = 0usize;

    for hit in fused {
        let Some(text) = hit.text.as_deref() else {
            continue;
        };

        let block_size = text.chars().count();
        if size + block_size > budget {
            tracing::debug!(
                "Context budget reached at {} ({} + {} > {})",
                hit.chunk_id,
                size,
                block_size,
                budget
            );
            break;
        }

        size += block_size;
        blocks.push(ContextBlock {
            chunk_id: hit.chunk_id.clone(),
            text: text.to_string(),
            fused_score: hit.fused_score,
        });
    }

    Context {
        blocks,
        size,
        budget,
    }
}
