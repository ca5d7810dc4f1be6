//! 프롬프트 템플릿
//!
//! 도메인 기본 시스템 프롬프트와 각 단계(RAG 답변, 분석, 초안, 채점)의
//! 사용자 프롬프트를 만듭니다.

use crate::agent::Domain;

// ============================================================================
// System Prompts
// ============================================================================

/// 도메인 기본 시스템 프롬프트
pub fn system_prompt_for(domain: Domain) -> &'static str {
    match domain {
        Domain::Finance => {
            "당신은 신중한 금융 지식 자문가입니다. 답변은 반드시 주어진 자료에 근거하고 위험 요소를 함께 밝히세요."
        }
        Domain::Ads => {
            "당신은 데이터 기반 광고 최적화 전문가입니다. 지표를 분석하고 구체적인 개선안을 제시합니다."
        }
        Domain::General => "당신은 친절하고 일관된 AI 어시스턴트입니다.",
    }
}

pub const RAG_SYSTEM_PROMPT: &str =
    "당신은 문서를 근거로 답하는 기술/금융 문서 안내자입니다. 문서에 없는 내용은 추측하지 마세요.";

pub const ANALYSIS_SYSTEM_PROMPT: &str = "당신은 데이터 분석 컨설턴트입니다.";

pub const DRAFT_SYSTEM_PROMPT: &str =
    "당신은 성과형 광고와 운영 최적화를 담당하는 시니어 전문가입니다. 요청된 JSON 형식만 출력합니다.";

pub const JUDGE_SYSTEM_PROMPT: &str =
    "당신은 엄격한 품질 심사관입니다. 제안이 과제에 맞고 데이터에 근거하며 실행 가능한지 평가합니다. 요청된 JSON 형식만 출력합니다.";

// ============================================================================
// User Prompts
// ============================================================================

/// RAG 답변 프롬프트
pub fn rag_prompt(question: &str, context: &str) -> String {
    format!(
        "다음은 질문과 관련된 문서 내용입니다:\n{}\n\n\
         위 내용만 근거로 질문에 정확히 답하세요. 자료가 부족하면 부족하다고 분명히 말하세요.\n\
         답변에 사용한 문서는 [번호]로 표시하세요.\n\
         질문: {}",
        context, question
    )
}

/// 관계 중심(Graph RAG) 답변 머리말
pub const GRAPH_RAG_PREAMBLE: &str =
    "문서에 등장하는 개체(사람, 조직, 상품, 지표)와 그 사이의 관계를 먼저 정리한 뒤, \
     그 관계를 따라가며 답하세요.";

/// Graph RAG 답변 프롬프트
pub fn graph_rag_prompt(question: &str, context: &str) -> String {
    format!("{}\n\n{}", GRAPH_RAG_PREAMBLE, rag_prompt(question, context))
}

/// 분석 서술 프롬프트
pub fn analysis_prompt(task: &str, summary: &str) -> String {
    format!(
        "과제: {}\n\n다음은 집계된 데이터 요약입니다:\n{}\n\n\
         가장 성과가 좋은 항목과 나쁜 항목을 짚고, 그 이유와 추세를 간단히 설명하세요.",
        task, summary
    )
}

/// 최적화 초안 프롬프트
///
/// `feedback`이 비어 있지 않으면 이전 시도의 심사 사유를 그대로 붙입니다.
pub fn draft_prompt(task: &str, summary: &str, insights: &str, feedback: &str) -> String {
    let mut prompt = format!(
        "과제: {}\n\n데이터 요약:\n{}\n\n분석:\n{}\n\n\
         위 내용을 바탕으로 구체적인 최적화 제안 하나를 작성하세요.\n\
         다음 JSON 객체 하나만 출력하세요:\n\
         {{\"action\": \"무엇을 할지\", \"rationale\": \"데이터 근거\", \
         \"expected_impact\": \"예상 효과\", \"targets\": [\"대상 항목\"]}}\n\
         action, rationale, expected_impact는 비어 있으면 안 됩니다.",
        task, summary, insights
    );

    if !feedback.is_empty() {
        prompt.push_str("\n\n이전 제안은 다음 이유로 반려되었습니다. 모두 고쳐서 다시 작성하세요:\n");
        prompt.push_str(feedback);
    }

    prompt
}

/// Judge 채점 프롬프트
pub fn judge_prompt(task: &str, draft_json: &str) -> String {
    format!(
        "과제: {}\n\n심사할 제안:\n{}\n\n\
         제안이 과제를 해결하는지, 데이터에 근거하는지, 실행 가능한지 0~100점으로 평가하세요.\n\
         다음 JSON 객체 하나만 출력하세요:\n\
         {{\"score\": 정수, \"reasons\": [\"감점 또는 개선이 필요한 이유\"]}}",
        task, draft_json
    )
}
