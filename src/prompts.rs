//! Prompt templates and canned degraded answers for the walkthrough assistant.
//!
//! The corpus and audience are Chinese, so all user-facing copy stays in
//! Chinese.

/// System prompt for answering questions, both from retrieved passages and
/// from general knowledge.
pub const ANSWER_SYSTEM_PROMPT: &str = "你是一个游戏攻略助手。你必须严格按照用户提供的攻略内容回答问题，不能添加攻略中没有的信息。如果攻略中没有相关信息，必须明确说明。";

/// System prompt for generating a complete fresh guide.
pub const GUIDE_SYSTEM_PROMPT: &str = "你是一个专业的游戏攻略撰写者，擅长撰写详细、实用的游戏攻略。";

/// Sampling temperature for answer synthesis; low so the model sticks to the
/// supplied passages.
pub const ANSWER_TEMPERATURE: f32 = 0.1;

/// Token budget for answer synthesis.
pub const ANSWER_MAX_TOKENS: usize = 500;

/// Sampling temperature for fresh-guide generation.
pub const GUIDE_TEMPERATURE: f32 = 0.7;

/// Token budget for fresh-guide generation.
pub const GUIDE_MAX_TOKENS: usize = 2000;

/// User prompt for answering from retrieved walkthrough passages.
pub fn rag_answer_prompt(question: &str, passages: &[String]) -> String {
    let context = passages
        .iter()
        .enumerate()
        .map(|(i, passage)| format!("段落 {}: {}", i + 1, passage))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "你是一个游戏攻略助手。请基于以下攻略内容回答用户问题。\n\n\
         【攻略内容】\n{context}\n【攻略内容结束】\n\n\
         用户问题：{question}\n\n\
         回答规则：\n\
         1. 优先使用上述攻略内容中的信息回答\n\
         2. 如果攻略中有相关内容，请直接引用或转述攻略内容\n\
         3. 如果攻略中的信息不够完整，可以适当补充合理的游戏常识，但要明确区分哪些是攻略内容，哪些是补充说明\n\
         4. 回答要详细、准确、实用，尽量提供完整的答案\n\
         5. 如果攻略内容与问题相关度不高，可以基于攻略内容进行合理推断\n\n\
         现在请基于攻略内容回答："
    )
}

/// User prompt for answering from general game knowledge, used when no
/// passages were retrieved at all.
pub fn general_answer_prompt(question: &str) -> String {
    format!(
        "你是一个专业的游戏攻略助手，拥有丰富的游戏知识和经验。\n\n\
         用户问题：{question}\n\n\
         请基于你的游戏知识，提供专业、详细的回答。回答要：\n\
         1. 准确、实用\n\
         2. 结构清晰，易于理解\n\
         3. 包含具体的建议和技巧\n\
         4. 如果问题涉及特定游戏，请提供通用的游戏策略和思路\n\n\
         请回答："
    )
}

/// User prompt for generating a complete Markdown guide for `game_title`.
pub fn guide_generation_prompt(game_title: &str, question: &str) -> String {
    format!(
        "你是一名硬核游戏攻略撰写专家。当前检测到用户询问的游戏《{game_title}》与现有攻略库不匹配，\
         请为这款游戏重新生成完整攻略。请参考以下结构输出 Markdown 内容，并确保用词专业、条理清晰：\n\n\
         ## 🎮 游戏概览\n\
         - 简述游戏类型、背景、核心特色\n\n\
         ## 💡 新手必读\n\
         - 3-5 条入门关键技巧（操作、系统、资源）\n\n\
         ## ⚔️ 核心机制解析\n\
         - 说明战斗/养成/系统玩法，给出示例或优先级\n\n\
         ## 🗺️ 任务与进度指引\n\
         - 重要主线/支线、小贴士或流程建议\n\n\
         ## 🔥 进阶与成就技巧\n\
         - 高难度挑战、装备搭配、刷资源策略\n\n\
         额外要求：\n\
         - 必须针对《{game_title}》编写，而不是其他游戏\n\
         - 可以结合用户问题提供的上下文：{question}\n\
         - 保持 Markdown 结构，使用必要的加粗、列表、表情符号增强可读性\n\
         - 中文回答"
    )
}

/// Canned answer used when no chat model is configured but passages exist.
pub fn offline_rag_answer(question: &str, passages: &[String]) -> String {
    let first = passages
        .first()
        .map(String::as_str)
        .unwrap_or("无相关内容");
    format!(
        "根据攻略内容：{first}，回答您的问题：{question}。\n\n\
         （提示：请设置 DEEPSEEK_API_KEY 环境变量以使用完整的 LLM 功能）"
    )
}

/// Canned message when guide generation is requested without a chat model.
pub const OFFLINE_GUIDE_MESSAGE: &str = "无法生成攻略：未配置 DEEPSEEK_API_KEY";

/// Explanatory answer substituted when the chat call fails mid-answer.
pub fn answer_failure_message(err: &anyhow::Error) -> String {
    format!("Deepseek API 调用失败: {err}。请检查 API 密钥配置。")
}

/// Explanatory guide body substituted when generation fails.
pub fn guide_failure_message(err: &anyhow::Error) -> String {
    format!("生成攻略时出错: {err}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rag_prompt_numbers_every_passage() {
        let passages = vec!["钓鱼需要鱼竿".to_string(), "春天可以钓鲤鱼".to_string()];
        let prompt = rag_answer_prompt("怎么钓鱼", &passages);
        assert!(prompt.contains("段落 1: 钓鱼需要鱼竿"));
        assert!(prompt.contains("段落 2: 春天可以钓鲤鱼"));
        assert!(prompt.contains("用户问题：怎么钓鱼"));
    }

    #[test]
    fn guide_prompt_targets_the_requested_game() {
        let prompt = guide_generation_prompt("原神", "七天神像在哪");
        assert!(prompt.contains("《原神》"));
        assert!(prompt.contains("七天神像在哪"));
    }

    #[test]
    fn offline_answer_quotes_the_best_passage() {
        let answer = offline_rag_answer("怎么钓鱼", &["按住左键".to_string()]);
        assert!(answer.contains("按住左键"));
        assert!(answer.contains("怎么钓鱼"));
    }
}
