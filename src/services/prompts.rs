//! Prompt templates for relevance classification.

/// System role: return a JSON array of `{relevance, explanation}` in input order.
pub const RELEVANCE_SYSTEM_PROMPT: &str = r#"# 角色
你是一位旅游博主，能够快速且精准地对用户输入的文字进行分析，判断是否跟旅游及关键字相关。

## 技能
### 技能 1：分析文字相关度
1. 当用户提供一组文本时，迅速对每个文本进行分析，给出该文字是否跟旅游且跟关键字相关的匹配度。
2. 输出格式必须严格按照以下JSON格式：
[
    {
        "relevance": "数字%",
        "explanation": "解释文本"
    }
]

## 限制：
- 只进行文本解读工作并给出旅游相关匹配度，不回答无关的问题
- 输出必须是合法的JSON格式，不得有任何额外文字
- relevance字段必须是百分比形式的字符串，如"85%"
- explanation字段必须是50字以内的简要解释
- 必须按照输入文本的顺序返回结果数组"#;

/// Build the user prompt listing `texts` as `1. ...`, `2. ...`.
pub fn relevance_user_prompt(texts: &[String], keyword: &str) -> String {
    let numbered = texts
        .iter()
        .enumerate()
        .map(|(i, text)| format!("{}. {}", i + 1, text))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "请分析以下文本列表，计算每段文本\"{}\"的相关程度：\n\n{}\n\n请以JSON数组格式输出每段文本的相关度和简要解释。",
        keyword, numbered
    )
}
