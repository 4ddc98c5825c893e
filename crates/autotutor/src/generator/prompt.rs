//! Prompt construction for comment generation.

use gradebook::RowRecord;

/// Placeholder substituted with the target column name.
pub const TARGET_COLUMN_PLACEHOLDER: &str = "{TARGET_COLUMN}";

/// Default system instruction.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a senior high school teaching assistant (Math & Physics).
I will provide you with a JSON object representing ONE student's data row.
Your task is to:
1. **Analyze the Row**: Identify which fields hold the score or grade, the subject, the lesson content and the student's name.
2. **Focus on Column '{TARGET_COLUMN}'**: This column holds a keyword naming the student's weak point, or it is empty.
3. **Generate a Comment**: Write a 50-100 word comment that will replace the content of '{TARGET_COLUMN}'.
4. **Tone & Logic**:
   - **High Score**: Challenge them. Praise, then name the keyword as the final hurdle, then give actionable advice based on the lesson content.
   - **Mid Score**: Encourage them. Affirm the base, then name the keyword as the main blocker, then assign a specific review task.
   - **Low Score**: Support them. Reassure, then present the keyword as a foundation, then suggest basic practice.
5. **Output**: Return ONLY the comment text. No JSON, no quotes.

Write the comment in the same language as the row data.

Example (Math, high score):
Input Context: Score 115, Keyword '导数极值点偏移', Lesson '构造函数法'
Output: 这次测验115分，整体手感维持得很棒！但在压轴题的“导数极值点偏移”上还不够老练，这正是你突破140分的最后一道坎。今晚务必结合上课讲的“构造函数法”，把那道错题重新推导一遍过程，期待你下次完美通关！

Example (Physics, mid score):
Input Context: Score 65, Keyword '受力分析整体法', Lesson '连接体问题'
Output: 这次物理及格了，说明基础概念有了起色。现在最大的拦路虎就是“受力分析整体法”，这块不弄懂，后面的连接体问题很难得分。今晚别做新题，先把课上讲的那两个例题盖住答案重做一遍，一定要画对受力图！

Example (Math, low score):
Input Context: Score 42, Keyword '诱导公式', Lesson '单位圆性质'
Output: 分数暂时不理想没关系，我们先沉下心来解决基础问题。你目前在“诱导公式”上的混淆非常明显，这是三角函数的基石。请务必回归课本，结合今天讲的单位圆画图记忆，先保证简单的公式变换不丢分，我们可以一步步来。"#;

/// Render a system instruction template for `target_column`.
pub fn system_instruction(template: &str, target_column: &str) -> String {
    template.replace(TARGET_COLUMN_PLACEHOLDER, target_column)
}

/// The user turn: the row as JSON in header order plus the target column name.
pub fn user_message(record: &RowRecord, target_column: &str) -> String {
    format!(
        "Row Data: {}\nTarget Column Name: {}",
        record.to_json(),
        target_column
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_replaced_everywhere() {
        let rendered = system_instruction(DEFAULT_SYSTEM_PROMPT, "Weakness");
        assert!(!rendered.contains(TARGET_COLUMN_PLACEHOLDER));
        assert_eq!(rendered.matches("'Weakness'").count(), 2);
    }

    #[test]
    fn test_user_message_keeps_header_order() {
        let record = RowRecord::new(
            4,
            vec![
                ("Name".into(), "Li".into()),
                ("Score".into(), "65".into()),
                ("Weakness".into(), "受力分析".into()),
            ],
        );
        assert_eq!(
            user_message(&record, "Weakness"),
            "Row Data: {\"Name\":\"Li\",\"Score\":\"65\",\"Weakness\":\"受力分析\"}\nTarget Column Name: Weakness"
        );
    }
}
