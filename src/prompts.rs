//! Prompt templates for the two generation workflows
//!
//! Both templates are pure: the same inputs always render the same text. Each one also
//! carries the exact output schema the model must return. The enum choices in those
//! schemas are rendered from [`Category`], [`Difficulty`] and [`RiskLevel`], and the field
//! names must match [`Question`] / [`ResponseDraft`], which is what
//! [`crate::extract`] deserializes the reply into.

use crate::reference::{PerformanceSnapshot, ReferenceDataBundle, competitive_context};
use crate::schemas::{Category, Difficulty, Question, RiskLevel};

/// A versioned prompt template with `{{name}}` placeholders
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    /// Stable identifier (format: workflow-name-v1)
    pub id: &'static str,
    pub one_liner: &'static str,
    pub template: &'static str,
}

impl PromptTemplate {
    /// Substitute placeholders in one pass. Substituted text is never rescanned, so caller
    /// text containing `{{...}}` is emitted literally. Unknown placeholders are kept.
    pub fn render(&self, vars: &[(&str, &str)]) -> String {
        let mut out = String::with_capacity(self.template.len() + 256);
        let mut rest = self.template;
        while let Some(start) = rest.find("{{") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find("}}") {
                Some(end) => {
                    let name = &after[..end];
                    match vars.iter().find(|(k, _)| *k == name) {
                        Some((_, value)) => out.push_str(value),
                        None => {
                            out.push_str("{{");
                            out.push_str(name);
                            out.push_str("}}");
                        }
                    }
                    rest = &after[end + 2..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

pub const QUESTION_PROMPT: PromptTemplate = PromptTemplate {
    id: "questions-analyst-v1",
    one_liner: "Predict tough analyst questions from latest-quarter and peer data",
    template: r#"You are a senior Wall Street equity research analyst preparing for Snowflake's earnings call. Based on the following data, generate {{count}} tough, specific questions that analysts are likely to ask during the Q&A session.

Context:
1. Snowflake's latest quarter (Q3 FY2026, ending Oct 31, 2025):
   - Product Revenue: $1,160M
   - Total Revenue: $1,210M
   - NRR: 125% (down from 127% YoY)
   - Customers >$1M: 688 (up from 542 YoY)
   - Free Cash Flow: $110.5M
   - Gross Margin: 76%

2. Key Competitive Intelligence:
   - MongoDB Q3 FY2025: Revenue $529M (+22% YoY), Atlas grew 26% YoY, raised FY25 guidance
   - Datadog showing strong performance in observability market
   - Multiple analyst upgrades for MongoDB citing AI opportunity

3. Industry Trends:
   - GenAI adoption accelerating
   - Data platform consolidation
   - Consumption model volatility concerns
   - Competitive pressure in data warehousing
{{reference_data}}
Generate questions that:
- Focus on NRR deceleration and what it signals
- Challenge growth sustainability vs peers
- Press on AI strategy and competitive positioning
- Question consumption trends and optimization
- Examine competitive losses or wins
- Challenge margin trajectory and profitability

Format each question as a JSON object with:
{
  "id": "unique_id",
  "question": "the full question text",
  "category": "{{categories}}",
  "difficulty": "{{difficulties}}",
  "context": "brief explanation of why this question matters"{{extra_fields}}
}

Return ONLY a JSON array of questions, no other text."#,
};

pub const RESPONSE_PROMPT: PromptTemplate = PromptTemplate {
    id: "response-cfo-v1",
    one_liner: "Draft a data-backed CFO answer to one analyst question",
    template: r#"You are the CFO of Snowflake preparing to answer this analyst question during the earnings call:

"{{question}}"

Based on the following data, prepare a comprehensive, data-backed response:

Snowflake Metrics (Q3 FY2026 vs Q3 FY2025):
- Product Revenue: $1,160M vs $900.3M (+28.9% YoY)
- Total Revenue: $1,210M vs $942.1M (+28.4% YoY)
- RPO: $6,900M vs $5,700M (+21.1% YoY)
- NRR: 125% vs 127% (-200 bps)
- Customers >$1M: 688 vs 542 (+27.0%)
- FCF: $110.5M vs $78.2M (+41.3%)
- Gross Margin: 76% (flat)

Key Points to Address:
1. Lead with the positive narrative
2. Acknowledge concerns directly but with context
3. Use specific data points and metrics
4. Reference competitive differentiation
5. Provide forward-looking commentary
6. Be concise but comprehensive (2-3 paragraphs)

Format your response as JSON:
{
  "talking_points": ["point 1", "point 2", "point 3"],
  "key_metrics": ["metric 1", "metric 2"],
  "response_text": "full response text",
  "risk_level": "{{risk_levels}}",
  "follow_up_concerns": ["potential follow-up 1", "potential follow-up 2"]
}

Return ONLY valid JSON."#,
};

const DATA_POINTS_FIELD: &str = ",\n  \"data_points\": [\"relevant metrics\"]";

fn render_question_prompt(count: usize, reference_data: &str, extra_fields: &str) -> String {
    let count = count.max(1).to_string();
    let categories = Category::schema_choices();
    let difficulties = Difficulty::schema_choices();
    QUESTION_PROMPT.render(&[
        ("count", &count),
        ("reference_data", reference_data),
        ("categories", &categories),
        ("difficulties", &difficulties),
        ("extra_fields", extra_fields),
    ])
}

/// Question-generation prompt for `count` questions (values below 1 are raised to 1)
pub fn build_question_prompt(count: usize) -> String {
    render_question_prompt(count, "", "")
}

/// Question-generation prompt with the loaded reference tables appended to the fixed
/// narrative, `rows` news items and ratings at most. Also asks for `data_points`.
pub fn build_question_prompt_with_context(
    count: usize,
    bundle: &ReferenceDataBundle,
    rows: usize,
) -> String {
    let mut sections = Vec::new();
    if let Some(snapshot) = PerformanceSnapshot::from_bundle(bundle) {
        sections.push(format!("SNOWFLAKE {}", snapshot.render().trim_end()));
    }
    let competitive = competitive_context(bundle, rows);
    if !competitive.is_empty() {
        sections.push(competitive);
    }

    if sections.is_empty() {
        return render_question_prompt(count, "", DATA_POINTS_FIELD);
    }
    let block = format!("\n4. Reference Data:\n{}\n", sections.join("\n\n"));
    render_question_prompt(count, &block, DATA_POINTS_FIELD)
}

/// Response-generation prompt for the selected question
pub fn build_response_prompt(question: &Question) -> String {
    let risk_levels = RiskLevel::schema_choices();
    RESPONSE_PROMPT.render(&[
        ("question", question.question.as_str()),
        ("risk_levels", &risk_levels),
    ])
}
