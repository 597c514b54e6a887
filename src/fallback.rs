//! Hand-authored artifacts substituted when generation cannot produce a validated result

use crate::schemas::{Category, Difficulty, Question, QuestionBatch, ResponseDraft, RiskLevel};

fn question(
    id: &str,
    text: &str,
    category: Category,
    difficulty: Difficulty,
    context: &str,
) -> Question {
    Question {
        id: id.to_string(),
        question: text.to_string(),
        category,
        difficulty,
        context: context.to_string(),
        data_points: Vec::new(),
    }
}

/// The canned five-question batch
pub fn sample_questions() -> QuestionBatch {
    vec![
        question(
            "q1",
            "Your NRR declined 200 basis points year-over-year to 125%. Given that MongoDB just reported 26% Atlas growth and raised guidance, how do you explain the deceleration in your core consumption metrics?",
            Category::Growth,
            Difficulty::VeryHard,
            "NRR is a key metric for SaaS companies and any deceleration raises concerns about customer health and competitive pressure",
        ),
        question(
            "q2",
            "With customer optimization continuing to impact consumption and GenAI workloads still ramping, when should investors expect NRR to stabilize? What are the leading indicators you're watching?",
            Category::CustomerTrends,
            Difficulty::Hard,
            "Investors need visibility into when consumption patterns will normalize",
        ),
        question(
            "q3",
            "MongoDB and Databricks are both aggressively positioning around AI-native data platforms. What specific customer wins can you point to where Snowflake beat these competitors for GenAI workloads?",
            Category::Competition,
            Difficulty::VeryHard,
            "Competitive positioning in the AI era is critical for maintaining market share",
        ),
        question(
            "q4",
            "Your Remaining Performance Obligations grew 21%, which is decelerating faster than revenue growth. Is this indicating softer enterprise commitment levels or shorter contract durations?",
            Category::Growth,
            Difficulty::Hard,
            "RPO growth deceleration can signal weakening customer commitment",
        ),
        question(
            "q5",
            "Free cash flow grew 41% while revenue grew 28%. Can you sustain this operating leverage, or should we expect increased sales and R&D investment to defend against MongoDB and Databricks?",
            Category::Profitability,
            Difficulty::Hard,
            "Balance between profitability and growth investment is critical",
        ),
    ]
}

/// The canned response draft. The same draft is returned for every question.
pub fn sample_response(_question: &Question) -> ResponseDraft {
    ResponseDraft {
        talking_points: vec![
            "Strong underlying business fundamentals with 29% revenue growth".to_string(),
            "NRR decline primarily driven by optimization, not competitive losses".to_string(),
            "Leading AI/ML workload growth in the industry".to_string(),
        ],
        key_metrics: vec![
            "688 customers over $1M, up 27% YoY".to_string(),
            "$110.5M FCF, up 41% YoY".to_string(),
        ],
        response_text: "Thank you for the question. While we did see NRR compress 200 basis points to 125%, I want to provide important context. First, our revenue growth of 29% year-over-year demonstrates strong underlying demand. The NRR decline is primarily attributable to customer optimization behaviors, not competitive displacement. In fact, we added 146 net new customers over $1M this quarter, our strongest growth in this cohort in the past year. Second, regarding GenAI workloads, we're seeing accelerating adoption with Snowflake Cortex being used by over 1,000 customers. Our consumption economics actually benefit from AI workloads as they tend to be more compute-intensive. We believe we're well-positioned as customers consolidate their data infrastructure around platforms that can handle both traditional analytics and AI workloads at scale.".to_string(),
        risk_level: RiskLevel::Medium,
        follow_up_concerns: vec![
            "Request for specific customer win examples".to_string(),
            "Questions about optimization timeline".to_string(),
        ],
    }
}
