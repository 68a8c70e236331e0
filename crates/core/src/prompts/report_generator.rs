use chrono::NaiveDate;

use crate::domain::deal::DealContext;
use crate::domain::interview::{InterviewMessage, MessageRole};
use crate::prompts::interviewer::or_placeholder;

pub fn report_extraction_prompt(deal: &DealContext, today: NaiveDate) -> String {
    format!(
        r#"You are a report generator for sales call reports. Given a conversation transcript between an AI interviewer and a sales representative, generate a structured JSON report.

## DEAL CONTEXT
- Deal Name: {deal_name}
- Customer Brand: {customer}
- Pipeline: {pipeline}
- Current Stage: {stage}

## OUTPUT FORMAT
Return ONLY valid JSON matching this exact schema. No markdown, no explanation, just the JSON object:

{{
  "callDate": "YYYY-MM-DD",
  "callType": "phone" | "in-person" | "video",
  "attendees": [
    {{"name": "string", "title": "string", "company": "string"}}
  ],
  "summary": "2-3 sentence executive summary in third person, professional tone",
  "topicsDiscussed": ["topic1", "topic2"],
  "keyInsights": ["insight1", "insight2"],
  "actionItems": [
    {{"action": "string", "owner": "string", "dueDate": "YYYY-MM-DD or null"}}
  ],
  "nextSteps": [
    {{"step": "string", "timeline": "string"}}
  ],
  "competitorMentions": [
    {{"competitor": "string", "context": "string"}}
  ],
  "dealStageRecommendation": {{
    "currentStage": "{stage}",
    "recommendedStage": "string (stage label)",
    "rationale": "string"
  }},
  "customerSentiment": "positive" | "neutral" | "negative" | "mixed",
  "followUpDate": "YYYY-MM-DD or null",
  "pricingNotes": "string or null",
  "volumeNotes": "string or null"
}}

## RULES
- Extract ONLY information explicitly stated in the transcript
- Do NOT fabricate or assume information not discussed
- If information for a field was not discussed, use null or empty array
- For attendees, include attendees from both sides of the call
- For action items, clearly identify the owner (person or company)
- The summary should be written in third person, professional tone
- Competitor mentions should capture context of how they were discussed
- If no stage change was discussed, set recommendedStage to the same as currentStage
- For callDate, use today's date if not explicitly mentioned: {today}"#,
        deal_name = deal.deal_name,
        customer = or_placeholder(&deal.customer_name, "Unknown"),
        pipeline = deal.pipeline,
        stage = deal.deal_stage,
        today = today.format("%Y-%m-%d"),
    )
}

/// Renders the log as labelled lines, interviewer turns first-person to the model.
pub fn render_transcript(messages: &[InterviewMessage]) -> String {
    messages
        .iter()
        .map(|message| {
            let label = match message.role {
                MessageRole::Assistant => "Interviewer",
                MessageRole::User => "Sales Rep",
            };
            format!("{label}: {}", message.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub fn report_request(messages: &[InterviewMessage]) -> String {
    format!(
        "Generate a structured call report from this interview transcript:\n\n{}",
        render_transcript(messages)
    )
}
