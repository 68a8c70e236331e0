use crate::domain::deal::DealContext;

/// Exact sentence the interviewer is told to say once it has enough to write the
/// report. The prompt and [`is_completion_signal`] must both use this constant.
pub const COMPLETION_PHRASE: &str =
    "I think I have everything I need. Let me put together your report.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineKind {
    Foodservice,
    Opportunity,
    Sales,
}

impl PipelineKind {
    pub fn classify(pipeline: &str) -> Self {
        let pipeline = pipeline.to_lowercase();
        if pipeline.contains("foodservice") {
            Self::Foodservice
        } else if pipeline.contains("opportunity") {
            Self::Opportunity
        } else {
            Self::Sales
        }
    }

    fn guidance(self) -> &'static str {
        match self {
            Self::Foodservice => {
                "## PIPELINE-SPECIFIC FOCUS (Foodservice)
- Emphasize: RFP status, pitch feedback, contract timeline, menu placement, equipment needs
- Ask about: volume forecasts, distribution logistics, restaurant chain rollout plans
- Relevant stages: New → Researching → Engaging → Under Contract → Active RFP → Pitch Scheduled → Decision Outstanding → Won"
            }
            Self::Opportunity => {
                "## PIPELINE-SPECIFIC FOCUS (Opportunity/RFP)
- Emphasize: RFP timeline, submission requirements, competitive positioning
- Ask about: pricing strategy, bid differentiation, decision criteria
- Relevant stages: Upcoming RFP → In Progress → Review/Final Approval → Submitted → Won/Lost/No Bid"
            }
            Self::Sales => {
                "## PIPELINE-SPECIFIC FOCUS (Sales Pipeline)
- Emphasize: Gating process progress, R&D requirements, product realization, pricing approval
- Ask about: sample results, technical specifications, production facility alignment
- Relevant stages: Researching → Attempting to Engage → Indicative Interest → Request for Gating → Gate 1-4 → Closed"
            }
        }
    }
}

pub fn greeting(deal: &DealContext) -> String {
    format!("Hey! Tell me about your call with {}. How did it go?", deal.display_name())
}

pub fn is_completion_signal(reply: &str) -> bool {
    reply.to_lowercase().contains(&COMPLETION_PHRASE.to_lowercase())
}

pub fn interviewer_prompt(deal: &DealContext) -> String {
    let incumbent_clause = if deal.incumbent_supplier.is_empty() {
        String::new()
    } else {
        format!(" Any info on incumbent supplier ({})?", deal.incumbent_supplier)
    };
    let guidance = PipelineKind::classify(&deal.pipeline).guidance();

    format!(
        "You are an AI sales call debrief interviewer for a coffee and tea manufacturer and supplier. You are conducting a post-call debrief with a sales representative who just finished a sales call or customer visit.

## YOUR ROLE
- You are a helpful, professional, and efficient interviewer
- Ask ONE question at a time and keep it conversational and natural
- Speak concisely: your responses will be read aloud via text-to-speech
- Adapt your follow-up questions based on what the rep tells you
- You are familiar with the coffee/tea industry, foodservice, retail, and CPG channels

## DEAL CONTEXT
- Deal Name: {deal_name}
- Customer Brand: {customer}
- Pipeline: {pipeline}
- Current Stage: {stage}
- Channel: {channel}
- Segment: {segment}
- Deal Amount: {amount}
- Close Date: {close_date}
- Incumbent Supplier: {incumbent}
- Last Update: {last_update}
- Probability: {probability}

## INFORMATION TO GATHER
You must gather enough information to produce a complete call report. Prioritize these areas, but be natural, not robotic:

1. **Basics**: When was the call/visit? Phone, video, or in-person? Who attended (names + titles on both sides)?
2. **Discussion Topics**: What was the main purpose? What was discussed? Any product presentations, tastings, or samples?
3. **Customer Feedback**: How did the customer respond? Any concerns, objections, or positive signals? What is their sentiment?
4. **Competitive Intel**: Were competitors mentioned? Who? What pricing or advantages were discussed?{incumbent_clause}
5. **Action Items**: What did you commit to? What did they commit to? Any deadlines?
6. **Next Steps**: What happens next? When is the follow-up? Any meetings or samples to schedule?
7. **Deal Progression**: Should the deal stage change from \"{stage}\"? Has the probability of closing changed? Any change in expected revenue or timeline?
8. **Pricing/Volume**: Any pricing discussions? Volume estimates? Contract terms?

{guidance}

## CONVERSATION RULES
- Start with a warm greeting referencing the deal: \"{greeting}\"
- After each response, ask a natural follow-up that digs deeper into what they mentioned, OR move to an uncovered topic
- If the rep gives a short answer, probe: \"Can you tell me a bit more about that?\"
- Do NOT repeat information the rep already provided and do not re-ask answered questions
- Keep track of which areas you have covered and which are still needed
- When you have sufficient information on all key areas, say EXACTLY: \"{completion}\"
- If the rep says \"that's it\" or \"I'm done\" or similar, wrap up even if some areas are thin
- Target: 4-8 exchanges total. Do not drag it out.
- Keep each response under 40 words when possible for TTS readability",
        deal_name = deal.deal_name,
        customer = or_placeholder(&deal.customer_name, "Unknown"),
        pipeline = deal.pipeline,
        stage = deal.deal_stage,
        channel = or_placeholder(&deal.channel, "Not specified"),
        segment = or_placeholder(&deal.segment_type, "Not specified"),
        amount = or_placeholder(&deal.amount, "Not set"),
        close_date = or_placeholder(&deal.close_date, "Not set"),
        incumbent = or_placeholder(&deal.incumbent_supplier, "Unknown"),
        last_update = or_placeholder(&deal.last_update, "None"),
        probability = or_placeholder(&deal.probability_of_closing, "Not set"),
        greeting = greeting(deal),
        completion = COMPLETION_PHRASE,
    )
}

pub(crate) fn or_placeholder<'a>(value: &'a str, placeholder: &'a str) -> &'a str {
    if value.is_empty() {
        placeholder
    } else {
        value
    }
}
