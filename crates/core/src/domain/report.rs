use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallType {
    Phone,
    InPerson,
    Video,
}

impl CallType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phone => "phone",
            Self::InPerson => "in-person",
            Self::Video => "video",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "phone" => Some(Self::Phone),
            "in-person" => Some(Self::InPerson),
            "video" => Some(Self::Video),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
    Mixed,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
            Self::Mixed => "mixed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "positive" => Some(Self::Positive),
            "neutral" => Some(Self::Neutral),
            "negative" => Some(Self::Negative),
            "mixed" => Some(Self::Mixed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    pub name: String,
    pub title: String,
    pub company: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionItem {
    pub action: String,
    pub owner: String,
    pub due_date: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextStep {
    pub step: String,
    pub timeline: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorMention {
    pub competitor: String,
    pub context: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealStageRecommendation {
    pub current_stage: String,
    pub recommended_stage: String,
    pub rationale: String,
}

/// The call report extracted from a finished interview transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredReport {
    pub call_date: String,
    pub call_type: CallType,
    pub attendees: Vec<Attendee>,
    pub summary: String,
    pub topics_discussed: Vec<String>,
    pub key_insights: Vec<String>,
    pub action_items: Vec<ActionItem>,
    pub next_steps: Vec<NextStep>,
    pub competitor_mentions: Vec<CompetitorMention>,
    pub deal_stage_recommendation: DealStageRecommendation,
    pub customer_sentiment: Sentiment,
    pub follow_up_date: Option<String>,
    pub pricing_notes: Option<String>,
    pub volume_notes: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealUpdates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dealstage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability_of_closing: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub competitive_coffee_pricing: Option<String>,
}

impl DealUpdates {
    /// Property name/value pairs that carry a non-empty value.
    pub fn properties(&self) -> Vec<(&'static str, String)> {
        [
            ("next_step", &self.next_step),
            ("dealstage", &self.dealstage),
            ("probability_of_closing", &self.probability_of_closing),
            ("competitive_coffee_pricing", &self.competitive_coffee_pricing),
        ]
        .into_iter()
        .filter_map(|(name, value)| {
            value.as_deref().filter(|value| !value.trim().is_empty()).map(|v| (name, v.to_string()))
        })
        .collect()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOptions {
    pub create_note: bool,
    pub log_call: bool,
    pub update_deal: bool,
    #[serde(default)]
    pub deal_updates: Option<DealUpdates>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    pub deal_updated: bool,
    pub hubspot_url: String,
}
