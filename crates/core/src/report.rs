//! Schema gate for model-produced call reports.
//!
//! The extractor's raw text goes through [`parse_report`] before anything else
//! sees it: the text is parsed as generic JSON, checked field by field, and only
//! then converted into a [`StructuredReport`]. Missing arrays read as empty and
//! missing nullable fields read as null; everything else must be present with
//! the right type.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::report::{
    ActionItem, Attendee, CallType, CompetitorMention, DealStageRecommendation, NextStep,
    Sentiment, StructuredReport,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MalformedReport {
    #[error("report is not valid JSON: {0}")]
    NotJson(String),
    #[error("report field `{field}` {message}")]
    SchemaViolation { field: String, message: String },
}

impl MalformedReport {
    fn violation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SchemaViolation { field: field.into(), message: message.into() }
    }
}

/// Removes one optional leading ```` ``` ```` / ```` ```json ```` fence and one
/// optional trailing fence.
pub fn strip_code_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        text = rest.strip_prefix('\n').unwrap_or(rest);
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest.strip_suffix('\n').unwrap_or(rest);
    }
    text.trim()
}

pub fn parse_report(raw: &str) -> Result<StructuredReport, MalformedReport> {
    let value: Value = serde_json::from_str(strip_code_fences(raw))
        .map_err(|error| MalformedReport::NotJson(error.to_string()))?;
    let root = value.as_object().ok_or_else(|| MalformedReport::violation("$", "must be an object"))?;

    let call_type_raw = required_str(root, "callType", "")?;
    let call_type = CallType::parse(&call_type_raw).ok_or_else(|| {
        MalformedReport::violation(
            "callType",
            format!("must be one of phone, in-person, video (got `{call_type_raw}`)"),
        )
    })?;
    let sentiment_raw = required_str(root, "customerSentiment", "")?;
    let customer_sentiment = Sentiment::parse(&sentiment_raw).ok_or_else(|| {
        MalformedReport::violation(
            "customerSentiment",
            format!("must be one of positive, neutral, negative, mixed (got `{sentiment_raw}`)"),
        )
    })?;

    let attendees = objects(root, "attendees")?
        .map(|(path, item)| {
            Ok::<_, MalformedReport>(Attendee {
                name: required_str(item, "name", &path)?,
                title: nullable_str(item, "title", &path)?.unwrap_or_default(),
                company: nullable_str(item, "company", &path)?.unwrap_or_default(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let action_items = objects(root, "actionItems")?
        .map(|(path, item)| {
            Ok::<_, MalformedReport>(ActionItem {
                action: required_str(item, "action", &path)?,
                owner: nullable_str(item, "owner", &path)?.unwrap_or_default(),
                due_date: nullable_str(item, "dueDate", &path)?,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let next_steps = objects(root, "nextSteps")?
        .map(|(path, item)| {
            Ok::<_, MalformedReport>(NextStep {
                step: required_str(item, "step", &path)?,
                timeline: nullable_str(item, "timeline", &path)?.unwrap_or_default(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let competitor_mentions = objects(root, "competitorMentions")?
        .map(|(path, item)| {
            Ok::<_, MalformedReport>(CompetitorMention {
                competitor: required_str(item, "competitor", &path)?,
                context: nullable_str(item, "context", &path)?.unwrap_or_default(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let recommendation = root
        .get("dealStageRecommendation")
        .and_then(Value::as_object)
        .ok_or_else(|| MalformedReport::violation("dealStageRecommendation", "must be an object"))?;
    let path = "dealStageRecommendation";
    let deal_stage_recommendation = DealStageRecommendation {
        current_stage: required_str(recommendation, "currentStage", path)?,
        recommended_stage: required_str(recommendation, "recommendedStage", path)?,
        rationale: nullable_str(recommendation, "rationale", path)?.unwrap_or_default(),
    };

    Ok(StructuredReport {
        call_date: required_str(root, "callDate", "")?,
        call_type,
        attendees,
        summary: required_str(root, "summary", "")?,
        topics_discussed: strings(root, "topicsDiscussed")?,
        key_insights: strings(root, "keyInsights")?,
        action_items,
        next_steps,
        competitor_mentions,
        deal_stage_recommendation,
        customer_sentiment,
        follow_up_date: nullable_str(root, "followUpDate", "")?,
        pricing_notes: nullable_str(root, "pricingNotes", "")?,
        volume_notes: nullable_str(root, "volumeNotes", "")?,
    })
}

fn field_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn required_str(object: &Map<String, Value>, key: &str, parent: &str) -> Result<String, MalformedReport> {
    match object.get(key) {
        Some(Value::String(value)) => Ok(value.clone()),
        Some(Value::Null) | None => {
            Err(MalformedReport::violation(field_path(parent, key), "is required"))
        }
        Some(_) => Err(MalformedReport::violation(field_path(parent, key), "must be a string")),
    }
}

fn nullable_str(
    object: &Map<String, Value>,
    key: &str,
    parent: &str,
) -> Result<Option<String>, MalformedReport> {
    match object.get(key) {
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(Value::Null) | None => Ok(None),
        Some(_) => {
            Err(MalformedReport::violation(field_path(parent, key), "must be a string or null"))
        }
    }
}

fn array<'a>(object: &'a Map<String, Value>, key: &str) -> Result<&'a [Value], MalformedReport> {
    match object.get(key) {
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(Value::Null) | None => Ok(&[][..]),
        Some(_) => Err(MalformedReport::violation(key, "must be an array")),
    }
}

fn strings(object: &Map<String, Value>, key: &str) -> Result<Vec<String>, MalformedReport> {
    array(object, key)?
        .iter()
        .enumerate()
        .map(|(index, item)| {
            item.as_str()
                .map(str::to_string)
                .ok_or_else(|| MalformedReport::violation(format!("{key}[{index}]"), "must be a string"))
        })
        .collect()
}

fn objects<'a>(
    object: &'a Map<String, Value>,
    key: &'a str,
) -> Result<impl Iterator<Item = (String, &'a Map<String, Value>)> + 'a, MalformedReport> {
    let items = array(object, key)?;
    let checked = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let path = format!("{key}[{index}]");
            item.as_object()
                .map(|object| (path.clone(), object))
                .ok_or_else(|| MalformedReport::violation(path, "must be an object"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(checked.into_iter())
}
