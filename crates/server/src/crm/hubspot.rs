use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use debrief_core::config::CrmConfig;
use debrief_core::domain::deal::{
    Company, Contact, DealDetail, DealRecord, DealSearchResult, DealSummary,
};
use debrief_core::domain::report::{StructuredReport, UploadOptions, UploadResult};

use super::format::{call_title, ReportFormatter};
use super::{CrmError, CrmGateway, DealQuery, DEAL_PROPERTIES};

const NOTE_TO_DEAL: u32 = 214;
const CALL_TO_DEAL: u32 = 206;
const CONTACT_PROPERTIES: &[&str] = &["firstname", "lastname", "email", "jobtitle", "company"];
const COMPANY_PROPERTIES: &[&str] = &["name", "domain", "industry"];

pub struct HubSpotClient {
    client: Client,
    access_token: SecretString,
    base_url: String,
    owner_id: String,
    portal_id: String,
    internal_company: String,
    formatter: ReportFormatter,
}

impl HubSpotClient {
    pub fn new(config: &CrmConfig) -> Result<Self, CrmError> {
        Ok(Self {
            client: Client::new(),
            access_token: config.access_token.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            owner_id: config.default_owner_id.clone(),
            portal_id: config.portal_id.clone(),
            internal_company: config.internal_company.clone(),
            formatter: ReportFormatter::new()?,
        })
    }

    async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, CrmError> {
        let mut request = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(self.access_token.expose_secret());
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response =
            request.send().await.map_err(|error| CrmError::Transport(error.to_string()))?;
        let status = response.status();
        let text = response.text().await.map_err(|error| CrmError::Transport(error.to_string()))?;

        if !status.is_success() {
            return Err(CrmError::Api { status: status.as_u16(), message: api_message(&text) });
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|error| CrmError::Decode(error.to_string()))
    }

    async fn associated_ids(&self, deal_id: &str, object: &str) -> Result<Vec<String>, CrmError> {
        let value = self
            .call(Method::GET, &format!("/crm/v3/objects/deals/{deal_id}/associations/{object}"), None)
            .await?;
        let page: AssociationPage = decode(value)?;
        Ok(page.results.iter().filter_map(AssociationRef::object_id).collect())
    }

    async fn contacts(&self, deal_id: &str) -> Result<Vec<Contact>, CrmError> {
        let ids = self.associated_ids(deal_id, "contacts").await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let inputs: Vec<Value> = ids.iter().map(|id| json!({ "id": id })).collect();
        let value = self
            .call(
                Method::POST,
                "/crm/v3/objects/contacts/batch/read",
                Some(json!({
                    "inputs": inputs,
                    "properties": CONTACT_PROPERTIES,
                    "propertiesWithHistory": [],
                })),
            )
            .await?;
        let page: ObjectPage = decode(value)?;

        Ok(page
            .results
            .into_iter()
            .map(|object| Contact {
                firstname: object.property("firstname"),
                lastname: object.property("lastname"),
                email: object.property("email"),
                jobtitle: object.property("jobtitle"),
                company: object.property("company"),
                id: object.id,
            })
            .collect())
    }

    async fn company(&self, deal_id: &str) -> Result<Option<Company>, CrmError> {
        let Some(company_id) = self.associated_ids(deal_id, "companies").await?.into_iter().next()
        else {
            return Ok(None);
        };

        let value = self
            .call(
                Method::GET,
                &format!(
                    "/crm/v3/objects/companies/{company_id}?properties={}",
                    COMPANY_PROPERTIES.join(",")
                ),
                None,
            )
            .await?;
        let object: CrmObject = decode(value)?;

        Ok(Some(Company {
            name: object.property("name"),
            domain: object.property("domain"),
            industry: object.property("industry"),
            id: object.id,
        }))
    }

    async fn create_engagement(
        &self,
        object: &str,
        properties: Value,
        association_type: u32,
        deal_id: &str,
    ) -> Result<String, CrmError> {
        let value = self
            .call(
                Method::POST,
                &format!("/crm/v3/objects/{object}"),
                Some(json!({
                    "properties": properties,
                    "associations": [{
                        "to": { "id": deal_id },
                        "types": [{
                            "associationCategory": "HUBSPOT_DEFINED",
                            "associationTypeId": association_type,
                        }],
                    }],
                })),
            )
            .await?;
        let created: CrmObject = decode(value)?;
        Ok(created.id)
    }

    fn deal_url(&self, deal_id: &str) -> String {
        format!("https://app.hubspot.com/contacts/{}/deal/{deal_id}", self.portal_id)
    }
}

#[async_trait]
impl CrmGateway for HubSpotClient {
    async fn search_deals(&self, query: &DealQuery) -> Result<DealSearchResult, CrmError> {
        let value = self.call(Method::POST, "/crm/v3/objects/deals/search", Some(search_body(query))).await?;
        let page: ObjectPage = decode(value)?;

        Ok(DealSearchResult {
            deals: page.results.iter().map(deal_summary).collect(),
            total: page.total.unwrap_or_default(),
        })
    }

    async fn get_deal(&self, deal_id: &str) -> Result<DealDetail, CrmError> {
        let path =
            format!("/crm/v3/objects/deals/{deal_id}?properties={}", DEAL_PROPERTIES.join(","));
        let deal: CrmObject = match self.call(Method::GET, &path, None).await {
            Ok(value) => decode(value)?,
            Err(CrmError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                return Err(CrmError::DealNotFound(deal_id.to_string()));
            }
            Err(error) => return Err(error),
        };

        // Associations are optional context; a failed lookup leaves them empty.
        let contacts = self.contacts(deal_id).await.unwrap_or_else(|error| {
            warn!(event_name = "crm.contacts_lookup_failed", deal_id, error = %error);
            Vec::new()
        });
        let company = self.company(deal_id).await.unwrap_or_else(|error| {
            warn!(event_name = "crm.company_lookup_failed", deal_id, error = %error);
            None
        });

        Ok(DealDetail {
            deal: DealRecord { id: deal.id, properties: deal.properties },
            contacts,
            company,
        })
    }

    async fn upload_report(
        &self,
        deal_id: &str,
        report: &StructuredReport,
        options: &UploadOptions,
    ) -> Result<UploadResult, CrmError> {
        let mut result = UploadResult { hubspot_url: self.deal_url(deal_id), ..UploadResult::default() };
        let timestamp = Utc::now().to_rfc3339();

        if options.create_note {
            let properties = json!({
                "hs_note_body": self.formatter.note_html(report)?,
                "hs_timestamp": timestamp,
                "hubspot_owner_id": self.owner_id,
            });
            result.note_id =
                Some(self.create_engagement("notes", properties, NOTE_TO_DEAL, deal_id).await?);
        }

        if options.log_call {
            let properties = json!({
                "hs_call_title": call_title(report, &self.internal_company),
                "hs_call_body": self.formatter.call_text(report)?,
                "hs_call_direction": "OUTBOUND",
                "hs_call_status": "COMPLETED",
                "hs_timestamp": timestamp,
                "hubspot_owner_id": self.owner_id,
            });
            result.call_id =
                Some(self.create_engagement("calls", properties, CALL_TO_DEAL, deal_id).await?);
        }

        if let Some(updates) = options.deal_updates.as_ref().filter(|_| options.update_deal) {
            let properties: BTreeMap<&str, String> = updates.properties().into_iter().collect();
            if !properties.is_empty() {
                self.call(
                    Method::PATCH,
                    &format!("/crm/v3/objects/deals/{deal_id}"),
                    Some(json!({ "properties": properties })),
                )
                .await?;
                result.deal_updated = true;
            }
        }

        info!(
            event_name = "crm.report_uploaded",
            deal_id,
            note_id = result.note_id.as_deref().unwrap_or("none"),
            call_id = result.call_id.as_deref().unwrap_or("none"),
            deal_updated = result.deal_updated,
        );
        Ok(result)
    }

    fn backend(&self) -> &'static str {
        "hubspot"
    }
}

fn search_body(query: &DealQuery) -> Value {
    let mut body = json!({
        "properties": DEAL_PROPERTIES,
        "limit": query.limit,
        "sorts": [{ "propertyName": "hs_lastmodifieddate", "direction": "DESCENDING" }],
    });
    if !query.query.is_empty() {
        body["query"] = json!(query.query);
    }
    if let Some(owner_id) = query.owner_id.as_deref().filter(|owner| !owner.is_empty()) {
        body["filterGroups"] = json!([{
            "filters": [{ "propertyName": "hubspot_owner_id", "operator": "EQ", "value": owner_id }],
        }]);
    }
    if query.offset > 0 {
        body["after"] = json!(query.offset.to_string());
    }
    body
}

fn deal_summary(object: &CrmObject) -> DealSummary {
    let text = |name: &str| object.property(name).unwrap_or_default();
    DealSummary {
        id: object.id.clone(),
        dealname: text("dealname"),
        dealstage: text("dealstage"),
        pipeline: text("pipeline"),
        customer_name: object.property("customer_name"),
        channel: object.property("channel"),
        segment_type: object.property("segment_type"),
        amount: object.property("amount"),
        closedate: object.property("closedate"),
        hubspot_owner_id: object.property("hubspot_owner_id"),
    }
}

fn decode<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T, CrmError> {
    serde_json::from_value(value).map_err(|error| CrmError::Decode(error.to_string()))
}

fn api_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|value| value.get("message").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[derive(Debug, Deserialize)]
struct ObjectPage {
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    results: Vec<CrmObject>,
}

#[derive(Debug, Deserialize)]
struct CrmObject {
    id: String,
    #[serde(default)]
    properties: BTreeMap<String, Option<String>>,
}

impl CrmObject {
    /// Non-empty property value.
    fn property(&self, name: &str) -> Option<String> {
        self.properties.get(name).and_then(Clone::clone).filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct AssociationPage {
    #[serde(default)]
    results: Vec<AssociationRef>,
}

#[derive(Debug, Deserialize)]
struct AssociationRef {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default, rename = "toObjectId")]
    to_object_id: Option<Value>,
}

impl AssociationRef {
    fn object_id(&self) -> Option<String> {
        let raw = self.to_object_id.as_ref().or(self.id.as_ref())?;
        match raw {
            Value::String(id) => Some(id.clone()),
            Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{api_message, decode, deal_summary, search_body, AssociationPage, ObjectPage};
    use crate::crm::DealQuery;

    #[test]
    fn search_body_only_sets_present_filters() {
        let bare = search_body(&DealQuery {
            query: String::new(),
            owner_id: None,
            limit: 20,
            offset: 0,
        });
        assert!(bare.get("query").is_none());
        assert!(bare.get("filterGroups").is_none());
        assert!(bare.get("after").is_none());
        assert_eq!(bare["limit"], 20);
        assert_eq!(bare["sorts"][0]["propertyName"], "hs_lastmodifieddate");

        let full = search_body(&DealQuery {
            query: "cold brew".to_string(),
            owner_id: Some("211824246".to_string()),
            limit: 5,
            offset: 40,
        });
        assert_eq!(full["query"], "cold brew");
        assert_eq!(full["filterGroups"][0]["filters"][0]["value"], "211824246");
        assert_eq!(full["after"], "40");
    }

    #[test]
    fn search_results_map_blank_properties_to_none() {
        let page: ObjectPage = decode(json!({
            "total": 1,
            "results": [{
                "id": "4410",
                "properties": {"dealname": "Campus Cafes", "dealstage": null, "channel": ""}
            }]
        }))
        .expect("decode");

        let summary = deal_summary(&page.results[0]);
        assert_eq!(summary.dealname, "Campus Cafes");
        assert_eq!(summary.dealstage, "");
        assert_eq!(summary.channel, None);
        assert_eq!(page.total, Some(1));
    }

    #[test]
    fn association_ids_accept_both_shapes() {
        let page: AssociationPage = decode(json!({
            "results": [{"id": "101", "type": "deal_to_contact"}, {"toObjectId": 202}]
        }))
        .expect("decode");

        let ids: Vec<_> = page.results.iter().filter_map(|item| item.object_id()).collect();
        assert_eq!(ids, vec!["101".to_string(), "202".to_string()]);
    }

    #[test]
    fn api_message_prefers_structured_error() {
        assert_eq!(
            api_message(r#"{"status":"error","message":"Object not found"}"#),
            "Object not found"
        );
        assert_eq!(api_message("upstream down"), "upstream down");
    }
}
