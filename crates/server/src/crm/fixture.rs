use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::info;

use debrief_core::config::CrmConfig;
use debrief_core::domain::deal::{
    Company, Contact, DealDetail, DealRecord, DealSearchResult, DealSummary,
};
use debrief_core::domain::report::{StructuredReport, UploadOptions, UploadResult};

use super::format::{call_title, ReportFormatter};
use super::{CrmError, CrmGateway, DealQuery};

/// What an upload would have written to the CRM.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedUpload {
    pub deal_id: String,
    pub note_html: Option<String>,
    pub call_title: Option<String>,
    pub deal_properties: Vec<(&'static str, String)>,
}

/// In-process deal book used when the CRM integration is disabled.
pub struct FixtureCrm {
    deals: Vec<DealDetail>,
    portal_id: String,
    internal_company: String,
    formatter: ReportFormatter,
    uploads: Mutex<Vec<RecordedUpload>>,
}

impl FixtureCrm {
    pub fn new(config: &CrmConfig) -> Result<Self, CrmError> {
        Ok(Self {
            deals: sample_deals(),
            portal_id: config.portal_id.clone(),
            internal_company: config.internal_company.clone(),
            formatter: ReportFormatter::new()?,
            uploads: Mutex::new(Vec::new()),
        })
    }

    #[cfg(test)]
    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.uploads.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

#[async_trait]
impl CrmGateway for FixtureCrm {
    async fn search_deals(&self, query: &DealQuery) -> Result<DealSearchResult, CrmError> {
        let needle = query.query.to_lowercase();
        let matching: Vec<DealSummary> = self
            .deals
            .iter()
            .filter(|detail| {
                needle.is_empty()
                    || ["dealname", "customer_name"].iter().any(|name| {
                        detail.deal.property(name).is_some_and(|value| value.to_lowercase().contains(&needle))
                    })
            })
            .map(|detail| summary(&detail.deal))
            .collect();

        let total = matching.len() as u64;
        let deals = matching
            .into_iter()
            .skip(query.offset as usize)
            .take(query.limit as usize)
            .collect();
        Ok(DealSearchResult { deals, total })
    }

    async fn get_deal(&self, deal_id: &str) -> Result<DealDetail, CrmError> {
        self.deals
            .iter()
            .find(|detail| detail.deal.id == deal_id)
            .cloned()
            .ok_or_else(|| CrmError::DealNotFound(deal_id.to_string()))
    }

    async fn upload_report(
        &self,
        deal_id: &str,
        report: &StructuredReport,
        options: &UploadOptions,
    ) -> Result<UploadResult, CrmError> {
        let mut uploads = self.uploads.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let sequence = uploads.len() + 1;

        let note_html = if options.create_note { Some(self.formatter.note_html(report)?) } else { None };
        let title = options.log_call.then(|| call_title(report, &self.internal_company));
        let deal_properties = if options.update_deal {
            options.deal_updates.as_ref().map(|updates| updates.properties()).unwrap_or_default()
        } else {
            Vec::new()
        };

        let result = UploadResult {
            note_id: note_html.as_ref().map(|_| format!("fixture-note-{sequence}")),
            call_id: title.as_ref().map(|_| format!("fixture-call-{sequence}")),
            deal_updated: !deal_properties.is_empty(),
            hubspot_url: format!(
                "https://app.hubspot.com/contacts/{}/deal/{deal_id}",
                self.portal_id
            ),
        };
        uploads.push(RecordedUpload {
            deal_id: deal_id.to_string(),
            note_html,
            call_title: title,
            deal_properties,
        });

        info!(event_name = "crm.fixture_upload_recorded", deal_id, sequence);
        Ok(result)
    }

    fn backend(&self) -> &'static str {
        "fixture"
    }
}

fn summary(deal: &DealRecord) -> DealSummary {
    let optional = |name: &str| deal.property(name).map(str::to_string);
    DealSummary {
        id: deal.id.clone(),
        dealname: deal.property("dealname").unwrap_or_default().to_string(),
        dealstage: deal.property("dealstage").unwrap_or_default().to_string(),
        pipeline: deal.property("pipeline").unwrap_or_default().to_string(),
        customer_name: optional("customer_name"),
        channel: optional("channel"),
        segment_type: optional("segment_type"),
        amount: optional("amount"),
        closedate: optional("closedate"),
        hubspot_owner_id: optional("hubspot_owner_id"),
    }
}

fn record(id: &str, properties: &[(&str, &str)]) -> DealRecord {
    DealRecord {
        id: id.to_string(),
        properties: properties
            .iter()
            .map(|(name, value)| (name.to_string(), Some(value.to_string())))
            .collect::<BTreeMap<_, _>>(),
    }
}

fn sample_deals() -> Vec<DealDetail> {
    vec![
        DealDetail {
            deal: record(
                "1001",
                &[
                    ("dealname", "Campus Cafes Cold Brew Program"),
                    ("customer_name", "Campus Cafes"),
                    ("pipeline", "Foodservice"),
                    ("dealstage", "Engaging"),
                    ("channel", "Foodservice"),
                    ("segment_type", "Higher Education"),
                    ("amount", "185000"),
                    ("closedate", "2026-12-15"),
                    ("incumbent_supplier", "Farmer Brothers"),
                    ("next_step", "Schedule tasting with dining services"),
                    ("probability_of_closing", "40"),
                    ("hubspot_owner_id", "211824246"),
                ],
            ),
            contacts: vec![Contact {
                id: "501".to_string(),
                firstname: Some("Dana".to_string()),
                lastname: Some("Reyes".to_string()),
                email: Some("dana.reyes@campuscafes.example".to_string()),
                jobtitle: Some("Director of Dining".to_string()),
                company: Some("Campus Cafes".to_string()),
            }],
            company: Some(Company {
                id: "9001".to_string(),
                name: Some("Campus Cafes".to_string()),
                domain: Some("campuscafes.example".to_string()),
                industry: Some("Food & Beverages".to_string()),
            }),
        },
        DealDetail {
            deal: record(
                "1002",
                &[
                    ("dealname", "Harbor Grocers Private Label RFP"),
                    ("customer_name", "Harbor Grocers"),
                    ("pipeline", "Opportunity / RFP"),
                    ("dealstage", "RFP Submitted"),
                    ("channel", "Retail"),
                    ("amount", "420000"),
                    ("hubspot_owner_id", "211824246"),
                ],
            ),
            contacts: Vec::new(),
            company: None,
        },
        DealDetail {
            deal: record(
                "1003",
                &[
                    ("dealname", "Summit Tea RTD Line Extension"),
                    ("pipeline", "Sales Pipeline"),
                    ("dealstage", "Request for Gating"),
                    ("channel", "CPG"),
                    ("hubspot_owner_id", "211824246"),
                ],
            ),
            contacts: Vec::new(),
            company: None,
        },
    ]
}
