use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DealId(pub String);

/// Row returned by a deal search; field names follow the CRM property names.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealSummary {
    pub id: String,
    pub dealname: String,
    pub dealstage: String,
    pub pipeline: String,
    pub customer_name: Option<String>,
    pub channel: Option<String>,
    pub segment_type: Option<String>,
    pub amount: Option<String>,
    pub closedate: Option<String>,
    pub hubspot_owner_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealSearchResult {
    pub deals: Vec<DealSummary>,
    pub total: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealRecord {
    pub id: String,
    pub properties: BTreeMap<String, Option<String>>,
}

impl DealRecord {
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).and_then(|value| value.as_deref()).filter(|value| !value.is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub email: Option<String>,
    pub jobtitle: Option<String>,
    pub company: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub name: Option<String>,
    pub domain: Option<String>,
    pub industry: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DealDetail {
    pub deal: DealRecord,
    pub contacts: Vec<Contact>,
    pub company: Option<Company>,
}

/// Snapshot of the deal fields the interviewer needs. Built once when an interview
/// starts and copied into the session; never mutated afterwards.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealContext {
    pub deal_id: String,
    pub deal_name: String,
    pub customer_name: String,
    pub pipeline: String,
    pub pipeline_id: String,
    pub deal_stage: String,
    pub deal_stage_id: String,
    pub channel: String,
    pub segment_type: String,
    pub amount: String,
    pub close_date: String,
    pub incumbent_supplier: String,
    pub last_update: String,
    pub probability_of_closing: String,
}

impl DealContext {
    pub fn from_detail(detail: &DealDetail) -> Self {
        let deal = &detail.deal;
        let prop = |name: &str| deal.property(name).unwrap_or_default().to_string();

        Self {
            deal_id: deal.id.clone(),
            deal_name: deal.property("dealname").unwrap_or("Unknown Deal").to_string(),
            customer_name: prop("customer_name"),
            pipeline: prop("pipeline"),
            pipeline_id: prop("pipeline"),
            deal_stage: prop("dealstage"),
            deal_stage_id: prop("dealstage"),
            channel: prop("channel"),
            segment_type: prop("segment_type"),
            amount: prop("amount"),
            close_date: prop("closedate"),
            incumbent_supplier: prop("incumbent_supplier"),
            last_update: prop("next_step"),
            probability_of_closing: prop("probability_of_closing"),
        }
    }

    /// Name used when addressing the rep: the customer brand, else the deal name.
    pub fn display_name(&self) -> &str {
        if self.customer_name.is_empty() {
            &self.deal_name
        } else {
            &self.customer_name
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::{DealContext, DealDetail, DealRecord};

    fn detail(properties: &[(&str, Option<&str>)]) -> DealDetail {
        DealDetail {
            deal: DealRecord {
                id: "deal-1".to_string(),
                properties: properties
                    .iter()
                    .map(|(key, value)| (key.to_string(), value.map(str::to_string)))
                    .collect::<BTreeMap<_, _>>(),
            },
            contacts: Vec::new(),
            company: None,
        }
    }

    #[test]
    fn context_maps_crm_properties() {
        let context = DealContext::from_detail(&detail(&[
            ("dealname", Some("Blue Bottle Cold Brew")),
            ("customer_name", Some("Blue Bottle")),
            ("pipeline", Some("Foodservice")),
            ("dealstage", Some("Engaging")),
            ("next_step", Some("Send samples")),
            ("incumbent_supplier", None),
        ]));

        assert_eq!(context.deal_id, "deal-1");
        assert_eq!(context.deal_name, "Blue Bottle Cold Brew");
        assert_eq!(context.pipeline_id, "Foodservice");
        assert_eq!(context.deal_stage_id, "Engaging");
        assert_eq!(context.last_update, "Send samples");
        assert_eq!(context.incumbent_supplier, "");
        assert_eq!(context.display_name(), "Blue Bottle");
    }

    #[test]
    fn missing_deal_name_falls_back() {
        let context = DealContext::from_detail(&detail(&[("dealname", Some(""))]));

        assert_eq!(context.deal_name, "Unknown Deal");
        assert_eq!(context.display_name(), "Unknown Deal");
    }

    #[test]
    fn context_serializes_camel_case() {
        let context = DealContext { customer_name: "Acme".to_string(), ..DealContext::default() };
        let value = serde_json::to_value(&context).expect("serialize");

        assert_eq!(value["customerName"], "Acme");
        assert!(value.get("probabilityOfClosing").is_some());
    }
}
