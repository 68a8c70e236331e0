//! Deal lookup and report upload against the CRM.
//!
//! `HubSpotClient` talks to the live CRM REST API. `FixtureCrm` serves a small
//! built-in deal book when `crm.enabled` is false so the interview loop can be
//! exercised without credentials.

use async_trait::async_trait;
use thiserror::Error;

use debrief_core::domain::deal::{DealDetail, DealSearchResult};
use debrief_core::domain::report::{StructuredReport, UploadOptions, UploadResult};
use debrief_core::errors::ApplicationError;

pub mod fixture;
pub mod format;
pub mod hubspot;

pub use fixture::FixtureCrm;
pub use hubspot::HubSpotClient;

/// Properties requested for every deal read.
pub const DEAL_PROPERTIES: &[&str] = &[
    "dealname",
    "dealstage",
    "pipeline",
    "customer_name",
    "channel",
    "segment_type",
    "amount",
    "closedate",
    "incumbent_supplier",
    "next_step",
    "probability_of_closing",
    "hubspot_owner_id",
    "competitive_coffee_pricing",
    "description",
];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DealQuery {
    pub query: String,
    pub owner_id: Option<String>,
    pub limit: u32,
    pub offset: u32,
}

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("deal not found: {0}")]
    DealNotFound(String),
    #[error("crm transport failed: {0}")]
    Transport(String),
    #[error("crm returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("crm response could not be decoded: {0}")]
    Decode(String),
    #[error("report template failed: {0}")]
    Template(String),
}

impl From<CrmError> for ApplicationError {
    fn from(error: CrmError) -> Self {
        match error {
            CrmError::DealNotFound(id) => ApplicationError::not_found("Deal", id),
            CrmError::Template(message) => ApplicationError::Configuration(message),
            other => ApplicationError::Integration(other.to_string()),
        }
    }
}

#[async_trait]
pub trait CrmGateway: Send + Sync {
    async fn search_deals(&self, query: &DealQuery) -> Result<DealSearchResult, CrmError>;

    async fn get_deal(&self, deal_id: &str) -> Result<DealDetail, CrmError>;

    /// Writes whichever of note, call and deal update `options` asks for.
    async fn upload_report(
        &self,
        deal_id: &str,
        report: &StructuredReport,
        options: &UploadOptions,
    ) -> Result<UploadResult, CrmError>;

    fn backend(&self) -> &'static str;
}
