use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use debrief_agent::{AnthropicClient, InterviewOrchestrator, LlmClient, ReportExtractor, TurnSettings};
use debrief_core::config::{AppConfig, ConfigError, LoadOptions, SessionBackend};
use debrief_db::{open_session_store, spawn_sweeper, StoreError};

use crate::crm::{CrmError, CrmGateway, FixtureCrm, HubSpotClient};
use crate::routes::AppState;

pub struct Application {
    pub config: Arc<AppConfig>,
    pub state: AppState,
    /// Present for backends without native key expiry.
    pub sweeper: Option<JoinHandle<()>>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("session store unavailable: {0}")]
    SessionStore(#[from] StoreError),
    #[error("crm gateway setup failed: {0}")]
    Crm(#[from] CrmError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        session_backend = config.session.backend.as_str(),
        crm_enabled = config.crm.enabled,
        "starting application bootstrap"
    );

    let store = open_session_store(&config).await?;
    let sweeper = match config.session.backend {
        SessionBackend::Redis => None,
        SessionBackend::Memory | SessionBackend::Sqlite => Some(spawn_sweeper(
            store.clone(),
            Duration::from_secs(config.session.sweep_interval_secs),
        )),
    };

    let llm: Arc<dyn LlmClient> = Arc::new(AnthropicClient::new(&config.llm));
    let settings = TurnSettings::from_config(&config.llm);
    let orchestrator = Arc::new(InterviewOrchestrator::new(store.clone(), llm.clone(), settings));
    let extractor = Arc::new(ReportExtractor::new(store, llm, settings));

    let crm: Arc<dyn CrmGateway> = if config.crm.enabled {
        Arc::new(HubSpotClient::new(&config.crm)?)
    } else {
        Arc::new(FixtureCrm::new(&config.crm)?)
    };
    info!(event_name = "system.bootstrap.crm_ready", backend = crm.backend(), "crm gateway ready");

    let config = Arc::new(config);
    let state = AppState { config: config.clone(), orchestrator, extractor, crm };
    Ok(Application { config, state, sweeper })
}
