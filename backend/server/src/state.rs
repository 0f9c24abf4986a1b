use std::sync::Arc;

use anyhow::Error;

use super::{
    auth::{IdentityProvider, StaticIdentities},
    config::{Config, ConfigError},
    session::SessionSigner,
    store::{RowStore, open_or_create},
    submissions::ReadFailure,
};

pub struct State {
    pub config: Config,
    pub identities: Arc<dyn IdentityProvider>,
    pub sessions: SessionSigner,
    pub store: Arc<dyn RowStore>,
}

impl State {
    pub async fn new(config: Config) -> Result<Arc<Self>, Error> {
        let store = open_or_create(
            &config.sheets.url,
            &config.sheets.responses_sheet,
            config.sheets.service_account.as_deref(),
        )
        .await?;
        let identities = Arc::new(StaticIdentities::new(config.users.clone()));

        Ok(Self::from_parts(config, identities, store)?)
    }

    pub fn from_parts(
        config: Config,
        identities: Arc<dyn IdentityProvider>,
        store: Arc<dyn RowStore>,
    ) -> Result<Arc<Self>, ConfigError> {
        let sessions = SessionSigner::new(&config.cookie)?;

        Ok(Arc::new(Self {
            config,
            identities,
            sessions,
            store,
        }))
    }

    pub fn read_failure(&self) -> ReadFailure {
        ReadFailure::from_fail_closed(self.config.fail_closed)
    }
}
