use std::sync::Arc;

use anyhow::Context;

use devbook_auth::{
    Argon2Credentials, CredentialError, Credentials, Hs256TokenService, JwtValidator, TokenIssuer,
};
use devbook_core::PasswordDigest;
use devbook_infra::{AppConfig, InMemoryStore, PgStore, PublicationStore, UserStore};

/// Everything a handler needs, shared behind one `Arc`.
#[derive(Clone)]
pub struct AppServices {
    pub users: Arc<dyn UserStore>,
    pub publications: Arc<dyn PublicationStore>,
    pub tokens: Arc<dyn TokenIssuer>,
    pub jwt: Arc<dyn JwtValidator>,
    pub credentials: Arc<dyn Credentials>,
    /// Hashed once at startup with `credentials`; verified against when a
    /// login email is unknown so that path costs the same as a wrong password.
    pub decoy_digest: PasswordDigest,
}

const DECOY_PASSWORD: &str = "devbook-decoy-password";

impl AppServices {
    /// Wire a store that serves both users and publications.
    pub fn new<S>(
        store: Arc<S>,
        secret: &[u8],
        credentials: Arc<dyn Credentials>,
    ) -> Result<Self, CredentialError>
    where
        S: UserStore + PublicationStore + 'static,
    {
        let token_service = Arc::new(Hs256TokenService::new(secret));
        let decoy_digest = credentials.hash(DECOY_PASSWORD)?;
        Ok(Self {
            users: store.clone(),
            publications: store,
            tokens: token_service.clone(),
            jwt: token_service,
            credentials,
            decoy_digest,
        })
    }

    /// Check a login password. With no stored digest the decoy is verified
    /// instead and the result is always `false`.
    pub fn verify_login(&self, stored: Option<&PasswordDigest>, candidate: &str) -> bool {
        match stored {
            Some(digest) => self.credentials.verify(digest, candidate),
            None => {
                let _ = self.credentials.verify(&self.decoy_digest, candidate);
                false
            }
        }
    }

    /// Process-local store; used when no database is configured and by tests.
    pub fn in_memory(
        secret: &[u8],
        credentials: Arc<dyn Credentials>,
    ) -> Result<Self, CredentialError> {
        Self::new(Arc::new(InMemoryStore::new()), secret, credentials)
    }

    /// Select the backing store from configuration.
    pub async fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let credentials: Arc<dyn Credentials> = Arc::new(Argon2Credentials::new());

        match &config.database_url {
            Some(url) => {
                let store = PgStore::connect(url, config.max_connections)
                    .await
                    .context("failed to connect to postgres")?;
                tracing::info!(max_connections = config.max_connections, "using postgres store");
                Self::new(Arc::new(store), &config.secret_key, credentials)
                    .context("failed to prepare credentials")
            }
            None => {
                tracing::warn!("no database configured; using in-memory store (data is lost on restart)");
                Self::in_memory(&config.secret_key, credentials)
                    .context("failed to prepare credentials")
            }
        }
    }
}
