use std::sync::Arc;

use anyhow::Context;

use bizhub_api::config::ServerConfig;
use bizhub_auth::{Hs256JwtValidator, JwtValidator, default_catalog};
use bizhub_core::{Clock, SystemClock};
use bizhub_infra::{InMemoryRbacStore, PostgresRbacStore, RbacServices};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    bizhub_observability::init();

    let config = ServerConfig::from_env()?;
    let validator: Arc<dyn JwtValidator> = Arc::new(Hs256JwtValidator::from_config(&config.auth));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let app = match &config.database_url {
        Some(url) => {
            let store = PostgresRbacStore::connect(url)
                .await
                .context("connecting to DATABASE_URL")?;
            store.migrate().await.context("applying schema")?;
            store
                .seed_catalog(&default_catalog())
                .await
                .context("seeding permission catalog")?;
            tracing::info!("using postgres rbac store");
            bizhub_api::app::build_app(RbacServices::new(Arc::new(store), validator, clock))
        }
        None => {
            let store = InMemoryRbacStore::new();
            store
                .seed_catalog(default_catalog())
                .context("seeding permission catalog")?;
            tracing::warn!("DATABASE_URL not set; using in-memory rbac store");
            bizhub_api::app::build_app(RbacServices::new(Arc::new(store), validator, clock))
        }
    };

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
