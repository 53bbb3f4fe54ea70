/*
 * Responsibility
 * - load Config -> build services -> assemble the Router
 * - apply the outer middleware (security headers / CORS / HTTP hardening)
 * - serve with axum::serve()
 */
use std::{panic, process, sync::Arc};

use anyhow::{Context, Result};
use axum::Router;
use chrono::Duration;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::middleware::{cors, http, security_headers, stateful::EnsureFrontendRequestsAreStateful};
use crate::repos::{AccessTokenRepository, PgAccessTokenRepository};
use crate::services::auth::{
    BearerTokenProvider, Guard, JwtTokenManager, PersonalAccessTokenFactory, SigningKeys,
    SubjectUserProvider, TokenManager,
};
use crate::services::encrypter::{Encrypter, KeyEncrypter};
use crate::{api, state::AppState};

pub fn init_tracing() {
    // RUST_LOG wins when set, e.g.
    // RUST_LOG=info,jwt_guard=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        // Development: crash so it gets noticed. Production: keep serving.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;
    init_panic_hook(!config.app_env.is_production());

    info!(
        "starting API in {:?} mode on {}",
        config.app_env, config.addr
    );

    let state = build_state(&config).await?;
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("binding {}", config.addr))?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Signing keys per config: Ed25519 PEM pair when `JWT_USE_SSL`, HMAC otherwise.
pub fn token_manager(config: &Config) -> Result<JwtTokenManager> {
    let keys = if config.tokens.use_ssl {
        let (private_pem, public_pem) = config.signing_key_pems()?;
        SigningKeys::EdPem {
            private_pem,
            public_pem,
        }
    } else {
        let secret = config
            .tokens
            .hmac_key
            .as_deref()
            .context("JWT_HMAC_KEY is not set")?;
        SigningKeys::Hmac(secret.as_bytes().to_vec())
    };

    Ok(JwtTokenManager::new(
        keys,
        config.tokens.issuer.clone(),
        Duration::minutes(config.tokens.token_ttl),
    )?)
}

/// Postgres token store, migrated on connect. `None` without DATABASE_URL.
pub async fn token_repository(config: &Config) -> Result<Option<Arc<dyn AccessTokenRepository>>> {
    let Some(url) = config.database_url.as_deref() else {
        warn!("DATABASE_URL not set; issued tokens are not persisted and cannot be revoked");
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(url)
        .await
        .context("connecting to DATABASE_URL")?;
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(Some(Arc::new(PgAccessTokenRepository::new(
        pool,
        Duration::minutes(config.tokens.refresh_ttl),
    ))))
}

pub async fn build_state(config: &Config) -> Result<AppState> {
    let tokens: Arc<dyn TokenManager> = Arc::new(token_manager(config)?);
    let repository = token_repository(config).await?;

    let encrypter: Arc<dyn Encrypter> = match config.app_key.as_deref() {
        Some(secret) => Arc::new(KeyEncrypter::from_secret(secret)),
        None => {
            warn!("APP_KEY not set; using a random cookie key for this process");
            Arc::new(KeyEncrypter::generate())
        }
    };

    let provider = Arc::new(BearerTokenProvider::new(
        Arc::clone(&tokens),
        Arc::new(SubjectUserProvider),
        repository.clone(),
    ));
    // No session backend is wired in; every request takes the bearer path.
    let guard = Arc::new(Guard::new(provider, None, config.guards.clone()));

    let factory = PersonalAccessTokenFactory::new(Arc::clone(&tokens), repository.clone());
    let stateful = Arc::new(EnsureFrontendRequestsAreStateful::new(
        &config.stateful,
        encrypter,
        tokens,
    ));

    info!(
        guard = %config.process.guard_name,
        session_guards = ?guard.guards(),
        persisted = repository.is_some(),
        "auth services ready"
    );

    Ok(AppState::new(guard, factory, repository, stateful))
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    let router = Router::new()
        .nest("/api/v1", api::v1::routes(&state))
        .with_state(state);

    let router = security_headers::apply(router);
    let router = cors::apply(router, config);
    http::apply(router, &config.http)
}
