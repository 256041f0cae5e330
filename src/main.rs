use anyhow::Context;
use axum::http::HeaderValue;
use clap::Parser;
use std::sync::Arc;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::EnvFilter;

use docfeed_api::auth::{IdentityProvider, JwtIdentityProvider, SupabaseIdentityProvider};
use docfeed_api::config::{self, AppConfig};
use docfeed_api::database::{MemoryStorage, PgStorage, Storage};
use docfeed_api::{app, AppState};

#[derive(Parser)]
#[command(name = "docfeed-api")]
#[command(about = "Document feedback API server")]
#[command(version)]
struct Args {
    #[arg(long, env = "PORT", default_value_t = 3000, help = "Port to listen on")]
    port: u16,

    #[arg(long, env = "DOCFEED_MEMORY", help = "Use in-memory storage instead of Postgres")]
    memory: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so DATABASE_URL, SUPABASE_* etc. are picked up
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = config::config();
    tracing::info!("Starting docfeed-api in {:?} mode", config.environment);

    config.validate().context("refusing to start")?;
    if config.security.allow_unverified_fallback {
        tracing::warn!("Unverified token fallback is enabled; disable with SECURITY_ALLOW_UNVERIFIED_FALLBACK=false");
    }

    let storage: Arc<dyn Storage> = if args.memory {
        tracing::warn!("Using in-memory storage; data is lost on exit");
        Arc::new(MemoryStorage::new())
    } else {
        let pg = PgStorage::connect(&config.database)
            .await
            .context("failed to connect to Postgres")?;
        pg.ensure_schema().await.context("failed to apply schema")?;
        Arc::new(pg)
    };

    let provider = identity_provider(config)?;
    let state = AppState::new(storage, provider, config);

    let mut router = app(state);
    if config.security.enable_cors {
        router = router.layer(cors_layer(config));
    }
    if config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    let bind_addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("docfeed-api listening on http://{}", bind_addr);
    axum::serve(listener, router).await.context("server error")?;
    Ok(())
}

fn identity_provider(config: &AppConfig) -> anyhow::Result<Arc<dyn IdentityProvider>> {
    match (&config.identity.supabase_url, &config.identity.supabase_anon_key) {
        (Some(url), Some(key)) => {
            tracing::info!("Verifying tokens against {}", url);
            Ok(Arc::new(SupabaseIdentityProvider::new(url, key.clone())?))
        }
        (Some(_), None) => anyhow::bail!("SUPABASE_URL is set but SUPABASE_ANON_KEY is missing"),
        _ => {
            tracing::info!("Verifying tokens locally with the configured JWT secret");
            Ok(Arc::new(JwtIdentityProvider::new(config.security.jwt_secret.clone())))
        }
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
