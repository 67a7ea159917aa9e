//! Server assembly: database pool, policy context, reconciler worker, and
//! the axum router with its middleware stack.

use anyhow::{anyhow, Context, Result};
use axum::{
    body::Body,
    extract::{Extension, MatchedPath},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE},
        HeaderName, HeaderValue, Method, Request,
    },
    routing::{get, post, put},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use url::Url;
use utoipa_swagger_ui::SwaggerUi;

pub mod handlers;
pub mod reconciler;

mod openapi;

pub use openapi::openapi;
pub use reconciler::ReconcilerConfig;

use crate::policy::{PolicyConfig, PolicyContext};
use crate::store::{
    definitions::ensure_definition, schema::ensure_schema, PgAccountDirectory, PgAttributeStore,
    PgAuthenticator, PgDefinitionRegistry,
};

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(
    port: u16,
    dsn: String,
    policy_config: PolicyConfig,
    reconciler_config: ReconcilerConfig,
) -> Result<()> {
    // Connect to database
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&dsn)
        .await
        .context("Failed to connect to database")?;

    ensure_schema(&pool)
        .await
        .context("Failed to apply database schema")?;
    ensure_definition(&pool)
        .await
        .context("Failed to provision the password-change attribute definition")?;

    let accounts = Arc::new(PgAccountDirectory::new(pool.clone()));
    let authenticator = Arc::new(PgAuthenticator::new(
        pool.clone(),
        policy_config.session_ttl_seconds(),
    ));
    let ctx = PolicyContext::new(
        policy_config,
        Arc::new(PgAttributeStore::new(pool.clone())),
        accounts,
        authenticator,
        Arc::new(PgDefinitionRegistry::new(pool.clone())),
    );

    // Background worker drains the attribute change outbox and keeps
    // recovery credentials consistent with the flag.
    reconciler::spawn_reconciler(pool.clone(), ctx.clone(), reconciler_config);

    let frontend_origin = frontend_origin(ctx.config().frontend_base_url())?;
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_origin(AllowOrigin::exact(frontend_origin))
        .allow_credentials(true);

    let ctx = Arc::new(ctx);
    let app = Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health::health))
        .route("/v1/auth/login", post(handlers::login::login))
        .route(
            "/v1/auth/password-recovery/confirm",
            post(handlers::recovery::password_recovery_confirm),
        )
        .route("/v1/accounts", post(handlers::accounts::create))
        .route(
            "/v1/accounts/:id/password-policy",
            put(handlers::accounts::set_password_policy),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(ctx))
                .layer(Extension(pool.clone())),
        )
        .layer(Extension(pool));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
