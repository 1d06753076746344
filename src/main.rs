use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tower::ServiceBuilder;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use licensehub::config::Config;
use licensehub::crypto::StoreKey;
use licensehub::db::{self, AppState, license_store};
use licensehub::handlers;
use licensehub::licensing::{FingerprintPolicy, IssueLicense, issue};
use licensehub::metrics::Metrics;
use licensehub::middleware::StaticSecretVerifier;
use licensehub::models::{ActorType, AuditAction, LicenseSettings};
use licensehub::notify::{LogNotifier, Notifier, ResendNotifier};
use licensehub::payments::{CoinPaymentsClient, IpnVerifier};

#[derive(Parser)]
#[command(name = "licensehub", version, about = "License issuance and crypto payment reconciliation service")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Print a fresh base64 master key for LICENSE_DB_KEY
    GenKey,
    /// Issue a license directly into the license database
    Issue {
        #[arg(long)]
        email: String,
        #[arg(long)]
        product: String,
        /// Defaults to LICENSE_DURATION_DAYS
        #[arg(long)]
        days: Option<i64>,
    },
    /// Re-encrypt the license database under a new master key
    RotateKey {
        /// New base64 master key; LICENSE_DB_KEY must still hold the current one
        #[arg(long)]
        new_key: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "licensehub=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::GenKey => {
            println!("{}", StoreKey::generate_base64());
            Ok(())
        }
        Command::Serve => serve(Config::from_env()?).await,
        Command::Issue {
            email,
            product,
            days,
        } => issue_license(Config::from_env()?, &email, &product, days),
        Command::RotateKey { new_key } => rotate_key(Config::from_env()?, &new_key),
    }
}

fn license_defaults(config: &Config) -> LicenseSettings {
    LicenseSettings {
        grace_period_days: config.grace_period_days,
        max_validations_per_day: config.max_validations_per_day,
        default_max_offline_days: config.max_offline_days,
        key_id: String::new(),
    }
}

fn open_database(config: &Config) -> anyhow::Result<db::DbPool> {
    let pool = db::create_pool(&config.database_path, config.db_pool_timeout)
        .context("Failed to open database")?;
    let conn = pool.get().context("Failed to get database connection")?;
    db::init_db(&conn).context("Failed to initialize schema")?;
    Ok(pool)
}

fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let store_key = StoreKey::from_base64(config.license_db_key.expose())
        .context("LICENSE_DB_KEY is invalid")?;

    let gateway = CoinPaymentsClient::new(
        config.coinpayments.api_url.clone(),
        config.coinpayments.public_key.clone(),
        config.coinpayments.private_key.clone(),
        config.gateway_timeout,
    )?;

    let notifier: Arc<dyn Notifier> = match &config.resend_api_key {
        Some(api_key) => Arc::new(ResendNotifier::new(
            api_key.clone(),
            config.email_from.clone(),
            config.notify_timeout,
        )?),
        None => {
            tracing::warn!("RESEND_API_KEY not set, license emails will only be logged");
            Arc::new(LogNotifier)
        }
    };

    Ok(AppState {
        db: open_database(config)?,
        store_key: Arc::new(store_key),
        license_defaults: license_defaults(config),
        fingerprint_policy: FingerprintPolicy::new(config.fingerprint_tolerance),
        license_duration_days: config.license_duration_days,
        admin: Arc::new(StaticSecretVerifier::new(&config.admin_secret)),
        gateway: Arc::new(gateway),
        ipn: IpnVerifier::new(
            config.coinpayments.ipn_secret.clone(),
            config.coinpayments.merchant_id.clone(),
        ),
        notifier,
        base_url: config.base_url.trim_end_matches('/').to_string(),
        download_url: config.download_url.clone(),
        settlement_currency: config.settlement_currency.clone(),
        metrics: Arc::new(Metrics::default()),
    })
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let state = build_state(&config)?;

    // Fail fast on a wrong key instead of on the first request.
    {
        let conn = state.db.get()?;
        let licenses = state
            .load_licenses(&conn)
            .context("License database could not be decrypted with LICENSE_DB_KEY")?;
        tracing::info!(
            key_id = %state.store_key.key_id(),
            licenses = licenses.licenses.len(),
            "License database loaded"
        );
    }

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(2)
            .burst_size(60)
            .finish()
            .context("Failed to build rate limiter config")?,
    );
    let governor_limiter = governor_conf.limiter().clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(60)).await;
            governor_limiter.retain_recent();
        }
    });

    let app = handlers::app(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(GovernorLayer::new(governor_conf))
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            ),
    );

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!("licensehub v{} listening on {}", env!("CARGO_PKG_VERSION"), addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")
}

fn issue_license(
    config: Config,
    email: &str,
    product: &str,
    days: Option<i64>,
) -> anyhow::Result<()> {
    let state = build_state(&config)?;
    let mut conn = state.db.get()?;

    let license = state.update_licenses(&mut conn, |db| {
        issue(
            db,
            IssueLicense {
                email,
                product_id: product,
                duration_days: days.unwrap_or(config.license_duration_days),
                order_id: None,
            },
            Utc::now(),
        )
    })?;

    db::queries::create_audit_log(
        &conn,
        ActorType::System,
        AuditAction::GenerateLicense,
        "license",
        &license.key,
        Some(&serde_json::json!({ "product_id": license.product_id, "source": "cli" })),
        None,
    )?;

    println!("{}", license.key);
    tracing::info!(product_id = %license.product_id, expires_at = %license.expires_at, "License issued");
    Ok(())
}

fn rotate_key(config: Config, new_key: &str) -> anyhow::Result<()> {
    let old_key = StoreKey::from_base64(config.license_db_key.expose())
        .context("LICENSE_DB_KEY is invalid")?;
    let new_key = StoreKey::from_base64(new_key).context("--new-key is invalid")?;

    let pool = open_database(&config)?;
    let mut conn = pool.get()?;
    let count = license_store::rekey(&mut conn, &old_key, &new_key)?;

    println!(
        "Re-encrypted {} licenses under key {}. Update LICENSE_DB_KEY before restarting.",
        count,
        new_key.key_id()
    );
    Ok(())
}
