use std::sync::Arc;
use std::sync::atomic::Ordering;

use claims_triage::config::Settings;
use claims_triage::ingest::DirSource;
use claims_triage::monitor::HealthMonitor;
use claims_triage::notify::{NotifierSet, SmtpAlerts, TeamsNotifier};
use claims_triage::pipeline::{ClaimProcessor, spawn_health_loop, spawn_ingest_loop};
use claims_triage::store::{Database, LibSqlBackend};
use claims_triage::triage::TriageConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let settings = Settings::from_env();
    if let Err(e) = settings.validate() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }

    // Initialize tracing; an optional daily-rotated file sits next to stderr
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&settings.log_level));

    let _log_guard = match settings.log_dir.as_ref() {
        Some(dir) => {
            if let Err(e) = std::fs::create_dir_all(dir) {
                eprintln!("   Warning: Could not create log dir: {e}");
            }
            let appender = tracing_appender::rolling::daily(dir, "claims-triage.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
            None
        }
    };

    eprintln!("📬 Claims Triage v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Environment: {}", settings.environment);
    eprintln!("   Database: {}", settings.db_path.display());
    eprintln!("   Drop dir: {}", settings.drop_dir.display());
    eprintln!(
        "   Archive: {} (keep {} days)",
        settings.archive_dir.display(),
        settings.archive_keep_days
    );
    eprintln!(
        "   Schedule: ingest every {}s, health check every {}s",
        settings.ingest_interval_secs, settings.health_interval_secs
    );

    // Triage rules: explicit YAML file, or the built-in defaults
    let config = match settings.rules_path.as_ref() {
        Some(path) => {
            eprintln!("   Rules: {}", path.display());
            TriageConfig::from_path(path).unwrap_or_else(|e| {
                eprintln!("Error: Failed to load rules from {}: {e}", path.display());
                std::process::exit(1);
            })
        }
        None => {
            eprintln!("   Rules: built-in defaults");
            TriageConfig::default_rules()
        }
    };

    // ── Notifiers ────────────────────────────────────────────────────────
    let mut notifiers = NotifierSet::new();

    if let Some(url) = settings.teams_webhook_url.clone() {
        match TeamsNotifier::new(url) {
            Ok(teams) => {
                notifiers.push(Arc::new(teams));
                eprintln!("   Teams: enabled");
            }
            Err(e) => eprintln!("   Warning: Teams notifier disabled: {e}"),
        }
    } else {
        eprintln!("   Teams: disabled");
    }

    if let Some(smtp) = settings.smtp.clone() {
        eprintln!(
            "   Email alerts: enabled ({} via {}:{})",
            smtp.recipients.join(", "),
            smtp.host,
            smtp.port
        );
        notifiers.push(Arc::new(SmtpAlerts::new(smtp)));
    } else {
        eprintln!("   Email alerts: disabled");
    }

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&settings.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {e}",
                    settings.db_path.display()
                );
                std::process::exit(1);
            }),
    );

    // ── Mail source ──────────────────────────────────────────────────────
    let source = Arc::new(
        DirSource::new(&settings.drop_dir, &settings.archive_dir).unwrap_or_else(|e| {
            eprintln!("Error: Failed to prepare mail directories: {e}");
            std::process::exit(1);
        }),
    );

    // ── Pipeline ─────────────────────────────────────────────────────────
    let processor = Arc::new(
        ClaimProcessor::new(config, Arc::clone(&db), notifiers.clone()).unwrap_or_else(|e| {
            eprintln!("Error: Invalid triage rules: {e}");
            std::process::exit(1);
        }),
    );
    let monitor = Arc::new(HealthMonitor::new(Arc::clone(&db), notifiers.clone()));

    // Both loops fire immediately on startup: one full ingest run and one
    // health check, then their regular cadence.
    let (ingest_handle, ingest_shutdown) = spawn_ingest_loop(
        Arc::clone(&db),
        Arc::clone(&processor),
        Arc::clone(&source),
        settings.archive_keep_days,
        Some(settings.ingest_interval_secs),
    );
    let (health_handle, health_shutdown) =
        spawn_health_loop(monitor, Some(settings.health_interval_secs));

    eprintln!("   Running. Ctrl+C to stop.\n");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    ingest_shutdown.store(true, Ordering::Relaxed);
    health_shutdown.store(true, Ordering::Relaxed);
    ingest_handle.abort();
    health_handle.abort();

    Ok(())
}
