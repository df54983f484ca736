mod admin;
mod cli;
mod state;

use anyhow::Context;
use clap::Parser;
use sa_domain::config::ConfigSeverity;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let config_path = std::env::var("SA_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = cli::load_config(&config_path)?;

    match args.command {
        None | Some(Command::Serve) => {
            init_tracing();
            serve(config).await
        }
        Some(Command::Transcript { thread_id }) => {
            let state = AppState::open(&config)?;
            transcript(&state, &thread_id)
        }
        Some(Command::Recover {
            thread_id,
            older_than_ms,
            action,
            admin_token,
        }) => {
            init_tracing();
            admin::check_admin_token(&config, admin_token.as_deref())?;
            let state = AppState::open(&config)?;
            recover(&state, thread_id, older_than_ms, action.into())
        }
        Some(Command::ConfigValidate) => {
            let issues = config.validate();
            for issue in &issues {
                println!("{issue}");
            }
            if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Version) => {
            println!("sa-server {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sa_server=debug")),
        )
        .json()
        .init();
}

async fn serve(config: sa_domain::config::Config) -> anyhow::Result<()> {
    tracing::info!("sa-server starting");

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    let state = AppState::open(&config)?;
    tracing::info!(path = %config.store.database_path, namespace = %config.store.namespace, "store ready");

    // ── Periodic stale-run reconciliation ────────────────────────────
    {
        let ledger = state.ledger.clone();
        let scan_interval = std::time::Duration::from_millis(config.reconciliation.scan_interval_ms);
        let older_than_ms = config.reconciliation.default_stale_threshold_ms as i64;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(scan_interval);
            loop {
                interval.tick().await;
                let opts = sa_run_manager::ReconcileOptions {
                    thread_id: None,
                    older_than_ms,
                };
                match tokio::task::spawn_blocking({
                    let ledger = ledger.clone();
                    move || sa_run_manager::recover_all_stale_runs(&ledger, sa_domain::RecoverAction::Fail, opts)
                })
                .await
                {
                    Ok(Ok(outcomes)) if !outcomes.is_empty() => {
                        tracing::warn!(count = outcomes.len(), "recovered stale runs");
                    }
                    Ok(Ok(_)) => {}
                    Ok(Err(e)) => tracing::error!(error = %e, "stale-run sweep failed"),
                    Err(e) => tracing::error!(error = %e, "stale-run sweep task panicked"),
                }
            }
        });
    }

    let app = sa_fanout_server::router(state.fanout.clone());
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "sa-server listening");

    axum::serve(listener, app).await.context("axum server error")?;
    Ok(())
}

fn transcript(state: &AppState, thread_id: &str) -> anyhow::Result<()> {
    let scoped = state.scoped_thread_id(thread_id);
    let messages = state
        .ledger
        .get_transcript(&scoped, &sa_ledger::BranchSelector::new())?;
    println!("{}", serde_json::to_string_pretty(&messages)?);
    Ok(())
}

fn recover(
    state: &AppState,
    thread_id: Option<String>,
    older_than_ms: Option<i64>,
    action: sa_domain::RecoverAction,
) -> anyhow::Result<()> {
    let mut opts = sa_run_manager::ReconcileOptions {
        thread_id,
        ..Default::default()
    };
    if let Some(ms) = older_than_ms {
        opts.older_than_ms = ms;
    }
    let outcomes = sa_run_manager::recover_all_stale_runs(&state.ledger, action, opts)?;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(result) => println!("{}: recovered (committed={})", outcome.run_id, result.committed),
            Err(e) => println!("{}: failed to recover: {e}", outcome.run_id),
        }
    }
    if outcomes.is_empty() {
        println!("no stale runs found");
    }
    Ok(())
}
