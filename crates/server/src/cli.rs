use clap::{Parser, Subcommand};

/// sa-server — event-sourced transcript ledger with real-time fan-out.
#[derive(Debug, Parser)]
#[command(name = "sa-server", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the fan-out server (default when no subcommand is given).
    Serve,
    /// Print a thread's resolved transcript as JSON.
    Transcript {
        /// Thread to inspect.
        thread_id: String,
    },
    /// Force-recover every run the reconciliation sweep considers stale.
    Recover {
        /// Restrict the sweep to one thread; every thread if omitted.
        #[arg(long)]
        thread_id: Option<String>,
        /// Override the stale-age threshold in milliseconds.
        #[arg(long)]
        older_than_ms: Option<i64>,
        /// Status to force stale runs into.
        #[arg(long, value_enum, default_value = "fail")]
        action: RecoverActionArg,
        /// Admin token, required when `admin.token_env` resolves to a
        /// non-empty value.
        #[arg(long)]
        admin_token: Option<String>,
    },
    /// Parse the config file and report any errors.
    ConfigValidate,
    /// Print version information.
    Version,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum RecoverActionArg {
    Fail,
    Cancel,
}

impl From<RecoverActionArg> for sa_domain::RecoverAction {
    fn from(a: RecoverActionArg) -> Self {
        match a {
            RecoverActionArg::Fail => sa_domain::RecoverAction::Fail,
            RecoverActionArg::Cancel => sa_domain::RecoverAction::Cancel,
        }
    }
}

/// Loads config from `--config`/`SA_CONFIG`, falling back to defaults if the
/// file does not exist.
pub fn load_config(path: &str) -> anyhow::Result<sa_domain::config::Config> {
    if std::path::Path::new(path).exists() {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading {path}: {e}"))?;
        toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {path}: {e}"))
    } else {
        Ok(sa_domain::config::Config::default())
    }
}
