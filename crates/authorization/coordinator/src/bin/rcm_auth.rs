//! RCM Authorization CLI
//!
//! Run the authorization rules over a dataset file.
//!
//! Usage:
//!   rcm-auth populate [<claim-id>...] [--dataset <file>]
//!   rcm-auth validate [<claim-id>...] [--today <YYYY-MM-DD>]
//!   rcm-auth submit <claim-id> [--save <file>]
//!   rcm-auth batch [<claim-id>...] [--save <file>]
//!   rcm-auth expiring [--window-days <n>]
//!   rcm-auth check-dataset

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rcm_authorization::*;
use rcm_authorization_integrity::Claim;
use rcm_shared::{AuditLog, Clock, FixedClock, JsonLinesAuditLog, NoopAuditLog, SessionContext, SystemClock, UserRole};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "rcm-auth")]
#[command(version = "0.1.0")]
#[command(about = "Match, validate and decrement claim authorizations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Dataset JSON file (bundled demo dataset if not specified)
    #[arg(short, long, global = true)]
    dataset: Option<PathBuf>,

    /// Rule configuration JSON file
    #[arg(short, long, global = true, env = "RCM_CONFIG")]
    config: Option<PathBuf>,

    /// Evaluate as of this date instead of now
    #[arg(long, global = true)]
    today: Option<NaiveDate>,

    /// Override the tie-break policy
    #[arg(long, global = true, value_enum)]
    tie_break: Option<TieBreak>,

    /// Append audit events (JSON lines) to this file
    #[arg(long, global = true, env = "RCM_AUDIT_LOG")]
    audit_log: Option<PathBuf>,

    /// Acting user id recorded in the audit trail
    #[arg(long, global = true, default_value = "system")]
    user: String,

    /// Role of the acting user: front-desk, biller, coder,
    /// authorization-coordinator or admin (system user: admin, others: biller)
    #[arg(long, global = true)]
    role: Option<UserRole>,

    /// Output format: json, compact, or table
    #[arg(short, long, global = true, default_value = "json")]
    format: String,

    /// Output file (stdout if not specified)
    #[arg(short, long, global = true)]
    output: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fill in auth_number/auth_type on claims
    Populate {
        /// Claims to populate (all claims if none given)
        claim_ids: Vec<String>,
    },

    /// Check claims for missing or expiring authorizations
    Validate {
        /// Claims to validate (all claims if none given)
        claim_ids: Vec<String>,

        /// Exit non-zero if any claim is invalid
        #[arg(long)]
        strict: bool,
    },

    /// Record a visit for one submitted claim
    Submit {
        claim_id: String,

        /// Write the updated dataset here
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// Record visits for several claims in order
    Batch {
        /// Claims to submit, in order (all claims if none given)
        claim_ids: Vec<String>,

        /// Write the updated dataset here
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// List approved authorizations expiring soon
    Expiring {
        /// Alert window in days
        #[arg(short, long)]
        window_days: Option<i64>,
    },

    /// Validate every record in the dataset
    CheckDataset,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut dataset = match &cli.dataset {
        Some(path) => Dataset::from_path(path)?,
        None => Dataset::demo()?,
    };
    if matches!(cli.command, Commands::Submit { .. } | Commands::Batch { .. }) {
        dataset.ensure_valid()?;
    }

    let mut config = match &cli.config {
        Some(path) => AuthorizationConfig::from_path(path)?,
        None => AuthorizationConfig::default(),
    }
    .with_env_overrides()?;
    if let Some(tie_break) = cli.tie_break {
        config.tie_break = tie_break;
    }
    if let Commands::Expiring { window_days: Some(days) } = &cli.command {
        config.expiring_window_days = *days;
        config.validate()?;
    }

    let clock: Arc<dyn Clock> = match cli.today {
        Some(date) => Arc::new(FixedClock::at_date(date)),
        None => Arc::new(SystemClock),
    };
    let audit: Arc<dyn AuditLog> = match &cli.audit_log {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Arc::new(JsonLinesAuditLog::new(file))
        }
        None => Arc::new(NoopAuditLog),
    };
    let session = match (cli.user.as_str(), cli.role) {
        ("system", None) => SessionContext::system(),
        (user, role) => SessionContext::new(user, user, role.unwrap_or(UserRole::Biller)),
    };

    info!(
        claims = dataset.claims.len(),
        referrals = dataset.referrals.len(),
        service_authorizations = dataset.service_authorizations.len(),
        tie_break = ?config.tie_break,
        "dataset loaded"
    );

    let engine = AuthorizationEngine::new(config, session)
        .with_clock(clock)
        .with_audit_log(audit);

    let mut exit_code = 0;
    let result: serde_json::Value = match cli.command {
        Commands::Populate { claim_ids } => {
            let claims = select_claims(&dataset, &claim_ids)?;
            let mut populated = Vec::with_capacity(claims.len());
            for claim in &claims {
                populated.push(engine.populate(claim, &dataset)?);
            }
            serde_json::to_value(populated)?
        }
        Commands::Validate { claim_ids, strict } => {
            let claims = select_claims(&dataset, &claim_ids)?;
            let mut rows = Vec::with_capacity(claims.len());
            for claim in &claims {
                let validation = engine.validate(claim, &dataset)?;
                if strict && !validation.valid {
                    exit_code = 2;
                }
                rows.push(serde_json::json!({
                    "claim_id": claim.claim_id,
                    "valid": validation.valid,
                    "errors": validation.errors,
                    "warnings": validation.warnings,
                }));
            }
            serde_json::Value::Array(rows)
        }
        Commands::Submit { claim_id, save } => {
            let claim = select_claims(&dataset, std::slice::from_ref(&claim_id))?.remove(0);
            let decrement = engine.submit(&claim, &mut dataset)?;
            save_dataset(save.as_deref(), &dataset)?;
            serde_json::to_value(decrement)?
        }
        Commands::Batch { claim_ids, save } => {
            let claims = select_claims(&dataset, &claim_ids)?;
            let outcome = engine.submit_batch(&claims, &mut dataset);
            save_dataset(save.as_deref(), &dataset)?;
            serde_json::to_value(outcome)?
        }
        Commands::Expiring { .. } => serde_json::to_value(engine.expiring(&dataset))?,
        Commands::CheckDataset => {
            let validation = dataset.validate();
            if !validation.is_valid() {
                exit_code = 2;
            }
            serde_json::json!({
                "valid": validation.is_valid(),
                "errors": validation.messages(),
            })
        }
    };

    let output_str = match cli.format.as_str() {
        "compact" => serde_json::to_string(&result)?,
        "table" => result_to_table(&result),
        _ => serde_json::to_string_pretty(&result)?,
    };

    if let Some(output_path) = cli.output {
        fs::write(&output_path, &output_str)?;
        eprintln!("Output written to: {}", output_path.display());
    } else {
        println!("{}", output_str);
    }

    if exit_code != 0 {
        error!(exit_code, "one or more checks failed");
        std::process::exit(exit_code);
    }
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn select_claims(dataset: &Dataset, claim_ids: &[String]) -> Result<Vec<Claim>, Box<dyn std::error::Error>> {
    if claim_ids.is_empty() {
        return Ok(dataset.claims.clone());
    }
    claim_ids
        .iter()
        .map(|id| {
            dataset
                .claim(id)
                .cloned()
                .ok_or_else(|| format!("claim {} not found in dataset", id).into())
        })
        .collect()
}

fn save_dataset(path: Option<&Path>, dataset: &Dataset) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = path {
        fs::write(path, serde_json::to_string_pretty(dataset)?)?;
        eprintln!("Dataset written to: {}", path.display());
    }
    Ok(())
}

/// Tab-separated rows for an array of objects; anything else is pretty JSON
fn result_to_table(value: &serde_json::Value) -> String {
    let rows = match value {
        serde_json::Value::Array(rows) if rows.iter().all(|r| r.is_object()) && !rows.is_empty() => rows,
        _ => return serde_json::to_string_pretty(value).unwrap_or_default(),
    };

    let headers: Vec<&String> = match &rows[0] {
        serde_json::Value::Object(map) => map.keys().collect(),
        _ => Vec::new(),
    };

    let mut out = headers.iter().map(|h| h.as_str()).collect::<Vec<_>>().join("\t");
    for row in rows {
        out.push('\n');
        let cells: Vec<String> = headers
            .iter()
            .map(|h| match row.get(h.as_str()) {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Null) | None => String::new(),
                Some(serde_json::Value::Array(items)) => items
                    .iter()
                    .map(|i| i.as_str().map(str::to_string).unwrap_or_else(|| i.to_string()))
                    .collect::<Vec<_>>()
                    .join("; "),
                Some(other) => other.to_string(),
            })
            .collect();
        out.push_str(&cells.join("\t"));
    }
    out
}
