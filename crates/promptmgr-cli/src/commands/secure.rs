//! Secure variable commands.
//!
//! Provides `pm secure setup|add|get|list|update|delete|export|rotate|check`
//! on top of `promptmgr-secrets`. Every command authenticates first, prompting
//! for the password when no session is active.

use crate::prompter::prompt_value;
use crate::Context;
use clap::Args;
use console::{style, Emoji};
use promptmgr_secrets::audit::DEFAULT_AUDIT_CAPACITY;
use promptmgr_secrets::{
    AuditEvent, AuthState, SecureVariableStore, VariableSummary, VariableUpdate,
};
use std::path::PathBuf;
use tracing::warn;

static CHECK: Emoji = Emoji("✓", "+");
static CROSS: Emoji = Emoji("✗", "x");
static WARN: Emoji = Emoji("⚠", "!");

/// Secure command arguments.
#[derive(Args)]
pub struct SecureArgs {
    /// Print the audit events recorded during this command
    #[arg(long, global = true)]
    pub audit: bool,

    #[command(subcommand)]
    pub command: SecureCommand,
}

#[derive(clap::Subcommand)]
pub enum SecureCommand {
    /// Set up password protection
    Setup,

    /// Store a secure variable (prompts for the value)
    Add {
        /// Variable name (alphanumeric, underscore, hyphen)
        name: String,

        /// What the variable is for (stored encrypted)
        #[arg(short, long, default_value = "")]
        description: String,

        /// Value (if omitted, prompts for hidden input)
        #[arg(long)]
        value: Option<String>,

        /// Default value (stored encrypted)
        #[arg(long)]
        default: Option<String>,
    },

    /// Print a decrypted secure variable
    Get {
        /// Variable name
        name: String,
    },

    /// List secure variables (values masked)
    List {
        /// Show decrypted values and defaults
        #[arg(long)]
        show_values: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Change fields of a secure variable
    Update {
        /// Variable name
        name: String,

        /// New description
        #[arg(short, long)]
        description: Option<String>,

        /// New value
        #[arg(long)]
        value: Option<String>,

        /// New default; an empty string removes it
        #[arg(long)]
        default: Option<String>,
    },

    /// Delete a secure variable
    Delete {
        /// Variable name
        name: String,

        /// Skip confirmation
        #[arg(short, long)]
        force: bool,
    },

    /// Export the encrypted store to a file
    Export {
        /// Destination file
        path: PathBuf,
    },

    /// Change the password and re-encrypt every variable
    Rotate,

    /// Check which encryption backend is available
    Check,
}

/// Run the secure command.
pub async fn run(args: SecureArgs, ctx: &Context) -> anyhow::Result<()> {
    let store = ctx
        .open_store()
        .map_err(|e| anyhow::anyhow!("Failed to initialize secure store: {}", e))?;

    let result = execute(args.command, &store).await;

    if args.audit {
        print_audit(&store.recent_audit(DEFAULT_AUDIT_CAPACITY));
    }

    result
}

async fn execute(command: SecureCommand, store: &SecureVariableStore) -> anyhow::Result<()> {
    match command {
        SecureCommand::Setup => {
            if store.auth().state().await? != AuthState::NoCredential {
                println!("Secure variables are already set up.");
                println!("  Use 'pm secure rotate' to change the password.");
                return Ok(());
            }

            check_capability(store)?;
            store
                .auth()
                .authenticate(false)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            println!("{} Password protection enabled.", style(CHECK).green());
        }

        SecureCommand::Add {
            name,
            description,
            value,
            default,
        } => {
            check_capability(store)?;

            let value = match value {
                Some(v) => v,
                None => prompt_value(&name)?,
            };
            if value.is_empty() {
                anyhow::bail!("Value must not be empty");
            }

            let added = store
                .add(&name, &description, &value, default.as_deref())
                .await
                .map_err(|e| anyhow::anyhow!("{}", e))?;

            if added {
                println!("Secure variable '{}' stored.", name);
            } else {
                println!("Secure variable '{}' left unchanged.", name);
            }
        }

        SecureCommand::Get { name } => match store.get(&name).await {
            Some(secret) => println!("{}", secret.expose()),
            None => anyhow::bail!(
                "Secure variable '{}' is not available (missing, locked, or undecryptable)",
                name
            ),
        },

        SecureCommand::List { show_values, json } => {
            let summaries = store
                .list(show_values)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                print_table(&summaries);
            }
        }

        SecureCommand::Update {
            name,
            description,
            value,
            default,
        } => {
            let update = build_update(description, value, default);
            if update.is_empty() {
                anyhow::bail!("Nothing to update: pass --description, --value or --default");
            }
            if update.value.is_some() || !update.default.is_keep() {
                check_capability(store)?;
            }

            let updated = store
                .update(&name, update)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            if !updated {
                anyhow::bail!("Secure variable '{}' not found", name);
            }
            println!("Secure variable '{}' updated.", name);
        }

        SecureCommand::Delete { name, force } => {
            let deleted = store
                .delete(&name, force)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e))?;

            if deleted {
                println!("Secure variable '{}' deleted.", name);
            } else {
                println!("Secure variable '{}' was not deleted.", name);
            }
        }

        SecureCommand::Export { path } => {
            store
                .export(&path)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            println!("Encrypted store exported to {}", path.display());
            println!("  Values stay encrypted; the same password is needed to read them.");
        }

        SecureCommand::Rotate => {
            check_capability(store)?;
            let report = store
                .rotate_password()
                .await
                .map_err(|e| anyhow::anyhow!("{}", e))?;

            println!(
                "{} Password changed; {} field(s) re-encrypted.",
                style(CHECK).green(),
                report.re_encrypted
            );
            if report.skipped > 0 {
                println!(
                    "  {} {} field(s) could not be decrypted and were left as they were.",
                    style(WARN).yellow(),
                    report.skipped
                );
            }
        }

        SecureCommand::Check => {
            let report = store.cipher().verify_capability();
            let mark = if !report.ok {
                style(CROSS).red()
            } else if report.is_degraded() {
                style(WARN).yellow()
            } else {
                style(CHECK).green()
            };
            println!("  {} {}", mark, report.message);
            if !report.ok {
                anyhow::bail!("Encryption is not available");
            }
        }
    }

    Ok(())
}

/// Map CLI flags onto a [`VariableUpdate`]. `--default ""` clears the default.
pub fn build_update(
    description: Option<String>,
    value: Option<String>,
    default: Option<String>,
) -> VariableUpdate {
    let mut update = VariableUpdate::new();
    if let Some(description) = description {
        update = update.description(description);
    }
    if let Some(value) = value {
        update = update.value(value);
    }
    match default {
        Some(d) if d.is_empty() => update.clear_default(),
        Some(d) => update.default_value(d),
        None => update,
    }
}

/// Refuse to store secrets when encryption is broken; warn on the fallback.
fn check_capability(store: &SecureVariableStore) -> anyhow::Result<()> {
    let report = store.cipher().verify_capability();
    if !report.ok {
        anyhow::bail!("Encryption unavailable: {}", report.message);
    }
    if report.is_degraded() {
        warn!(algorithm = ?report.algorithm, "using reduced-security encryption");
        eprintln!("{} {}", style(WARN).yellow(), report.message);
    }
    Ok(())
}

fn print_table(summaries: &[VariableSummary]) {
    if summaries.is_empty() {
        println!("No secure variables stored.");
        return;
    }

    println!(
        "{:<24} {:<32} {:<20} {:<20} {}",
        "NAME", "DESCRIPTION", "VALUE", "DEFAULT", "USED"
    );
    println!("{}", "-".repeat(104));
    for s in summaries {
        println!(
            "{:<24} {:<32} {:<20} {:<20} {}",
            s.name,
            truncate(&s.description, 32),
            truncate(&s.value, 20),
            truncate(s.default_value.as_deref().unwrap_or("-"), 20),
            s.used_count
        );
    }
    println!("\n{} secure variable(s) total.", summaries.len());
}

fn print_audit(events: &[AuditEvent]) {
    println!("\n{}", style("Audit").bold());
    for event in events {
        let mark = if event.success {
            style(CHECK).green()
        } else {
            style(CROSS).red()
        };
        println!(
            "  {} {} {:<7} {:<24} {}",
            mark,
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.action.as_str(),
            event.variable_name,
            event.details.as_deref().unwrap_or("")
        );
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let kept: String = text.chars().take(width.saturating_sub(1)).collect();
    format!("{kept}…")
}
