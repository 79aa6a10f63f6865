//! Diagnostic commands.

use crate::Context;
use clap::Args;
use console::{style, Emoji};
use promptmgr_core::{env, identity, paths, ConfigError};
use promptmgr_secrets::credential::KEYCHAIN_SERVICE;
use promptmgr_secrets::{verify_encryption_capability, AuthState, KeychainCredentialStore};

static CHECK: Emoji = Emoji("✓", "+");
static CROSS: Emoji = Emoji("✗", "x");
static WARN: Emoji = Emoji("⚠", "!");

/// Doctor command arguments.
#[derive(Args)]
pub struct DoctorArgs {
    /// Also check the stored credential and session
    #[arg(long)]
    pub full: bool,
}

/// Run the doctor command.
pub async fn run(args: DoctorArgs, ctx: &Context) -> anyhow::Result<()> {
    println!("promptmgr Doctor\n");

    let mut errors = 0;
    let mut warnings = 0;

    // Check configuration
    println!("Checking configuration...");

    match promptmgr_core::Config::load(&ctx.config_path) {
        Ok(config) => {
            println!("  {} Configuration loaded: {:?}", style(CHECK).green(), ctx.config_path);
            match config.validate() {
                Ok(_) => println!("  {} Configuration valid", style(CHECK).green()),
                Err(e) => {
                    println!("  {} Configuration invalid: {}", style(CROSS).red(), e);
                    errors += 1;
                }
            }
        }
        Err(ConfigError::NotFound(_)) => {
            println!("  {} Configuration file not found, using defaults", style(WARN).yellow());
            println!("    Run 'pm config init' to create one");
            warnings += 1;
        }
        Err(e) => {
            println!("  {} Configuration error: {}", style(CROSS).red(), e);
            errors += 1;
        }
    }

    let ttl = ctx.config.session_ttl_minutes();
    let source = if env::get_var(env::vars::PM_SECURE_SESSION_TTL).is_some() {
        env::vars::PM_SECURE_SESSION_TTL
    } else {
        "config"
    };
    println!("  {} Session lifetime: {} minute(s) ({})", style(CHECK).green(), ttl, source);

    // Check storage locations
    println!("\nChecking storage...");

    match ctx.data_file() {
        Ok(data_file) => {
            let store = paths::secure_store_file(&data_file);
            match store.parent() {
                Some(dir) if dir.exists() => {
                    println!("  {} Secure store: {:?}", style(CHECK).green(), store);
                }
                _ => {
                    println!(
                        "  {} Secure store directory missing (created on first use): {:?}",
                        style(WARN).yellow(),
                        store
                    );
                    warnings += 1;
                }
            }
        }
        Err(e) => {
            println!("  {} Failed to determine data file: {}", style(CROSS).red(), e);
            errors += 1;
        }
    }

    if KeychainCredentialStore::is_supported() {
        println!(
            "  {} Credential: OS keychain (service '{}', account '{}')",
            style(CHECK).green(),
            KEYCHAIN_SERVICE,
            identity::username()
        );
    } else {
        match paths::credential_file() {
            Ok(path) => println!("  {} Credential file: {:?}", style(CHECK).green(), path),
            Err(e) => {
                println!("  {} Failed to locate credential file: {}", style(CROSS).red(), e);
                errors += 1;
            }
        }
    }

    // Check encryption
    println!("\nChecking encryption...");

    let report = verify_encryption_capability();
    if !report.ok {
        println!("  {} {}", style(CROSS).red(), report.message);
        errors += 1;
    } else if report.is_degraded() {
        println!("  {} {}", style(WARN).yellow(), report.message);
        warnings += 1;
    } else {
        println!("  {} {}", style(CHECK).green(), report.message);
    }

    // Full checks: credential and session state
    if args.full {
        println!("\nChecking authentication...");
        match ctx.open_session() {
            Ok(auth) => match auth.state().await {
                Ok(AuthState::NoCredential) => {
                    println!("  {} No password set up yet", style(WARN).yellow());
                    println!("    Run 'pm secure setup' to choose one");
                    warnings += 1;
                }
                Ok(AuthState::Unauthenticated) => {
                    println!("  {} Password set up; session locked", style(CHECK).green());
                }
                Ok(AuthState::Authenticated) => {
                    println!("  {} Password set up; session unlocked", style(CHECK).green());
                }
                Err(e) => {
                    println!("  {} Credential store error: {}", style(CROSS).red(), e);
                    errors += 1;
                }
            },
            Err(e) => {
                println!("  {} Failed to open credential store: {}", style(CROSS).red(), e);
                errors += 1;
            }
        }
    }

    // Summary
    println!("\n{}", style("Summary").bold());
    println!("  Errors: {}", if errors > 0 { style(errors).red() } else { style(errors).green() });
    println!("  Warnings: {}", if warnings > 0 { style(warnings).yellow() } else { style(warnings).green() });

    if errors > 0 {
        anyhow::bail!("{} error(s) found", errors);
    }

    Ok(())
}
