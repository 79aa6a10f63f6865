//! Session commands: `pm session status|login|logout|extend`.

use crate::Context;
use clap::Args;
use console::{style, Emoji};
use promptmgr_secrets::AuthState;

static CHECK: Emoji = Emoji("✓", "+");
static LOCK: Emoji = Emoji("🔒", "*");

/// Session command arguments.
#[derive(Args)]
pub struct SessionArgs {
    #[command(subcommand)]
    pub command: SessionCommand,
}

#[derive(clap::Subcommand)]
pub enum SessionCommand {
    /// Show whether secure variables are unlocked
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Unlock secure variables
    Login {
        /// Ask for the password even if a session is active
        #[arg(short, long)]
        force: bool,
    },

    /// Lock secure variables now
    Logout,

    /// Keep the current session open longer
    Extend {
        /// Minutes to add (default: one session lifetime)
        #[arg(short, long)]
        minutes: Option<u32>,
    },
}

/// Run the session command.
pub async fn run(args: SessionArgs, ctx: &Context) -> anyhow::Result<()> {
    let auth = ctx.open_session()?;

    match args.command {
        SessionCommand::Status { json } => {
            let state = auth.state().await?;
            let info = auth.session_info().await;

            if json {
                let value = serde_json::json!({
                    "state": state,
                    "session": info,
                    "ttl_minutes": auth.ttl().num_minutes(),
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
                return Ok(());
            }

            match (state, info) {
                (AuthState::NoCredential, _) => {
                    println!("{} Secure variables are not set up.", style(LOCK).yellow());
                    println!("  Run 'pm secure setup' to choose a password.");
                }
                (AuthState::Authenticated, Some(info)) => {
                    println!("{} Unlocked", style(CHECK).green());
                    println!("  Started:   {}", info.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
                    println!("  Expires:   {}", info.expires_at.format("%Y-%m-%d %H:%M:%S UTC"));
                    println!("  Remaining: {} minute(s)", info.time_remaining_minutes);
                    println!("  Accesses:  {}", info.access_count);
                }
                _ => {
                    println!("{} Locked", style(LOCK).yellow());
                    println!("  Run 'pm session login' to unlock.");
                }
            }
        }

        SessionCommand::Login { force } => {
            auth.authenticate(force)
                .await
                .map_err(|e| anyhow::anyhow!("{}", e))?;
            if let Some(info) = auth.session_info().await {
                println!(
                    "{} Unlocked until {}",
                    style(CHECK).green(),
                    info.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
        }

        SessionCommand::Logout => {
            auth.logout().await?;
            println!("{} Locked", style(LOCK).yellow());
        }

        SessionCommand::Extend { minutes } => {
            if !auth.extend_session(minutes).await? {
                anyhow::bail!("No active session to extend. Run 'pm session login' first.");
            }
            if let Some(info) = auth.session_info().await {
                println!(
                    "{} Session extended; {} minute(s) remaining.",
                    style(CHECK).green(),
                    info.time_remaining_minutes
                );
            }
        }
    }

    Ok(())
}
