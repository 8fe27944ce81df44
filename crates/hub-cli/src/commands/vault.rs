//! Vault commands.

use super::Context;
use crate::output::{self, OutputFormat};
use anyhow::{anyhow, Result};
use credential_vault::{VaultError, VaultState, VaultStatus};

fn vault_error(e: VaultError) -> anyhow::Error {
    anyhow!("vault {}: {}", e.cause(), e)
}

pub fn vault_store(ctx: &Context, user_id: &str, secret: Option<&str>, token: &str) -> Result<()> {
    let vault = ctx.vault()?;
    vault.persist(user_id, token, secret).map_err(vault_error)?;
    output::print_success(&format!("Token stored for {}", user_id), &ctx.format);
    Ok(())
}

pub fn vault_show(ctx: &Context, user_id: &str, secret: Option<&str>, reveal: bool) -> Result<()> {
    let vault = ctx.vault()?;
    let state = VaultState::from_load(vault.load(user_id, secret));
    let token = state.token().map(|token| {
        if reveal {
            token.to_string()
        } else {
            output::mask(token)
        }
    });

    match ctx.format {
        OutputFormat::Text => {
            output::print_heading(&format!("Vault for {}", user_id));
            output::print_row("Status", state.status.as_str());
            output::print_row("Stored token", if state.has_stored_token { "yes" } else { "no" });
            output::print_row("Token", token.as_deref().unwrap_or("-"));
            if state.status == VaultStatus::Locked {
                println!("\nThe token was stored under another session. Sign in again to unlock it.");
            }
        }
        OutputFormat::Json => {
            output::print_json(&serde_json::json!({
                "user_id": user_id,
                "status": state.status,
                "has_stored_token": state.has_stored_token,
                "token": token,
            }))?;
        }
    }
    Ok(())
}

pub fn vault_clear(ctx: &Context, user_id: &str) -> Result<()> {
    let vault = ctx.vault()?;
    vault.clear(user_id).map_err(vault_error)?;
    output::print_success(&format!("Vault cleared for {}", user_id), &ctx.format);
    Ok(())
}
