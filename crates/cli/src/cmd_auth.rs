//! `wadash login` / `wadash signout`.

use anyhow::{bail, Context as _};
use console::{style, Term};
use tracing::info;

use wadash_client::api::DEFAULT_REQUEST_TIMEOUT;
use wadash_client::{ApiError, AuthClient, Notification};

use crate::Context;

pub async fn login(ctx: &mut Context, password: Option<String>) -> anyhow::Result<()> {
    let password = match password {
        Some(p) => p,
        None => {
            let term = Term::stderr();
            term.write_str("  Password: ")?;
            term.read_secure_line().context("could not read password")?
        }
    };
    if password.is_empty() {
        bail!("password is empty");
    }

    let auth = AuthClient::new(ctx.dashboard_url.clone(), DEFAULT_REQUEST_TIMEOUT)?;
    let verified = tokio::select! {
        result = auth.verify_password(&password) => result,
        _ = tokio::signal::ctrl_c() => bail!("interrupted"),
    };

    let token = match verified {
        Ok(token) => token,
        Err(err @ ApiError::Transport(_)) => {
            let title = format!("Could not reach {}", ctx.dashboard_url);
            return Err(ctx.fail(&title, err));
        }
        Err(err) => return Err(ctx.fail("Login failed", err)),
    };

    ctx.settings.sign_in(token);
    ctx.save_settings()?;
    info!(component = "cli", event = "cli.login", dashboard_url = %ctx.dashboard_url);

    ctx.report(Notification::success("Logged in"));
    println!("  Token saved to {}", style(ctx.settings_path.display()).dim());
    Ok(())
}

pub fn signout(ctx: &mut Context) -> anyhow::Result<()> {
    if !ctx.settings.logged_in && ctx.settings.token.is_none() {
        println!("  Not logged in.");
        return Ok(());
    }
    ctx.settings.sign_out();
    ctx.save_settings()?;
    info!(component = "cli", event = "cli.signout");
    println!("  Signed out.");
    Ok(())
}
