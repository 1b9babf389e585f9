//! `wadash config show` / `wadash config set-url`.

use anyhow::bail;

use wadash_client::paths;

use crate::{ConfigCommand, Context, VERSION};

pub fn run(ctx: &mut Context, command: ConfigCommand) -> anyhow::Result<()> {
    match command {
        ConfigCommand::Show => {
            println!();
            println!("  wadash v{VERSION}");
            println!("  Data dir:      {}", ctx.data_dir.display());
            println!("  Settings:      {}", ctx.settings_path.display());
            println!("  Logs:          {}", paths::log_dir().display());
            println!("  Backend URL:   {}", ctx.backend_url);
            println!("  Dashboard URL: {}", ctx.dashboard_url);
            println!(
                "  Logged in:     {}",
                if ctx.settings.active_token().is_some() {
                    "yes"
                } else {
                    "no"
                }
            );
            println!();
        }
        ConfigCommand::SetUrl { url } => {
            let url = url.trim().trim_end_matches('/').to_string();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                bail!("backend URL must start with http:// or https://");
            }
            ctx.settings.backend_url = Some(url.clone());
            ctx.save_settings()?;
            println!("  Backend URL set to {url}");
        }
    }
    Ok(())
}
