//! `wadash addresses ...`: address book over REST.

use anyhow::bail;
use tracing::info;

use wadash_client::api::DEFAULT_REQUEST_TIMEOUT;
use wadash_client::{ApiClient, ApiError, Notification, Severity};
use wadash_protocol::{AddressQuery, AddressUpdate};

use crate::render;
use crate::{AddressCommand, Context};

fn client(ctx: &Context) -> anyhow::Result<ApiClient> {
    Ok(ApiClient::new(ctx.backend_url.clone(), DEFAULT_REQUEST_TIMEOUT)?
        .with_token(ctx.settings.active_token().map(str::to_string)))
}

/// Run `fut` unless the user hits Ctrl-C first. A failure is reported as a
/// notification titled `title`.
async fn call<T>(
    ctx: &Context,
    title: &str,
    fut: impl std::future::Future<Output = Result<T, ApiError>>,
) -> anyhow::Result<T> {
    tokio::select! {
        result = fut => result.map_err(|err| ctx.fail(title, err)),
        _ = tokio::signal::ctrl_c() => bail!("interrupted"),
    }
}

pub async fn run(ctx: &Context, command: AddressCommand) -> anyhow::Result<()> {
    let api = client(ctx)?;
    match command {
        AddressCommand::List {
            page,
            limit,
            search,
            sort_by,
            sort_order,
        } => {
            let query = AddressQuery {
                page: page.max(1),
                limit: limit.max(1),
                search,
                sort_by,
                sort_order,
            };
            let result = call(ctx, "Could not load addresses", api.list_addresses(&query)).await?;
            println!();
            if result.data.is_empty() {
                println!("  No addresses found.");
            } else {
                println!("{}", render::addresses_table(&result));
                println!(
                    "  Page {} of {} ({} total)",
                    result.page,
                    result.total_pages.max(1),
                    result.total
                );
            }
            println!();
        }
        AddressCommand::Update {
            id,
            name,
            phone_number,
        } => {
            let update = AddressUpdate {
                name,
                phone_number,
                is_valid: None,
            };
            if update.is_empty() {
                bail!("nothing to update; pass --name and/or --phone-number");
            }
            let address = call(ctx, "Could not update address", api.update_address(&id, &update))
                .await?;
            info!(component = "cli", event = "cli.address.updated", address_id = %id);
            ctx.report(Notification::new(
                Severity::Success,
                format!("Updated {}", address.id),
                Some(format!(
                    "{} {}",
                    address.name.as_deref().unwrap_or("(no name)"),
                    address.phone_number
                )),
            ));
        }
        AddressCommand::Delete { id } => {
            call(ctx, "Could not delete address", api.delete_address(&id)).await?;
            info!(component = "cli", event = "cli.address.deleted", address_id = %id);
            ctx.report(Notification::success(format!("Deleted {id}")));
        }
    }
    Ok(())
}
