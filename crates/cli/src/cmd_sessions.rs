//! `wadash sessions`, `wadash watch`, `wadash session ...` and `wadash send`.

use std::path::Path;

use anyhow::{bail, Context as _};
use console::style;
use tracing::info;

use wadash_client::{DashboardState, StoreChange};
use wadash_protocol::{new_id, Session, SessionStatus, WaId};

use crate::live::{Activity, Live};
use crate::render;
use crate::{Context, SessionCommand};

pub async fn list(ctx: &Context) -> anyhow::Result<()> {
    let mut live = Live::connect(ctx).await?;
    let state = live.initial_state().await;
    live.close().await;
    let state = state?;

    println!();
    if state.sessions().is_empty() {
        println!("  No sessions yet.");
        println!("  Create one with: wadash session add");
    } else {
        println!("{}", render::sessions_table(state.sessions().iter()));
    }
    println!();
    Ok(())
}

/// Whether a message change belongs to the watched session. Without a
/// session id on the event, the chat must be in that session's chat list.
fn messages_wanted(
    only: Option<&str>,
    session_id: Option<&str>,
    chat_id: &WaId,
    state: &DashboardState,
) -> bool {
    let Some(only) = only else {
        return true;
    };
    match session_id {
        Some(id) => id == only,
        None => state.inbox().chat(only, chat_id.as_str()).is_some(),
    }
}

pub async fn watch(ctx: &Context, only: Option<&str>) -> anyhow::Result<()> {
    let mut live = Live::connect(ctx).await?;
    println!(
        "  Connected to {}. Watching{}; Ctrl-C to stop.",
        ctx.backend_url,
        only.map(|id| format!(" session {id}")).unwrap_or_default()
    );

    let wanted = |id: &str| only.map_or(true, |o| o == id);

    while let Some(activity) = live.next_activity().await {
        match activity {
            Activity::Change(change, state) => match change {
                StoreChange::Sessions => {
                    let sessions = state.sessions().iter().filter(|s| wanted(&s.id));
                    println!("{}", render::sessions_table(sessions));
                }
                StoreChange::Session { id } if wanted(&id) => {
                    if let Some(session) = state.sessions().get(&id) {
                        println!("  {}", describe(session));
                    }
                }
                StoreChange::SessionRemoved { id } if wanted(&id) => {
                    println!("  {} {}", style(&id).bold(), style("removed").dim());
                }
                StoreChange::Log { id } if wanted(&id) => {
                    if let Some(line) = state.sessions().logs(&id).and_then(|l| l.latest()) {
                        println!("  {} {}", style(format!("[{id}]")).dim(), line);
                    }
                }
                StoreChange::Chats { session_id } if wanted(&session_id) => {
                    let chats = state.inbox().chats(&session_id);
                    println!(
                        "  {} {} chats, {} unread",
                        style(format!("[{session_id}]")).dim(),
                        chats.len(),
                        state.inbox().unread_total(&session_id)
                    );
                }
                StoreChange::Messages {
                    session_id,
                    chat_id,
                } if messages_wanted(only, session_id.as_deref(), &chat_id, &state) => {
                    if let Some(message) = state.inbox().messages(chat_id.as_str()).last() {
                        let from = if message.from_me { "me" } else { chat_id.user() };
                        println!(
                            "  {} {}: {}",
                            style(format!("[{}]", chat_id.user())).dim(),
                            style(from).cyan(),
                            render::truncate(&message.body, 100)
                        );
                    }
                }
                _ => {}
            },
            Activity::Notice(note) => println!("  {}", render::notification(&note)),
            Activity::Lagged(skipped) => {
                println!("  {}", style(format!("(skipped {skipped} updates)")).dim());
            }
            Activity::Disconnected => break,
        }
    }

    live.close().await;
    Ok(())
}

pub async fn run(ctx: &Context, command: SessionCommand) -> anyhow::Result<()> {
    match command {
        SessionCommand::Add { id } => add(ctx, id.unwrap_or_else(new_id)).await,
        SessionCommand::Pair { id, phone } => pair(ctx, &id, &phone).await,
        SessionCommand::Logout { id } => logout(ctx, &id).await,
        SessionCommand::Qr { id, save } => qr(ctx, &id, save.as_deref()).await,
    }
}

fn describe(session: &Session) -> String {
    let mut line = format!("{} {}", style(&session.id).bold(), render::status(session.status));
    if let Some(name) = session.display_name() {
        line.push_str(&format!(" ({name})"));
    }
    if let Some(code) = &session.pairing_code {
        line.push_str(&format!("  pairing code {}", style(code).bold()));
    } else if session.qr.is_some() && session.status.awaiting_login() {
        line.push_str(&format!("  run `wadash session qr {}`", session.id));
    }
    line
}

async fn add(ctx: &Context, id: String) -> anyhow::Result<()> {
    let mut live = Live::connect(ctx).await?;
    let result = async {
        let state = live.initial_state().await?;
        if state.sessions().contains(&id) {
            bail!("session {id} already exists");
        }
        if !live.emitter().add_new_session(&id) {
            bail!("not connected to the backend");
        }
        info!(component = "cli", event = "cli.session.add", session_id = %id);
        live.wait_for(|change, _| matches!(change, StoreChange::Session { id: s } if *s == id))
            .await
            .context("backend did not acknowledge the new session")
    }
    .await;
    live.close().await;
    let state = result?;

    println!();
    if let Some(session) = state.sessions().get(&id) {
        println!("  {}", describe(session));
    }
    println!("  Log in with: wadash session qr {id}");
    println!("  Or by phone: wadash session pair {id} <phone-number>");
    println!();
    Ok(())
}

async fn pair(ctx: &Context, id: &str, phone: &str) -> anyhow::Result<()> {
    let phone: String = phone.chars().filter(char::is_ascii_digit).collect();
    if phone.is_empty() {
        bail!("phone number must contain digits");
    }

    let mut live = Live::connect(ctx).await?;
    let result = async {
        let state = live.initial_state().await?;
        if !state.sessions().contains(id) {
            bail!("unknown session {id}");
        }
        if !live.emitter().request_login_code(id, &phone) {
            bail!("not connected to the backend");
        }
        live.wait_for(|change, state| {
            matches!(change, StoreChange::Session { id: s } if s == id)
                && state
                    .sessions()
                    .get(id)
                    .is_some_and(|s| s.pairing_code.is_some())
        })
        .await
        .context("backend did not send a pairing code")
    }
    .await;
    live.close().await;
    let state = result?;

    let code = state
        .sessions()
        .get(id)
        .and_then(|s| s.pairing_code.clone())
        .unwrap_or_default();
    println!();
    println!("  Pairing code for {id}: {}", style(code).bold().green());
    println!("  On the phone: Linked devices > Link with phone number instead.");
    println!();
    Ok(())
}

async fn logout(ctx: &Context, id: &str) -> anyhow::Result<()> {
    let mut live = Live::connect(ctx).await?;
    let result = async {
        let state = live.initial_state().await?;
        if !state.sessions().contains(id) {
            bail!("unknown session {id}");
        }
        if !live.emitter().logout_session(id) {
            bail!("not connected to the backend");
        }
        live.wait_for(|change, _| match change {
            StoreChange::SessionRemoved { id: s } | StoreChange::Session { id: s } => s == id,
            _ => false,
        })
        .await
    }
    .await;
    live.close().await;
    let state = result?;

    match state.sessions().get(id) {
        Some(session) => println!("  {}", describe(session)),
        None => println!("  {} logged out and removed", style(id).bold()),
    }
    Ok(())
}

async fn qr(ctx: &Context, id: &str, save: Option<&Path>) -> anyhow::Result<()> {
    let mut live = Live::connect(ctx).await?;
    let result = async {
        let state = live.initial_state().await?;
        let Some(session) = state.sessions().get(id) else {
            bail!("unknown session {id}");
        };
        if let Some(qr) = &session.qr {
            return Ok(qr.clone());
        }
        println!("  Waiting for a QR code from {id}...");
        let state = live
            .wait_for(|change, state| {
                matches!(change, StoreChange::Session { id: s } if s == id)
                    && state.sessions().get(id).is_some_and(|s| s.qr.is_some())
            })
            .await
            .context("backend did not send a QR code")?;
        state
            .sessions()
            .get(id)
            .and_then(|s| s.qr.clone())
            .context("QR code disappeared")
    }
    .await;
    live.close().await;
    let qr = result?;

    match save {
        Some(path) => save_qr(&qr, path)?,
        None if render::is_data_url(&qr) => {
            bail!("the backend sent the QR code as an image; use --save <file.png>")
        }
        None => {
            println!();
            print!("{}", render::qr_unicode(&qr)?);
            println!();
            println!("  Scan with WhatsApp: Settings > Linked devices > Link a device.");
            println!();
        }
    }
    Ok(())
}

fn save_qr(qr: &str, path: &Path) -> anyhow::Result<()> {
    let bytes = if render::is_data_url(qr) {
        let (mime, bytes) = render::decode_data_url(qr)?;
        info!(component = "cli", event = "cli.qr.save", mime = %mime, bytes = bytes.len());
        bytes
    } else {
        render::qr_svg(qr)?.into_bytes()
    };
    std::fs::write(path, bytes).with_context(|| format!("could not write {}", path.display()))?;
    println!("  QR code saved to {}", path.display());
    Ok(())
}

pub async fn send(ctx: &Context, id: &str, to: &str, message: &str) -> anyhow::Result<()> {
    if message.trim().is_empty() {
        bail!("message is empty");
    }

    let mut live = Live::connect(ctx).await?;
    let result = async {
        let state = live.initial_state().await?;
        match state.sessions().get(id) {
            None => bail!("unknown session {id}"),
            Some(session) if session.status != SessionStatus::Ready => {
                bail!("session {id} is {}, not ready", session.status)
            }
            Some(_) => {}
        }
        if !live.emitter().send_message(id, to, message) {
            bail!("not connected to the backend");
        }
        Ok::<(), anyhow::Error>(())
    }
    .await;
    // Disconnecting drains the outbound queue, so the message is on the wire first.
    live.close().await;
    result?;

    println!("  Sent to {to} from {id}");
    Ok(())
}
