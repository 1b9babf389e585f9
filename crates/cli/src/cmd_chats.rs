//! `wadash chats` and `wadash messages`.

use anyhow::bail;

use wadash_client::StoreChange;
use wadash_protocol::{SessionStatus, WaId};

use crate::live::Live;
use crate::render;
use crate::Context;

/// Connect and check that `id` exists and is ready to chat.
async fn ready_session(ctx: &Context, id: &str) -> anyhow::Result<Live> {
    let mut live = Live::connect(ctx).await?;
    let checked = match live.initial_state().await {
        Ok(state) => match state.sessions().get(id) {
            None => Err(anyhow::anyhow!("unknown session {id}")),
            Some(s) if s.status != SessionStatus::Ready => {
                Err(anyhow::anyhow!("session {id} is {}, not ready", s.status))
            }
            Some(_) => Ok(()),
        },
        Err(e) => Err(e),
    };
    if let Err(e) = checked {
        live.close().await;
        return Err(e);
    }
    Ok(live)
}

pub async fn chats(ctx: &Context, id: &str) -> anyhow::Result<()> {
    let mut live = ready_session(ctx, id).await?;
    let result = async {
        if !live.emitter().request_chats(id) {
            bail!("not connected to the backend");
        }
        live.wait_for(|change, _| {
            matches!(change, StoreChange::Chats { session_id } if session_id == id)
        })
        .await
    }
    .await;
    live.close().await;
    let state = result?;

    let chats = state.inbox().chats(id);
    println!();
    if chats.is_empty() {
        println!("  No chats for {id}.");
    } else {
        println!("{}", render::chats_table(chats));
        println!(
            "  {} chats, {} unread",
            chats.len(),
            state.inbox().unread_total(id)
        );
    }
    println!();
    Ok(())
}

pub async fn messages(
    ctx: &Context,
    id: &str,
    chat_id: &str,
    limit: Option<u32>,
) -> anyhow::Result<()> {
    let chat_id = WaId::new(chat_id);
    let mut live = ready_session(ctx, id).await?;
    let result = async {
        if !live.emitter().request_messages(id, chat_id.as_str(), limit) {
            bail!("not connected to the backend");
        }
        live.wait_for(|change, _| {
            matches!(change, StoreChange::Messages { chat_id: c, .. } if *c == chat_id)
        })
        .await
    }
    .await;
    live.close().await;
    let state = result?;

    let messages = state.inbox().messages(chat_id.as_str());
    println!();
    if messages.is_empty() {
        println!("  No messages in {chat_id}.");
    } else {
        println!("{}", render::messages_table(messages));
    }
    println!();
    Ok(())
}
