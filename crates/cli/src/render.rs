//! Terminal output: tables, status colors, QR codes.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context};
use base64::Engine as _;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{ContentArrangement, Table};
use console::{style, StyledObject};
use qrcode::{Color, QrCode};

use wadash_client::{Notification, Severity};
use wadash_protocol::{Address, Chat, ChatMessage, Page, Session, SessionStatus};

const QUIET_ZONE: usize = 4;

pub fn status(status: SessionStatus) -> StyledObject<&'static str> {
    let text = status.as_str();
    match status {
        SessionStatus::Ready | SessionStatus::Authenticated => style(text).green(),
        SessionStatus::QrReceived | SessionStatus::CodeReceived => style(text).yellow(),
        SessionStatus::AuthFailure | SessionStatus::Error => style(text).red(),
        SessionStatus::Disconnected => style(text).dim(),
        SessionStatus::Initializing => style(text).cyan(),
        SessionStatus::Unknown => style(text).magenta(),
    }
}

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

pub fn truncate(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() <= max && !text.contains('\n') {
        return line.to_string();
    }
    let cut: String = line.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}

/// "42s ago", "5m ago", "3h ago", "2d ago".
pub fn age(timestamp: Option<i64>) -> String {
    let Some(ts) = timestamp else {
        return "-".to_string();
    };
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    // Backends send seconds; some message payloads carry milliseconds.
    let ts = if ts > 1_000_000_000_000 { ts / 1000 } else { ts };
    let secs = (now - ts).max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

pub fn sessions_table<'a>(sessions: impl Iterator<Item = &'a Session>) -> Table {
    let mut table = table(&["ID", "Status", "Name", "Number", "Login"]);
    for session in sessions {
        let number = session
            .info
            .as_ref()
            .and_then(|i| i.wid.as_ref())
            .map(|w| w.user().to_string())
            .unwrap_or_default();
        let login = match (&session.pairing_code, &session.qr) {
            (Some(code), _) => format!("code {code}"),
            (None, Some(_)) => "QR ready".to_string(),
            (None, None) => String::new(),
        };
        table.add_row(vec![
            session.id.clone(),
            status(session.status).to_string(),
            session.display_name().unwrap_or("").to_string(),
            number,
            login,
        ]);
    }
    table
}

pub fn chats_table(chats: &[Chat]) -> Table {
    let mut table = table(&["Chat", "ID", "Unread", "Last activity", "Last message"]);
    for chat in chats {
        let unread = if chat.unread_count > 0 {
            style(chat.unread_count.to_string()).bold().to_string()
        } else {
            String::new()
        };
        let title = if chat.is_group {
            format!("{} (group)", chat.title())
        } else {
            chat.title().to_string()
        };
        table.add_row(vec![
            title,
            chat.id.to_string(),
            unread,
            age(chat.timestamp),
            chat.last_message
                .as_ref()
                .map(|m| truncate(&m.body, 48))
                .unwrap_or_default(),
        ]);
    }
    table
}

pub fn messages_table(messages: &[ChatMessage]) -> Table {
    let mut table = table(&["When", "From", "Message"]);
    for message in messages {
        let from = if message.from_me {
            style("me").cyan().to_string()
        } else {
            message.from.clone().unwrap_or_default()
        };
        let body = if message.body.is_empty() && message.has_media {
            style("[media]").dim().to_string()
        } else {
            truncate(&message.body, 80)
        };
        table.add_row(vec![age(message.timestamp), from, body]);
    }
    table
}

pub fn addresses_table(page: &Page<Address>) -> Table {
    let mut table = table(&["ID", "Name", "Phone", "Valid", "Updated"]);
    for address in &page.data {
        let valid = match address.is_valid {
            Some(true) => style("yes").green().to_string(),
            Some(false) => style("no").red().to_string(),
            None => String::new(),
        };
        table.add_row(vec![
            address.id.clone(),
            address.name.clone().unwrap_or_default(),
            address.phone_number.clone(),
            valid,
            address.updated_at.clone().unwrap_or_default(),
        ]);
    }
    table
}

pub fn notification(note: &Notification) -> String {
    let title = match note.severity {
        Severity::Error => style(note.title.as_str()).red().bold(),
        Severity::Warning => style(note.title.as_str()).yellow().bold(),
        Severity::Success => style(note.title.as_str()).green().bold(),
        Severity::Info => style(note.title.as_str()).bold(),
    };
    match &note.detail {
        Some(detail) => format!("{title}: {detail}"),
        None => title.to_string(),
    }
}

/// Unicode half blocks, two QR rows per line, with a quiet zone.
pub fn qr_unicode(data: &str) -> anyhow::Result<String> {
    let code = QrCode::new(data.as_bytes()).context("QR payload too large to encode")?;
    let width = code.width();
    let colors = code.to_colors();
    let size = width + QUIET_ZONE * 2;
    let color_at = |x: usize, y: usize| {
        if x < QUIET_ZONE || y < QUIET_ZONE || x >= QUIET_ZONE + width || y >= QUIET_ZONE + width {
            Color::Light
        } else {
            colors[(y - QUIET_ZONE) * width + (x - QUIET_ZONE)]
        }
    };

    let mut out = String::with_capacity(size * (size / 2 + 1) * 3);
    for y in (0..size).step_by(2) {
        for x in 0..size {
            let top = color_at(x, y);
            let bottom = if y + 1 < size {
                color_at(x, y + 1)
            } else {
                Color::Light
            };
            out.push(match (top, bottom) {
                (Color::Light, Color::Light) => ' ',
                (Color::Dark, Color::Dark) => '\u{2588}',
                (Color::Dark, Color::Light) => '\u{2580}',
                (Color::Light, Color::Dark) => '\u{2584}',
            });
        }
        out.push('\n');
    }
    Ok(out)
}

/// SVG rendering of a raw QR payload.
pub fn qr_svg(data: &str) -> anyhow::Result<String> {
    let code = QrCode::new(data.as_bytes()).context("QR payload too large to encode")?;
    Ok(code
        .render::<qrcode::render::svg::Color>()
        .min_dimensions(256, 256)
        .build())
}

pub fn is_data_url(qr: &str) -> bool {
    qr.starts_with("data:")
}

/// Decode `data:<mime>;base64,<payload>` into the MIME type and raw bytes.
pub fn decode_data_url(url: &str) -> anyhow::Result<(String, Vec<u8>)> {
    let Some(rest) = url.strip_prefix("data:") else {
        bail!("not a data URL");
    };
    let (meta, payload) = rest.split_once(',').context("data URL has no payload")?;
    let Some(mime) = meta.strip_suffix(";base64") else {
        bail!("only base64 data URLs are supported");
    };
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .context("invalid base64 in data URL")?;
    Ok((mime.to_string(), bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_decodes_png_payload() {
        let (mime, bytes) = decode_data_url("data:image/png;base64,iVBORw0K").expect("decode");
        assert_eq!(mime, "image/png");
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn data_url_rejects_plain_payloads() {
        assert!(decode_data_url("2@abc,def").is_err());
        assert!(decode_data_url("data:text/plain,hello").is_err());
        assert!(!is_data_url("2@abc"));
    }

    #[test]
    fn qr_render_is_square_with_quiet_zone() {
        let rendered = qr_unicode("2@pairing-ref,abc,def").expect("render");
        let lines: Vec<&str> = rendered.lines().collect();
        let width = lines[0].chars().count();
        assert_eq!(lines.len(), (width + 1) / 2);
        assert!(lines[0].chars().all(|c| c == ' '));
        assert!(rendered.contains('\u{2588}'));
    }

    #[test]
    fn truncate_keeps_first_line() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("line one\nline two", 20), "line one…");
        assert_eq!(truncate("abcdefghij", 5), "abcd…");
    }

    #[test]
    fn age_handles_missing_and_millis() {
        assert_eq!(age(None), "-");
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_millis() as i64;
        assert!(age(Some(now_ms)).ends_with("s ago"));
    }
}
