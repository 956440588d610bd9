use mission_control_integrations::slack_data::parse_slack_ts;

use crate::web::ThreadMessage;

pub const DEFAULT_INSTRUCTION: &str = "Create a ticket from this thread.";

/// Renders a thread for the model, one message per line:
/// `@user (h:mm AM): text`, with attachments listed on an indented line.
pub fn format_transcript(messages: &[ThreadMessage]) -> String {
    messages.iter().map(format_message).collect::<Vec<_>>().join("\n")
}

fn format_message(message: &ThreadMessage) -> String {
    let time = parse_slack_ts(&message.ts)
        .map(|at| at.format("%-I:%M %p").to_string())
        .unwrap_or_else(|| message.ts.clone());
    let mut line = format!("@{} ({time}): {}", message.user, message.text);
    if !message.files.is_empty() {
        let names: Vec<&str> = message.files.iter().map(|file| file.name.as_str()).collect();
        line.push_str(&format!("\n  [Attached files: {}]", names.join(", ")));
    }
    line
}

/// Removes `<@BOT>` / `<@BOT|name>` tokens. Without a known bot id every
/// leading user mention is dropped instead.
pub fn strip_bot_mentions(text: &str, bot_user_id: Option<&str>) -> String {
    let mut rest = text;
    let mut kept = String::with_capacity(text.len());
    let mut leading = true;

    while let Some(start) = rest.find("<@") {
        let Some(len) = rest[start..].find('>') else {
            break;
        };
        let token = &rest[start..start + len + 1];
        let mentioned = token[2..token.len() - 1].split('|').next().unwrap_or_default();
        let before = &rest[..start];
        leading = leading && before.trim().is_empty();

        kept.push_str(before);
        let is_bot = match bot_user_id {
            Some(bot) => mentioned == bot,
            None => leading,
        };
        rest = &rest[start + len + 1..];
        if is_bot {
            // Drop the gap the mention leaves; line breaks stay.
            rest = rest.trim_start_matches([' ', '\t']);
            if rest.is_empty() || rest.starts_with('\n') {
                kept.truncate(kept.trim_end_matches([' ', '\t']).len());
            }
        } else {
            kept.push_str(token);
        }
    }
    kept.push_str(rest);

    kept.trim().to_string()
}

/// The user's request with bot mentions removed, or the default ask.
pub fn instruction_from(text: &str, bot_user_id: Option<&str>) -> String {
    let stripped = strip_bot_mentions(text, bot_user_id);
    if stripped.is_empty() {
        DEFAULT_INSTRUCTION.to_string()
    } else {
        stripped
    }
}
