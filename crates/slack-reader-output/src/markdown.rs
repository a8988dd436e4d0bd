use std::fmt::Write as _;
use std::sync::OnceLock;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use slack_reader_conversations::Record;

use crate::users::UserResolver;

// Same author, same block, as long as messages stay this close together.
const HEADER_REPEAT_MINUTES: i64 = 60;

fn angle_token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<([^<>\n]+)>").expect("valid mrkdwn token regex"))
}

pub fn parse_slack_ts(ts: &str) -> Result<DateTime<Utc>> {
    let ts = ts.trim();
    let (seconds, fraction) = ts.split_once('.').unwrap_or((ts, ""));
    let seconds: i64 = seconds
        .parse()
        .with_context(|| format!("parse timestamp {ts:?}"))?;

    let nanos = if fraction.is_empty() {
        0
    } else {
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            bail!("parse timestamp {ts:?}: fractional part is not numeric");
        }
        let digits: String = fraction.chars().chain("000000000".chars()).take(9).collect();
        digits
            .parse::<u32>()
            .with_context(|| format!("parse timestamp {ts:?}"))?
    };

    DateTime::<Utc>::from_timestamp(seconds, nanos)
        .ok_or_else(|| anyhow!("parse timestamp {ts:?}: out of range"))
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

async fn convert_token(inner: &str, users: &dyn UserResolver) -> String {
    let (target, label) = match inner.split_once('|') {
        Some((target, label)) => (target, Some(label).filter(|l| !l.is_empty())),
        None => (inner, None),
    };

    if let Some(user_id) = target.strip_prefix('@') {
        let name = users.username_for_id(user_id).await;
        return format!("`@{name}`");
    }
    if let Some(channel_id) = target.strip_prefix('#') {
        return format!("#{}", unescape(label.unwrap_or(channel_id)));
    }
    if let Some(special) = target.strip_prefix('!') {
        if let Some(label) = label {
            return unescape(label);
        }
        let keyword = special.split('^').next().unwrap_or(special);
        return format!("@{keyword}");
    }

    let url = unescape(target);
    match label {
        Some(label) => format!("[{}]({url})", unescape(label)),
        None => url,
    }
}

/// Rewrites Slack mrkdwn control sequences into GitHub-flavored markdown:
/// user mentions become `` `@name` ``, channel links `#name`, and labelled
/// URLs `[label](url)`.
pub async fn convert_mrkdwn(text: &str, users: &dyn UserResolver) -> String {
    let tokens: Vec<(usize, usize, String)> = angle_token_re()
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let inner = caps.get(1)?;
            Some((whole.start(), whole.end(), inner.as_str().to_string()))
        })
        .collect();

    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    for (start, end, inner) in tokens {
        out.push_str(&unescape(&text[cursor..start]));
        out.push_str(&convert_token(&inner, users).await);
        cursor = end;
    }
    out.push_str(&unescape(&text[cursor..]));
    out
}

fn speaker_id(message: &Record) -> &str {
    ["user", "bot_id"]
        .iter()
        .filter_map(|key| message.get(*key).and_then(Value::as_str))
        .find(|id| !id.is_empty())
        .unwrap_or("")
}

fn push_quoted(out: &mut String, text: &str) {
    for line in text.split('\n') {
        let _ = writeln!(out, "> {line}");
    }
}

/// Renders messages as blockquotes, with a speaker header whenever the
/// author changes or the gap to the previous message exceeds an hour.
pub async fn format_markdown(messages: &[Record], users: &dyn UserResolver) -> Result<String> {
    let times = messages
        .iter()
        .map(|message| {
            let ts = message.get("ts").and_then(Value::as_str).unwrap_or("");
            parse_slack_ts(ts)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut out = String::new();
    let mut last_speaker = "";

    for (index, message) in messages.iter().enumerate() {
        let speaker = speaker_id(message);
        let minutes_apart = if index > 0 {
            (times[index].timestamp() - times[index - 1].timestamp()).abs() / 60
        } else {
            0
        };

        let speaker_changed = !last_speaker.is_empty() && speaker != last_speaker;
        let long_gap = minutes_apart > HEADER_REPEAT_MINUTES;
        if speaker_changed || long_gap {
            out.push('\n');
        }

        let with_header = last_speaker.is_empty() || speaker_changed || long_gap;
        if with_header {
            let author = users.username_for_message(message).await;
            let _ = writeln!(
                out,
                "> **{author}** at {}",
                times[index].format("%Y-%m-%d %H:%M UTC")
            );
        }
        out.push_str(">\n");

        if let Some(text) = message
            .get("text")
            .and_then(Value::as_str)
            .filter(|text| !text.is_empty())
        {
            push_quoted(&mut out, &convert_mrkdwn(text, users).await);
        }

        let attachment_texts = message
            .get("attachments")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|attachment| attachment.get("text").and_then(Value::as_str))
            .filter(|text| !text.is_empty());
        for text in attachment_texts {
            push_quoted(&mut out, &convert_mrkdwn(text, users).await);
        }

        if !with_header {
            out.push('\n');
        }
        last_speaker = speaker;
    }

    Ok(out)
}
