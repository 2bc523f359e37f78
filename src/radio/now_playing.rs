//! Now-playing lookups against the NTS live API.
//!
//! Used only to compose display text. Failures never propagate out of
//! [`NowPlayingSource::describe`]; they become a placeholder line instead.

use std::time::Duration;

use regex::{Captures, Regex};
use serde_json::Value;
use tracing::{debug, warn};

use crate::platform::BoxFuture;
use crate::{AppError, Result};

const UNKNOWN_SHOW: &str = "Unknown Show";
const UNKNOWN_LOCATION: &str = "Unknown Location";

/// Show currently on air for one channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    /// Broadcast title.
    pub show: String,
    /// Where the show is broadcasting from.
    pub location: String,
}

/// Anything that can describe what a station is playing.
pub trait NowPlayingSource: Send + Sync {
    /// A single display line for `channel`. Never fails.
    fn describe(&self, channel: u8) -> BoxFuture<'_, String>;
}

/// HTTP client for the live endpoint.
#[derive(Debug, Clone)]
pub struct NowPlayingClient {
    http: reqwest::Client,
    api_url: String,
}

impl NowPlayingClient {
    /// Build a client with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Metadata` if the HTTP client cannot be constructed.
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("nts-radio/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_url: api_url.into(),
        })
    }

    /// Fetch and parse the live data for `channel` (1-based).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Metadata` on transport failure, a non-200 status,
    /// or a response without an entry for the channel.
    pub async fn fetch(&self, channel: u8) -> Result<NowPlaying> {
        let response = self.http.get(&self.api_url).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(AppError::Metadata(format!(
                "live endpoint returned status {}",
                status.as_u16()
            )));
        }
        let body: Value = response.json().await?;
        parse_live_response(&body, channel)
    }
}

impl NowPlayingSource for NowPlayingClient {
    fn describe(&self, channel: u8) -> BoxFuture<'_, String> {
        Box::pin(async move {
            match self.fetch(channel).await {
                Ok(now) => format_line(channel, &now),
                Err(err) => {
                    warn!(channel, %err, "now-playing lookup failed");
                    placeholder_line(channel, &err)
                }
            }
        })
    }
}

/// Extract the show and location for `channel` from a live response body.
///
/// # Errors
///
/// Returns `AppError::Metadata` if `results` is missing, not an array, or
/// has no entry for the channel.
pub fn parse_live_response(body: &Value, channel: u8) -> Result<NowPlaying> {
    let index = usize::from(channel)
        .checked_sub(1)
        .ok_or_else(|| AppError::Metadata("channel numbers start at 1".into()))?;
    let entry = body
        .get("results")
        .and_then(Value::as_array)
        .and_then(|results| results.get(index))
        .ok_or_else(|| {
            debug!(channel, "live response has no entry for channel");
            AppError::Metadata(format!("unexpected structure for channel {channel}"))
        })?;

    let now = entry.get("now");
    let details = now
        .and_then(|n| n.get("embeds"))
        .and_then(|e| e.get("details"));

    let text_at = |value: Option<&Value>| {
        value
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(decode_entities)
    };

    let show = text_at(now.and_then(|n| n.get("broadcast_title")))
        .unwrap_or_else(|| UNKNOWN_SHOW.to_owned());
    let location = text_at(details.and_then(|d| d.get("location_short")))
        .or_else(|| text_at(details.and_then(|d| d.get("location_long"))))
        .unwrap_or_else(|| UNKNOWN_LOCATION.to_owned());

    Ok(NowPlaying { show, location })
}

/// Render the display line, e.g. `１ ▶︎  Show  －  London`.
#[must_use]
pub fn format_line(channel: u8, now: &NowPlaying) -> String {
    format!(
        "{} \u{25b6}\u{fe0e}  {}  \u{ff0d}  {}",
        fullwidth_number(channel),
        now.show,
        now.location
    )
}

/// Line shown when the lookup fails.
#[must_use]
pub fn placeholder_line(channel: u8, err: &AppError) -> String {
    format!("Could not retrieve NTS {channel} info ({err})")
}

fn fullwidth_number(n: u8) -> String {
    n.to_string()
        .chars()
        .map(|c| {
            c.to_digit(10)
                .and_then(|d| char::from_u32(0xFF10 + d))
                .unwrap_or(c)
        })
        .collect()
}

/// Decode HTML character references: common named entities plus decimal
/// and hex numeric forms. Unknown references are left as-is.
#[must_use]
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_owned();
    }
    let Ok(re) = Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);") else {
        return text.to_owned();
    };
    re.replace_all(text, |caps: &Captures<'_>| {
        let reference = &caps[1];
        let decoded = if let Some(hex) = reference
            .strip_prefix("#x")
            .or_else(|| reference.strip_prefix("#X"))
        {
            u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
        } else if let Some(dec) = reference.strip_prefix('#') {
            dec.parse::<u32>().ok().and_then(char::from_u32)
        } else {
            named_entity(reference)
        };
        decoded.map_or_else(|| caps[0].to_owned(), String::from)
    })
    .into_owned()
}

fn named_entity(name: &str) -> Option<char> {
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "ndash" => '\u{2013}',
        "mdash" => '\u{2014}',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "hellip" => '\u{2026}',
        "eacute" => '\u{e9}',
        "egrave" => '\u{e8}',
        "aacute" => '\u{e1}',
        "oacute" => '\u{f3}',
        "uuml" => '\u{fc}',
        "ouml" => '\u{f6}',
        "auml" => '\u{e4}',
        _ => return None,
    })
}
