//! Free-form text → validated loop parameters.
//!
//! Everything here is pure and never fails loudly: unparseable input comes
//! back as `None` and the caller decides how to phrase the validation error.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::bookmark::VideoId;

// youtube.com/watch?v=ID, youtube.com/embed/ID, youtu.be/ID
static URL_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:youtube\.com/watch\?v=|youtube\.com/embed/|youtu\.be/)([^&?\s]+)")
        .expect("static regex")
});

static BARE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{11}$").expect("static regex"));

static SECONDS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9]+$").expect("static regex"));

static MIN_SEC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+):([0-9]{2})$").expect("static regex"));

/// Extract a video id from a watch/embed/short URL, or accept a bare
/// 11-character id.  No network lookup is made.
pub fn parse_video_reference(text: &str) -> Option<VideoId> {
    if text.is_empty() {
        return None;
    }
    if let Some(caps) = URL_ID.captures(text) {
        return caps.get(1).map(|m| VideoId::new(m.as_str()));
    }
    if BARE_ID.is_match(text) {
        return Some(VideoId::new(text));
    }
    None
}

/// Parse `"90"` or `"1:30"` into whole seconds.
///
/// The seconds field of `m:ss` must be exactly two ASCII digits; it is not
/// range-checked, so `"1:75"` is 135.
pub fn parse_time_text(text: &str) -> Option<u32> {
    let trimmed = text.trim();
    if SECONDS.is_match(trimmed) {
        return trimmed.parse().ok();
    }
    let caps = MIN_SEC.captures(trimmed)?;
    let minutes: u32 = caps[1].parse().ok()?;
    let seconds: u32 = caps[2].parse().ok()?;
    minutes.checked_mul(60)?.checked_add(seconds)
}

/// Canonical `m:ss` rendering.  Minutes are not padded.
pub fn format_seconds(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

/// The watch URL for an id, as shown in the editor and handed to the player.
pub fn watch_url(id: &VideoId) -> String {
    format!("https://www.youtube.com/watch?v={}", id)
}
