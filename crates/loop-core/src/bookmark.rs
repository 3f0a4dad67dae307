use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::LoopError;
use crate::input::format_seconds;

/// Opaque external video identifier (the YouTube id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A saved loop.  Field names on disk follow the persisted record layout:
/// `{videoId, title, startTime, endTime}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopBookmark {
    pub video_id: VideoId,
    pub title: String,
    pub start_time: u32,
    pub end_time: u32,
}

impl LoopBookmark {
    /// Build a bookmark with the default title, rejecting empty ranges.
    pub fn new(video_id: VideoId, start_time: u32, end_time: u32) -> Result<Self, LoopError> {
        check_range(start_time, end_time)?;
        let title = default_title(&video_id);
        Ok(Self {
            video_id,
            title,
            start_time,
            end_time,
        })
    }

    /// Loop length in seconds.
    pub fn duration(&self) -> u32 {
        self.end_time.saturating_sub(self.start_time)
    }

    /// `"0:30 – 1:30"` for list rows.
    pub fn range_label(&self) -> String {
        format!(
            "{} \u{2013} {}",
            format_seconds(self.start_time),
            format_seconds(self.end_time)
        )
    }
}

/// `"Loop " + first 8 chars of the id`.
pub fn default_title(video_id: &VideoId) -> String {
    let prefix: String = video_id.as_str().chars().take(8).collect();
    format!("Loop {}", prefix)
}

pub fn check_range(start: u32, end: u32) -> Result<(), LoopError> {
    if start >= end {
        return Err(LoopError::InvalidRange { start, end });
    }
    Ok(())
}
