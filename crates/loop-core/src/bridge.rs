//! Selection/playback bridge: which bookmark is selected, and keeping that
//! selection, the collection and the loop controller consistent.
//!
//! The selection is a copy of the bookmark, not a borrow into the store, so
//! store mutations that affect it have to go through here.

use tracing::{debug, info};

use crate::bookmark::{LoopBookmark, VideoId};
use crate::controller::LoopController;
use crate::error::LoopError;
use crate::input::{format_seconds, parse_time_text, parse_video_reference, watch_url};
use crate::store::{CollectionStore, RecordStore};

/// The editor fields, as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopForm {
    pub url: String,
    pub start: String,
    pub end: String,
}

impl LoopForm {
    pub fn new(url: impl Into<String>, start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            start: start.into(),
            end: end.into(),
        }
    }

    /// Canonical text for a saved bookmark (watch URL, `m:ss` times).
    pub fn from_bookmark(bookmark: &LoopBookmark) -> Self {
        Self {
            url: watch_url(&bookmark.video_id),
            start: format_seconds(bookmark.start_time),
            end: format_seconds(bookmark.end_time),
        }
    }

    /// Validate all three fields, reporting the first problem.
    pub fn parse(&self) -> Result<(VideoId, u32, u32), LoopError> {
        let video_id = parse_video_reference(&self.url)
            .ok_or_else(|| LoopError::InvalidReference(self.url.clone()))?;
        let start =
            parse_time_text(&self.start).ok_or_else(|| LoopError::InvalidTime(self.start.clone()))?;
        let end = parse_time_text(&self.end).ok_or_else(|| LoopError::InvalidTime(self.end.clone()))?;
        Ok((video_id, start, end))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Seeked and looping on the attached player.
    Looping,
    /// Saved and loaded; playback starts once the player is ready.
    AwaitingPlayer,
}

#[derive(Debug, Default)]
pub struct SelectionBridge {
    selected: Option<LoopBookmark>,
}

impl SelectionBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected(&self) -> Option<&LoopBookmark> {
        self.selected.as_ref()
    }

    pub fn is_selected(&self, video_id: &VideoId) -> bool {
        self.selected.as_ref().is_some_and(|b| &b.video_id == video_id)
    }

    /// Select `bookmark` and load it into the controller without starting.
    pub fn select(
        &mut self,
        bookmark: &LoopBookmark,
        controller: &mut LoopController,
    ) -> Result<(), LoopError> {
        controller.load(
            bookmark.video_id.clone(),
            bookmark.start_time,
            bookmark.end_time,
        )?;
        info!("bridge: selected {} ({})", bookmark.video_id, bookmark.title);
        self.selected = Some(bookmark.clone());
        Ok(())
    }

    /// Remove from the store; a removed selection is cleared but the
    /// controller keeps whatever it is playing.
    pub fn remove<R: RecordStore>(
        &mut self,
        store: &mut CollectionStore<R>,
        video_id: &VideoId,
    ) -> Result<bool, LoopError> {
        if self.is_selected(video_id) {
            debug!("bridge: selection {} deleted", video_id);
            self.selected = None;
        }
        store.remove(video_id)
    }

    /// Rename in the store and mirror the new title into the selection.
    pub fn rename<R: RecordStore>(
        &mut self,
        store: &mut CollectionStore<R>,
        video_id: &VideoId,
        new_title: &str,
    ) -> Result<bool, LoopError> {
        // the store keeps the new title even when persisting it fails
        let renamed = store.rename(video_id, new_title);
        if let (Some(selected), Some(stored)) = (self.selected.as_mut(), store.get(video_id)) {
            if &selected.video_id == video_id {
                selected.title = stored.title.clone();
            }
        }
        renamed
    }

    pub fn clear<R: RecordStore>(&mut self, store: &mut CollectionStore<R>) -> Result<(), LoopError> {
        self.selected = None;
        store.clear()
    }

    /// Validate the form, save the bookmark, select it and start looping.
    ///
    /// Re-submitting a saved video updates its times in place and keeps its
    /// title.  A player that is not ready yet is not a failure: the loop
    /// starts when it signals ready.
    pub async fn submit<R: RecordStore>(
        &mut self,
        form: &LoopForm,
        store: &mut CollectionStore<R>,
        controller: &mut LoopController,
    ) -> Result<SubmitOutcome, LoopError> {
        let (video_id, start, end) = form.parse()?;
        let mut bookmark = LoopBookmark::new(video_id, start, end)?;
        if let Some(existing) = store.get(&bookmark.video_id) {
            bookmark.title = existing.title.clone();
        }

        store.upsert(bookmark.clone())?;
        self.select(&bookmark, controller)?;

        match controller.start().await {
            Ok(()) => Ok(SubmitOutcome::Looping),
            Err(LoopError::NoPlayerAttached) => Ok(SubmitOutcome::AwaitingPlayer),
            Err(e) => Err(e),
        }
    }
}
