//! The capability the loop controller needs from whatever renders the video.
//!
//! Readiness is not part of the trait: the owner of the player calls
//! [`LoopController::on_player_ready`](crate::controller::LoopController::on_player_ready)
//! once the player can accept commands, and no method below is invoked
//! before that.

use async_trait::async_trait;

#[async_trait]
pub trait Player: Send + Sync {
    /// Jump to `seconds`.  `allow_seek_ahead` permits seeking into media that
    /// has not been buffered yet.
    async fn seek_to(&self, seconds: f64, allow_seek_ahead: bool) -> anyhow::Result<()>;

    async fn play_video(&self) -> anyhow::Result<()>;

    async fn pause_video(&self) -> anyhow::Result<()>;

    /// Current playback position in seconds.
    async fn current_time(&self) -> anyhow::Result<f64>;
}
