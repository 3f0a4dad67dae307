//! LoopController: owns the active loop and the single polling cycle.
//!
//! ```text
//!   AwaitingReady ──on_player_ready──▶ Ready
//!        ▲                               │
//!        └─────────detach_player─────────┘
//! ```
//!
//! `start()` in AwaitingReady (or while the attached player shows a different
//! video) records a pending intent; the next matching `on_player_ready`
//! performs the initial seek+play and arms the polling cycle.
//!
//! The polling cycle is a spawned task.  Its `AbortHandle` is the only
//! cancellation handle and every transition that replaces or ends the cycle
//! aborts it first, so two cycles never issue seeks concurrently.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::bookmark::{check_range, VideoId};
use crate::error::LoopError;
use crate::player::Player;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Ticks spent past the end point after a seek before the seek is re-issued.
/// Covers a player that dropped the command or reports a stale position.
pub const RESEEK_AFTER_TICKS: u32 = 5;

/// The loaded loop.  Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveLoopSession {
    pub video_id: VideoId,
    pub start_time: u32,
    pub end_time: u32,
    pub is_looping: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    AwaitingReady,
    Ready,
}

enum PlayerSlot {
    AwaitingReady,
    Ready {
        player: Arc<dyn Player>,
        video_id: VideoId,
    },
}

pub struct LoopController {
    slot: PlayerSlot,
    session: Option<ActiveLoopSession>,
    pending_start: bool,
    poll: Option<AbortHandle>,
    poll_interval: Duration,
    allow_seek_ahead: bool,
}

impl LoopController {
    pub fn new(poll_interval: Duration, allow_seek_ahead: bool) -> Self {
        Self {
            slot: PlayerSlot::AwaitingReady,
            session: None,
            pending_start: false,
            poll: None,
            poll_interval,
            allow_seek_ahead,
        }
    }

    pub fn session(&self) -> Option<&ActiveLoopSession> {
        self.session.as_ref()
    }

    pub fn readiness(&self) -> Readiness {
        match self.slot {
            PlayerSlot::AwaitingReady => Readiness::AwaitingReady,
            PlayerSlot::Ready { .. } => Readiness::Ready,
        }
    }

    /// Video the attached player is showing, if any.
    pub fn player_video(&self) -> Option<&VideoId> {
        match &self.slot {
            PlayerSlot::Ready { video_id, .. } => Some(video_id),
            PlayerSlot::AwaitingReady => None,
        }
    }

    /// True while a `start()` is waiting for the player.
    pub fn is_start_pending(&self) -> bool {
        self.pending_start
    }

    pub fn is_polling(&self) -> bool {
        self.poll.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Replace the session.  Any running cycle is cancelled and a pending
    /// start is dropped; the new session is idle until `start()`.
    pub fn load(&mut self, video_id: VideoId, start_time: u32, end_time: u32) -> Result<(), LoopError> {
        check_range(start_time, end_time)?;
        self.cancel_poll();
        self.pending_start = false;
        info!("loop: loaded {} [{}s, {}s)", video_id, start_time, end_time);
        self.session = Some(ActiveLoopSession {
            video_id,
            start_time,
            end_time,
            is_looping: false,
        });
        Ok(())
    }

    /// Seek to the start, play, and arm the polling cycle.
    ///
    /// Without a ready player for the session's video this returns
    /// `NoPlayerAttached` and remembers the intent for `on_player_ready`.
    pub async fn start(&mut self) -> Result<(), LoopError> {
        let Some(session) = self.session.as_ref() else {
            return Err(LoopError::NoSession);
        };
        if self.player_for(&session.video_id).is_none() {
            debug!("loop: start deferred until {} is ready", session.video_id);
            self.pending_start = true;
            return Err(LoopError::NoPlayerAttached);
        }
        self.begin().await
    }

    /// Cancel polling and pause.  Safe to call when nothing is playing.
    pub async fn stop(&mut self) -> Result<(), LoopError> {
        self.cancel_poll();
        self.pending_start = false;
        if let Some(session) = self.session.as_mut() {
            session.is_looping = false;
        }
        if let PlayerSlot::Ready { player, .. } = &self.slot {
            player.pause_video().await.map_err(LoopError::Player)?;
            info!("loop: stopped");
        }
        Ok(())
    }

    /// The player for `video_id` has signalled ready.  Performs a deferred
    /// start if one is pending for that video.
    ///
    /// A ready signal while looping (the player reloaded its media) restarts
    /// the loop from its start point.
    pub async fn on_player_ready(
        &mut self,
        player: Arc<dyn Player>,
        video_id: VideoId,
    ) -> Result<(), LoopError> {
        info!("loop: player ready for {}", video_id);
        self.cancel_poll();
        if let Some(session) = self.session.as_mut() {
            if session.is_looping {
                session.is_looping = false;
                self.pending_start = true;
            }
        }
        self.slot = PlayerSlot::Ready { player, video_id };

        let wanted = self
            .session
            .as_ref()
            .is_some_and(|s| self.player_video() == Some(&s.video_id));
        if self.pending_start && wanted {
            return self.begin().await;
        }
        Ok(())
    }

    /// The player went away (torn down, or about to load another video).
    /// A loop that was running becomes a pending start.
    pub fn detach_player(&mut self) {
        self.cancel_poll();
        if let Some(session) = self.session.as_mut() {
            if session.is_looping {
                session.is_looping = false;
                self.pending_start = true;
            }
        }
        if matches!(self.slot, PlayerSlot::Ready { .. }) {
            debug!("loop: player detached");
        }
        self.slot = PlayerSlot::AwaitingReady;
    }

    async fn begin(&mut self) -> Result<(), LoopError> {
        self.cancel_poll();
        self.pending_start = false;

        let (player, session) = match (&self.slot, self.session.as_mut()) {
            (PlayerSlot::Ready { player, .. }, Some(session)) => (Arc::clone(player), session),
            _ => return Err(LoopError::NoPlayerAttached),
        };

        player
            .seek_to(f64::from(session.start_time), self.allow_seek_ahead)
            .await
            .map_err(LoopError::Player)?;
        player.play_video().await.map_err(LoopError::Player)?;

        let boundary = LoopBoundary::new(session.start_time, session.end_time);
        let task = tokio::spawn(poll_loop(
            player,
            boundary,
            self.poll_interval,
            self.allow_seek_ahead,
        ));
        self.poll = Some(task.abort_handle());
        session.is_looping = true;
        info!(
            "loop: looping {} [{}s, {}s) every {:?}",
            session.video_id, session.start_time, session.end_time, self.poll_interval
        );
        Ok(())
    }

    fn player_for(&self, video_id: &VideoId) -> Option<&Arc<dyn Player>> {
        match &self.slot {
            PlayerSlot::Ready { player, video_id: v } if v == video_id => Some(player),
            _ => None,
        }
    }

    fn cancel_poll(&mut self) {
        if let Some(handle) = self.poll.take() {
            handle.abort();
            debug!("loop: polling cycle cancelled");
        }
    }
}

impl Default for LoopController {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, true)
    }
}

impl Drop for LoopController {
    fn drop(&mut self) {
        self.cancel_poll();
    }
}

// ── seek policy ───────────────────────────────────────────────────────────────

/// Decides, per position sample, whether to seek back to the start.
///
/// Seeks on the first sample at or past the end (`>=`: the exact end instant
/// is usually skipped between samples).  After a seek it stays quiet until a
/// sample falls below the end again, or `RESEEK_AFTER_TICKS` samples pass.
#[derive(Debug, Clone)]
struct LoopBoundary {
    start: f64,
    end: f64,
    armed: bool,
    ticks_since_seek: u32,
}

impl LoopBoundary {
    fn new(start: u32, end: u32) -> Self {
        Self {
            start: f64::from(start),
            end: f64::from(end),
            armed: true,
            ticks_since_seek: 0,
        }
    }

    fn check(&mut self, position: f64) -> Option<f64> {
        if position < self.end {
            self.armed = true;
            return None;
        }
        if !self.armed {
            self.ticks_since_seek += 1;
            if self.ticks_since_seek < RESEEK_AFTER_TICKS {
                return None;
            }
        }
        self.armed = false;
        self.ticks_since_seek = 0;
        Some(self.start)
    }
}

async fn poll_loop(
    player: Arc<dyn Player>,
    mut boundary: LoopBoundary,
    interval: Duration,
    allow_seek_ahead: bool,
) {
    loop {
        tokio::time::sleep(interval).await;
        let position = match player.current_time().await {
            Ok(p) => p,
            Err(e) => {
                debug!("loop: position unavailable: {}", e);
                continue;
            }
        };
        if let Some(target) = boundary.check(position) {
            debug!("loop: {:.2}s reached end, seeking to {}s", position, target);
            if let Err(e) = player.seek_to(target, allow_seek_ahead).await {
                warn!("loop: seek failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Seek(f64),
        Play,
        Pause,
        Sample(f64),
    }

    /// Replays a scripted list of positions, then repeats the last one.
    #[derive(Default)]
    struct ScriptedPlayer {
        positions: Mutex<VecDeque<f64>>,
        last: Mutex<f64>,
        calls: Mutex<Vec<Call>>,
    }

    impl ScriptedPlayer {
        fn new(positions: &[f64]) -> Arc<Self> {
            Arc::new(Self {
                positions: Mutex::new(positions.iter().copied().collect()),
                ..Default::default()
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn seeks(&self) -> Vec<f64> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Seek(s) => Some(s),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl Player for ScriptedPlayer {
        async fn seek_to(&self, seconds: f64, _allow_seek_ahead: bool) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::Seek(seconds));
            Ok(())
        }

        async fn play_video(&self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::Play);
            Ok(())
        }

        async fn pause_video(&self) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::Pause);
            Ok(())
        }

        async fn current_time(&self) -> anyhow::Result<f64> {
            let mut last = self.last.lock().unwrap();
            if let Some(p) = self.positions.lock().unwrap().pop_front() {
                *last = p;
            }
            self.calls.lock().unwrap().push(Call::Sample(*last));
            Ok(*last)
        }
    }

    fn vid() -> VideoId {
        VideoId::new("dQw4w9WgXcQ")
    }

    #[test]
    fn test_boundary_seeks_once_at_first_sample_past_end() {
        let mut b = LoopBoundary::new(10, 30);
        let seeks: Vec<Option<f64>> = [28.0, 29.9, 31.0, 5.0].iter().map(|p| b.check(*p)).collect();
        assert_eq!(seeks, vec![None, None, Some(10.0), None]);
    }

    #[test]
    fn test_boundary_exact_end_triggers() {
        let mut b = LoopBoundary::new(0, 30);
        assert_eq!(b.check(30.0), Some(0.0));
    }

    #[test]
    fn test_boundary_retries_when_position_lags() {
        let mut b = LoopBoundary::new(0, 30);
        assert_eq!(b.check(31.0), Some(0.0));
        for _ in 1..RESEEK_AFTER_TICKS {
            assert_eq!(b.check(31.1), None);
        }
        assert_eq!(b.check(31.2), Some(0.0));
    }

    #[test]
    fn test_load_rejects_inverted_range() {
        let mut c = LoopController::default();
        assert!(matches!(
            c.load(vid(), 90, 30),
            Err(LoopError::InvalidRange { start: 90, end: 30 })
        ));
        assert!(c.session().is_none());
    }

    #[tokio::test]
    async fn test_start_without_session() {
        let mut c = LoopController::default();
        assert!(matches!(c.start().await, Err(LoopError::NoSession)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_before_ready_is_deferred() {
        let mut c = LoopController::default();
        c.load(vid(), 10, 30).unwrap();
        assert!(matches!(c.start().await, Err(LoopError::NoPlayerAttached)));
        assert!(c.is_start_pending());
        assert!(!c.is_polling());

        let player = ScriptedPlayer::new(&[]);
        c.on_player_ready(player.clone(), vid()).await.unwrap();
        assert_eq!(player.calls()[..2], [Call::Seek(10.0), Call::Play]);
        assert!(c.is_polling());
        assert!(!c.is_start_pending());
        assert!(c.session().unwrap().is_looping);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_without_intent_does_not_play() {
        let mut c = LoopController::default();
        c.load(vid(), 10, 30).unwrap();
        let player = ScriptedPlayer::new(&[]);
        c.on_player_ready(player.clone(), vid()).await.unwrap();
        assert!(player.calls().is_empty());
        assert_eq!(c.readiness(), Readiness::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_for_other_video_keeps_waiting() {
        let mut c = LoopController::default();
        c.load(vid(), 10, 30).unwrap();
        let _ = c.start().await;
        let player = ScriptedPlayer::new(&[]);
        c.on_player_ready(player.clone(), VideoId::new("zzzzzzzzzzz")).await.unwrap();
        assert!(player.calls().is_empty());
        assert!(c.is_start_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_seeks_exactly_once() {
        let player = ScriptedPlayer::new(&[28.0, 29.9, 31.0, 5.0]);
        let mut c = LoopController::default();
        c.on_player_ready(player.clone(), vid()).await.unwrap();
        c.load(vid(), 0, 30).unwrap();
        c.start().await.unwrap();

        tokio::time::sleep(Duration::from_millis(1050)).await;

        let calls = player.calls();
        // initial seek + play, then the loop seek
        assert_eq!(player.seeks(), vec![0.0, 0.0]);
        let loop_seek = calls.iter().rposition(|c| *c == Call::Seek(0.0)).unwrap();
        assert_eq!(calls[loop_seek - 1], Call::Sample(31.0));
        let samples_before: Vec<_> = calls[..loop_seek]
            .iter()
            .filter(|c| matches!(c, Call::Sample(_)))
            .collect();
        assert_eq!(samples_before.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reload_replaces_session_and_cycle() {
        let player = ScriptedPlayer::new(&[]);
        let mut c = LoopController::default();
        c.on_player_ready(player.clone(), vid()).await.unwrap();
        c.load(vid(), 30, 90).unwrap();
        c.start().await.unwrap();
        assert!(c.is_polling());

        c.load(vid(), 10, 20).unwrap();
        assert!(!c.is_polling());
        let s = c.session().unwrap();
        assert_eq!((s.start_time, s.end_time, s.is_looping), (10, 20, false));

        // positions past 90 would make the first cycle seek to 30
        *player.last.lock().unwrap() = 120.0;
        let before = player.seeks().len();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(player.seeks().len(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_keeps_single_cycle() {
        let player = ScriptedPlayer::new(&[]);
        let mut c = LoopController::default();
        c.on_player_ready(player.clone(), vid()).await.unwrap();
        c.load(vid(), 0, 30).unwrap();
        c.start().await.unwrap();
        c.start().await.unwrap();
        *player.last.lock().unwrap() = 31.0;

        tokio::time::sleep(Duration::from_millis(150)).await;
        // two initial seeks from start(), one loop seek from the surviving cycle
        assert_eq!(player.seeks(), vec![0.0, 0.0, 0.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_idempotent_and_pauses() {
        let player = ScriptedPlayer::new(&[]);
        let mut c = LoopController::default();
        c.stop().await.unwrap();

        c.on_player_ready(player.clone(), vid()).await.unwrap();
        c.load(vid(), 0, 30).unwrap();
        c.start().await.unwrap();
        c.stop().await.unwrap();
        c.stop().await.unwrap();
        assert!(!c.is_polling());
        assert!(!c.session().unwrap().is_looping);
        assert_eq!(
            player.calls().iter().filter(|c| **c == Call::Pause).count(),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_detach_turns_running_loop_into_pending_start() {
        let first = ScriptedPlayer::new(&[]);
        let mut c = LoopController::default();
        c.on_player_ready(first.clone(), vid()).await.unwrap();
        c.load(vid(), 5, 30).unwrap();
        c.start().await.unwrap();

        c.detach_player();
        assert_eq!(c.readiness(), Readiness::AwaitingReady);
        assert!(!c.is_polling());
        assert!(c.is_start_pending());

        let second = ScriptedPlayer::new(&[]);
        c.on_player_ready(second.clone(), vid()).await.unwrap();
        assert_eq!(second.calls()[..2], [Call::Seek(5.0), Call::Play]);
        assert!(c.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_ready_keeps_loop_polling() {
        let player = ScriptedPlayer::new(&[]);
        let mut c = LoopController::default();
        c.load(vid(), 0, 30).unwrap();
        let _ = c.start().await;
        c.on_player_ready(player.clone(), vid()).await.unwrap();
        c.on_player_ready(player.clone(), vid()).await.unwrap();
        assert!(c.is_polling());
        assert!(c.session().unwrap().is_looping);
        assert_eq!(player.seeks(), vec![0.0, 0.0]);

        *player.last.lock().unwrap() = 40.0;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(c.is_polling());
        assert_eq!(player.seeks(), vec![0.0, 0.0, 0.0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_for_other_video_while_looping_defers() {
        let player = ScriptedPlayer::new(&[]);
        let mut c = LoopController::default();
        c.on_player_ready(player.clone(), vid()).await.unwrap();
        c.load(vid(), 0, 30).unwrap();
        c.start().await.unwrap();

        c.on_player_ready(player.clone(), VideoId::new("zzzzzzzzzzz")).await.unwrap();
        assert!(!c.is_polling());
        assert!(c.is_start_pending());
        assert!(!c.session().unwrap().is_looping);
    }
}
