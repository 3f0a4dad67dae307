//! A player whose position advances with tokio's (paused) clock.

use std::sync::Mutex;

use async_trait::async_trait;
use loop_core::Player;
use tokio::time::Instant;

/// Simulates real playback: position = offset + wall time since the last
/// seek while playing.
pub struct ClockPlayer {
    inner: Mutex<State>,
}

struct State {
    offset: f64,
    since: Option<Instant>,
    seeks: Vec<f64>,
}

impl ClockPlayer {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(State {
                offset: 0.0,
                since: None,
                seeks: Vec::new(),
            }),
        }
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.inner.lock().unwrap().seeks.clone()
    }

    pub fn is_playing(&self) -> bool {
        self.inner.lock().unwrap().since.is_some()
    }

    pub fn position(&self) -> f64 {
        let s = self.inner.lock().unwrap();
        s.offset + s.since.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0)
    }
}

#[async_trait]
impl Player for ClockPlayer {
    async fn seek_to(&self, seconds: f64, _allow_seek_ahead: bool) -> anyhow::Result<()> {
        let mut s = self.inner.lock().unwrap();
        s.offset = seconds;
        if s.since.is_some() {
            s.since = Some(Instant::now());
        }
        s.seeks.push(seconds);
        Ok(())
    }

    async fn play_video(&self) -> anyhow::Result<()> {
        let mut s = self.inner.lock().unwrap();
        if s.since.is_none() {
            s.since = Some(Instant::now());
        }
        Ok(())
    }

    async fn pause_video(&self) -> anyhow::Result<()> {
        let mut s = self.inner.lock().unwrap();
        if let Some(t) = s.since.take() {
            s.offset += t.elapsed().as_secs_f64();
        }
        Ok(())
    }

    async fn current_time(&self) -> anyhow::Result<f64> {
        Ok(self.position())
    }
}
