//! AppCore: single-owner event loop for all mutable state.
//!
//! Owns the collection, the selection bridge, the loop controller and the
//! mpv driver.  Shell commands, mpv events and the heartbeat all arrive as
//! `AppEvent`s on one channel, so nothing here needs a lock.
//!
//! Player lifecycle: whenever the loaded loop's video differs from what mpv
//! shows, the controller is detached and mpv is told to load the new video.
//! The `file-loaded` event attaches an `MpvPlayer` for that video, which
//! fires any start that was requested in the meantime.

use std::sync::Arc;

use loop_core::config::Config;
use loop_core::input::watch_url;
use loop_core::thumbnail::resolve_thumbnail;
use loop_core::{
    CollectionStore, FileRecords, LoopController, LoopError, LoopForm, SelectionBridge,
    SubmitOutcome, VideoId,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::mpv::{MpvDriver, MpvEvent, MpvHandle, MpvPlayer};
use crate::shell::{self, ShellCommand};

#[derive(Debug)]
pub enum AppEvent {
    Shell(ShellCommand),
    Mpv(MpvEvent),
    /// Liveness check for the mpv process.
    HeartbeatTick,
    Shutdown,
}

pub struct AppCore {
    config: Config,
    store: CollectionStore<FileRecords>,
    bridge: SelectionBridge,
    controller: LoopController,
    mpv_driver: MpvDriver,
    mpv_handle: Option<MpvHandle>,
    /// Video most recently sent to mpv with `loadfile`.
    mpv_video: Option<VideoId>,
    event_tx: mpsc::Sender<AppEvent>,
    http: reqwest::Client,
}

impl AppCore {
    pub fn new(config: Config, event_tx: mpsc::Sender<AppEvent>) -> Self {
        let records = FileRecords::new(config.storage.data_dir.clone());
        let store = CollectionStore::load(records, config.storage.record_name.clone());
        let controller =
            LoopController::new(config.player.poll_interval(), config.player.allow_seek_ahead);
        let mpv_driver = MpvDriver::new(config.player.volume);

        Self {
            config,
            store,
            bridge: SelectionBridge::new(),
            controller,
            mpv_driver,
            mpv_handle: None,
            mpv_video: None,
            event_tx,
            http: reqwest::Client::new(),
        }
    }

    /// Run until `Shutdown`/`quit` or the channel closes.
    pub async fn run(mut self, mut event_rx: mpsc::Receiver<AppEvent>) -> anyhow::Result<()> {
        info!("AppCore: starting event loop");

        let heartbeat_tx = self.event_tx.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
                if heartbeat_tx.send(AppEvent::HeartbeatTick).await.is_err() {
                    break;
                }
            }
        });

        println!("{}", shell::render_list(self.store.as_slice(), &self.bridge));

        while let Some(evt) = event_rx.recv().await {
            match evt {
                AppEvent::Shutdown | AppEvent::Shell(ShellCommand::Quit) => {
                    info!("AppCore: shutdown requested");
                    break;
                }
                AppEvent::Shell(cmd) => {
                    debug!("AppCore: command {:?}", cmd);
                    if let Err(e) = self.handle_command(cmd).await {
                        report(&e);
                    }
                }
                AppEvent::Mpv(evt) => self.handle_mpv_event(evt).await,
                AppEvent::HeartbeatTick => {
                    if self.mpv_handle.is_some() && !self.mpv_driver.process_alive() {
                        warn!("AppCore: mpv process died");
                        self.drop_player();
                    }
                }
            }
        }

        self.cleanup().await;
        Ok(())
    }

    async fn handle_command(&mut self, cmd: ShellCommand) -> Result<(), LoopError> {
        match cmd {
            ShellCommand::Add { url, start, end } => {
                let form = LoopForm::new(url, start, end);
                let outcome = self
                    .bridge
                    .submit(&form, &mut self.store, &mut self.controller)
                    .await?;
                if let Some(b) = self.bridge.selected() {
                    println!("saved {} ({})", b.title, b.range_label());
                }
                if outcome == SubmitOutcome::AwaitingPlayer {
                    println!("waiting for the player…");
                }
                self.sync_player().await;
            }
            ShellCommand::List => {
                println!("{}", shell::render_list(self.store.as_slice(), &self.bridge));
            }
            ShellCommand::Select(target) => {
                let Some(id) = self.resolve(&target) else {
                    println!("no saved loop {:?}", target);
                    return Ok(());
                };
                if let Some(bookmark) = self.store.get(&id).cloned() {
                    self.bridge.select(&bookmark, &mut self.controller)?;
                    let form = LoopForm::from_bookmark(&bookmark);
                    println!("loaded {}  {} {} {}", bookmark.title, form.url, form.start, form.end);
                    self.sync_player().await;
                }
            }
            ShellCommand::Play => match self.controller.start().await {
                Ok(()) => println!("looping"),
                Err(LoopError::NoPlayerAttached) => {
                    println!("waiting for the player…");
                    self.sync_player().await;
                }
                Err(e) => return Err(e),
            },
            ShellCommand::Stop => {
                self.controller.stop().await?;
                println!("stopped");
            }
            ShellCommand::Rename { target, title } => {
                let Some(id) = self.resolve(&target) else {
                    println!("no saved loop {:?}", target);
                    return Ok(());
                };
                if self.bridge.rename(&mut self.store, &id, &title)? {
                    println!("renamed to {}", title.trim());
                }
            }
            ShellCommand::Delete(target) => {
                let Some(id) = self.resolve(&target) else {
                    println!("no saved loop {:?}", target);
                    return Ok(());
                };
                if self.bridge.remove(&mut self.store, &id)? {
                    println!("deleted {}", id);
                }
            }
            ShellCommand::Clear => {
                self.bridge.clear(&mut self.store)?;
                println!("playlist cleared");
            }
            ShellCommand::Thumb(target) => {
                let Some(id) = self.resolve(&target) else {
                    println!("no saved loop {:?}", target);
                    return Ok(());
                };
                let client = self.http.clone();
                tokio::spawn(async move {
                    let url = resolve_thumbnail(&client, &id).await;
                    println!("{}: {}", id, url);
                });
            }
            ShellCommand::Help => println!("{}", shell::HELP),
            ShellCommand::Quit => {}
        }
        Ok(())
    }

    /// `n` (1-based list position) or a video reference of a saved loop.
    fn resolve(&self, target: &str) -> Option<VideoId> {
        if let Ok(n) = target.parse::<usize>() {
            if let Some(b) = n.checked_sub(1).and_then(|i| self.store.as_slice().get(i)) {
                return Some(b.video_id.clone());
            }
        }
        let id = loop_core::input::parse_video_reference(target)?;
        self.store.get(&id).map(|b| b.video_id.clone())
    }

    // ── player lifecycle ──────────────────────────────────────────────────────

    /// Make mpv show the loaded loop's video.
    async fn sync_player(&mut self) {
        let Some(wanted) = self.controller.session().map(|s| s.video_id.clone()) else {
            return;
        };
        if self.mpv_handle.is_some() && self.mpv_video.as_ref() == Some(&wanted) {
            return;
        }

        self.controller.detach_player();
        let Some(handle) = self.ensure_mpv_handle().await else {
            println!("mpv is not available; see the log");
            return;
        };
        let url = watch_url(&wanted);
        info!("AppCore: loading {}", url);
        match handle.load_video(&url).await {
            Ok(()) => self.mpv_video = Some(wanted),
            Err(e) => {
                warn!("AppCore: loadfile failed: {}", e);
                self.mpv_video = None;
            }
        }
    }

    async fn ensure_mpv_handle(&mut self) -> Option<MpvHandle> {
        if self.mpv_handle.is_some() && !self.mpv_driver.process_alive() {
            warn!("AppCore: mpv process died, dropping handle");
            self.drop_player();
        }

        if self.mpv_handle.is_none() {
            // one forwarder per connection
            let (mpv_tx, mut mpv_rx) = mpsc::channel::<MpvEvent>(64);
            let core_tx = self.event_tx.clone();
            tokio::spawn(async move {
                while let Some(evt) = mpv_rx.recv().await {
                    if core_tx.send(AppEvent::Mpv(evt)).await.is_err() {
                        break;
                    }
                }
            });

            match self.mpv_driver.spawn_and_connect(mpv_tx).await {
                Ok(handle) => {
                    if let Err(e) = handle.set_volume(self.config.player.volume).await {
                        debug!("AppCore: set volume failed: {}", e);
                    }
                    self.mpv_handle = Some(handle);
                }
                Err(e) => {
                    warn!("AppCore: failed to start mpv: {}", e);
                    return None;
                }
            }
        }

        self.mpv_handle.clone()
    }

    async fn handle_mpv_event(&mut self, evt: MpvEvent) {
        debug!("mpv event: {:?}", evt.raw);
        match evt.event_name() {
            Some("file-loaded") => {
                let (Some(handle), Some(video)) = (self.mpv_handle.clone(), self.mpv_video.clone())
                else {
                    return;
                };
                let player = Arc::new(MpvPlayer::new(handle));
                match self.controller.on_player_ready(player, video).await {
                    Ok(()) if self.controller.session().is_some_and(|s| s.is_looping) => {
                        println!("looping");
                    }
                    Ok(()) => {}
                    Err(e) => report(&e),
                }
            }
            Some("end-file") if evt.end_reason() == Some("error") => {
                warn!("AppCore: mpv could not play {:?}", self.mpv_video);
                println!("the player could not open this video");
                self.controller.detach_player();
                self.mpv_video = None;
            }
            Some("shutdown") => {
                info!("AppCore: mpv shut down");
                self.drop_player();
            }
            _ => {}
        }
    }

    fn drop_player(&mut self) {
        self.controller.detach_player();
        self.mpv_handle = None;
        self.mpv_video = None;
    }

    async fn cleanup(&mut self) {
        if let Err(e) = self.controller.stop().await {
            debug!("AppCore: stop on exit: {}", e);
        }
        if let Some(handle) = self.mpv_handle.take() {
            let _ = handle.quit().await;
        }
        self.mpv_driver.kill().await;
        info!("AppCore: stopped");
    }
}

/// Validation problems are the user's to fix; the rest is also logged.
fn report(e: &LoopError) {
    if e.is_validation() || matches!(e, LoopError::NoSession) {
        println!("{}", e);
    } else {
        error!("AppCore: {}", e);
        println!("error: {}", e);
    }
}
