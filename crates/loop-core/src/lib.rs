pub mod bookmark;
pub mod bridge;
pub mod config;
pub mod controller;
pub mod error;
pub mod input;
pub mod platform;
pub mod player;
pub mod store;
pub mod thumbnail;

pub use bookmark::{LoopBookmark, VideoId};
pub use bridge::{LoopForm, SelectionBridge, SubmitOutcome};
pub use controller::{ActiveLoopSession, LoopController, Readiness};
pub use error::LoopError;
pub use player::Player;
pub use store::{CollectionStore, FileRecords, MemoryRecords, RecordStore};
