//! # Audio Module
//!
//! Per-guild queue management and playback for the jukebox.
//!
//! ## Architecture
//!
//! ### [`queue`] - Room Queue
//! - Pure state machine: pending tracks, current track, playback status
//! - Positions are 1-based and index the pending tracks only; the current
//!   track has no position and `0` is rejected as out of range
//!
//! ### [`worker`] - Guild Worker
//! - One tokio task per guild owns its [`queue::RoomQueue`]
//! - Control commands, resolver results and driver events arrive on the same
//!   channel, so every guild sees a single total order of mutations
//!
//! ### [`registry`] - Queue Registry
//! - `GuildId -> GuildQueue` map, creating each queue exactly once
//!
//! ### [`driver`] / [`songbird_driver`] - Playback
//! - Trait seam over the voice connection; songbird in production

pub mod driver;
pub mod events;
pub mod queue;
pub mod registry;
pub mod songbird_driver;
pub mod track;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;
