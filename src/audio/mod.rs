//! # Audio Module
//!
//! Single-session playback engine for Open Jukebox.
//!
//! ## Architecture
//!
//! ### [`engine`] - Session Engine
//! - Owns the pending queue and the session state behind one lock order
//! - Runs the resolve-and-play sequence under an in-flight guard
//! - Receives track completions as messages on its own event loop
//!
//! ### [`queue`] - Track Queue
//! - FIFO of plain-text requests with monotonic sequence numbers
//! - Skip-target lookup (exact, substring, then 1-based position)
//!
//! ### [`player`] - Songbird Sink
//! - [`sink::AudioSink`] implementation over a Songbird `Call`
//! - Bridges `TrackEvent::End` / `TrackEvent::Error` into completion tokens
//!
//! ### [`reaper`] - Idle Reaper
//! - Tears the session down once the voice channel is empty
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use open_jukebox::audio::engine::{EngineSettings, SessionEngine};
//!
//! # async fn example(engine: SessionEngine) -> anyhow::Result<()> {
//! let queued = engine.enqueue("Bohemian Rhapsody - Queen").await?;
//! if queued.started_immediately() {
//!     println!("now playing");
//! }
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod player;
pub mod queue;
pub mod reaper;
pub mod session;
pub mod sink;

#[cfg(test)]
pub(crate) mod testing;
