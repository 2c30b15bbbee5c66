//! # Events Module
//!
//! Decisions made during a save, reported to any listening UI.
//!
//! ## Design
//! The core emits events through crossbeam channels. A browser bridge, the
//! CLI or a test can subscribe; nobody has to.
//!
//! ## Example
//! ```rust,ignore
//! let (sender, receiver) = EventChannel::new();
//! let pipeline = SavePipeline::builder(store).events(sender).build();
//!
//! pipeline.save(request)?;
//! for event in receiver.try_iter() {
//!     if let Event::Duplicate(DuplicateEvent::RemoteFallback { reason }) = event {
//!         eprintln!("remote index unavailable: {reason}");
//!     }
//! }
//! ```

mod channel;
mod types;

pub use channel::{null_sender, EventChannel, EventReceiver, EventSender};
pub use types::*;
