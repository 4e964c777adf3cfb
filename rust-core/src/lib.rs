//! Core of lockstep: keeps several viewers' players in step.
//!
//! A local play or pause becomes a [`SyncMessage`] broadcast through the
//! relay; every peer's [`Synchronizer`] turns it back into commands on its
//! own [`PlaybackSurface`]. Play messages carry an absolute start instant so
//! peers begin together regardless of how long delivery took.

pub mod backoff;
pub mod catalog;
pub mod clock;
pub mod codec;
pub mod messages;
pub mod surface;
pub mod synchronizer;
pub mod transport;

pub use catalog::{CatalogClient, CatalogError, Video};
pub use codec::DecodeError;
pub use messages::{Intent, Position, SyncMessage, VideoId};
pub use surface::PlaybackSurface;
pub use synchronizer::{LocalCommand, PlaybackState, SyncConfig, Synchronizer};
pub use transport::{Frame, TransportChannel, TransportError};
