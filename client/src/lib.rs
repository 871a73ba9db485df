//! Client side of the voxel room protocol.
//!
//! ARCHITECTURE
//! ============
//! - `transport` owns the socket and yields typed server messages on one
//!   ordered channel
//! - `scene` is the local voxel set and its matching rules
//! - `reconciler` applies remote and local events to the scene and drives
//!   snapshot exchange for late joiners
//! - `config` picks the server URL
//!
//! Rendering, picking, and color selection live outside this crate; they
//! consume [`Update`]s and feed [`LocalEdit`]s.

pub mod config;
pub mod reconciler;
pub mod scene;
pub mod transport;

pub use config::ClientConfig;
pub use reconciler::{LocalEdit, Outbox, Reconciler, RoomStatus, Update, run_session};
pub use scene::{Scene, SceneChange};
pub use transport::{ConnectionState, Transport, TransportError};
