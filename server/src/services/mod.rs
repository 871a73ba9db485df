//! Domain services used by the websocket route.
//!
//! ARCHITECTURE
//! ============
//! `room` owns membership and notifications; `relay` fans scene ops out to a
//! room. Route handlers stay focused on protocol translation.

pub mod relay;
pub mod room;
