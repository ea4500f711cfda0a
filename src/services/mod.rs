//! Domain services used by the websocket and admin routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own the canvas, connection membership, fan-out and
//! persistence so route handlers stay focused on protocol translation.

pub mod broadcast;
pub mod grid;
pub mod palette;
pub mod persistence;
pub mod registry;
