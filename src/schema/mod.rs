//! surface.contact_event.v1 schema
//!
//! Recorded contact streams: raw surface events plus the presentation-side
//! control events, for offline replay and reproducible sessions.

mod adapter;
mod contact_event;

pub use adapter::*;
pub use contact_event::*;
