//! Matchmaking and room lifecycle for Duet.
//!
//! This crate is the core of the server. It decides which two waiting
//! clients become partners, keeps a client from being queued and seated at
//! the same time, and tears rooms down cleanly when someone leaves.
//!
//! It is deliberately synchronous and I/O free: every operation takes
//! `&mut Matchmaker` and returns the [`Notification`]s to deliver. The
//! server owns the locking and the sockets.
//!
//! # Key types
//!
//! - [`Matchmaker`] — the single state container; all operations live here
//! - [`Registry`] / [`ClientState`] — who is connected and where they stand
//! - [`AvailabilityQueue`] — who is waiting, oldest first
//! - [`RoomTable`] / [`Room`] — who is paired with whom
//! - [`TransitionGuard`] — per-client in-flight markers
//!
//! # Example
//!
//! ```
//! use duet_match::{ClientState, Matchmaker};
//! use duet_protocol::ClientId;
//!
//! let mut mm = Matchmaker::new();
//! mm.connect(ClientId(1));
//! mm.connect(ClientId(2));
//!
//! mm.request_match(ClientId(1)); // waits
//! let notes = mm.request_match(ClientId(2)); // pairs with 1
//!
//! assert_eq!(notes.len(), 2);
//! assert!(matches!(mm.state_of(ClientId(1)), Some(ClientState::InRoom(_))));
//! ```

mod guard;
mod lifecycle;
mod matchmaker;
mod queue;
mod registry;
mod room;

pub use guard::TransitionGuard;
pub use matchmaker::{Matchmaker, Notification, Occupancy, WAITING_MESSAGE};
pub use queue::AvailabilityQueue;
pub use registry::{ClientState, Registry};
pub use room::{Room, RoomTable};
