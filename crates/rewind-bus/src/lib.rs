//! `rewind-bus` – replay on the pub/sub seam.
//!
//! Lets code written against a live publish/subscribe client run unchanged
//! against a recorded log, and lets live handlers be instrumented for
//! recording.
//!
//! # Modules
//!
//! - [`client`] – [`PubSubClient`][client::PubSubClient]: the four-operation
//!   contract shared by live and replay clients, plus the
//!   [`Callback`][client::Callback] type.
//! - [`local_bus`] – [`LocalBus`][local_bus::LocalBus]: an in-process live
//!   client on Tokio broadcast channels.
//! - [`pacing`] – [`Pacing`][pacing::Pacing]: inter-entry delay policy of the
//!   dispatch loop.
//! - [`replay`] – [`ReplayClient`][replay::ReplayClient]: the replay shim and
//!   its background dispatch loop.
//! - [`autolog`] – [`Autolog`][autolog::Autolog]: records every payload a
//!   wrapped handler sees.

pub mod autolog;
pub mod client;
pub mod error;
pub mod local_bus;
pub mod pacing;
pub mod replay;

pub use autolog::{Autolog, Logged};
pub use client::{Callback, PubSubClient, callback};
pub use error::BusError;
pub use local_bus::LocalBus;
pub use pacing::Pacing;
pub use replay::ReplayClient;
