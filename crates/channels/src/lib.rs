//! Destination platform contract.
//!
//! The relay talks to the destination only through [`DestinationChannels`];
//! platform crates (Slack) implement it, and [`memory::MemoryChannels`] backs
//! tests.

pub mod destination;
pub mod error;
pub mod memory;

pub use {
    destination::{Channel, DestinationChannels, OutgoingPost},
    error::{Error, Result},
    memory::MemoryChannels,
};
