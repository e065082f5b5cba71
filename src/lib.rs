//! Best-effort local mirror of an Anki instance, reached through the
//! anki-connect HTTP API.
//!
//! [`anki::AnkiClient`] keeps a snapshot of the peer's decks, note types
//! and fields fresh in the background, serves reads from it, and executes
//! mutating commands with immediate reconciliation. While anki is
//! unreachable or misconfigured, reads fail fast with the last classified
//! error instead of hitting the network.

pub mod anki;
pub mod config;
pub mod core;
pub mod persistence;

pub use crate::{
    anki::{
        AnkiClient,
        AnkiConfig,
        AnkiConnect,
        HttpAnkiConnect,
        Note,
        Snapshot,
    },
    core::AnkiError,
};
