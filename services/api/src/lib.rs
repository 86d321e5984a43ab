//! Laingfy API Library Crate
//!
//! This library contains all the core logic for the Laingfy web service:
//! the application state, the session registry and serializer, the response
//! pipeline, artifact storage and retention, the room lifecycle manager,
//! API handlers, and routing. The `api` binary is a thin wrapper around
//! this library.

pub mod config;
pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod room;
pub mod router;
pub mod session;
pub mod state;
pub mod storage;
pub mod sweeper;
