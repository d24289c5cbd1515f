//! Gaod is a terminal chat client that orchestrates conversations across
//! AI providers, with a deterministic simulation fallback and per-user
//! long-term memory.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns configuration, the message/chat data model, and the
//!   provider/model catalog.
//! - [`storage`] abstracts persistence behind one adapter trait with a
//!   local JSON-file backend and a remote REST backend, plus the typed
//!   [`storage::Store`] facade everything else uses.
//! - [`auth`] keeps accounts and the active session in that same store.
//! - [`provider`] dispatches turns to OpenAI or Gemini endpoints and maps
//!   failures into one error taxonomy; [`simulation`] produces the
//!   deterministic replies used when no credentials exist.
//! - [`tools`] executes bracketed tool directives (calculator, web
//!   search, image generation) found in assistant output.
//! - [`memory`] extracts and persists per-user facts across chats.
//! - [`orchestrator`] ties it together: one user message in, exactly one
//!   assistant-or-error message out, with per-chat turn serialization and
//!   cancellation.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod auth;
pub mod cli;
pub mod core;
pub mod memory;
pub mod orchestrator;
pub mod provider;
pub mod simulation;
pub mod storage;
pub mod tools;
pub mod utils;
