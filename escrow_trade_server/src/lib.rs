//! # Escrow trade gateway server
//! This crate hosts the HTTP and WebSocket front end of the escrow trade gateway. It is responsible for:
//! * Identifying the caller from the headers set by the upstream session gateway ([`auth`]).
//! * Exposing the trade lifecycle and conversations of the engine as a JSON API ([`routes`]).
//! * Pushing new messages to connected clients over WebSocket ([`ws`]).
//! * Re-checking pending deposits in the background ([`deposit_worker`]).
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/ws`: WebSocket endpoint for live conversations.
//! * `/api/trades`, `/api/trades/{id}/...`: Propose, accept, fund, settle, reject and cancel trades.
//! * `/api/conversations`, `/api/messages/{id}/read`: Conversation listings, message history and read receipts.
//! * `/api/sellers/register`: Seller self-registration.

pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod deposit_worker;
pub mod errors;
pub mod helpers;
pub mod routes;
pub mod server;
pub mod ws;

#[cfg(test)]
mod endpoint_tests;
