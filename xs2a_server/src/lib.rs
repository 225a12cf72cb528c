//! # XS2A gateway server
//! This crate hosts the HTTP surface of the XS2A gateway. It is responsible for:
//! * Checking the TPP's qualified certificate on every `/v1` request and establishing who is calling.
//! * Translating XS2A authorisation requests into calls on the SCA engine.
//! * Mapping engine outcomes onto HTTP statuses and response bodies.
//! * Expiring abandoned authorisations in the background.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/v1/{service}/{resourceId}/authorisations`: start (POST) and list (GET) authorisations.
//! * `/v1/{service}/{resourceId}/authorisations/{authorisationId}`: update PSU data (PUT) and read the SCA status
//!   (GET).
//!
//! The bundled [`sandbox::SandboxBank`] stands in for a real core banking system.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod expiry_worker;
pub mod helpers;
pub mod middleware;
pub mod routes;
pub mod sandbox;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
