//! Telemetry relay: ingests device readings over MQTT, validates and
//! persists them, and fans each one out to live dashboard viewers over
//! WebSocket, with REST endpoints for history hydration and session
//! authorization.

pub mod alerts;
pub mod auth;
pub mod errors;
pub mod hub;
pub mod metrics;
pub mod model;
pub mod mqtt;
pub mod rest;
pub mod session;
pub mod store;
pub mod validate;
pub mod ws;
