// SPDX-License-Identifier: MIT

//! Deployment layer - configuration, connection lifecycle, the demo graph
//! and the HTTP server that exposes it.

pub mod config;
pub mod demo;
pub mod lifecycle;
pub mod server;
