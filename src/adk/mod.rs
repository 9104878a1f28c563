// SPDX-License-Identifier: MIT

//! Agent development kit - graph engine, persistence and models

pub mod error;
pub mod graph;
pub mod memory;
pub mod model;
