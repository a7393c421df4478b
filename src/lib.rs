// SPDX-License-Identifier: MIT OR Apache-2.0

//! homecare - FAQ retrieval and SOAP note tooling for home-visit nursing
//!
//! Shared modules for the homecare CLI and upload server.

pub mod config;
pub mod corpus;
pub mod embedding;
pub mod errors;
pub mod index;
pub mod output;
pub mod report;
pub mod search;
pub mod server;
pub mod similarity;
pub mod utils;

pub use errors::{FaqError, Result};
