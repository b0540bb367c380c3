// src/lib.rs

//! Attraction Crawler Library
//!
//! Searches RedNote for notes about an attraction, keeps the ones an LLM
//! judges relevant, and enriches those with full note details.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod testing;
pub mod utils;
