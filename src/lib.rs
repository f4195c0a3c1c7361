// src/lib.rs

//! Australian emergency incident feed reconciler.
//!
//! Polls agency feeds (CRIIMSON JSON, CAP XML, bushfire GeoJSON), normalizes
//! their records into one incident model and tracks each incident across
//! polls, publishing created/updated/removed events and aggregate views.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
