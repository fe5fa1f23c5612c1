// Copyright 2026 Creatorfeed Contributors
// SPDX-License-Identifier: Apache-2.0

//! Creatorfeed runtime library: creator content aggregation from pages that
//! embed their state as JSON.
//!
//! Pages are fetched concurrently, the embedded state object is extracted and
//! searched for content records, records are normalized and merged in source
//! priority order, and listings are served through a TTL cache that falls
//! back to stale data when upstream is down.

pub mod acquisition;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod feed;
pub mod protocol;
pub mod rest;
pub mod storage;
pub mod temporal;
