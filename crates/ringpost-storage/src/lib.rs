// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Ringpost campaign dialer.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a single-writer
//! concurrency model via `tokio-rusqlite`, and typed queries for ports and
//! their audit trail, dialer jobs, call attempts and campaigns.

pub mod database;
pub mod directory;
pub mod migrations;
pub mod queries;

pub use database::Database;
pub use directory::SqliteCampaignDirectory;
