// SPDX-FileCopyrightText: 2026 Ringpost Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules for CRUD operations on storage entities.

pub mod attempts;
pub mod campaigns;
pub mod jobs;
pub mod ports;

use std::str::FromStr;

/// Parse a TEXT column holding a strum-serialized enum.
pub(crate) fn parse_column<T>(idx: usize, value: &str) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    T::from_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Parse a nullable TEXT column holding a strum-serialized enum.
pub(crate) fn parse_optional_column<T>(idx: usize, value: Option<String>) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.map(|v| parse_column(idx, &v)).transpose()
}
