//! Repository functions, one submodule per table.
//!
//! All functions take a borrowed `rusqlite::Connection` so callers decide the
//! transaction boundary (see `unchecked_transaction` in the mapping engine).

mod application;
mod audit;
mod document;
mod module_field;

pub use application::*;
pub use audit::*;
pub use document::*;
pub use module_field::*;

use std::str::FromStr;

use uuid::Uuid;

use super::DatabaseError;

pub(crate) fn parse_uuid(field: &str, value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|_| DatabaseError::InvalidValue {
        field: field.into(),
        value: value.into(),
    })
}

pub(crate) fn parse_opt_uuid(field: &str, value: Option<String>) -> Result<Option<Uuid>, DatabaseError> {
    value.map(|v| parse_uuid(field, &v)).transpose()
}

pub(crate) fn parse_enum<T>(value: &str) -> Result<T, DatabaseError>
where
    T: FromStr<Err = DatabaseError>,
{
    T::from_str(value)
}

pub(crate) fn parse_json(field: &str, value: &str) -> Result<serde_json::Value, DatabaseError> {
    serde_json::from_str(value).map_err(|_| DatabaseError::InvalidValue {
        field: field.into(),
        value: value.into(),
    })
}
