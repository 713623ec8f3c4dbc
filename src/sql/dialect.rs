//! Database dialect hook: identifier quoting, column types and key generation syntax.

use crate::config::ScalarType;
use std::fmt;

pub trait Dialect: fmt::Debug + Send + Sync {
    /// Quote an identifier. Identifiers come from validated metadata only.
    fn quote(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Native column type for a storage type; `None` when the dialect has no mapping.
    fn column_type(&self, storage: ScalarType) -> Option<&'static str>;

    /// Clause appended after `PRIMARY KEY` on a single integer key, if supported.
    fn auto_increment(&self) -> Option<&'static str>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct Sqlite;

impl Dialect for Sqlite {
    fn column_type(&self, storage: ScalarType) -> Option<&'static str> {
        match storage {
            ScalarType::Int | ScalarType::Long => Some("INTEGER"),
            ScalarType::String => Some("TEXT"),
            ScalarType::Date => Some("DATE"),
            ScalarType::Time | ScalarType::DateTime => None,
        }
    }

    fn auto_increment(&self) -> Option<&'static str> {
        Some("AUTOINCREMENT")
    }
}
