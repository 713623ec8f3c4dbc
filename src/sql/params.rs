//! Bind parameters: field values in a form sqlx can encode for SQLite.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::encode::{Encode, IsNull};
use sqlx::sqlite::{Sqlite, SqliteTypeInfo};
use sqlx::Database;

/// A value that can be bound to a SQLite statement. Built by the type bridge.
#[derive(Clone, Debug, PartialEq)]
pub enum BindValue {
    Null,
    Int(i32),
    Long(i64),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(DateTime<Utc>),
}

impl<'q> Encode<'q, Sqlite> for BindValue {
    fn encode_by_ref(
        &self,
        buf: &mut <Sqlite as Database>::ArgumentBuffer<'q>,
    ) -> Result<IsNull, Box<dyn std::error::Error + Send + Sync>> {
        Ok(match self {
            BindValue::Null => <Option<i64> as Encode<Sqlite>>::encode_by_ref(&None, buf)?,
            BindValue::Int(n) => <i32 as Encode<Sqlite>>::encode_by_ref(n, buf)?,
            BindValue::Long(n) => <i64 as Encode<Sqlite>>::encode_by_ref(n, buf)?,
            BindValue::Text(s) => <String as Encode<Sqlite>>::encode_by_ref(s, buf)?,
            BindValue::Date(d) => <NaiveDate as Encode<Sqlite>>::encode_by_ref(d, buf)?,
            BindValue::Time(t) => <NaiveTime as Encode<Sqlite>>::encode_by_ref(t, buf)?,
            BindValue::DateTime(dt) => <DateTime<Utc> as Encode<Sqlite>>::encode_by_ref(dt, buf)?,
        })
    }
}

impl sqlx::Type<Sqlite> for BindValue {
    fn type_info() -> SqliteTypeInfo {
        <String as sqlx::Type<Sqlite>>::type_info()
    }
}
