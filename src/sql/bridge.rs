//! Type bridge between field data types and the driver: value conversion on set,
//! bind parameters for statements and column extraction from rows.

use crate::config::{DataType, FieldMap, ScalarType};
use crate::error::{Phase, StoreError};
use crate::sql::params::BindValue;
use crate::value::{Datum, Reference, Value};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

/// Converts a scalar to the field's storage type. Integer widths convert when in range.
pub fn coerce(resource: &str, field: &FieldMap, value: Value) -> Result<Value, StoreError> {
    let Some(storage) = field.storage else {
        return Err(StoreError::UnsupportedFieldType(field.full_name(resource)));
    };
    if value.is_null() {
        return Ok(Value::Null);
    }
    let mismatch = |value: &Value| StoreError::conversion(&field.full_name(resource), storage.name(), value);
    Ok(match (storage, value) {
        (ScalarType::Int, Value::Int(n)) => Value::Int(n),
        (ScalarType::Int, Value::Long(n)) => match i32::try_from(n) {
            Ok(n) => Value::Int(n),
            Err(_) => return Err(mismatch(&Value::Long(n))),
        },
        (ScalarType::Long, Value::Int(n)) => Value::Long(i64::from(n)),
        (ScalarType::Long, Value::Long(n)) => Value::Long(n),
        (ScalarType::String, v @ Value::String(_)) => v,
        (ScalarType::Date, v @ Value::Date(_)) => v,
        (ScalarType::Time, v @ Value::Time(_)) => v,
        (ScalarType::DateTime, v @ Value::DateTime(_)) => v,
        (_, other) => return Err(mismatch(&other)),
    })
}

/// Normalizes a datum for a field slot. Scalars given to a reference field become
/// `Reference::ByKey`; linked instances must be of the target resource.
/// Transient fields hold whatever they are given.
pub fn coerce_datum(resource: &str, field: &FieldMap, datum: Datum) -> Result<Datum, StoreError> {
    if field.transient {
        return Ok(datum);
    }
    let full_name = || field.full_name(resource);
    let check_target = |target: &str, entity: &crate::entity::Entity| {
        let name = entity.name();
        if name == target {
            Ok(())
        } else {
            Err(StoreError::conversion(&full_name(), "instance of the target resource", name))
        }
    };
    match (&field.data_type, datum) {
        (DataType::Many(target), Datum::Many(items)) => {
            for item in &items {
                check_target(target.as_str(), item)?;
            }
            Ok(Datum::Many(items))
        }
        (DataType::Many(_), other) => Err(StoreError::conversion(&full_name(), "collection", other)),
        (DataType::Reference(_), Datum::Value(v)) | (DataType::Reference(_), Datum::Reference(Reference::ByKey(v))) => {
            Ok(Datum::Reference(Reference::ByKey(coerce(resource, field, v)?)))
        }
        (DataType::Reference(target), Datum::Reference(Reference::ByValue(entity))) => {
            check_target(target.as_str(), &entity)?;
            Ok(Datum::Reference(Reference::ByValue(entity)))
        }
        (DataType::Reference(_), other) => Err(StoreError::conversion(&full_name(), "reference", other)),
        (_, Datum::Value(v)) => Ok(Datum::Value(coerce(resource, field, v)?)),
        (_, other) => Err(StoreError::conversion(&full_name(), "scalar", other)),
    }
}

/// Bind parameter for a persisted field value.
pub fn bind(resource: &str, field: &FieldMap, value: &Value) -> Result<BindValue, StoreError> {
    if field.storage.is_none() {
        return Err(StoreError::UnsupportedFieldType(field.full_name(resource)));
    }
    Ok(match coerce(resource, field, value.clone())? {
        Value::Null => BindValue::Null,
        Value::Int(n) => BindValue::Int(n),
        Value::Long(n) => BindValue::Long(n),
        Value::String(s) => BindValue::Text(s),
        Value::Date(d) => BindValue::Date(d),
        Value::Time(t) => BindValue::Time(t),
        Value::DateTime(dt) => BindValue::DateTime(dt),
    })
}

/// Reads column `index` of `row` as the field's storage type. SQL NULL becomes `Value::Null`.
pub fn extract(row: &SqliteRow, index: usize, resource: &str, field: &FieldMap, sql: &str) -> Result<Value, StoreError> {
    let storage = field
        .storage
        .ok_or_else(|| StoreError::UnsupportedFieldType(field.full_name(resource)))?;
    let convert = StoreError::driver(Phase::Convert, sql);
    Ok(match storage {
        ScalarType::Int => match row.try_get::<Option<i64>, _>(index).map_err(convert)? {
            Some(n) => Value::Int(
                i32::try_from(n).map_err(|_| StoreError::conversion(&field.full_name(resource), "int", n))?,
            ),
            None => Value::Null,
        },
        ScalarType::Long => row.try_get::<Option<i64>, _>(index).map_err(convert)?.into(),
        ScalarType::String => row.try_get::<Option<String>, _>(index).map_err(convert)?.into(),
        ScalarType::Date => row.try_get::<Option<NaiveDate>, _>(index).map_err(convert)?.into(),
        ScalarType::Time => row.try_get::<Option<NaiveTime>, _>(index).map_err(convert)?.into(),
        ScalarType::DateTime => row.try_get::<Option<DateTime<Utc>>, _>(index).map_err(convert)?.into(),
    })
}
