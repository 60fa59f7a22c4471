//! Arrow value normalization into JSON-safe transport rows

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, FixedSizeBinaryArray};
use arrow::compute::cast;
use arrow::datatypes::{
    DataType, Date32Type, Date64Type, Decimal128Type, Decimal256Type, Float16Type, Float32Type,
    Float64Type, Int16Type, Int32Type, Int64Type, Int8Type, IntervalDayTimeType,
    IntervalMonthDayNanoType, IntervalUnit, IntervalYearMonthType, Time32MillisecondType,
    Time32SecondType, Time64MicrosecondType, Time64NanosecondType, TimeUnit,
    TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
    TimestampSecondType, UInt16Type, UInt32Type, UInt64Type, UInt8Type,
};
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local, NaiveDate, NaiveTime, SecondsFormat, Utc};
use serde_json::{json, Value};

use pqv_core::types::{DateTimeFormat, DateTimeFormatSettings, Row};
use pqv_core::DataError;

/// Convert a record batch into transport rows.
///
/// Values that JSON cannot carry losslessly are rewritten: 64-bit integers
/// and decimals become decimal strings, byte arrays become arrays of
/// numbers, dates and timestamps are rendered per `fmt`, non-finite floats
/// become strings, and nested structs/lists/maps are serialized to a JSON
/// string so every cell stays a flat scalar or a plain array.
pub fn batch_to_rows(
    batch: &RecordBatch,
    fmt: &DateTimeFormatSettings,
) -> Result<Vec<Row>, DataError> {
    let schema = batch.schema();
    let mut columns: Vec<(String, ArrayRef)> = Vec::with_capacity(batch.num_columns());
    for (field, column) in schema.fields().iter().zip(batch.columns()) {
        // Decode dictionary columns up front so row access sees plain values
        let column = match field.data_type() {
            DataType::Dictionary(_, value_type) => cast(column, value_type)?,
            _ => Arc::clone(column),
        };
        columns.push((field.name().clone(), column));
    }

    let mut rows = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let mut out = Row::new();
        for (name, column) in &columns {
            let value = normalize_value(column.as_ref(), row, fmt)?;
            let value = if value.is_null() {
                value
            } else {
                match column.data_type() {
                    DataType::Struct(_)
                    | DataType::List(_)
                    | DataType::LargeList(_)
                    | DataType::FixedSizeList(_, _)
                    | DataType::Map(_, _) => Value::String(value.to_string()),
                    _ => value,
                }
            };
            out.insert(name.clone(), value);
        }
        rows.push(out);
    }
    Ok(rows)
}

/// Normalize one cell to a JSON value; nested types come back as native
/// JSON arrays/objects and are flattened to strings by the caller
fn normalize_value(
    array: &dyn Array,
    row: usize,
    fmt: &DateTimeFormatSettings,
) -> Result<Value, DataError> {
    if array.is_null(row) {
        return Ok(Value::Null);
    }
    let value = match array.data_type() {
        DataType::Boolean => json!(array.as_boolean().value(row)),
        DataType::Int8 => json!(array.as_primitive::<Int8Type>().value(row)),
        DataType::Int16 => json!(array.as_primitive::<Int16Type>().value(row)),
        DataType::Int32 => json!(array.as_primitive::<Int32Type>().value(row)),
        // 64-bit integers exceed the exact range of a JSON double
        DataType::Int64 => json!(array.as_primitive::<Int64Type>().value(row).to_string()),
        DataType::UInt8 => json!(array.as_primitive::<UInt8Type>().value(row)),
        DataType::UInt16 => json!(array.as_primitive::<UInt16Type>().value(row)),
        DataType::UInt32 => json!(array.as_primitive::<UInt32Type>().value(row)),
        DataType::UInt64 => json!(array.as_primitive::<UInt64Type>().value(row).to_string()),
        DataType::Float16 => float_value(array.as_primitive::<Float16Type>().value(row).to_f32() as f64),
        DataType::Float32 => float_value(array.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Float64 => float_value(array.as_primitive::<Float64Type>().value(row)),
        DataType::Utf8 => json!(array.as_string::<i32>().value(row)),
        DataType::LargeUtf8 => json!(array.as_string::<i64>().value(row)),
        DataType::Binary => bytes_value(array.as_binary::<i32>().value(row)),
        DataType::LargeBinary => bytes_value(array.as_binary::<i64>().value(row)),
        DataType::FixedSizeBinary(_) => {
            match array.as_any().downcast_ref::<FixedSizeBinaryArray>() {
                Some(arr) => bytes_value(arr.value(row)),
                None => display_value(array, row)?,
            }
        }
        DataType::Decimal128(_, _) => {
            json!(array.as_primitive::<Decimal128Type>().value_as_string(row))
        }
        DataType::Decimal256(_, _) => {
            json!(array.as_primitive::<Decimal256Type>().value_as_string(row))
        }
        DataType::Date32 => {
            let days = array.as_primitive::<Date32Type>().value(row);
            match DateTime::from_timestamp(i64::from(days) * 86_400, 0) {
                Some(dt) => json!(format_date(dt.date_naive(), fmt)),
                None => display_value(array, row)?,
            }
        }
        DataType::Date64 => {
            let millis = array.as_primitive::<Date64Type>().value(row);
            match DateTime::from_timestamp_millis(millis) {
                Some(dt) => json!(format_date(dt.date_naive(), fmt)),
                None => display_value(array, row)?,
            }
        }
        DataType::Timestamp(unit, _) => {
            let dt = match unit {
                TimeUnit::Second => {
                    DateTime::from_timestamp(array.as_primitive::<TimestampSecondType>().value(row), 0)
                }
                TimeUnit::Millisecond => DateTime::from_timestamp_millis(
                    array.as_primitive::<TimestampMillisecondType>().value(row),
                ),
                TimeUnit::Microsecond => DateTime::from_timestamp_micros(
                    array.as_primitive::<TimestampMicrosecondType>().value(row),
                ),
                TimeUnit::Nanosecond => Some(DateTime::from_timestamp_nanos(
                    array.as_primitive::<TimestampNanosecondType>().value(row),
                )),
            };
            match dt {
                Some(dt) => json!(format_datetime(dt, fmt)),
                None => display_value(array, row)?,
            }
        }
        DataType::Time32(unit) => {
            let (secs, nanos) = match unit {
                TimeUnit::Second => (array.as_primitive::<Time32SecondType>().value(row), 0),
                _ => {
                    let v = array.as_primitive::<Time32MillisecondType>().value(row);
                    (v / 1_000, (v % 1_000) * 1_000_000)
                }
            };
            match NaiveTime::from_num_seconds_from_midnight_opt(secs as u32, nanos as u32) {
                Some(t) => json!(t.to_string()),
                None => display_value(array, row)?,
            }
        }
        DataType::Time64(unit) => {
            let (secs, nanos) = match unit {
                TimeUnit::Microsecond => {
                    let v = array.as_primitive::<Time64MicrosecondType>().value(row);
                    (v / 1_000_000, (v % 1_000_000) * 1_000)
                }
                _ => {
                    let v = array.as_primitive::<Time64NanosecondType>().value(row);
                    (v / 1_000_000_000, v % 1_000_000_000)
                }
            };
            match NaiveTime::from_num_seconds_from_midnight_opt(secs as u32, nanos as u32) {
                Some(t) => json!(t.to_string()),
                None => display_value(array, row)?,
            }
        }
        DataType::Interval(IntervalUnit::YearMonth) => {
            let months = array.as_primitive::<IntervalYearMonthType>().value(row);
            json!(interval_string(months, 0, 0))
        }
        DataType::Interval(IntervalUnit::DayTime) => {
            let v = array.as_primitive::<IntervalDayTimeType>().value(row);
            json!(interval_string(0, v.days, i64::from(v.milliseconds) * 1_000_000))
        }
        DataType::Interval(IntervalUnit::MonthDayNano) => {
            let v = array.as_primitive::<IntervalMonthDayNanoType>().value(row);
            json!(interval_string(v.months, v.days, v.nanoseconds))
        }
        DataType::Struct(_) => {
            let arr = array.as_struct();
            let mut object = serde_json::Map::new();
            for (name, child) in arr.column_names().iter().zip(arr.columns()) {
                object.insert(name.to_string(), normalize_value(child.as_ref(), row, fmt)?);
            }
            Value::Object(object)
        }
        DataType::List(_) => list_value(&array.as_list::<i32>().value(row), fmt)?,
        DataType::LargeList(_) => list_value(&array.as_list::<i64>().value(row), fmt)?,
        DataType::FixedSizeList(_, _) => {
            list_value(&array.as_fixed_size_list().value(row), fmt)?
        }
        DataType::Map(_, _) => {
            let entries = array.as_map().value(row);
            let keys = entries.column(0);
            let values = entries.column(1);
            let mut object = serde_json::Map::new();
            for i in 0..entries.len() {
                let key = match normalize_value(keys.as_ref(), i, fmt)? {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                object.insert(key, normalize_value(values.as_ref(), i, fmt)?);
            }
            Value::Object(object)
        }
        // Nested dictionaries are not pre-cast by batch_to_rows
        DataType::Dictionary(_, value_type) => {
            let decoded = cast(array, value_type)?;
            normalize_value(decoded.as_ref(), row, fmt)?
        }
        _ => display_value(array, row)?,
    };
    Ok(value)
}

fn float_value(v: f64) -> Value {
    if v.is_finite() {
        json!(v)
    } else {
        // JSON has no NaN/inf; keep them visible instead of collapsing to null
        json!(v.to_string())
    }
}

fn bytes_value(bytes: &[u8]) -> Value {
    Value::Array(bytes.iter().map(|b| json!(b)).collect())
}

fn list_value(values: &ArrayRef, fmt: &DateTimeFormatSettings) -> Result<Value, DataError> {
    let mut items = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        items.push(normalize_value(values.as_ref(), i, fmt)?);
    }
    Ok(Value::Array(items))
}

fn display_value(array: &dyn Array, row: usize) -> Result<Value, DataError> {
    Ok(Value::String(array_value_to_string(array, row)?))
}

fn pattern_is_valid(pattern: &str) -> bool {
    !StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error))
}

/// Render an instant per the configured format; naive timestamps are taken
/// as UTC instants
fn format_datetime(dt: DateTime<Utc>, fmt: &DateTimeFormatSettings) -> String {
    match &fmt.format {
        DateTimeFormat::Iso8601 => {
            if fmt.use_utc {
                dt.to_rfc3339_opts(SecondsFormat::Millis, true)
            } else {
                dt.with_timezone(&Local).to_rfc3339_opts(SecondsFormat::Millis, false)
            }
        }
        DateTimeFormat::Rfc2822 => {
            if fmt.use_utc {
                dt.to_rfc2822()
            } else {
                dt.with_timezone(&Local).to_rfc2822()
            }
        }
        DateTimeFormat::Custom(pattern) if pattern_is_valid(pattern) => {
            if fmt.use_utc {
                dt.format(pattern).to_string()
            } else {
                dt.with_timezone(&Local).format(pattern).to_string()
            }
        }
        // A broken custom pattern would panic inside chrono's Display
        DateTimeFormat::Custom(_) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
    }
}

/// Render a calendar date (no instant, so the UTC flag does not apply)
fn format_date(date: NaiveDate, fmt: &DateTimeFormatSettings) -> String {
    match &fmt.format {
        DateTimeFormat::Iso8601 => date.format("%Y-%m-%d").to_string(),
        DateTimeFormat::Rfc2822 => date.format("%a, %d %b %Y").to_string(),
        DateTimeFormat::Custom(pattern) if pattern_is_valid(pattern) => {
            // Time specifiers in the pattern need a time of day to render
            date.and_time(NaiveTime::MIN).format(pattern).to_string()
        }
        DateTimeFormat::Custom(_) => date.format("%Y-%m-%d").to_string(),
    }
}

fn interval_string(months: i32, days: i32, nanos: i64) -> String {
    let mut parts = Vec::new();
    if months != 0 {
        parts.push(format!("{} mon", months));
    }
    if days != 0 {
        parts.push(format!("{} day", days));
    }
    if nanos != 0 || parts.is_empty() {
        let total_secs = nanos / 1_000_000_000;
        let hours = total_secs / 3_600;
        let mins = (total_secs % 3_600).abs() / 60;
        let secs = (total_secs % 60).abs();
        let sub_nanos = (nanos % 1_000_000_000).abs();
        if sub_nanos == 0 {
            parts.push(format!("{:02}:{:02}:{:02}", hours, mins, secs));
        } else {
            let frac = format!("{:09}", sub_nanos);
            parts.push(format!("{:02}:{:02}:{:02}.{}", hours, mins, secs, frac.trim_end_matches('0')));
        }
    }
    parts.join(" ")
}
