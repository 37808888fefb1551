use serde_json::Value as JsonValue;

use crate::{
    wire::SqlParameter, Params, Result, TabularResult, Value, WarehouseError, WrappedValue,
};

/// Assembles wrapped-value rows into a column-oriented result.
///
/// Position `i` of every record belongs to `columns[i]`.
pub(crate) fn decode_records(
    columns: Vec<String>,
    records: Vec<Vec<WrappedValue>>,
) -> Result<TabularResult> {
    let mut data: Vec<Vec<Value>> = columns
        .iter()
        .map(|_| Vec::with_capacity(records.len()))
        .collect();

    for (row_index, record) in records.into_iter().enumerate() {
        if record.len() != columns.len() {
            return Err(WarehouseError::Decode(format!(
                "record {row_index} has {} fields, expected {}",
                record.len(),
                columns.len()
            )));
        }
        for (column, field) in data.iter_mut().zip(record) {
            column.push(decode_field(field)?);
        }
    }

    TabularResult::from_columns(columns, data)
}

/// Extracts the sole scalar from a wrapped value.
///
/// The tag only names the wire type. `isNull` and `blobValue` are the two
/// tags whose payload would otherwise be misread.
pub(crate) fn decode_field(field: WrappedValue) -> Result<Value> {
    let mut entries = field.into_iter();
    let (tag, value) = entries
        .next()
        .ok_or_else(|| WarehouseError::Decode("empty wrapped value".to_owned()))?;
    if entries.next().is_some() {
        return Err(WarehouseError::Decode(format!(
            "wrapped value has more than one tag (first: '{tag}')"
        )));
    }

    match (tag.as_str(), value) {
        ("isNull", JsonValue::Bool(true)) => Ok(Value::Null),
        ("isNull", other) => Err(WarehouseError::Decode(format!(
            "'isNull' tag must be true, got {other}"
        ))),
        ("blobValue", JsonValue::String(base64)) => Ok(Value::BlobBase64(base64)),
        (_, value) => decode_scalar(&tag, value),
    }
}

fn decode_scalar(tag: &str, value: JsonValue) -> Result<Value> {
    match value {
        JsonValue::Null => Ok(Value::Null),
        JsonValue::Bool(value) => Ok(Value::Bool(value)),
        JsonValue::String(value) => Ok(Value::Text(value)),
        JsonValue::Number(number) => {
            if let Some(value) = number.as_i64() {
                Ok(Value::Integer(value))
            } else if let Some(value) = number.as_f64() {
                Ok(Value::Float(value))
            } else {
                Err(WarehouseError::Decode(format!(
                    "number '{number}' under '{tag}' does not fit i64 or f64"
                )))
            }
        }
        other => Err(WarehouseError::Decode(format!(
            "non-scalar value under '{tag}': {other}"
        ))),
    }
}

pub(crate) fn build_parameters(params: Params) -> Result<Vec<SqlParameter>> {
    params
        .0
        .into_iter()
        .map(|(name, value)| {
            let name = normalize_parameter_name(&name)?;
            let value = value.to_parameter_string().ok_or_else(|| {
                WarehouseError::Decode(format!("parameter '{name}' cannot be NULL"))
            })?;
            Ok(SqlParameter { name, value })
        })
        .collect()
}

fn normalize_parameter_name(name: &str) -> Result<String> {
    let normalized = name.trim_start_matches(':');
    if normalized.is_empty() {
        return Err(WarehouseError::Decode(
            "named parameter name cannot be empty".to_owned(),
        ));
    }
    Ok(normalized.to_owned())
}
