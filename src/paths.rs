use std::collections::{BTreeMap, BTreeSet};

use crate::{Result, WarehouseError};

/// File extensions objects may carry.
pub const VALID_FILE_TYPES: [&str; 2] = ["parquet", "json"];

/// Normalizes an object key.
///
/// Leading `/` and surrounding whitespace are removed and repeated `/`
/// collapsed. A non-empty key whose last segment has no `.` is treated as
/// a folder and gets a trailing `/`.
///
/// `"/us//data/20240217"` → `"us/data/20240217/"`, `"2024/02/data.json"` is
/// unchanged.
pub fn clean_path(path: &str) -> String {
    let segments: Vec<&str> = path
        .trim()
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect();
    let Some(last) = segments.last() else {
        return String::new();
    };

    let mut cleaned = segments.join("/");
    if !last.contains('.') {
        cleaned.push('/');
    }
    cleaned
}

/// Builds object keys from `{placeholder}` templates.
#[derive(Clone, Debug, Default)]
pub struct PathFactory;

impl PathFactory {
    pub fn new() -> Self {
        Self
    }

    /// Accepted file types, in the order they are reported in errors.
    pub fn valid_files(&self) -> &'static [&'static str] {
        &VALID_FILE_TYPES
    }

    /// Fills `template` with `parameters` and cleans the result.
    ///
    /// The placeholder names must equal the parameter keys. Values must be
    /// non-empty lowercase strings without `/` or spaces.
    pub fn generate<K, V>(&self, template: &str, parameters: &BTreeMap<K, V>) -> Result<String>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let parameters: BTreeMap<&str, &str> = parameters
            .iter()
            .map(|(key, value)| (key.as_ref(), value.as_ref()))
            .collect();

        validate_parameters(template, &parameters)?;
        let path = format_template(template, &parameters)?;
        validate_file_type(&path)?;
        Ok(clean_path(&path))
    }
}

/// Placeholder names in order of appearance.
pub fn find_template_params(template: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            break;
        };
        params.push(&after[..close]);
        rest = &after[close + 1..];
    }
    params
}

fn validate_parameters(template: &str, parameters: &BTreeMap<&str, &str>) -> Result<()> {
    let expected: BTreeSet<&str> = find_template_params(template).into_iter().collect();
    let provided: BTreeSet<&str> = parameters.keys().copied().collect();
    if expected != provided {
        return Err(WarehouseError::InvalidPath(
            "Template parameters should match parameter keys provided".to_owned(),
        ));
    }

    for value in parameters.values() {
        validate_parameter_value(value)?;
    }
    Ok(())
}

fn validate_parameter_value(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(WarehouseError::InvalidPath(
            "parameter value cannot be empty".to_owned(),
        ));
    }
    if value.contains('/') {
        return Err(WarehouseError::InvalidPath(format!(
            "{value} cannot contain '/'"
        )));
    }
    if value.to_lowercase() != value {
        return Err(WarehouseError::InvalidPath(format!(
            "{value} must be in lowercase"
        )));
    }
    if value.contains(' ') {
        return Err(WarehouseError::InvalidPath(format!(
            "{value} must not contain spaces"
        )));
    }
    Ok(())
}

/// Rejects an extension other than the accepted ones. Paths whose last
/// segment has no `.` are folders and pass.
pub(crate) fn validate_file_type(path: &str) -> Result<()> {
    let name = path.trim_end().rsplit('/').next().unwrap_or_default();
    let Some((_, extension)) = name.rsplit_once('.') else {
        return Ok(());
    };
    if VALID_FILE_TYPES.contains(&extension) {
        return Ok(());
    }
    Err(WarehouseError::UnsupportedFileType(format!(
        "Invalid file type '{extension}'. Accepted file types are {VALID_FILE_TYPES:?}"
    )))
}

fn format_template(template: &str, parameters: &BTreeMap<&str, &str>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            WarehouseError::InvalidPath(format!("unclosed placeholder in '{template}'"))
        })?;
        let name = &after[..close];
        let value = parameters.get(name).ok_or_else(|| {
            WarehouseError::InvalidPath(format!("no value for placeholder '{name}'"))
        })?;
        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
