//! Compact field specification parser.
//!
//! A spec looks like `generic:hostname,labels;aws:aws_device_type`: field sets
//! separated by `;`, each naming an adapter and a comma-joined field list.
//! Whitespace around every token is ignored and empty segments are skipped.
//! The output keeps first-seen order and drops repeated fields per adapter.

use crate::domain::fields::FieldSelection;
use crate::errors::FieldSpecError;

pub const DEFAULT_DEVICE_FIELDS: &str = "generic:last_seen,labels,hostname,network_interfaces";
pub const DEFAULT_USER_FIELDS: &str = "generic:last_seen,labels,username,mail";

pub fn device_fields_example() -> String {
    format!("example device fields: '{DEFAULT_DEVICE_FIELDS};aws:aws_device_type'")
}

pub fn user_fields_example() -> String {
    format!("example user fields: '{DEFAULT_USER_FIELDS};active_directory:last_bad_logon'")
}

/// Parses `spec` into an unresolved selection. `example` is echoed back in
/// error messages so the operator can see the expected shape.
pub fn parse_field_spec(spec: &str, example: &str) -> Result<FieldSelection, FieldSpecError> {
    let mut selection = FieldSelection::new();
    for field_set in split_trimmed(spec, ';') {
        parse_field_set(&mut selection, field_set, example)?;
    }
    Ok(selection)
}

fn parse_field_set(
    selection: &mut FieldSelection,
    field_set: &str,
    example: &str,
) -> Result<(), FieldSpecError> {
    let malformed = || FieldSpecError::MalformedFieldSet {
        segment: field_set.to_owned(),
        example: example.to_owned(),
    };

    let (adapter, fields) = field_set.split_once(':').ok_or_else(malformed)?;
    let (adapter, fields) = (adapter.trim(), fields.trim());
    if adapter.is_empty() || fields.is_empty() {
        return Err(malformed());
    }

    let fields = split_trimmed(fields, ',').collect::<Vec<_>>();
    if fields.is_empty() {
        return Err(FieldSpecError::EmptyFieldList {
            segment: field_set.to_owned(),
            example: example.to_owned(),
        });
    }

    for field in fields {
        selection.add(adapter, field);
    }
    Ok(())
}

pub(crate) fn split_trimmed(input: &str, separator: char) -> impl Iterator<Item = &str> {
    input.split(separator).map(str::trim).filter(|segment| !segment.is_empty())
}
