//! Query filter text for fetch-by-field lookups.

use axonbot_core::FieldLookup;

/// Builds `(adapter:field == "value")`, or the case-insensitive regex form
/// when the lookup asked for one.
pub fn field_filter(lookup: &FieldLookup) -> String {
    let value = escape_value(&lookup.value);
    if lookup.is_regex {
        format!("({}:{} == regex(\"{value}\", \"i\"))", lookup.adapter, lookup.field)
    } else {
        format!("({}:{} == \"{value}\")", lookup.adapter, lookup.field)
    }
}

fn escape_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use axonbot_core::FieldLookup;

    use super::field_filter;

    #[test]
    fn literal_lookup_builds_equality_filter() {
        let lookup = FieldLookup::from_raw_value("generic", "hostname", "web-01");
        assert_eq!(field_filter(&lookup), r#"(generic:hostname == "web-01")"#);
    }

    #[test]
    fn regex_lookup_is_case_insensitive_and_strips_prefix() {
        let lookup = FieldLookup::from_raw_value("generic", "network_interfaces.mac", "re=^00:1a");
        assert_eq!(
            field_filter(&lookup),
            r#"(generic:network_interfaces.mac == regex("^00:1a", "i"))"#
        );
    }

    #[test]
    fn quotes_and_backslashes_are_escaped() {
        let lookup = FieldLookup::from_raw_value("generic", "username", r#"corp\"admin""#);
        assert_eq!(field_filter(&lookup), r#"(generic:username == "corp\\\"admin\"")"#);
    }
}
