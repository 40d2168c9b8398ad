//! PV name record-field parsing.
//!
//! A channel name can address a record field (`x.NAME`), request
//! long-string access (`x.NAME$`), or attach a server-side channel filter
//! (`x.VAL{"ts":true}`). Parsing splits those apart; filter validation is
//! separate because malformed filters are accepted syntactically and
//! rejected only when interpreted.

use bitflags::bitflags;

use crate::error::Error;

bitflags! {
    /// Modifiers a channel name can carry.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct RecordModifiers: u8 {
        /// `$` suffix: access a string field as a char array.
        const LONG_STRING = 0x01;
        /// `{...}` suffix: server-side channel filter.
        const FILTERED = 0x02;
    }
}

/// A channel name taken apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord {
    /// The name to put on the wire (`record.FIELD` without modifiers).
    pub pvname: String,
    pub record: String,
    pub field: Option<String>,
    pub modifiers: RecordModifiers,
    /// The raw filter text, when FILTERED is set.
    pub filter_text: Option<String>,
}

/// Split a channel name into record, field, and modifiers.
pub fn parse_record_field(name: &str) -> ParsedRecord {
    let Some((record, rest)) = name.split_once('.') else {
        return ParsedRecord {
            pvname: name.to_string(),
            record: name.to_string(),
            field: None,
            modifiers: RecordModifiers::empty(),
            filter_text: None,
        };
    };

    let mut modifiers = RecordModifiers::empty();
    let (mut field_part, filter_text) = match rest.find('{') {
        Some(at) => {
            modifiers |= RecordModifiers::FILTERED;
            (&rest[..at], Some(rest[at..].to_string()))
        }
        None => (rest, None),
    };
    if let Some(stripped) = field_part.strip_suffix('$') {
        modifiers |= RecordModifiers::LONG_STRING;
        field_part = stripped;
    }

    let field = (!field_part.is_empty()).then(|| field_part.to_string());
    let pvname = match &field {
        Some(field) => format!("{}.{}", record, field),
        None => record.to_string(),
    };
    ParsedRecord {
        pvname,
        record: record.to_string(),
        field,
        modifiers,
        filter_text,
    }
}

/// The filter names servers interpret.
const KNOWN_FILTERS: &[&str] = &["ts", "dbnd", "arr", "sync"];

/// Validate a channel filter: a JSON object whose keys are known filter
/// names.
pub fn parse_channel_filter(
    text: &str,
) -> Result<serde_json::Map<String, serde_json::Value>, Error> {
    let value: serde_json::Value = serde_json::from_str(text)
        .map_err(|e| Error::BadFilter(format!("filter is not valid JSON: {}", e)))?;
    let object = match value {
        serde_json::Value::Object(object) => object,
        other => {
            return Err(Error::BadFilter(format!(
                "filter must be a JSON object, got {}",
                other
            )));
        }
    };
    for key in object.keys() {
        if !KNOWN_FILTERS.contains(&key.as_str()) {
            return Err(Error::BadFilter(format!("unknown filter {:?}", key)));
        }
    }
    Ok(object)
}
