//! Decoding of provider responses into entries.
//!
//! Providers serve a JSON array of objects:
//!
//! ```json
//! [{ "uuid": "…", "name": "Steve", "value": "eyJ0ZXh0…", "tags": "human,player" }]
//! ```
//!
//! `name` and `value` are required, `uuid` and `tags` are optional.

use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value};

use crate::error::MalformedDataError;
use crate::types::{Category, Entry, Tags, UniqueId};

/// Source of entry ids, shared by every parse of one store.
///
/// Ids are handed out in increasing order and never reused.
#[derive(Debug, Default)]
pub struct IdSequence(AtomicU64);

impl IdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }

    /// The id the next entry will receive.
    pub fn peek(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A decoded provider record that has not been assigned an id yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    pub unique_id: UniqueId,
    pub name: String,
    pub value: String,
    pub tags: Tags,
}

impl EntryRecord {
    pub fn into_entry(self, id: u64, category: Category) -> Entry {
        Entry::new(
            id,
            self.unique_id,
            self.name,
            self.value,
            self.tags,
            category,
        )
    }
}

/// Parse a provider response into entries of `category`,
/// taking ids from `ids`.
pub fn parse(
    text: &str,
    category: &Category,
    ids: &IdSequence,
) -> Result<Vec<Entry>, MalformedDataError> {
    let records = decode(text)?;
    Ok(records
        .into_iter()
        .map(|record| record.into_entry(ids.next_id(), category.clone()))
        .collect())
}

/// Decode a provider response without assigning ids.
pub fn decode(text: &str) -> Result<Vec<EntryRecord>, MalformedDataError> {
    let document: Value = serde_json::from_str(text).map_err(MalformedDataError::Json)?;
    let elements = match document {
        Value::Array(elements) => elements,
        other => {
            return Err(MalformedDataError::NotAnArray {
                found: json_type(&other),
            });
        },
    };

    elements
        .iter()
        .enumerate()
        .map(|(index, element)| {
            let object = element
                .as_object()
                .ok_or(MalformedDataError::NotAnObject { index })?;
            decode_record(index, object)
        })
        .collect()
}

fn decode_record(
    index: usize,
    object: &Map<String, Value>,
) -> Result<EntryRecord, MalformedDataError> {
    let required = |field: &'static str| {
        text_field(object, field).ok_or(MalformedDataError::MissingField { index, field })
    };

    let name = required("name")?;
    let value = required("value")?;
    let unique_id = UniqueId::resolve(text_field(object, "uuid").as_deref());
    let tags = match object.get("tags") {
        Some(Value::Array(tags)) => tags.iter().filter_map(as_text).collect(),
        Some(other) => match as_text(other) {
            Some(raw) => Tags::parse(&raw),
            None => Tags::placeholder(),
        },
        None => Tags::placeholder(),
    };

    Ok(EntryRecord {
        unique_id,
        name,
        value,
        tags,
    })
}

/// Reads a field as text, `null` counts as missing.
fn text_field(object: &Map<String, Value>, field: &str) -> Option<String> {
    object.get(field).and_then(as_text)
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use super::*;
    use crate::types::NO_TAGS_PLACEHOLDER;

    const STEVE_UUID: &str = "8667ba71-b85a-4004-af54-457a9734eed7";

    #[test]
    fn parses_complete_record() {
        let text = format!(
            r#"[{{"name":"Steve","value":"v1","uuid":"{STEVE_UUID}","tags":"human"}}]"#
        );
        let entries = parse(&text, &Category::HUMANS, &IdSequence::new()).unwrap();

        assert_eq!(entries, [Entry::new(
            0,
            UniqueId::Provided(Uuid::parse_str(STEVE_UUID).unwrap()),
            "Steve",
            "v1",
            Tags::parse("human"),
            Category::HUMANS,
        )]);
    }

    #[test]
    fn optional_fields_get_defaults() {
        let entries = parse(
            r#"[{"name":"Creeper","value":"v2"},{"name":"Zombie","value":"v3","uuid":null,"tags":null}]"#,
            &Category::MONSTERS,
            &IdSequence::new(),
        )
        .unwrap();

        for entry in &entries {
            assert!(entry.unique_id().is_generated());
            assert_eq!(entry.tags(), &Tags::placeholder());
            assert!(entry.tags().contains(NO_TAGS_PLACEHOLDER));
        }
    }

    #[test]
    fn malformed_uuid_is_replaced() {
        let entries = parse(
            r#"[{"name":"Oak Log","value":"v","uuid":"oak-log"}]"#,
            &Category::BLOCKS,
            &IdSequence::new(),
        )
        .unwrap();

        assert!(entries[0].unique_id().is_generated());
    }

    #[test]
    fn tags_as_array_are_accepted() {
        let records = decode(r#"[{"name":"A","value":"v","tags":["letter", " red "]}]"#).unwrap();
        assert_eq!(records[0].tags, Tags::parse("letter,red"));
    }

    #[test]
    fn non_string_scalars_are_read_as_text() {
        let records = decode(r#"[{"name":7,"value":true}]"#).unwrap();
        assert_eq!(records[0].name, "7");
        assert_eq!(records[0].value, "true");
    }

    #[test]
    fn ids_continue_across_parses() {
        let ids = IdSequence::new();
        let text = r#"[{"name":"A","value":"a"},{"name":"B","value":"b"}]"#;

        let first = parse(text, &Category::ALPHABET, &ids).unwrap();
        let second = parse(text, &Category::ALPHABET, &ids).unwrap();

        let ids = first
            .iter()
            .chain(&second)
            .map(Entry::id)
            .collect::<Vec<_>>();
        assert_eq!(ids, [0, 1, 2, 3]);
    }

    #[test]
    fn parsing_is_deterministic_except_for_ids() {
        let text = format!(
            r#"[{{"name":"Steve","value":"v1","uuid":"{STEVE_UUID}","tags":"human,player"}}]"#
        );
        let ids = IdSequence::new();
        let first = parse(&text, &Category::HUMANS, &ids).unwrap();
        let second = parse(&text, &Category::HUMANS, &IdSequence::new()).unwrap();

        assert_eq!(first, second);

        let third = parse(&text, &Category::HUMANS, &ids).unwrap();
        assert_ne!(first[0].id(), third[0].id());
        assert_eq!(first[0].unique_id(), third[0].unique_id());
        assert_eq!(first[0].tags(), third[0].tags());
    }

    #[test]
    fn invalid_json_is_rejected() {
        let result = decode("<html>502 Bad Gateway</html>");
        assert!(
            matches!(result, Err(MalformedDataError::Json(_))),
            "expected MalformedDataError::Json, found: {result:?}"
        );
    }

    #[test]
    fn non_array_document_is_rejected() {
        let result = decode(r#"{"error":"unknown category"}"#);
        assert!(
            matches!(result, Err(MalformedDataError::NotAnArray {
                found: "an object"
            })),
            "expected MalformedDataError::NotAnArray, found: {result:?}"
        );
    }

    #[test]
    fn non_object_element_is_rejected() {
        let result = decode(r#"[{"name":"A","value":"a"}, "B"]"#);
        assert!(
            matches!(result, Err(MalformedDataError::NotAnObject { index: 1 })),
            "expected MalformedDataError::NotAnObject, found: {result:?}"
        );
    }

    #[test]
    fn missing_required_field_is_rejected() {
        let result = decode(r#"[{"name":"A"}]"#);
        assert!(
            matches!(result, Err(MalformedDataError::MissingField {
                index: 0,
                field: "value"
            })),
            "expected MalformedDataError::MissingField, found: {result:?}"
        );
    }

    #[test]
    fn empty_array_has_no_entries() {
        let ids = IdSequence::new();
        assert!(parse("[]", &Category::PLANTS, &ids).unwrap().is_empty());
        assert_eq!(ids.peek(), 0);
    }
}
