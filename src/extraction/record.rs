use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

use super::schema::ExtractionSchema;

/// Best-effort extraction result.
///
/// Keys always equal the schema's field names in declared order. Values are
/// `None` when the completion could not be parsed; `raw_text` is the verbatim
/// completion either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedRecord {
    fields: Vec<(String, Option<String>)>,
    raw_text: String,
    parse_error: Option<String>,
}

impl ExtractedRecord {
    /// Record with every declared field populated.
    pub(crate) fn parsed(fields: Vec<(String, String)>, raw_text: String) -> Self {
        Self {
            fields: fields.into_iter().map(|(k, v)| (k, Some(v))).collect(),
            raw_text,
            parse_error: None,
        }
    }

    /// Record with every declared field unset.
    pub(crate) fn unparsed(schema: &ExtractionSchema, raw_text: String, error: String) -> Self {
        Self {
            fields: schema.field_names().map(|n| (n.to_string(), None)).collect(),
            raw_text,
            parse_error: Some(error),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| v.as_deref())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    /// Why structured parsing failed, if it did.
    pub fn parse_error(&self) -> Option<&str> {
        self.parse_error.as_deref()
    }

    pub fn is_parsed(&self) -> bool {
        self.parse_error.is_none()
    }

    /// `key: value` lines for embedding in later prompts; falls back to the raw text.
    pub fn to_prompt_text(&self) -> String {
        if !self.is_parsed() {
            return self.raw_text.clone();
        }
        self.fields
            .iter()
            .map(|(k, v)| format!("{k}: {}", v.as_deref().unwrap_or_default()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Fields keep declared order in serialized output.
struct OrderedFields<'a>(&'a [(String, Option<String>)]);

impl Serialize for OrderedFields<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl Serialize for ExtractedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ExtractedRecord", 3)?;
        state.serialize_field("fields", &OrderedFields(&self.fields))?;
        state.serialize_field("raw_text", &self.raw_text)?;
        state.serialize_field("parse_error", &self.parse_error)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialization_preserves_field_order() {
        let record = ExtractedRecord::parsed(
            vec![
                ("zeta".into(), "1".into()),
                ("alpha".into(), "2".into()),
            ],
            "{}".into(),
        );
        let json = serde_json::to_string(&record).expect("serializable");
        let zeta = json.find("zeta").expect("zeta present");
        let alpha = json.find("alpha").expect("alpha present");
        assert!(zeta < alpha);
    }

    #[test]
    fn test_unparsed_prompt_text_falls_back_to_raw() {
        let schema = ExtractionSchema::from_pairs([("date", "d")]).expect("valid");
        let record = ExtractedRecord::unparsed(&schema, "garbled".into(), "no json".into());
        assert_eq!(record.to_prompt_text(), "garbled");
        assert_eq!(record.get("date"), None);
        assert_eq!(record.keys().collect::<Vec<_>>(), vec!["date"]);
    }
}
