//! Declared fields for structured extraction.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::prompt::Bindings;

/// One named field and its natural-language description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub description: String,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("extraction schema declares no fields")]
    Empty,
    #[error("field names must not be blank")]
    BlankName,
    #[error("field '{0}' is declared more than once")]
    DuplicateField(String),
}

/// Ordered, uniquely named set of fields to pull out of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionSchema {
    fields: Vec<FieldSpec>,
}

impl ExtractionSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, SchemaError> {
        if fields.is_empty() {
            return Err(SchemaError::Empty);
        }
        let mut seen = HashSet::new();
        for field in &fields {
            if field.name.trim().is_empty() {
                return Err(SchemaError::BlankName);
            }
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField(field.name.clone()));
            }
        }
        Ok(Self { fields })
    }

    /// Build from `(name, description)` pairs.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, SchemaError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(name, description)| FieldSpec::new(name, description))
                .collect(),
        )
    }

    /// The Affidavit of Heirship fields title examiners check first.
    pub fn affidavit_of_heirship() -> Self {
        Self {
            fields: vec![
                FieldSpec::new("date_affidavit", "Date of Affidavit"),
                FieldSpec::new("deceased_death_date", "Date of death of the decedent"),
                FieldSpec::new("deceased_death_place", "Place of death of the decedent"),
                FieldSpec::new(
                    "deceased_residence",
                    "Decedent's place of residence at time of death",
                ),
                FieldSpec::new("deceased_marital", "Decedent's complete marital history"),
                FieldSpec::new(
                    "children_all",
                    "All children born to, adopted by, or raised in the home of the decedent and whether or not living",
                ),
            ],
        }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// `name: description` lines, one blank line between entries.
    pub fn details(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("{}: {}\n", f.name, f.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Field names, one per line.
    pub fn keys(&self) -> String {
        self.field_names().collect::<Vec<_>>().join("\n")
    }

    /// Template bindings for the `details` and `keys` placeholders.
    pub fn bindings(&self) -> Bindings {
        let mut bindings = Bindings::new();
        bindings.insert("details".to_string(), self.details());
        bindings.insert("keys".to_string(), self.keys());
        bindings
    }
}

impl Default for ExtractionSchema {
    fn default() -> Self {
        Self::affidavit_of_heirship()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_fields_rejected() {
        let err = ExtractionSchema::from_pairs([("date", "a"), ("date", "b")])
            .expect_err("duplicate names");
        assert_eq!(err, SchemaError::DuplicateField("date".into()));
    }

    #[test]
    fn test_empty_and_blank_rejected() {
        assert_eq!(ExtractionSchema::new(vec![]), Err(SchemaError::Empty));
        assert_eq!(
            ExtractionSchema::from_pairs([(" ", "x")]),
            Err(SchemaError::BlankName)
        );
    }

    #[test]
    fn test_details_and_keys_keep_declared_order() {
        let schema = ExtractionSchema::from_pairs([("b", "second"), ("a", "first")])
            .expect("valid schema");
        assert_eq!(schema.keys(), "b\na");
        assert_eq!(schema.details(), "b: second\n\na: first\n");
    }

    #[test]
    fn test_default_schema_has_six_fields() {
        let schema = ExtractionSchema::default();
        assert_eq!(schema.len(), 6);
        assert_eq!(schema.field_names().next(), Some("date_affidavit"));
    }
}
