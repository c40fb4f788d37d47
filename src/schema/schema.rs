use serde::{Serialize, Deserialize};
use crate::analysis::analyzer::{Analyzer, AnalyzerConfig};
use crate::core::error::{Error, Result};
use crate::core::types::{Document, FieldValue};

/// Per-field kind; fixed when the index is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    /// Analyzed full text, positions kept for phrases and highlighting
    Text,
    /// Indexed as a single verbatim term (identifiers, paths, tags)
    Keyword,
    /// Numeric value usable for range filters and sorting
    Numeric,
    /// Kept verbatim for display, never searchable
    StoredOnly,
}

/// Field definition with analyzer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    pub field_type: FieldType,
    pub stored: bool,
    pub required: bool,
    pub analyzer: AnalyzerConfig,  // Only consulted for Text fields
}

impl FieldDefinition {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        FieldDefinition {
            name: name.to_string(),
            field_type,
            stored: true,
            required: false,
            analyzer: AnalyzerConfig::default(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn not_stored(mut self) -> Self {
        self.stored = false;
        self
    }

    pub fn with_analyzer(mut self, analyzer: AnalyzerConfig) -> Self {
        self.analyzer = analyzer;
        self
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self.field_type, FieldType::Text | FieldType::Keyword)
    }

    pub fn build_analyzer(&self) -> Analyzer {
        match self.field_type {
            FieldType::Keyword => Analyzer::keyword(),
            _ => Analyzer::from_config(&self.analyzer),
        }
    }
}

/// Explicitly declared document schema, persisted as `meta/schema.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<FieldDefinition>,
}

impl Schema {
    pub fn new() -> Self {
        Schema { fields: Vec::new() }
    }

    pub fn add_field(mut self, field: FieldDefinition) -> Self {
        self.fields.retain(|f| f.name != field.name);
        self.fields.push(field);
        self
    }

    pub fn add_text_field(self, name: &str, analyzer: AnalyzerConfig) -> Self {
        self.add_field(FieldDefinition::new(name, FieldType::Text).with_analyzer(analyzer))
    }

    pub fn add_keyword_field(self, name: &str) -> Self {
        self.add_field(FieldDefinition::new(name, FieldType::Keyword))
    }

    pub fn add_numeric_field(self, name: &str) -> Self {
        self.add_field(FieldDefinition::new(name, FieldType::Numeric))
    }

    pub fn add_stored_field(self, name: &str) -> Self {
        self.add_field(FieldDefinition::new(name, FieldType::StoredOnly))
    }

    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Text and keyword fields, in declaration order
    pub fn indexed_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.is_indexed())
    }

    pub fn numeric_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields.iter().filter(|f| f.field_type == FieldType::Numeric)
    }

    pub fn validate(&self) -> Result<()> {
        if self.fields.is_empty() {
            return Err(Error::invalid_argument("schema declares no fields"));
        }
        for field in &self.fields {
            if field.name.is_empty() || field.name.contains('\0') || field.name.contains(':') {
                return Err(Error::invalid_argument(
                    format!("invalid field name '{}'", field.name)));
            }
        }
        Ok(())
    }

    /// Check a document before it is buffered; failures are write errors
    pub fn check_document(&self, doc: &Document) -> Result<()> {
        for (name, value) in &doc.fields {
            let field = self.field(name)
                .ok_or_else(|| Error::write(format!("unknown field '{}'", name)))?;

            let matches_kind = match (field.field_type, value) {
                (FieldType::Numeric, FieldValue::Number(n)) => n.is_finite(),
                (FieldType::Numeric, FieldValue::Text(_)) => false,
                (_, FieldValue::Text(_)) => true,
                (_, FieldValue::Number(_)) => false,
            };
            if !matches_kind {
                return Err(Error::write(format!(
                    "value of field '{}' does not match its kind {:?}", name, field.field_type)));
            }
        }

        for field in self.fields.iter().filter(|f| f.required) {
            if !doc.fields.contains_key(&field.name) {
                return Err(Error::write(format!("missing required field '{}'", field.name)));
            }
        }
        Ok(())
    }
}
