// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Field properties and index mappings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::MappingError;
use crate::template::DynamicTemplate;
use crate::types::{DynamicMode, FieldType};

/// Reserved document id field.
pub const ID_FIELD: &str = "_id";
/// Reserved document timestamp field.
pub const TIMESTAMP_FIELD: &str = "_timestamp";

static ID_PROPERTY: Property = Property {
    field_type: Some(FieldType::Keyword),
    dynamic: Some(DynamicMode::Strict),
    format: None,
    index: true,
    store: true,
};

static TIMESTAMP_PROPERTY: Property = Property {
    field_type: Some(FieldType::Date),
    dynamic: Some(DynamicMode::Strict),
    format: None,
    index: true,
    store: true,
};

/// The reserved property for `name`, if it is one of `_id`/`_timestamp`.
pub fn reserved_property(name: &str) -> Option<&'static Property> {
    match name {
        ID_FIELD => Some(&ID_PROPERTY),
        TIMESTAMP_FIELD => Some(&TIMESTAMP_PROPERTY),
        _ => None,
    }
}

fn yes() -> bool {
    true
}

fn is_true(b: &bool) -> bool {
    *b
}

/// Declared settings of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub field_type: Option<FieldType>,
    /// Overrides the index-level dynamic mode for this field and its
    /// children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic: Option<DynamicMode>,
    /// chrono layout for `date` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    #[serde(default = "yes", skip_serializing_if = "is_true")]
    pub index: bool,
    #[serde(default = "yes", skip_serializing_if = "is_true")]
    pub store: bool,
}

impl Default for Property {
    fn default() -> Self {
        Self {
            field_type: None,
            dynamic: None,
            format: None,
            index: true,
            store: true,
        }
    }
}

impl Property {
    pub fn typed(field_type: FieldType) -> Self {
        Self {
            field_type: Some(field_type),
            ..Default::default()
        }
    }

    pub fn with_dynamic(mut self, dynamic: DynamicMode) -> Self {
        self.dynamic = Some(dynamic);
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }
}

/// The schema of an index.
///
/// `properties` holds user fields only; `_id` and `_timestamp` are always
/// present through [`Mappings::property`] and can not be redeclared.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Mappings {
    #[serde(default)]
    pub dynamic: DynamicMode,
    #[serde(default)]
    pub properties: BTreeMap<String, Property>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dynamic_templates: Vec<DynamicTemplate>,
}

impl Mappings {
    pub fn new(dynamic: DynamicMode) -> Self {
        Self {
            dynamic,
            ..Default::default()
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, property: Property) -> Self {
        self.properties.insert(name.into(), property);
        self
    }

    pub fn with_template(mut self, template: DynamicTemplate) -> Self {
        self.dynamic_templates.push(template);
        self
    }

    /// Parse mappings from their JSON form and validate them.
    pub fn from_json(value: serde_json::Value) -> Result<Self, MappingError> {
        let mappings: Mappings = serde_json::from_value(value)
            .map_err(|e| MappingError::Unsupported(format!("mappings: {e}")))?;
        mappings.validate()?;
        Ok(mappings)
    }

    /// Property of `name`, including the reserved fields.
    pub fn property(&self, name: &str) -> Option<&Property> {
        reserved_property(name).or_else(|| self.properties.get(name))
    }

    /// Check the mappings can be used by an index.
    pub fn validate(&self) -> Result<(), MappingError> {
        for name in self.properties.keys() {
            if reserved_property(name).is_some() {
                return Err(MappingError::ReservedField(name.clone()));
            }
            if name.is_empty() || name.split('.').any(str::is_empty) {
                return Err(MappingError::invalid_field(name, "empty field name segment"));
            }
        }
        if self.dynamic == DynamicMode::Strict && self.properties.is_empty() {
            return Err(MappingError::EmptyMappings);
        }
        Ok(())
    }
}
