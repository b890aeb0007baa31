// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Mapping resolution.
//
// For every scalar in a document the resolver decides the field's type, in
// this order: field-level dynamic override (own or nearest ancestor), the
// explicit property type, then the effective dynamic mode. In `dynamic` mode
// the first matching dynamic template wins, else the type is deduced from
// the value. The value is then checked against the type, and fields typed
// for the first time become pending promotions.
//
// Resolution never mutates `Mappings`; promotions are returned and merged by
// the owner of the mappings under its write lock.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::MappingError;
use crate::property::{Mappings, Property};
use crate::types::{DynamicMode, FieldType, ValueKind};

/// Fields first typed during resolution, keyed by dotted path.
pub type Promotions = BTreeMap<String, Property>;

/// Resolved type per dotted field path. `None` marks a field kept in
/// `_source` without a type.
pub type ResolvedFields = BTreeMap<String, Option<FieldType>>;

impl Mappings {
    /// Resolve and check one document.
    ///
    /// `pending` holds promotions from earlier documents of the same batch;
    /// they constrain this document like declared properties do. On success
    /// this document's own promotions are added to it; on error `pending` is
    /// left untouched.
    pub fn resolve_document(
        &self,
        doc: &Map<String, Value>,
        pending: &mut Promotions,
    ) -> Result<ResolvedFields, MappingError> {
        let mut cx = DocumentResolver {
            mappings: self,
            pending: &*pending,
            local: Promotions::new(),
            resolved: ResolvedFields::new(),
        };
        for (name, value) in doc {
            cx.visit(name, value)?;
        }

        let DocumentResolver {
            local, resolved, ..
        } = cx;
        pending.extend(local);
        Ok(resolved)
    }

    /// Resolve every document of a batch. The first invalid field fails the
    /// whole batch. Returns the promotions the batch would make.
    pub fn resolve_batch<'a, I>(&self, docs: I) -> Result<Promotions, MappingError>
    where
        I: IntoIterator<Item = &'a Map<String, Value>>,
    {
        let mut pending = Promotions::new();
        for doc in docs {
            self.resolve_document(doc, &mut pending)?;
        }
        Ok(pending)
    }

    /// Merge promotions into `properties`. Typed fields already present are
    /// left as they are; a field declared with only a `dynamic` override
    /// takes the promoted type and keeps its override. Returns the names
    /// actually typed.
    pub fn merge(&mut self, promotions: Promotions) -> Vec<String> {
        let mut added = Vec::new();
        for (name, property) in promotions {
            match self.properties.entry(name) {
                Entry::Vacant(slot) => {
                    debug!(field = %slot.key(), field_type = ?property.field_type, "promoting field");
                    added.push(slot.key().clone());
                    slot.insert(property);
                }
                Entry::Occupied(mut slot) if slot.get().field_type.is_none() => {
                    debug!(field = %slot.key(), field_type = ?property.field_type, "typing declared field");
                    added.push(slot.key().clone());
                    let existing = slot.get_mut();
                    existing.field_type = property.field_type;
                    if existing.format.is_none() {
                        existing.format = property.format;
                    }
                }
                Entry::Occupied(_) => {}
            }
        }
        added
    }
}

struct DocumentResolver<'a> {
    mappings: &'a Mappings,
    pending: &'a Promotions,
    local: Promotions,
    resolved: ResolvedFields,
}

impl DocumentResolver<'_> {
    fn lookup(&self, field: &str) -> Option<&Property> {
        self.mappings
            .property(field)
            .or_else(|| self.pending.get(field))
            .or_else(|| self.local.get(field))
    }

    /// Like `lookup`, but skips entries that only carry a `dynamic` override.
    fn typed(&self, field: &str) -> Option<&Property> {
        let has_type = |p: &&Property| p.field_type.is_some();
        self.mappings
            .property(field)
            .filter(has_type)
            .or_else(|| self.pending.get(field).filter(has_type))
            .or_else(|| self.local.get(field).filter(has_type))
    }

    /// Own override, else the nearest ancestor's, else the index mode.
    fn effective_dynamic(&self, field: &str) -> DynamicMode {
        let mut path = field;
        loop {
            if let Some(mode) = self.lookup(path).and_then(|p| p.dynamic) {
                return mode;
            }
            match path.rfind('.') {
                Some(dot) => path = &path[..dot],
                None => return self.mappings.dynamic,
            }
        }
    }

    fn visit(&mut self, field: &str, value: &Value) -> Result<(), MappingError> {
        match value {
            Value::Null => Ok(()),
            Value::Array(items) => items.iter().try_for_each(|item| self.visit(field, item)),
            Value::Object(children) => {
                if let Some(field_type) = self.typed(field).and_then(|p| p.field_type) {
                    return Err(MappingError::invalid_field(
                        field,
                        format!("expected {field_type}, got object"),
                    ));
                }
                children
                    .iter()
                    .try_for_each(|(name, child)| self.visit(&format!("{field}.{name}"), child))
            }
            scalar => self.resolve_scalar(field, scalar),
        }
    }

    fn resolve_scalar(&mut self, field: &str, value: &Value) -> Result<(), MappingError> {
        let declared = self.typed(field).cloned();

        let (property, is_new) = match declared {
            Some(property) => (property, false),
            None => match self.effective_dynamic(field) {
                DynamicMode::Ignore => {
                    self.resolved.insert(field.to_string(), None);
                    return Ok(());
                }
                DynamicMode::Strict => {
                    return Err(MappingError::invalid_field(
                        field,
                        "field is not declared and dynamic mode is strict",
                    ));
                }
                DynamicMode::Dynamic => (self.dynamic_property(field, value)?, true),
            },
        };

        let field_type = match property.field_type {
            Some(t) => t,
            None => return Err(MappingError::invalid_field(field, "no type could be resolved")),
        };
        field_type
            .check(value, property.format.as_deref())
            .map_err(|reason| MappingError::invalid_field(field, reason))?;

        if is_new {
            self.local.insert(field.to_string(), property);
        }
        self.resolved.insert(field.to_string(), Some(field_type));
        Ok(())
    }

    /// Type a new field from the first matching template or the value kind.
    fn dynamic_property(&self, field: &str, value: &Value) -> Result<Property, MappingError> {
        let kind = ValueKind::of(value)
            .ok_or_else(|| MappingError::invalid_field(field, "cannot deduce a type"))?;

        let mut property = self
            .mappings
            .dynamic_templates
            .iter()
            .find(|t| t.matches(field, kind))
            .map(|t| t.rule().mapping.clone())
            .unwrap_or_default();

        property.field_type.get_or_insert(kind.deduced_type());
        property.dynamic.get_or_insert(DynamicMode::Dynamic);
        Ok(property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::DynamicTemplate;
    use crate::types::NumericKind;
    use serde_json::json;

    fn doc(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("document must be an object"),
        }
    }

    #[test]
    fn test_strict_rejects_bad_integer_without_promotion() {
        let mappings = Mappings::new(DynamicMode::Strict)
            .with_property("age", Property::typed(FieldType::Numeric(NumericKind::Integer)));

        let mut pending = Promotions::new();
        let err = mappings
            .resolve_document(&doc(json!({"age": "not a number"})), &mut pending)
            .unwrap_err();
        assert!(matches!(err, MappingError::InvalidField { ref field, .. } if field == "age"));
        assert!(pending.is_empty());

        let err = mappings
            .resolve_document(&doc(json!({"name": "x"})), &mut pending)
            .unwrap_err();
        assert!(matches!(err, MappingError::InvalidField { ref field, .. } if field == "name"));
    }

    #[test]
    fn test_dynamic_promotes_double() {
        let mut mappings = Mappings::new(DynamicMode::Dynamic);
        let promotions = mappings
            .resolve_batch([&doc(json!({"score": 3.14}))])
            .unwrap();

        let score = &promotions["score"];
        assert_eq!(score.field_type, Some(FieldType::Numeric(NumericKind::Double)));
        assert_eq!(score.dynamic, Some(DynamicMode::Dynamic));

        assert_eq!(mappings.merge(promotions), vec!["score".to_string()]);
        assert_eq!(
            serde_json::to_value(&mappings.properties["score"]).unwrap(),
            json!({"type": "double", "dynamic": "true"})
        );
    }

    #[test]
    fn test_template_beats_deduction() {
        let template: DynamicTemplate = serde_json::from_value(json!({
            "status": {
                "match": "^status_*",
                "match_mapping_type": "string",
                "mapping": { "type": "keyword" }
            }
        }))
        .unwrap();
        let mappings = Mappings::new(DynamicMode::Dynamic).with_template(template);

        let mut pending = Promotions::new();
        let resolved = mappings
            .resolve_document(
                &doc(json!({"status_code": "OK", "message": "all good"})),
                &mut pending,
            )
            .unwrap();
        assert_eq!(resolved["status_code"], Some(FieldType::Keyword));
        assert_eq!(resolved["message"], Some(FieldType::Text));
        assert_eq!(pending["status_code"].field_type, Some(FieldType::Keyword));
    }

    #[test]
    fn test_explicit_type_beats_template() {
        let template: DynamicTemplate = serde_json::from_value(json!({
            "everything_keyword": { "mapping": { "type": "keyword" } }
        }))
        .unwrap();
        let mappings = Mappings::new(DynamicMode::Dynamic)
            .with_property("body", Property::typed(FieldType::Text))
            .with_template(template);

        let resolved = mappings
            .resolve_document(&doc(json!({"body": "hello", "tag": "x"})), &mut Promotions::new())
            .unwrap();
        assert_eq!(resolved["body"], Some(FieldType::Text));
        assert_eq!(resolved["tag"], Some(FieldType::Keyword));
    }

    #[test]
    fn test_ignore_keeps_field_untyped() {
        let mappings = Mappings::new(DynamicMode::Ignore);
        let mut pending = Promotions::new();
        let resolved = mappings
            .resolve_document(&doc(json!({"anything": {"goes": [1, "two"]}})), &mut pending)
            .unwrap();
        assert_eq!(resolved["anything.goes"], None);
        assert!(pending.is_empty());
    }

    #[test]
    fn test_field_override_applies_to_children() {
        let mappings = Mappings::new(DynamicMode::Strict)
            .with_property("id_like", Property::typed(FieldType::Keyword))
            .with_property("labels", Property::default().with_dynamic(DynamicMode::Dynamic))
            .with_property("debug", Property::default().with_dynamic(DynamicMode::Ignore));

        let mut pending = Promotions::new();
        let resolved = mappings
            .resolve_document(
                &doc(json!({
                    "id_like": "a",
                    "labels": {"team": "core", "tier": 2},
                    "debug": {"trace": "..."}
                })),
                &mut pending,
            )
            .unwrap();

        assert_eq!(resolved["labels.team"], Some(FieldType::Text));
        assert_eq!(resolved["labels.tier"], Some(FieldType::Numeric(NumericKind::Long)));
        assert_eq!(resolved["debug.trace"], None);
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn test_override_only_field_is_typed_once() {
        let mut mappings = Mappings::new(DynamicMode::Strict)
            .with_property("labels", Property::default().with_dynamic(DynamicMode::Dynamic));

        let err = mappings
            .resolve_batch([&doc(json!({"labels": 5})), &doc(json!({"labels": "text"}))])
            .unwrap_err();
        assert!(matches!(err, MappingError::InvalidField { ref field, .. } if field == "labels"));

        let promotions = mappings.resolve_batch([&doc(json!({"labels": 5}))]).unwrap();
        assert_eq!(mappings.merge(promotions), vec!["labels".to_string()]);
        let labels = &mappings.properties["labels"];
        assert_eq!(labels.field_type, Some(FieldType::Numeric(NumericKind::Long)));
        assert_eq!(labels.dynamic, Some(DynamicMode::Dynamic));

        assert!(mappings.resolve_batch([&doc(json!({"labels": "text"}))]).is_err());
        assert!(mappings
            .resolve_batch([&doc(json!({"labels": 7}))])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_promotion_constrains_later_documents() {
        let mappings = Mappings::new(DynamicMode::Dynamic);
        let batch = [doc(json!({"count": 1})), doc(json!({"count": "many"}))];

        let err = mappings.resolve_batch(batch.iter()).unwrap_err();
        assert!(matches!(err, MappingError::InvalidField { ref field, .. } if field == "count"));
    }

    #[test]
    fn test_arrays_check_every_element() {
        let mappings = Mappings::new(DynamicMode::Dynamic)
            .with_property("ports", Property::typed(FieldType::Numeric(NumericKind::Integer)));

        assert!(mappings
            .resolve_batch([&doc(json!({"ports": [80, 443], "tags": [], "note": null}))])
            .is_ok());
        assert!(mappings
            .resolve_batch([&doc(json!({"ports": [80, "http"]}))])
            .is_err());
    }

    #[test]
    fn test_object_for_typed_field_is_invalid() {
        let mappings = Mappings::new(DynamicMode::Dynamic)
            .with_property("user", Property::typed(FieldType::Keyword));
        let err = mappings
            .resolve_batch([&doc(json!({"user": {"name": "x"}}))])
            .unwrap_err();
        assert!(err.to_string().contains("got object"));
    }

    #[test]
    fn test_reserved_fields_are_checked() {
        let mappings = Mappings::new(DynamicMode::Dynamic);
        assert!(mappings
            .resolve_batch([&doc(json!({"_id": "a", "_timestamp": 1_700_000_000_000i64}))])
            .unwrap()
            .is_empty());
        assert!(mappings
            .resolve_batch([&doc(json!({"_timestamp": "not a date"}))])
            .is_err());
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut mappings = Mappings::new(DynamicMode::Dynamic);
        let first = mappings.resolve_batch([&doc(json!({"level": "info"}))]).unwrap();
        assert_eq!(mappings.merge(first.clone()).len(), 1);
        assert!(mappings.merge(first).is_empty());

        let again = mappings.resolve_batch([&doc(json!({"level": "warn"}))]).unwrap();
        assert!(again.is_empty());
        assert_eq!(mappings.properties.len(), 1);
    }
}
