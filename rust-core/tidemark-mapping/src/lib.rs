// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Tidemark Mappings
//
// The schema model of an index and the resolver that types document fields
// against it.
//
// A `Mappings` value holds the index-level dynamic mode, explicit field
// properties and an ordered list of dynamic templates. Resolution flattens
// nested objects into dotted paths, checks every scalar against its
// declared, templated or deduced type, and reports fields seen for the
// first time as promotions for the caller to merge.
//
// # Example
//
// ```rust
// use serde_json::json;
// use tidemark_mapping::{DynamicMode, FieldType, Mappings, NumericKind, Property};
//
// let mut mappings = Mappings::new(DynamicMode::Dynamic)
//     .with_property("age", Property::typed(FieldType::Numeric(NumericKind::Integer)));
//
// let doc = json!({"age": 42, "score": 3.5});
// let promotions = mappings.resolve_batch([doc.as_object().unwrap()]).unwrap();
// mappings.merge(promotions);
//
// assert_eq!(
//     mappings.properties["score"].field_type,
//     Some(FieldType::Numeric(NumericKind::Double))
// );
// ```

pub mod date;
pub mod error;
pub mod property;
pub mod resolver;
pub mod template;
pub mod types;

pub use date::{parse_date, parse_date_str};
pub use error::MappingError;
pub use property::{reserved_property, Mappings, Property, ID_FIELD, TIMESTAMP_FIELD};
pub use resolver::{Promotions, ResolvedFields};
pub use template::{DynamicTemplate, MatchMappingType, MatchPattern, TemplateRule};
pub use types::{DynamicMode, FieldType, NumericKind, ValueKind};
