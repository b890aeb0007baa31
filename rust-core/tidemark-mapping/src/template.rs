// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Tidemark Developers
//
// Dynamic templates: ordered rules that type previously undeclared fields
// by name pattern and runtime value kind.
//
// Patterns are compiled once, when the template is built or deserialized.
// A pattern is a regex when `match_pattern` says so, or when it contains
// regex metacharacters; otherwise it is a `*` wildcard matched against the
// whole dotted field name.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::MappingError;
use crate::property::Property;
use crate::types::ValueKind;

const REGEX_METACHARACTERS: &[char] = &['^', '$', '(', ')', '[', ']', '{', '}', '+', '?', '|', '\\'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPattern {
    Regex,
    Simple,
}

/// Runtime value kind a template applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMappingType {
    #[default]
    #[serde(rename = "*")]
    Any,
    String,
    Long,
    Double,
    Boolean,
    Date,
}

impl MatchMappingType {
    pub fn accepts(&self, kind: ValueKind) -> bool {
        matches!(
            (self, kind),
            (MatchMappingType::Any, _)
                | (MatchMappingType::String, ValueKind::String)
                | (MatchMappingType::Long, ValueKind::Long)
                | (MatchMappingType::Double, ValueKind::Double)
                | (MatchMappingType::Boolean, ValueKind::Boolean)
                | (MatchMappingType::Date, ValueKind::Date)
        )
    }
}

/// The body of a dynamic template as written in the mappings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TemplateRule {
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unmatch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_pattern: Option<MatchPattern>,
    #[serde(default)]
    pub match_mapping_type: MatchMappingType,
    /// Property given to matching fields. A missing `type` falls back to
    /// the deduced type.
    #[serde(default)]
    pub mapping: Property,
}

/// A named, compiled dynamic template.
///
/// Serialized as a single-entry object `{ "<name>": { ...rule } }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, TemplateRule>",
    into = "BTreeMap<String, TemplateRule>"
)]
pub struct DynamicTemplate {
    name: String,
    rule: TemplateRule,
    matcher: Option<Regex>,
    unmatcher: Option<Regex>,
}

impl DynamicTemplate {
    pub fn new(name: impl Into<String>, rule: TemplateRule) -> Result<Self, MappingError> {
        let name = name.into();
        let compile = |pattern: &Option<String>| {
            pattern
                .as_deref()
                .map(|p| compile_pattern(&name, p, rule.match_pattern))
                .transpose()
        };
        let matcher = compile(&rule.match_name)?;
        let unmatcher = compile(&rule.unmatch)?;
        Ok(Self {
            name,
            rule,
            matcher,
            unmatcher,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rule(&self) -> &TemplateRule {
        &self.rule
    }

    /// Whether this template applies to `field` holding a value of `kind`.
    pub fn matches(&self, field: &str, kind: ValueKind) -> bool {
        self.rule.match_mapping_type.accepts(kind)
            && self.matcher.as_ref().map_or(true, |re| re.is_match(field))
            && !self.unmatcher.as_ref().is_some_and(|re| re.is_match(field))
    }
}

fn compile_pattern(
    template: &str,
    pattern: &str,
    mode: Option<MatchPattern>,
) -> Result<Regex, MappingError> {
    let mode = mode.unwrap_or(if pattern.contains(REGEX_METACHARACTERS) {
        MatchPattern::Regex
    } else {
        MatchPattern::Simple
    });

    let source = match mode {
        MatchPattern::Regex => pattern.to_string(),
        MatchPattern::Simple => {
            let parts: Vec<String> = pattern.split('*').map(regex::escape).collect();
            format!("^{}$", parts.join(".*"))
        }
    };

    Regex::new(&source).map_err(|e| MappingError::InvalidPattern {
        template: template.to_string(),
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

impl PartialEq for DynamicTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.rule == other.rule
    }
}

impl TryFrom<BTreeMap<String, TemplateRule>> for DynamicTemplate {
    type Error = MappingError;

    fn try_from(map: BTreeMap<String, TemplateRule>) -> Result<Self, Self::Error> {
        let mut entries = map.into_iter();
        match (entries.next(), entries.next()) {
            (Some((name, rule)), None) => DynamicTemplate::new(name, rule),
            _ => Err(MappingError::Unsupported(
                "dynamic template: expected exactly one named rule".to_string(),
            )),
        }
    }
}

impl From<DynamicTemplate> for BTreeMap<String, TemplateRule> {
    fn from(t: DynamicTemplate) -> Self {
        BTreeMap::from([(t.name, t.rule)])
    }
}
