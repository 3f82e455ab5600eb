//! Condition trees: leaves, nested groups and the group lifecycle.
//!
//! A [`ConditionGroup`] is built incrementally, compiled once against an
//! entity type, then rendered into a SPARQL fragment as often as needed.
//! Conditions on the id and bundle keys are normalized as they are added.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::compile::{self, CompileContext, CompiledGroup};
use crate::error::{ConditionError, ConditionResult};
use crate::mapping::FieldMapping;
use crate::operator::{Conjunction, Operator};
use crate::render;

// =============================================================================
// DATA TYPES
// =============================================================================

/// A condition value: one query literal or a list of them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Single(String),
    List(Vec<String>),
}

impl ConditionValue {
    pub fn is_empty(&self) -> bool {
        match self {
            ConditionValue::Single(_) => false,
            ConditionValue::List(values) => values.is_empty(),
        }
    }

    pub fn into_list(self) -> Vec<String> {
        match self {
            ConditionValue::Single(value) => vec![value],
            ConditionValue::List(values) => values,
        }
    }
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        ConditionValue::Single(value.to_string())
    }
}

impl From<String> for ConditionValue {
    fn from(value: String) -> Self {
        ConditionValue::Single(value)
    }
}

impl From<Vec<String>> for ConditionValue {
    fn from(values: Vec<String>) -> Self {
        ConditionValue::List(values)
    }
}

impl From<Vec<&str>> for ConditionValue {
    fn from(values: Vec<&str>) -> Self {
        ConditionValue::List(values.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for ConditionValue {
    fn from(values: [&str; N]) -> Self {
        ConditionValue::List(values.into_iter().map(str::to_string).collect())
    }
}

/// The key fields of the queried entity type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityKeys {
    pub id: String,
    pub bundle: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum FieldKind {
    Id,
    Bundle,
    Label,
    Other,
}

impl EntityKeys {
    pub fn new(id: &str, bundle: &str) -> Self {
        Self {
            id: id.to_string(),
            bundle: bundle.to_string(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_string());
        self
    }

    pub(crate) fn kind(&self, field: &str) -> FieldKind {
        if field == self.id {
            FieldKind::Id
        } else if field == self.bundle {
            FieldKind::Bundle
        } else if self.label.as_deref() == Some(field) {
            FieldKind::Label
        } else {
            FieldKind::Other
        }
    }
}

/// A single field condition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Leaf {
    pub field: String,
    pub value: Option<ConditionValue>,
    pub operator: Operator,
    pub language: Option<String>,
}

#[derive(Clone, Debug)]
pub enum ConditionEntry {
    Leaf(Leaf),
    Nested(ConditionGroup),
}

/// Where a group is in its lifecycle. There is no way back to `Building`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupPhase {
    Building,
    Compiled,
    Rendered,
}

#[derive(Clone, Debug)]
enum GroupState {
    Building,
    Compiled(CompiledGroup),
    Rendered { compiled: CompiledGroup, text: String },
}

/// A list of conditions combined by one conjunction.
#[derive(Clone, Debug)]
pub struct ConditionGroup {
    conjunction: Conjunction,
    keys: EntityKeys,
    entries: Vec<ConditionEntry>,
    needs_default_bundle: bool,
    state: GroupState,
}

// =============================================================================
// BUILDING
// =============================================================================

/// Drops a column suffix: `field_tags.target_id` addresses `field_tags`.
fn base_field(field: &str) -> &str {
    field.split_once('.').map_or(field, |(name, _)| name)
}

/// Rewrites an id or bundle key condition into `IN` / `NOT IN` form.
fn normalize_key_condition(field: &str, value: Option<ConditionValue>, operator: Operator) -> ConditionResult<Leaf> {
    if !operator.is_key_operator() {
        return Err(ConditionError::UnsupportedOperatorForKey {
            field: field.to_string(),
            operator,
        });
    }
    let value = value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConditionError::MissingRequiredValue {
            field: field.to_string(),
            operator,
        })?;

    let (operator, values) = match (operator, value) {
        (Operator::Equal, ConditionValue::Single(v)) => (Operator::In, vec![v]),
        (Operator::NotEqual, ConditionValue::Single(v)) => (Operator::NotIn, vec![v]),
        (Operator::Equal | Operator::NotEqual, ConditionValue::List(_)) => {
            return Err(ConditionError::UnsupportedArrayValue {
                field: field.to_string(),
                operator,
            });
        }
        (Operator::In | Operator::NotIn, value) => (operator, value.into_list()),
        (operator, _) => {
            return Err(ConditionError::UnsupportedOperatorForKey {
                field: field.to_string(),
                operator,
            });
        }
    };

    Ok(Leaf {
        field: field.to_string(),
        value: Some(ConditionValue::List(values)),
        operator,
        language: None,
    })
}

impl ConditionGroup {
    pub fn new(conjunction: Conjunction, keys: EntityKeys) -> Self {
        Self {
            conjunction,
            keys,
            entries: Vec::new(),
            needs_default_bundle: true,
            state: GroupState::Building,
        }
    }

    pub fn and(keys: EntityKeys) -> Self {
        Self::new(Conjunction::And, keys)
    }

    pub fn or(keys: EntityKeys) -> Self {
        Self::new(Conjunction::Or, keys)
    }

    /// An empty AND group over the same entity keys.
    pub fn and_group(&self) -> Self {
        Self::and(self.keys.clone())
    }

    /// An empty OR group over the same entity keys.
    pub fn or_group(&self) -> Self {
        Self::or(self.keys.clone())
    }

    pub fn conjunction(&self) -> Conjunction {
        self.conjunction
    }

    pub fn keys(&self) -> &EntityKeys {
        &self.keys
    }

    pub fn entries(&self) -> &[ConditionEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether rendering will add a default `subject rdf:type ?bundle` triple.
    pub fn needs_default_bundle(&self) -> bool {
        self.conjunction == Conjunction::And && self.needs_default_bundle
    }

    pub fn phase(&self) -> GroupPhase {
        match self.state {
            GroupState::Building => GroupPhase::Building,
            GroupState::Compiled(_) => GroupPhase::Compiled,
            GroupState::Rendered { .. } => GroupPhase::Rendered,
        }
    }

    fn ensure_building(&self) -> ConditionResult<()> {
        match self.state {
            GroupState::Building => Ok(()),
            GroupState::Compiled(_) | GroupState::Rendered { .. } => Err(ConditionError::AlreadyCompiled),
        }
    }

    /// Adds a condition on `field`.
    ///
    /// In an OR group the condition is wrapped in its own AND sub-group so
    /// that it becomes one union branch. Conditions on the id and bundle keys
    /// only accept `=`, `!=`, `IN` and `NOT IN`, and are normalized to the
    /// set form.
    pub fn add_condition(
        &mut self,
        field: &str,
        value: Option<ConditionValue>,
        operator: Operator,
        language: Option<&str>,
    ) -> ConditionResult<&mut Self> {
        self.ensure_building()?;
        let field = base_field(field);

        if self.conjunction == Conjunction::Or {
            let mut branch = self.and_group();
            branch.add_condition(field, value, operator, language)?;
            self.entries.push(ConditionEntry::Nested(branch));
            return Ok(self);
        }

        let leaf = match self.keys.kind(field) {
            FieldKind::Id => normalize_key_condition(field, value, operator)?,
            FieldKind::Bundle => {
                let leaf = normalize_key_condition(field, value, operator)?;
                self.needs_default_bundle = false;
                leaf
            }
            kind @ (FieldKind::Label | FieldKind::Other) => {
                let value = if operator.uses_value() {
                    let value = value.ok_or_else(|| ConditionError::MissingRequiredValue {
                        field: field.to_string(),
                        operator,
                    })?;
                    Some(match operator {
                        Operator::In | Operator::NotIn => ConditionValue::List(value.into_list()),
                        _ => value,
                    })
                } else {
                    None
                };
                // A label alone does not narrow the query to any bundle.
                if kind == FieldKind::Other {
                    self.needs_default_bundle = false;
                }
                Leaf {
                    field: field.to_string(),
                    value,
                    operator,
                    language: language.map(str::to_string),
                }
            }
        };

        self.entries.push(ConditionEntry::Leaf(leaf));
        Ok(self)
    }

    /// Shorthand for an `=` condition.
    pub fn condition(&mut self, field: &str, value: impl Into<ConditionValue>) -> ConditionResult<&mut Self> {
        self.add_condition(field, Some(value.into()), Operator::Equal, None)
    }

    pub fn add_exists(&mut self, field: &str) -> ConditionResult<&mut Self> {
        self.add_condition(field, None, Operator::Exists, None)
    }

    pub fn add_not_exists(&mut self, field: &str) -> ConditionResult<&mut Self> {
        self.add_condition(field, None, Operator::NotExists, None)
    }

    /// Appends `group` as a nested entry, rendered as one fragment.
    pub fn add_group(&mut self, group: ConditionGroup) -> ConditionResult<&mut Self> {
        self.ensure_building()?;
        self.entries.push(ConditionEntry::Nested(group));
        Ok(self)
    }

    // =========================================================================
    // COMPILING AND RENDERING
    // =========================================================================

    /// Resolves field mappings and classifies every condition.
    ///
    /// Nested groups are compiled first. Calling this again once compiled is
    /// a no-op: the mappings of the first call stay frozen.
    pub fn compile(&mut self, ctx: &CompileContext<'_>) -> ConditionResult<()> {
        if !matches!(self.state, GroupState::Building) {
            debug!("Condition group already compiled, skipping");
            return Ok(());
        }
        let compiled = compile::compile_group(
            self.conjunction,
            &self.keys,
            self.needs_default_bundle(),
            &mut self.entries,
            ctx,
        )?;
        self.state = GroupState::Compiled(compiled);
        Ok(())
    }

    /// Returns the SPARQL fragment of a compiled group.
    ///
    /// The first call renders and caches the text; later calls return the
    /// cached copy.
    pub fn render(&mut self) -> ConditionResult<String> {
        match &self.state {
            GroupState::Building => return Err(ConditionError::NotCompiled),
            GroupState::Rendered { text, .. } => return Ok(text.clone()),
            GroupState::Compiled(_) => {}
        }
        let GroupState::Compiled(compiled) = std::mem::replace(&mut self.state, GroupState::Building) else {
            return Err(ConditionError::NotCompiled);
        };
        match render::render_group(self.conjunction, &compiled, &mut self.entries) {
            Ok(text) => {
                debug!("Rendered {} condition group: {}", self.conjunction, text);
                self.state = GroupState::Rendered {
                    compiled,
                    text: text.clone(),
                };
                Ok(text)
            }
            Err(e) => {
                self.state = GroupState::Compiled(compiled);
                Err(e)
            }
        }
    }

    /// The frozen mapping of `field`, once compiled.
    pub fn field_mapping(&self, field: &str) -> Option<&FieldMapping> {
        self.compiled().and_then(|compiled| compiled.mappings.get(field))
    }

    pub(crate) fn compiled(&self) -> Option<&CompiledGroup> {
        match &self.state {
            GroupState::Building => None,
            GroupState::Compiled(compiled) | GroupState::Rendered { compiled, .. } => Some(compiled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::keys;

    fn leaf(group: &ConditionGroup, index: usize) -> &Leaf {
        match &group.entries()[index] {
            ConditionEntry::Leaf(leaf) => leaf,
            ConditionEntry::Nested(_) => panic!("entry {index} is a nested group"),
        }
    }

    #[test]
    fn test_id_equal_is_normalized_to_in() {
        let mut group = ConditionGroup::and(keys());
        group.condition("id", "<http://example.com/1>").unwrap();
        let leaf = leaf(&group, 0);
        assert_eq!(leaf.operator, Operator::In);
        assert_eq!(
            leaf.value,
            Some(ConditionValue::List(vec!["<http://example.com/1>".to_string()]))
        );
    }

    #[test]
    fn test_bundle_not_equal_is_normalized_to_not_in() {
        let mut group = ConditionGroup::and(keys());
        group
            .add_condition("type", Some("page".into()), Operator::NotEqual, None)
            .unwrap();
        let leaf = leaf(&group, 0);
        assert_eq!(leaf.operator, Operator::NotIn);
        assert_eq!(leaf.value, Some(ConditionValue::List(vec!["page".to_string()])));
    }

    #[test]
    fn test_key_rejects_range_operator() {
        let mut group = ConditionGroup::and(keys());
        let result = group.add_condition("id", Some("X".into()), Operator::Less, None);
        assert_eq!(
            result.err(),
            Some(ConditionError::UnsupportedOperatorForKey {
                field: "id".to_string(),
                operator: Operator::Less
            })
        );
        let result = group.add_exists("type");
        assert!(matches!(result, Err(ConditionError::UnsupportedOperatorForKey { .. })));
    }

    #[test]
    fn test_key_requires_value() {
        let mut group = ConditionGroup::and(keys());
        let result = group.add_condition("id", None, Operator::Equal, None);
        assert!(matches!(result, Err(ConditionError::MissingRequiredValue { .. })));
        let result = group.add_condition("type", Some(ConditionValue::List(vec![])), Operator::In, None);
        assert!(matches!(result, Err(ConditionError::MissingRequiredValue { .. })));
    }

    #[test]
    fn test_key_equal_rejects_list() {
        let mut group = ConditionGroup::and(keys());
        let result = group.add_condition("id", Some(["a", "b"].into()), Operator::Equal, None);
        assert!(matches!(result, Err(ConditionError::UnsupportedArrayValue { .. })));
    }

    #[test]
    fn test_field_requires_value_unless_exists() {
        let mut group = ConditionGroup::and(keys());
        let result = group.add_condition("title", None, Operator::Like, None);
        assert!(matches!(result, Err(ConditionError::MissingRequiredValue { .. })));
        group.add_exists("title").unwrap();
        group.add_not_exists("body").unwrap();
        assert_eq!(group.len(), 2);
        assert_eq!(leaf(&group, 0).value, None);
    }

    #[test]
    fn test_scalar_in_becomes_list() {
        let mut group = ConditionGroup::and(keys());
        group
            .add_condition("status", Some("active".into()), Operator::In, None)
            .unwrap();
        assert_eq!(
            leaf(&group, 0).value,
            Some(ConditionValue::List(vec!["active".to_string()]))
        );
    }

    #[test]
    fn test_column_suffix_is_dropped() {
        let mut group = ConditionGroup::and(keys());
        group.condition("field_tags.target_id", "<http://example.com/t>").unwrap();
        assert_eq!(leaf(&group, 0).field, "field_tags");
    }

    #[test]
    fn test_language_is_kept() {
        let mut group = ConditionGroup::and(keys());
        group
            .add_condition("title", Some("Intro".into()), Operator::Equal, Some("en"))
            .unwrap();
        assert_eq!(leaf(&group, 0).language.as_deref(), Some("en"));
    }

    #[test]
    fn test_default_bundle_flag() {
        let mut group = ConditionGroup::and(keys());
        assert!(group.needs_default_bundle());

        group.condition("id", "<http://example.com/1>").unwrap();
        assert!(group.needs_default_bundle(), "id conditions keep the default bundle");

        group.condition("label", "\"Intro\"").unwrap();
        assert!(group.needs_default_bundle(), "label conditions keep the default bundle");

        group.condition("status", "active").unwrap();
        assert!(!group.needs_default_bundle());

        let mut group = ConditionGroup::and(keys());
        group.condition("type", "page").unwrap();
        assert!(!group.needs_default_bundle());
    }

    #[test]
    fn test_or_group_wraps_each_condition() {
        let mut group = ConditionGroup::or(keys());
        group.condition("status", "active").unwrap();
        group.condition("status", "inactive").unwrap();
        assert_eq!(group.len(), 2);
        assert!(!group.needs_default_bundle());
        for entry in group.entries() {
            match entry {
                ConditionEntry::Nested(branch) => {
                    assert_eq!(branch.conjunction(), Conjunction::And);
                    assert_eq!(branch.len(), 1);
                }
                ConditionEntry::Leaf(_) => panic!("OR groups hold branches only"),
            }
        }
    }

    #[test]
    fn test_chained_building() {
        let mut group = ConditionGroup::and(keys());
        group
            .condition("type", "page")
            .unwrap()
            .add_exists("body")
            .unwrap();
        let mut sub = group.or_group();
        sub.condition("status", "a").unwrap();
        group.add_group(sub).unwrap();
        assert_eq!(group.len(), 3);
        assert_eq!(group.phase(), GroupPhase::Building);
    }
}
