//! Field-level speclet diffing.
//!
//! Every diffable shape enumerates its externally visible fields by their
//! serialization names. Sections embedded with `#[serde(flatten)]` are
//! visible only through the flat field names the outer shape lists.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

use crate::domain::models::{ResourceSpeclet, Speclet};

/// Old and new value of one changed field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldDiff {
    pub old: Value,
    pub new: Value,
}

/// Changed fields keyed by serialization name.
pub type SpecletDiff = BTreeMap<&'static str, FieldDiff>;

/// Fields whose change requires restarting the running operation.
pub const RESTART_TRIGGERING_FIELDS: &[&str] = &[
    "pool",
    "query_engine_path",
    "log_tailer_path",
    "trampoline_path",
    "data_bundle_path",
    "enable_data_bundle",
    "instance_count",
    "instance_cpu",
    "instance_memory_bytes",
];

/// A configuration shape that can enumerate its visible fields.
pub trait SpecletShape {
    /// Name identifying the shape; values of different shapes are incomparable.
    fn shape(&self) -> &'static str;

    /// Visible fields as `(serialization name, value)` in declaration order.
    fn visible_fields(&self) -> Vec<(&'static str, Value)>;
}

fn to_value<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

impl SpecletShape for ResourceSpeclet {
    fn shape(&self) -> &'static str {
        "resources"
    }

    fn visible_fields(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("instance_count", to_value(&self.instance_count)),
            ("instance_cpu", to_value(&self.instance_cpu)),
            ("instance_memory_bytes", to_value(&self.instance_memory_bytes)),
        ]
    }
}

impl SpecletShape for Speclet {
    fn shape(&self) -> &'static str {
        "clique"
    }

    fn visible_fields(&self) -> Vec<(&'static str, Value)> {
        let mut fields = vec![
            ("active", to_value(&self.active)),
            ("pool", to_value(&self.pool)),
            (
                "restart_on_speclet_change",
                to_value(&self.restart_on_speclet_change),
            ),
            ("query_engine_path", to_value(&self.query_engine_path)),
            ("log_tailer_path", to_value(&self.log_tailer_path)),
            ("trampoline_path", to_value(&self.trampoline_path)),
            ("data_bundle_path", to_value(&self.data_bundle_path)),
            ("enable_data_bundle", to_value(&self.enable_data_bundle)),
            ("acl", to_value(&self.acl)),
            ("description", to_value(&self.description)),
        ];
        fields.extend(self.resources.visible_fields());
        fields
    }
}

/// Diff two values field by field.
///
/// Returns `None` when the shapes differ.
pub fn diff_speclets<A, B>(old: &A, new: &B) -> Option<SpecletDiff>
where
    A: SpecletShape + ?Sized,
    B: SpecletShape + ?Sized,
{
    if old.shape() != new.shape() {
        return None;
    }

    let mut new_fields: BTreeMap<&'static str, Value> = new.visible_fields().into_iter().collect();
    let mut diff = SpecletDiff::new();
    for (name, old_value) in old.visible_fields() {
        let new_value = new_fields.remove(name).unwrap_or(Value::Null);
        if old_value != new_value {
            diff.insert(
                name,
                FieldDiff {
                    old: old_value,
                    new: new_value,
                },
            );
        }
    }
    Some(diff)
}

/// Changed fields that require a restart.
pub fn restart_triggering_fields(diff: &SpecletDiff) -> Vec<&'static str> {
    diff.keys()
        .copied()
        .filter(|name| RESTART_TRIGGERING_FIELDS.contains(name))
        .collect()
}
