use crate::schema::{DataType, LayerDesc};
use indexmap::IndexMap;

/// Represents a single layer change detected between two schema versions.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaMigration {
    LayerAdded { name: String },
    LayerRemoved { name: String },
    LayerTypeChanged { name: String },
    BaseChanged {
        name: String,
        old_base: String,
        new_base: String,
    },
    DataChanged { name: String },
    EnumValueAdded { name: String, value: String },
    EnumValueRemoved { name: String, value: String },
    LinkChanged { name: String },
    MetaChanged { name: String },
}

impl SchemaMigration {
    /// Whether existing documents stay valid after this change.
    pub fn is_safe(&self) -> bool {
        matches!(
            self,
            SchemaMigration::LayerAdded { .. }
                | SchemaMigration::EnumValueAdded { .. }
                | SchemaMigration::MetaChanged { .. }
        )
    }

    /// Human-readable description of this migration.
    pub fn describe(&self) -> String {
        match self {
            SchemaMigration::LayerAdded { name } => format!("Layer '{name}' added"),
            SchemaMigration::LayerRemoved { name } => {
                format!("Layer '{name}' removed (documents holding it no longer validate)")
            }
            SchemaMigration::LayerTypeChanged { name } => {
                format!("Layer '{name}' type changed")
            }
            SchemaMigration::BaseChanged { name, old_base, new_base } => {
                format!("Layer '{name}' base changed: '{old_base}' -> '{new_base}'")
            }
            SchemaMigration::DataChanged { name } => format!("Layer '{name}' data type changed"),
            SchemaMigration::EnumValueAdded { name, value } => {
                format!("Enum value '{value}' added to '{name}'")
            }
            SchemaMigration::EnumValueRemoved { name, value } => {
                format!("Enum value '{value}' removed from '{name}' (WARNING)")
            }
            SchemaMigration::LinkChanged { name } => {
                format!("Link target or link types of '{name}' changed")
            }
            SchemaMigration::MetaChanged { name } => format!("Metadata of '{name}' changed"),
        }
    }
}

/// Compare two schema versions and return the detected layer changes.
pub fn diff_schemas(
    old: &IndexMap<String, LayerDesc>,
    new: &IndexMap<String, LayerDesc>,
) -> Vec<SchemaMigration> {
    let mut migrations = Vec::new();

    for name in new.keys().filter(|n| !old.contains_key(*n)) {
        migrations.push(SchemaMigration::LayerAdded { name: name.clone() });
    }
    for name in old.keys().filter(|n| !new.contains_key(*n)) {
        migrations.push(SchemaMigration::LayerRemoved { name: name.clone() });
    }

    for (name, old_desc) in old {
        let Some(new_desc) = new.get(name) else {
            continue;
        };
        if old_desc.layer_type() != new_desc.layer_type() {
            migrations.push(SchemaMigration::LayerTypeChanged { name: name.clone() });
            continue;
        }
        if let (Some(old_base), Some(new_base)) = (old_desc.base(), new_desc.base()) {
            if old_base != new_base {
                migrations.push(SchemaMigration::BaseChanged {
                    name: name.clone(),
                    old_base: old_base.to_string(),
                    new_base: new_base.to_string(),
                });
            }
        }
        match (old_desc.data(), new_desc.data()) {
            (Some(DataType::Enum(old_values)), Some(DataType::Enum(new_values))) => {
                for value in new_values.iter().filter(|v| !old_values.contains(v)) {
                    migrations.push(SchemaMigration::EnumValueAdded {
                        name: name.clone(),
                        value: value.clone(),
                    });
                }
                for value in old_values.iter().filter(|v| !new_values.contains(v)) {
                    migrations.push(SchemaMigration::EnumValueRemoved {
                        name: name.clone(),
                        value: value.clone(),
                    });
                }
            }
            (a, b) if a != b => {
                migrations.push(SchemaMigration::DataChanged { name: name.clone() })
            }
            _ => {}
        }
        if old_desc.target() != new_desc.target() || old_desc.link_types() != new_desc.link_types() {
            migrations.push(SchemaMigration::LinkChanged { name: name.clone() });
        }
        if old_desc.meta() != new_desc.meta() || old_desc.default_value() != new_desc.default_value() {
            migrations.push(SchemaMigration::MetaChanged { name: name.clone() });
        }
    }

    migrations
}

/// Check if any migrations are unsafe (would leave stored documents invalid).
pub fn has_unsafe_migrations(migrations: &[SchemaMigration]) -> Vec<&SchemaMigration> {
    migrations.iter().filter(|m| !m.is_safe()).collect()
}
