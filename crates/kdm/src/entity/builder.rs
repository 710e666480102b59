//! 🏗️ DocumentTypeConfig → EntityDescriptor, or a ConfigurationError explaining why not.
//!
//! All validation happens here, once, at registration time:
//! - every string value goes through the injected placeholder resolver
//! - at most one field per role
//! - rollover needs a write alias and at least one condition
//! - a declared time pattern must be non-empty and valid strftime
//!
//! Precedence of addressing modes: rollover block, then time pattern, then fixed index.

use std::collections::{BTreeMap, BTreeSet};

use chrono::format::{Item, StrftimeItems};
use tracing::debug;

use super::{
    AddressingMode, DocumentRelation, DocumentTypeConfig, EntityDescriptor, FieldConfig,
    FieldDescriptor, FieldRole, IndexSettings, RelationConfig, RolloverAlias, RolloverConfig,
};
use crate::criteria::FieldPath;
use crate::errors::ConfigurationError;
use crate::placeholders::{EnvironmentResolver, resolve_optional, resolve_placeholders};
use crate::query::PropertyPathResolver;
use crate::rollover::RolloverConditions;
use crate::scheduler::Schedule;
use crate::units::{ByteSize, parse_duration};

impl EntityDescriptor {
    /// 🏗️ Validate `config` and freeze it into a descriptor. No I/O, no side effects.
    pub fn build(
        config: &DocumentTypeConfig,
        resolver: &dyn EnvironmentResolver,
    ) -> Result<EntityDescriptor, ConfigurationError> {
        let document_type = resolve_placeholders(&config.name, resolver);
        let resolve = |raw: Option<&String>| {
            resolve_optional(raw.map(String::as_str), resolver).map(|value| value.trim().to_string())
        };

        let index_name = resolve(config.index_name.as_ref())
            .unwrap_or_else(|| document_type.to_lowercase());
        if index_name.is_empty() {
            return Err(ConfigurationError::EmptyIndexName { document_type });
        }
        let alias = resolve(config.alias.as_ref()).filter(|alias| !alias.is_empty());

        let mut roles = BTreeMap::new();
        let fields = build_fields(
            &document_type,
            &config.fields,
            &FieldPath::new(""),
            "",
            resolver,
            &mut roles,
        )?;
        let roles = roles
            .into_iter()
            .map(|(role, (_, path))| (role, path))
            .collect();

        let settings = IndexSettings {
            shards: config.settings.shards,
            replicas: config.settings.replicas,
            refresh_interval: resolve(config.settings.refresh_interval.as_ref()),
        };

        let mut descriptor = EntityDescriptor {
            document_type,
            index_name,
            alias,
            mode: AddressingMode::Fixed {
                index: String::new(),
            },
            relation: DocumentRelation::None,
            settings,
            fields,
            roles,
            rollover_schedule: None,
        };

        descriptor.mode = match (&config.rollover, resolve(config.time_pattern.as_ref())) {
            (Some(rollover), _) => {
                let (mode, schedule) = rollover_mode(&descriptor.document_type, rollover, resolver)?;
                descriptor.rollover_schedule = schedule;
                mode
            }
            (None, Some(pattern)) => time_based_mode(&descriptor, pattern, resolve(config.time_field.as_ref()))?,
            (None, None) => AddressingMode::Fixed {
                index: descriptor.index_name.clone(),
            },
        };
        descriptor.relation = relation(&descriptor, config.relation.as_ref(), resolver)?;

        debug!(
            "🪪 Built descriptor for '{}': {} addressing, {} field(s), {} role(s) bound",
            descriptor.document_type,
            descriptor.mode.name(),
            descriptor.fields.len(),
            descriptor.roles.len()
        );
        Ok(descriptor)
    }
}

/// Role bookkeeping: role → (language path for error messages, engine path).
type RoleBindings = BTreeMap<FieldRole, (String, FieldPath)>;

fn build_fields(
    document_type: &str,
    configs: &[FieldConfig],
    parent: &FieldPath,
    language_parent: &str,
    resolver: &dyn EnvironmentResolver,
    roles: &mut RoleBindings,
) -> Result<Vec<FieldDescriptor>, ConfigurationError> {
    let mut seen = BTreeSet::new();
    let mut fields = Vec::with_capacity(configs.len());

    for config in configs {
        let name = resolve_placeholders(&config.name, resolver);
        let engine_name = config
            .engine_name
            .as_deref()
            .map(|engine_name| resolve_placeholders(engine_name, resolver))
            .unwrap_or_else(|| name.clone());
        if !seen.insert(engine_name.clone()) {
            return Err(ConfigurationError::DuplicateField {
                document_type: document_type.to_string(),
                field: engine_name,
            });
        }

        let path = parent.child(&engine_name);
        let language_path = if language_parent.is_empty() {
            name.clone()
        } else {
            format!("{language_parent}.{name}")
        };

        if let Some(role) = config.role {
            if let Some((first, _)) = roles.get(&role) {
                return Err(ConfigurationError::DuplicateFieldRole {
                    document_type: document_type.to_string(),
                    role: role.as_str().to_string(),
                    first: first.clone(),
                    second: language_path,
                });
            }
            roles.insert(role, (language_path.clone(), path.clone()));
        }

        let properties = build_fields(
            document_type,
            &config.properties,
            &path,
            &language_path,
            resolver,
            roles,
        )?;
        fields.push(FieldDescriptor {
            name,
            engine_name,
            path,
            field_type: config.field_type,
            role: config.role,
            properties,
        });
    }
    Ok(fields)
}

fn rollover_mode(
    document_type: &str,
    rollover: &RolloverConfig,
    resolver: &dyn EnvironmentResolver,
) -> Result<(AddressingMode, Option<Schedule>), ConfigurationError> {
    let resolve = |raw: Option<&String>| {
        resolve_optional(raw.map(String::as_str), resolver)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let write_alias = resolve_placeholders(&rollover.write_alias, resolver).trim().to_string();
    if write_alias.is_empty() {
        return Err(ConfigurationError::EmptyWriteAlias {
            document_type: document_type.to_string(),
        });
    }

    let conditions = RolloverConditions {
        max_age: resolve(rollover.max_age.as_ref())
            .map(|raw| parse_duration(&raw))
            .transpose()?,
        max_docs: rollover.max_docs.filter(|docs| *docs > 0),
        max_size: resolve(rollover.max_size.as_ref())
            .map(|raw| raw.parse::<ByteSize>())
            .transpose()?,
    };
    if conditions.is_empty() {
        return Err(ConfigurationError::EmptyRolloverConditions {
            document_type: document_type.to_string(),
        });
    }

    let schedule = resolve(rollover.schedule.as_ref())
        .map(|raw| raw.parse::<Schedule>())
        .transpose()?;

    let alias = RolloverAlias {
        index_prefix: resolve(rollover.index_prefix.as_ref()).unwrap_or_else(|| write_alias.clone()),
        read_alias: resolve(rollover.read_alias.as_ref()),
        write_alias,
    };
    Ok((AddressingMode::RolloverBacked { alias, conditions }, schedule))
}

fn time_based_mode(
    descriptor: &EntityDescriptor,
    pattern: String,
    time_field: Option<String>,
) -> Result<AddressingMode, ConfigurationError> {
    let document_type = descriptor.document_type.clone();
    if pattern.is_empty() {
        return Err(ConfigurationError::EmptyTimePattern { document_type });
    }
    if StrftimeItems::new(&pattern).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigurationError::InvalidTimePattern {
            document_type,
            pattern,
        });
    }

    let time_field = match time_field.filter(|field| !field.is_empty()) {
        None => None,
        Some(field) => match descriptor.resolve(&field) {
            Some(resolved) => Some(resolved.path),
            None => {
                return Err(ConfigurationError::UnknownTimeField {
                    document_type,
                    field,
                });
            }
        },
    };
    Ok(AddressingMode::TimeBased {
        pattern,
        time_field,
    })
}

fn relation(
    descriptor: &EntityDescriptor,
    relation: Option<&RelationConfig>,
    resolver: &dyn EnvironmentResolver,
) -> Result<DocumentRelation, ConfigurationError> {
    let document_type = descriptor.document_type.clone();
    match relation {
        None => Ok(DocumentRelation::None),
        Some(RelationConfig::ParentOf { child }) => Ok(DocumentRelation::Parent {
            child_type: resolve_placeholders(child, resolver),
        }),
        Some(RelationConfig::ChildOf {
            parent,
            routing_field,
        }) => {
            let parent_type = resolve_placeholders(parent, resolver);
            let routing = match routing_field {
                Some(field) => descriptor
                    .resolve(field)
                    .map(|resolved| resolved.path)
                    .ok_or_else(|| ConfigurationError::UnknownRoutingField {
                        document_type: document_type.clone(),
                        field: field.clone(),
                    })?,
                None => descriptor.parent_id_field().cloned().ok_or_else(|| {
                    ConfigurationError::MissingParentRouting {
                        document_type: document_type.clone(),
                        parent: parent_type.clone(),
                    }
                })?,
            };
            Ok(DocumentRelation::Child {
                parent_type,
                routing,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::FieldType;
    use crate::placeholders::MapEnvironment;
    use std::time::Duration;

    fn env() -> MapEnvironment {
        MapEnvironment::default().with("env", "prod")
    }

    #[test]
    fn the_one_where_two_identity_fields_are_one_too_many() {
        let config = DocumentTypeConfig::new("Question")
            .field(FieldConfig::new("id", FieldType::Keyword).role(FieldRole::Identity))
            .field(FieldConfig::new("question_id", FieldType::Keyword).role(FieldRole::Identity));
        let err = EntityDescriptor::build(&config, &env()).expect_err("two identities must fail");
        let message = err.to_string();
        assert!(matches!(err, ConfigurationError::DuplicateFieldRole { .. }));
        assert!(message.contains("id"), "{message}");
        assert!(message.contains("question_id"), "{message}");
    }

    #[test]
    fn the_one_where_nested_roles_count_too() {
        let config = DocumentTypeConfig::new("Vote")
            .field(FieldConfig::new("version", FieldType::Long).role(FieldRole::Version))
            .field(
                FieldConfig::new("meta", FieldType::Object)
                    .property(FieldConfig::new("rev", FieldType::Long).role(FieldRole::Version)),
            );
        match EntityDescriptor::build(&config, &env()) {
            Err(ConfigurationError::DuplicateFieldRole { first, second, .. }) => {
                assert_eq!(first, "version");
                assert_eq!(second, "meta.rev");
            }
            other => panic!("expected a duplicate role, got {other:?}"),
        }
    }

    #[test]
    fn the_one_where_rollover_without_conditions_never_leaves_the_builder() {
        let config = DocumentTypeConfig::new("Answer").rollover(RolloverConfig::new("answers-write"));
        assert_eq!(
            EntityDescriptor::build(&config, &env()),
            Err(ConfigurationError::EmptyRolloverConditions {
                document_type: "Answer".into()
            })
        );

        // 🕳️ max_docs = 0 means unset, so it still has no conditions
        let config = DocumentTypeConfig::new("Answer")
            .rollover(RolloverConfig::new("answers-write").max_docs(0));
        assert!(matches!(
            EntityDescriptor::build(&config, &env()),
            Err(ConfigurationError::EmptyRolloverConditions { .. })
        ));
    }

    #[test]
    fn the_one_where_empty_names_are_refused() {
        let config = DocumentTypeConfig::new("Answer")
            .rollover(RolloverConfig::new("${missing:}").max_docs(5));
        assert!(matches!(
            EntityDescriptor::build(&config, &env()),
            Err(ConfigurationError::EmptyWriteAlias { .. })
        ));

        let config = DocumentTypeConfig::new("Log").time_pattern("  ");
        assert!(matches!(
            EntityDescriptor::build(&config, &env()),
            Err(ConfigurationError::EmptyTimePattern { .. })
        ));

        let config = DocumentTypeConfig::new("Log").time_pattern("logs-%Q");
        assert!(matches!(
            EntityDescriptor::build(&config, &env()),
            Err(ConfigurationError::InvalidTimePattern { .. })
        ));
    }

    #[test]
    fn the_one_where_rollover_outranks_a_time_pattern_and_placeholders_resolve() {
        let config = DocumentTypeConfig::new("Answer")
            .time_pattern("answers-%Y")
            .rollover(
                RolloverConfig::new("${env}-answers")
                    .read_alias("${env}-answers-read")
                    .max_age("30d")
                    .max_size("5gb")
                    .schedule("@every 10m"),
            );
        let descriptor = EntityDescriptor::build(&config, &env()).expect("should build");
        let AddressingMode::RolloverBacked { alias, conditions } = descriptor.mode() else {
            panic!("rollover block must win, got {:?}", descriptor.mode());
        };
        assert_eq!(alias.write_alias, "prod-answers");
        assert_eq!(alias.read_alias.as_deref(), Some("prod-answers-read"));
        assert_eq!(alias.index_prefix, "prod-answers");
        assert_eq!(conditions.max_age, Some(Duration::from_secs(30 * 86_400)));
        assert_eq!(conditions.max_size, Some(ByteSize::gb(5)));
        assert_eq!(conditions.max_docs, None);
        assert_eq!(
            descriptor.rollover_schedule().and_then(Schedule::interval),
            Some(Duration::from_secs(600))
        );
    }

    #[test]
    fn the_one_where_time_and_fixed_modes_fall_out_of_the_config() {
        let config = DocumentTypeConfig::new("Order")
            .time_pattern("${env}-orders-%Y.%m.%d")
            .time_field("placedAt")
            .field(FieldConfig::new("placed_at", FieldType::Date).engine_name("placedAt"));
        let descriptor = EntityDescriptor::build(&config, &env()).expect("should build");
        assert_eq!(
            descriptor.mode(),
            &AddressingMode::TimeBased {
                pattern: "prod-orders-%Y.%m.%d".into(),
                time_field: Some(FieldPath::new("placedAt")),
            }
        );

        let config = DocumentTypeConfig::new("Order").time_field("nope").time_pattern("o-%Y");
        assert!(matches!(
            EntityDescriptor::build(&config, &env()),
            Err(ConfigurationError::UnknownTimeField { .. })
        ));

        let descriptor = EntityDescriptor::build(&DocumentTypeConfig::new("Question"), &env())
            .expect("a bare type is fixed");
        assert_eq!(
            descriptor.mode(),
            &AddressingMode::Fixed {
                index: "question".into()
            }
        );
    }

    #[test]
    fn the_one_where_children_know_how_to_find_their_parents_shard() {
        let config = DocumentTypeConfig::new("Answer")
            .relation(RelationConfig::ChildOf {
                parent: "Question".into(),
                routing_field: None,
            })
            .field(FieldConfig::new("question_id", FieldType::Keyword).role(FieldRole::ParentId));
        let descriptor = EntityDescriptor::build(&config, &env()).expect("should build");
        assert_eq!(
            descriptor.relation(),
            &DocumentRelation::Child {
                parent_type: "Question".into(),
                routing: FieldPath::new("question_id"),
            }
        );

        let orphan = DocumentTypeConfig::new("Answer").relation(RelationConfig::ChildOf {
            parent: "Question".into(),
            routing_field: None,
        });
        assert!(matches!(
            EntityDescriptor::build(&orphan, &env()),
            Err(ConfigurationError::MissingParentRouting { .. })
        ));
    }

    #[test]
    fn the_one_where_a_field_declared_twice_is_caught() {
        let config = DocumentTypeConfig::new("Question")
            .field(FieldConfig::new("title", FieldType::Text))
            .field(FieldConfig::new("headline", FieldType::Text).engine_name("title"));
        assert!(matches!(
            EntityDescriptor::build(&config, &env()),
            Err(ConfigurationError::DuplicateField { .. })
        ));
    }
}
