//! Property mapping resolution.
//!
//! Binds each column to a property of the target type. Columns are matched,
//! in order of preference, by an explicit rename path, by a constructor
//! parameter, by a scalar property name, by a container element suffix
//! (`tags_0`, `tags[0]`), by a nested object prefix (`address_city`) and
//! finally, for columns without a name, by position. Columns under a nested
//! prefix are resolved recursively against the nested type with the prefix
//! stripped from their names.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::{ColumnDefinition, MapperConfig};
use crate::error::MapperResult;
use crate::error_handler::MapperBuilderErrorHandler;
use crate::key::{ColumnKey, Direction};
use crate::meta::{
    ClassMeta, ConstructorParam, ContainerAccessor, InstantiatorMeta, NestedProperty,
    PropertyKind, ScalarAccessor,
};
use crate::plan::{
    ConstantMapping, ConstructorMapping, ContainerMapping, ElementMapping, MappingPlan,
    PropertyMapping,
};
use crate::property_path::{PathSegment, PropertyNameMatcher, PropertyPath};
use crate::value::ValueType;

/// A column as seen by one nesting level
#[derive(Debug, Clone)]
pub struct ResolvedColumn {
    /// The column as the backend knows it
    pub key: ColumnKey,
    /// Name at this level, with parent prefixes stripped
    pub name: String,
    /// Remaining explicit property path, if the column was renamed
    pub rename: Option<PropertyPath>,
    pub definition: ColumnDefinition,
    /// Ordinal among the source columns
    pub position: usize,
}

enum Target<T> {
    Constructor(ConstructorParam),
    Scalar {
        property: String,
        accessor: ScalarAccessor<T>,
    },
    Element {
        property: String,
        accessor: ContainerAccessor<T>,
        index: usize,
    },
    Nested {
        property: String,
        nested: Arc<dyn NestedProperty<T>>,
        column: ResolvedColumn,
    },
}

/// Resolves columns against [`ClassMeta`] into a [`MappingPlan`]
pub struct PropertyMappingResolver<'a> {
    config: &'a MapperConfig,
    handler: &'a dyn MapperBuilderErrorHandler,
    matcher: PropertyNameMatcher,
    direction: Direction,
    source: &'static str,
}

impl<'a> PropertyMappingResolver<'a> {
    pub fn new(
        config: &'a MapperConfig,
        handler: &'a dyn MapperBuilderErrorHandler,
        direction: Direction,
        source: &'static str,
    ) -> Self {
        Self {
            config,
            handler,
            matcher: config.matcher(),
            direction,
            source,
        }
    }

    /// Resolve source columns against the target type
    ///
    /// # Arguments
    ///
    /// * `meta` - Registered surface of the target type
    /// * `columns` - Columns in source order
    pub fn resolve<T: 'static>(
        &self,
        meta: &ClassMeta<T>,
        columns: &[ColumnKey],
    ) -> MapperResult<MappingPlan<T>> {
        let resolved = columns
            .iter()
            .enumerate()
            .map(|(position, key)| {
                let definition = self.config.column_definition(&key.name);
                ResolvedColumn {
                    key: key.clone(),
                    name: key.name.clone(),
                    rename: definition.rename.as_deref().map(PropertyPath::parse),
                    definition,
                    position,
                }
            })
            .collect();
        let plan = self.resolve_columns(meta, resolved)?;
        tracing::debug!(
            "Resolved {} {:?} plan over {} columns: {} constructor, {} setters, {} containers, {} objects, {} joins",
            plan.target_name,
            plan.direction,
            plan.columns.len(),
            plan.constructor.len(),
            plan.setters.len(),
            plan.containers.len(),
            plan.objects.len(),
            plan.joins.len()
        );
        Ok(plan)
    }

    /// Resolve one nesting level
    pub fn resolve_columns<T: 'static>(
        &self,
        meta: &ClassMeta<T>,
        columns: Vec<ResolvedColumn>,
    ) -> MapperResult<MappingPlan<T>> {
        let mut plan = MappingPlan::new(meta.id(), meta.name(), self.source, self.direction);
        plan.instantiator = meta.instantiator().clone();
        if self.direction == Direction::Read && matches!(meta.instantiator(), InstantiatorMeta::None) {
            self.handler
                .accessor_not_found(&format!("No instantiator registered for {}", meta.name()))?;
        }

        let order: Vec<ColumnKey> = columns.iter().map(|c| c.key.clone()).collect();
        let mut containers: IndexMap<String, ContainerMapping<T>> = IndexMap::new();
        let mut nested: IndexMap<String, (Arc<dyn NestedProperty<T>>, Vec<ResolvedColumn>)> =
            IndexMap::new();

        for column in columns {
            if column.definition.ignore {
                tracing::debug!("Ignoring column {}", column.key);
                continue;
            }
            if self.direction == Direction::Write && column.definition.constant.is_some() {
                plan.constants.push(ConstantMapping {
                    column: column.key.clone(),
                    definition: column.definition.clone(),
                });
                continue;
            }

            match self.find_target(meta, &column) {
                Some(Target::Constructor(param)) => {
                    if self.check_type(meta, &param.name, param.value_type, &column)? {
                        plan.constructor.push(ConstructorMapping {
                            column: column.key.clone(),
                            param: param.name,
                            value_type: param.value_type,
                            definition: column.definition.clone(),
                        });
                    }
                }
                Some(Target::Scalar { property, accessor }) => {
                    self.bind_scalar(meta, &mut plan, property, accessor, &column)?;
                }
                Some(Target::Element {
                    property,
                    accessor,
                    index,
                }) => {
                    if self.check_type(meta, &property, accessor.element_type, &column)? {
                        containers
                            .entry(property.clone())
                            .or_insert_with(|| ContainerMapping {
                                property,
                                accessor,
                                elements: Vec::new(),
                            })
                            .elements
                            .push(ElementMapping {
                                column: column.key.clone(),
                                index,
                                definition: column.definition.clone(),
                            });
                    }
                }
                Some(Target::Nested {
                    property,
                    nested: property_meta,
                    column,
                }) => {
                    nested
                        .entry(property)
                        .or_insert_with(|| (property_meta, Vec::new()))
                        .1
                        .push(column);
                }
                None => self.handler.unmapped_column(&column.key, meta.name())?,
            }
        }

        for (_, mut container) in containers {
            container.elements.sort_by_key(|e| e.index);
            plan.containers.push(container);
        }

        for (property, (property_meta, columns)) in nested {
            if property_meta.is_join() && self.direction == Direction::Write {
                self.handler.accessor_not_found(&format!(
                    "Join collection {} on {} cannot be written to a flat sink",
                    property,
                    meta.name()
                ))?;
                continue;
            }
            let sub_plan = property_meta.resolve(self, &property, columns)?;
            if sub_plan.is_join() {
                plan.joins.push(sub_plan);
            } else {
                plan.objects.push(sub_plan);
            }
        }

        plan.keys = plan
            .constructor
            .iter()
            .filter(|m| m.definition.key)
            .map(|m| m.column.clone())
            .chain(
                plan.setters
                    .iter()
                    .filter(|m| m.definition.key)
                    .map(|m| m.column.clone()),
            )
            .chain(
                plan.containers
                    .iter()
                    .flat_map(|c| c.elements.iter())
                    .filter(|e| e.definition.key)
                    .map(|e| e.column.clone()),
            )
            .collect();

        let mut consumed: Vec<ColumnKey> = plan
            .constructor
            .iter()
            .map(|m| m.column.clone())
            .chain(plan.setters.iter().map(|m| m.column.clone()))
            .chain(
                plan.containers
                    .iter()
                    .flat_map(|c| c.elements.iter().map(|e| e.column.clone())),
            )
            .chain(plan.constants.iter().map(|c| c.column.clone()))
            .collect();
        for sub_plan in plan.objects.iter().chain(plan.joins.iter()) {
            consumed.extend(sub_plan.columns());
        }
        plan.columns = order.into_iter().filter(|k| consumed.contains(k)).collect();

        Ok(plan)
    }

    fn find_target<T: 'static>(&self, meta: &ClassMeta<T>, column: &ResolvedColumn) -> Option<Target<T>> {
        match &column.rename {
            Some(path) => self.find_renamed(meta, column, path),
            None => self.find_by_name(meta, column),
        }
    }

    fn find_renamed<T: 'static>(
        &self,
        meta: &ClassMeta<T>,
        column: &ResolvedColumn,
        path: &PropertyPath,
    ) -> Option<Target<T>> {
        let PathSegment::Property(head) = path.first()? else {
            return None;
        };
        let tail = path.tail();

        if tail.is_empty() && self.direction == Direction::Read {
            if let Some(param) = meta.constructor_param(head, |a, b| self.matcher.matches(a, b)) {
                if matches!(meta.instantiator(), InstantiatorMeta::Constructor { .. }) {
                    return Some(Target::Constructor(param.clone()));
                }
            }
        }

        let property = meta
            .properties()
            .iter()
            .find(|p| self.matcher.matches(&p.name, head))?;
        let tail_head = tail.first().cloned();
        match (&property.kind, tail_head) {
            (PropertyKind::Scalar(accessor), None) => Some(Target::Scalar {
                property: property.name.clone(),
                accessor: accessor.clone(),
            }),
            (PropertyKind::Container(accessor), Some(PathSegment::Index(index)))
                if tail.tail().is_empty() =>
            {
                Some(Target::Element {
                    property: property.name.clone(),
                    accessor: accessor.clone(),
                    index,
                })
            }
            (PropertyKind::Nested(nested), Some(_)) => Some(Target::Nested {
                property: property.name.clone(),
                nested: nested.clone(),
                column: ResolvedColumn {
                    name: tail.to_string(),
                    rename: Some(tail),
                    ..column.clone()
                },
            }),
            _ => None,
        }
    }

    fn find_by_name<T: 'static>(&self, meta: &ClassMeta<T>, column: &ResolvedColumn) -> Option<Target<T>> {
        let name = column.name.as_str();

        if name.is_empty() {
            return meta
                .properties()
                .iter()
                .filter_map(|p| match &p.kind {
                    PropertyKind::Scalar(accessor) => Some((p, accessor)),
                    _ => None,
                })
                .nth(column.position)
                .map(|(p, accessor)| Target::Scalar {
                    property: p.name.clone(),
                    accessor: accessor.clone(),
                });
        }

        if self.direction == Direction::Read {
            if let InstantiatorMeta::Constructor { .. } = meta.instantiator() {
                if let Some(param) = meta.constructor_param(name, |a, b| self.matcher.matches(a, b)) {
                    return Some(Target::Constructor(param.clone()));
                }
            }
        }

        for property in meta.properties() {
            if let PropertyKind::Scalar(accessor) = &property.kind {
                if self.matcher.matches(&property.name, name) {
                    return Some(Target::Scalar {
                        property: property.name.clone(),
                        accessor: accessor.clone(),
                    });
                }
            }
        }

        if self.direction == Direction::Read {
            if let Some(param) = meta.constructor_param(name, |a, b| self.matcher.matches(a, b)) {
                return Some(Target::Constructor(param.clone()));
            }
        }

        for property in meta.properties() {
            match &property.kind {
                PropertyKind::Container(accessor) => {
                    if let Some(index) = self.matcher.element_index(&property.name, name) {
                        return Some(Target::Element {
                            property: property.name.clone(),
                            accessor: accessor.clone(),
                            index,
                        });
                    }
                }
                PropertyKind::Nested(nested) => {
                    if let Some(rest) = self.matcher.strip_prefix(&property.name, name) {
                        return Some(Target::Nested {
                            property: property.name.clone(),
                            nested: nested.clone(),
                            column: ResolvedColumn {
                                name: rest.to_string(),
                                ..column.clone()
                            },
                        });
                    }
                }
                PropertyKind::Scalar(_) => {}
            }
        }
        None
    }

    fn bind_scalar<T: 'static>(
        &self,
        meta: &ClassMeta<T>,
        plan: &mut MappingPlan<T>,
        property: String,
        accessor: ScalarAccessor<T>,
        column: &ResolvedColumn,
    ) -> MapperResult<()> {
        if !self.check_type(meta, &property, accessor.value_type, column)? {
            return Ok(());
        }
        let staged = matches!(meta.instantiator(), InstantiatorMeta::StagedBuilder { .. });
        let usable = match self.direction {
            Direction::Read if staged => {
                plan.constructor.push(ConstructorMapping {
                    column: column.key.clone(),
                    param: property,
                    value_type: accessor.value_type,
                    definition: column.definition.clone(),
                });
                return Ok(());
            }
            Direction::Read => accessor.setter.is_some(),
            Direction::Write => accessor.getter.is_some(),
        };
        if !usable {
            let missing = match self.direction {
                Direction::Read => "setter or constructor parameter",
                Direction::Write => "getter",
            };
            return self.handler.accessor_not_found(&format!(
                "No {} for property {} on {} (column {})",
                missing,
                property,
                meta.name(),
                column.key
            ));
        }
        plan.setters.push(PropertyMapping {
            column: column.key.clone(),
            path: PropertyPath::property(&property),
            definition: column.definition.clone(),
            accessor,
        });
        Ok(())
    }

    /// `false` when a declared column type cannot feed the property and the
    /// handler chose to drop the mapping.
    fn check_type<T: 'static>(
        &self,
        meta: &ClassMeta<T>,
        property: &str,
        property_type: ValueType,
        column: &ResolvedColumn,
    ) -> MapperResult<bool> {
        if column.definition.converter.is_some() {
            return Ok(true);
        }
        let Some(declared) = column.definition.value_type.or(column.key.type_tag.declared()) else {
            return Ok(true);
        };
        let compatible = match self.direction {
            Direction::Read => property_type.accepts(declared),
            Direction::Write => declared.accepts(property_type),
        };
        if compatible {
            return Ok(true);
        }
        self.handler.accessor_not_found(&format!(
            "Property {} of type {} on {} is incompatible with column {} declared as {}",
            property,
            property_type,
            meta.name(),
            column.key,
            declared
        ))?;
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MapperError;
    use crate::error_handler::RethrowMapperBuilderErrorHandler;
    use crate::key::TypeTag;

    #[derive(Debug, Default)]
    struct Address {
        city: String,
        zip: String,
    }

    #[derive(Debug, Default)]
    struct Customer {
        id: i64,
        name: String,
        scores: Vec<i32>,
        address: Option<Address>,
    }

    fn customer_meta() -> ClassMeta<Customer> {
        let address = ClassMeta::<Address>::with_default("Address")
            .field("city", |a: &Address| &a.city, |a: &mut Address| &mut a.city)
            .field("zip", |a: &Address| &a.zip, |a: &mut Address| &mut a.zip);
        ClassMeta::with_default("Customer")
            .field("id", |c: &Customer| &c.id, |c: &mut Customer| &mut c.id)
            .field("name", |c: &Customer| &c.name, |c: &mut Customer| &mut c.name)
            .container("scores", |c: &Customer| &c.scores, |c: &mut Customer| &mut c.scores)
            .object(
                "address",
                address,
                |c: &Customer| c.address.as_ref(),
                |c: &mut Customer, a| c.address = Some(a),
            )
    }

    fn resolve(config: &MapperConfig, names: &[&str]) -> MapperResult<MappingPlan<Customer>> {
        let handler = RethrowMapperBuilderErrorHandler {
            fail_on_unmapped: config.fail_on_unmapped,
        };
        let resolver = PropertyMappingResolver::new(config, &handler, Direction::Read, "test");
        resolver.resolve(&customer_meta(), &ColumnKey::from_names(names, 0))
    }

    #[test]
    fn test_resolve_by_name_prefix_and_element() {
        let config = MapperConfig::default();
        let plan = resolve(&config, &["ID", "name", "scores_1", "scores_0", "address_city"]).unwrap();

        assert_eq!(plan.setters.len(), 2);
        assert_eq!(plan.containers.len(), 1);
        let indices: Vec<usize> = plan.containers[0].elements.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1]);
        assert_eq!(plan.objects.len(), 1);
        assert_eq!(plan.objects[0].property(), "address");
        assert_eq!(plan.columns.len(), 5);
    }

    #[test]
    fn test_rename_and_ignore() {
        let config = MapperConfig::default()
            .with_column("town", ColumnDefinition::rename("address.city"))
            .with_column("internal", ColumnDefinition::ignore());
        let plan = resolve(&config, &["id", "town", "internal"]).unwrap();
        assert_eq!(plan.objects.len(), 1);
        assert_eq!(plan.columns.len(), 2);
    }

    #[test]
    fn test_unmapped_column_strict() {
        let config = MapperConfig::default().with_fail_on_unmapped(true);
        let result = resolve(&config, &["id", "unknown"]);
        assert!(matches!(result, Err(MapperError::UnmappedColumn { .. })));

        let lenient = MapperConfig::default();
        let plan = resolve(&lenient, &["id", "unknown"]).unwrap();
        assert_eq!(plan.columns, vec![ColumnKey::new("id", 0)]);
    }

    #[test]
    fn test_declared_type_mismatch() {
        let config = MapperConfig::default();
        let handler = RethrowMapperBuilderErrorHandler::default();
        let resolver = PropertyMappingResolver::new(&config, &handler, Direction::Read, "test");
        let columns = vec![ColumnKey::new("id", 0).with_type(TypeTag::Declared(ValueType::Uuid))];
        let result = resolver.resolve(&customer_meta(), &columns);
        assert!(matches!(result, Err(MapperError::AccessorResolution(_))));
    }

    #[test]
    fn test_keys_follow_config() {
        let config = MapperConfig::default().with_keys(["id"]);
        let plan = resolve(&config, &["id", "name"]).unwrap();
        assert_eq!(plan.keys, vec![ColumnKey::new("id", 0)]);
    }
}
