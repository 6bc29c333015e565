//! Mapping plans.
//!
//! A [`MappingPlan`] is the resolver's output: every column bound to a
//! constructor parameter, a setter, a container element, a nested object or
//! a join collection. Plans are pure data plus accessor closures; compiling
//! them into a [`CompiledMapper`] is a separate step so that structurally
//! equal plans can share one compiled mapper.

use std::any::TypeId;
use std::sync::Arc;

use crate::cache::CompileEnv;
use crate::config::ColumnDefinition;
use crate::error::{MapperError, MapperResult};
use crate::join::grouping::{JoinFactory, JoinListFactory};
use crate::key::{ColumnKey, Direction, FieldDescriptor, FieldRole, InstantiatorDescriptor, StructuralKey};
use crate::mapper::{CompiledMapper, NestedObjectOp, ObjectOp};
use crate::meta::{
    ContainerAccessor, InstantiatorMeta, ObjectGetterFn, ObjectSetterFn, ScalarAccessor,
};
use crate::property_path::PropertyPath;
use crate::value::ValueType;

/// A column bound to a scalar property setter or getter
pub struct PropertyMapping<T> {
    pub column: ColumnKey,
    pub path: PropertyPath,
    pub definition: ColumnDefinition,
    pub accessor: ScalarAccessor<T>,
}

/// A column bound to a constructor or builder parameter
#[derive(Debug, Clone)]
pub struct ConstructorMapping {
    pub column: ColumnKey,
    pub param: String,
    pub value_type: ValueType,
    pub definition: ColumnDefinition,
}

/// A column bound to one element of a container
#[derive(Debug, Clone)]
pub struct ElementMapping {
    pub column: ColumnKey,
    pub index: usize,
    pub definition: ColumnDefinition,
}

/// All element mappings of one container property, ordered by element index
pub struct ContainerMapping<T> {
    pub property: String,
    pub accessor: ContainerAccessor<T>,
    pub elements: Vec<ElementMapping>,
}

/// A write-path column whose value does not come from the target
#[derive(Debug, Clone)]
pub struct ConstantMapping {
    pub column: ColumnKey,
    pub definition: ColumnDefinition,
}

/// Access to a nested property of type `P` on `T`
pub enum NestedAccess<T, P> {
    Object {
        get: ObjectGetterFn<T, P>,
        set: ObjectSetterFn<T, P>,
    },
    Join {
        push: ObjectSetterFn<T, P>,
    },
}

impl<T, P> Clone for NestedAccess<T, P> {
    fn clone(&self) -> Self {
        match self {
            NestedAccess::Object { get, set } => NestedAccess::Object {
                get: get.clone(),
                set: set.clone(),
            },
            NestedAccess::Join { push } => NestedAccess::Join { push: push.clone() },
        }
    }
}

/// A resolved nested level with its element type erased.
pub trait NestedPlan<T>: Send + Sync {
    /// Property on the parent holding the nested value
    fn property(&self) -> &str;

    fn target_name(&self) -> &'static str;

    fn is_join(&self) -> bool;

    /// Every column consumed by this level and its descendants
    fn columns(&self) -> Vec<ColumnKey>;

    /// Descriptors of the nested plan, prefixed with the property path
    fn descriptors(&self) -> Vec<FieldDescriptor>;

    fn compile_object(&self, env: &CompileEnv<'_>) -> MapperResult<Box<dyn ObjectOp<T>>>;

    fn compile_join(&self, env: &CompileEnv<'_>) -> MapperResult<Arc<dyn JoinFactory<T>>>;
}

/// The typed nested plan behind a [`NestedPlan`] trait object
pub struct NestedMappingPlan<T, P> {
    pub property: String,
    pub plan: MappingPlan<P>,
    pub access: NestedAccess<T, P>,
}

impl<T: 'static, P: 'static> NestedPlan<T> for NestedMappingPlan<T, P> {
    fn property(&self) -> &str {
        &self.property
    }

    fn target_name(&self) -> &'static str {
        self.plan.target_name
    }

    fn is_join(&self) -> bool {
        matches!(self.access, NestedAccess::Join { .. })
    }

    fn columns(&self) -> Vec<ColumnKey> {
        self.plan.columns.clone()
    }

    fn descriptors(&self) -> Vec<FieldDescriptor> {
        let role = if self.is_join() { FieldRole::Join } else { FieldRole::Object };
        let mut descriptors = vec![FieldDescriptor {
            column: None,
            path: self.property.clone(),
            role,
            converter: None,
            constant: Some(self.plan.target_name.to_string()),
            key: false,
        }];
        descriptors.extend(self.plan.descriptors().into_iter().map(|mut d| {
            d.path = format!("{}.{}", self.property, d.path);
            d
        }));
        descriptors
    }

    fn compile_object(&self, env: &CompileEnv<'_>) -> MapperResult<Box<dyn ObjectOp<T>>> {
        match &self.access {
            NestedAccess::Object { get, set } => {
                let mapper = env.cache.get_or_compile(&self.plan, env)?;
                Ok(Box::new(NestedObjectOp::new(mapper, get.clone(), set.clone())))
            }
            NestedAccess::Join { .. } => Err(MapperError::AccessorResolution(format!(
                "{} is a join collection, not an object",
                self.property
            ))),
        }
    }

    fn compile_join(&self, env: &CompileEnv<'_>) -> MapperResult<Arc<dyn JoinFactory<T>>> {
        match &self.access {
            NestedAccess::Join { push } => {
                let mapper = env.cache.get_or_compile(&self.plan, env)?;
                Ok(Arc::new(JoinListFactory::new(mapper, push.clone())))
            }
            NestedAccess::Object { .. } => Err(MapperError::AccessorResolution(format!(
                "{} is an object, not a join collection",
                self.property
            ))),
        }
    }
}

/// The resolved mapping of one target type against one set of columns
pub struct MappingPlan<T> {
    /// Registration id of the `ClassMeta` the plan was resolved from
    pub meta_id: u64,
    pub target_name: &'static str,
    pub source: &'static str,
    pub direction: Direction,
    /// All columns consumed by this plan, nested levels included
    pub columns: Vec<ColumnKey>,
    /// Group key columns of this level
    pub keys: Vec<ColumnKey>,
    pub constructor: Vec<ConstructorMapping>,
    pub setters: Vec<PropertyMapping<T>>,
    pub containers: Vec<ContainerMapping<T>>,
    pub constants: Vec<ConstantMapping>,
    pub objects: Vec<Arc<dyn NestedPlan<T>>>,
    pub joins: Vec<Arc<dyn NestedPlan<T>>>,
    pub instantiator: InstantiatorMeta<T>,
}

impl<T: 'static> MappingPlan<T> {
    pub fn new(meta_id: u64, target_name: &'static str, source: &'static str, direction: Direction) -> Self {
        Self {
            meta_id,
            target_name,
            source,
            direction,
            columns: Vec::new(),
            keys: Vec::new(),
            constructor: Vec::new(),
            setters: Vec::new(),
            containers: Vec::new(),
            constants: Vec::new(),
            objects: Vec::new(),
            joins: Vec::new(),
            instantiator: InstantiatorMeta::None,
        }
    }

    pub fn has_joins(&self) -> bool {
        !self.joins.is_empty()
    }

    /// Columns mapped at this level, excluding join collections
    pub fn own_columns(&self) -> Vec<ColumnKey> {
        let joined: Vec<ColumnKey> = self.joins.iter().flat_map(|j| j.columns()).collect();
        self.columns
            .iter()
            .filter(|c| !joined.contains(c))
            .cloned()
            .collect()
    }

    /// Descriptors of every mapping in the plan, in a stable order
    pub fn descriptors(&self) -> Vec<FieldDescriptor> {
        let mut fields = Vec::new();
        for m in &self.constructor {
            fields.push(FieldDescriptor {
                column: Some(m.column.clone()),
                path: m.param.clone(),
                role: FieldRole::Constructor,
                converter: m.definition.converter.clone(),
                constant: None,
                key: m.definition.key,
            });
        }
        for m in &self.setters {
            fields.push(FieldDescriptor {
                column: Some(m.column.clone()),
                path: m.path.to_string(),
                role: FieldRole::Setter,
                converter: m.definition.converter.clone(),
                constant: None,
                key: m.definition.key,
            });
        }
        for container in &self.containers {
            for e in &container.elements {
                fields.push(FieldDescriptor {
                    column: Some(e.column.clone()),
                    path: container.property.clone(),
                    role: FieldRole::Element(e.index),
                    converter: e.definition.converter.clone(),
                    constant: None,
                    key: e.definition.key,
                });
            }
        }
        for c in &self.constants {
            fields.push(FieldDescriptor {
                column: Some(c.column.clone()),
                path: String::new(),
                role: FieldRole::Setter,
                converter: c.definition.converter.clone(),
                constant: c.definition.constant.as_ref().map(|v| v.to_cell_string()),
                key: c.definition.key,
            });
        }
        for nested in self.objects.iter().chain(self.joins.iter()) {
            fields.extend(nested.descriptors());
        }
        fields
    }

    /// Fingerprint of the plan used as the compiled mapper cache key
    pub fn structural_key(&self) -> StructuralKey {
        let instantiator = match (&self.direction, &self.instantiator) {
            (Direction::Write, _) | (_, InstantiatorMeta::None) => InstantiatorDescriptor::None,
            (_, InstantiatorMeta::Default(_)) => InstantiatorDescriptor::Default,
            (_, InstantiatorMeta::Constructor { params, .. }) => {
                InstantiatorDescriptor::Constructor(params.iter().map(|p| p.name.clone()).collect())
            }
            (_, InstantiatorMeta::StagedBuilder { params, .. }) => InstantiatorDescriptor::StagedBuilder(
                params.iter().map(|p| p.name.clone()).collect(),
            ),
        };
        StructuralKey {
            target: TypeId::of::<T>(),
            meta_id: self.meta_id,
            target_name: self.target_name,
            source: self.source,
            direction: self.direction,
            columns: self.columns.clone(),
            fields: self.descriptors(),
            instantiator,
        }
    }

    /// Compile this plan without going through a cache
    pub fn compile(&self, env: &CompileEnv<'_>) -> MapperResult<CompiledMapper<T>> {
        CompiledMapper::compile(self, env)
    }
}
