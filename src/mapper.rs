//! Compiled mappers.
//!
//! A [`CompiledMapper`] is a [`MappingPlan`] flattened into a list of field
//! operations over the accessor closures, with converters looked up and
//! nested levels compiled up front. Compiled mappers hold no per-row state
//! and are shared across threads; join grouping state lives in the
//! [`crate::join`] nodes created per stream.

use std::fmt;
use std::sync::Arc;

use crate::cache::CompileEnv;
use crate::config::ColumnDefinition;
use crate::converter::{ConverterRegistry, ValueConverter};
use crate::error::{ConversionError, MapperError, MapperResult};
use crate::error_handler::{FieldErrorAction, FieldErrorHandler};
use crate::join::grouping::{JoinFactory, JoinNode};
use crate::key::{ColumnKey, Direction};
use crate::meta::{
    ConstructorArgs, ConstructorFn, ElementGetterFn, ElementSetterFn, GetterFn, InstantiatorMeta,
    ObjectGetterFn, ObjectSetterFn, ResetFn, SetterFn, SizeFn,
};
use crate::plan::MappingPlan;
use crate::source::{GettableByIndex, SettableByIndex};
use crate::value::{FieldValue, Formats, ValueType};

/// Read/write of a nested object, with its type erased
pub trait ObjectOp<T>: Send + Sync {
    fn read(&self, target: &mut T, source: &dyn GettableByIndex) -> MapperResult<()>;

    fn write(&self, target: &T, sink: &mut dyn SettableByIndex) -> MapperResult<()>;
}

/// A nested object mapped through its own compiled mapper.
///
/// On read the object is only created when at least one of its columns is
/// non-null. On write an absent object writes nulls to its columns.
pub struct NestedObjectOp<T, P> {
    mapper: Arc<CompiledMapper<P>>,
    get: ObjectGetterFn<T, P>,
    set: ObjectSetterFn<T, P>,
}

impl<T, P> NestedObjectOp<T, P> {
    pub fn new(mapper: Arc<CompiledMapper<P>>, get: ObjectGetterFn<T, P>, set: ObjectSetterFn<T, P>) -> Self {
        Self { mapper, get, set }
    }
}

impl<T: 'static, P: 'static> ObjectOp<T> for NestedObjectOp<T, P> {
    fn read(&self, target: &mut T, source: &dyn GettableByIndex) -> MapperResult<()> {
        if self.mapper.is_null_in(source) {
            return Ok(());
        }
        let value = self.mapper.map_dyn(source)?;
        (self.set)(target, value);
        Ok(())
    }

    fn write(&self, target: &T, sink: &mut dyn SettableByIndex) -> MapperResult<()> {
        match (self.get)(target) {
            Some(value) => self.mapper.write_dyn(value, sink),
            None => {
                for column in &self.mapper.columns {
                    sink.set(column, FieldValue::Null)?;
                }
                Ok(())
            }
        }
    }
}

/// Read-path operation on a scalar property
pub enum FieldOp<T> {
    Direct {
        column: ColumnKey,
        setter: SetterFn<T>,
        reset: Option<ResetFn<T>>,
    },
    Converted {
        column: ColumnKey,
        converter: Arc<dyn ValueConverter>,
        setter: SetterFn<T>,
        reset: Option<ResetFn<T>>,
    },
}

/// Write-path operation producing one or more column values
pub enum WriteOp<T> {
    Direct {
        column: ColumnKey,
        getter: GetterFn<T>,
    },
    Converted {
        column: ColumnKey,
        converter: Arc<dyn ValueConverter>,
        getter: GetterFn<T>,
    },
    Constant {
        column: ColumnKey,
        value: FieldValue,
    },
    /// Bound elements of a container; positions past its size write `Null`
    Elements {
        property: String,
        size: SizeFn<T>,
        get_element: ElementGetterFn<T>,
        columns: Vec<(usize, ColumnKey)>,
    },
}

struct ConstructorOp {
    column: ColumnKey,
    param: String,
    value_type: ValueType,
    converter: Option<Arc<dyn ValueConverter>>,
}

struct ElementOp<T> {
    set_element: ElementSetterFn<T>,
    elements: Vec<(usize, ColumnKey, Option<Arc<dyn ValueConverter>>)>,
}

enum Instantiator<T> {
    Default(Arc<dyn Fn() -> T + Send + Sync>),
    Constructor(ConstructorFn<T>),
    None,
}

/// An executable mapper for one target type and one column layout
pub struct CompiledMapper<T> {
    target_name: &'static str,
    direction: Direction,
    formats: Arc<Formats>,
    field_handler: Arc<dyn FieldErrorHandler>,
    instantiator: Instantiator<T>,
    constructor_ops: Vec<ConstructorOp>,
    field_ops: Vec<FieldOp<T>>,
    element_ops: Vec<ElementOp<T>>,
    write_ops: Vec<WriteOp<T>>,
    object_ops: Vec<Box<dyn ObjectOp<T>>>,
    joins: Vec<Arc<dyn JoinFactory<T>>>,
    columns: Vec<ColumnKey>,
    group_columns: Vec<ColumnKey>,
}

impl<T> fmt::Debug for CompiledMapper<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledMapper")
            .field("target", &self.target_name)
            .field("direction", &self.direction)
            .field("columns", &self.columns.len())
            .field("field_ops", &(self.field_ops.len() + self.write_ops.len()))
            .field("objects", &self.object_ops.len())
            .field("joins", &self.joins.len())
            .finish()
    }
}

fn lookup_converter(
    converters: &ConverterRegistry,
    definition: &ColumnDefinition,
) -> MapperResult<Option<Arc<dyn ValueConverter>>> {
    definition
        .converter
        .as_deref()
        .map(|name| converters.get(name))
        .transpose()
}

impl<T: 'static> CompiledMapper<T> {
    /// Compile a plan. Nested plans are compiled through the cache in `env`.
    pub fn compile(plan: &MappingPlan<T>, env: &CompileEnv<'_>) -> MapperResult<Self> {
        let mut mapper = CompiledMapper {
            target_name: plan.target_name,
            direction: plan.direction,
            formats: env.formats.clone(),
            field_handler: env.field_handler.clone(),
            instantiator: Instantiator::None,
            constructor_ops: Vec::new(),
            field_ops: Vec::new(),
            element_ops: Vec::new(),
            write_ops: Vec::new(),
            object_ops: Vec::new(),
            joins: Vec::new(),
            columns: plan.columns.clone(),
            group_columns: if plan.keys.is_empty() {
                plan.own_columns()
            } else {
                plan.keys.clone()
            },
        };

        match plan.direction {
            Direction::Read => mapper.compile_read(plan, env)?,
            Direction::Write => mapper.compile_write(plan, env)?,
        }
        for object in &plan.objects {
            mapper.object_ops.push(object.compile_object(env)?);
        }
        Ok(mapper)
    }

    fn compile_read(&mut self, plan: &MappingPlan<T>, env: &CompileEnv<'_>) -> MapperResult<()> {
        self.instantiator = match &plan.instantiator {
            InstantiatorMeta::Default(create) => Instantiator::Default(create.clone()),
            InstantiatorMeta::Constructor { build, .. } | InstantiatorMeta::StagedBuilder { build, .. } => {
                Instantiator::Constructor(build.clone())
            }
            InstantiatorMeta::None => {
                return Err(MapperError::AccessorResolution(format!(
                    "No instantiator registered for {}",
                    plan.target_name
                )))
            }
        };

        for m in &plan.constructor {
            self.constructor_ops.push(ConstructorOp {
                column: m.column.clone(),
                param: m.param.clone(),
                value_type: m.value_type,
                converter: lookup_converter(env.converters, &m.definition)?,
            });
        }

        for m in &plan.setters {
            let setter = m.accessor.setter.clone().ok_or_else(|| {
                MapperError::AccessorResolution(format!("No setter for {} on {}", m.path, plan.target_name))
            })?;
            let reset = m.accessor.reset.clone();
            let column = m.column.clone();
            self.field_ops.push(match lookup_converter(env.converters, &m.definition)? {
                Some(converter) => FieldOp::Converted {
                    column,
                    converter,
                    setter,
                    reset,
                },
                None => FieldOp::Direct { column, setter, reset },
            });
        }

        for container in &plan.containers {
            let mut elements = Vec::with_capacity(container.elements.len());
            for e in &container.elements {
                elements.push((
                    e.index,
                    e.column.clone(),
                    lookup_converter(env.converters, &e.definition)?,
                ));
            }
            self.element_ops.push(ElementOp {
                set_element: container.accessor.set_element.clone(),
                elements,
            });
        }

        for join in &plan.joins {
            self.joins.push(join.compile_join(env)?);
        }
        Ok(())
    }

    fn compile_write(&mut self, plan: &MappingPlan<T>, env: &CompileEnv<'_>) -> MapperResult<()> {
        if !plan.joins.is_empty() {
            return Err(MapperError::AccessorResolution(format!(
                "Join collections on {} cannot be written to a flat sink",
                plan.target_name
            )));
        }
        for m in &plan.setters {
            let getter = m.accessor.getter.clone().ok_or_else(|| {
                MapperError::AccessorResolution(format!("No getter for {} on {}", m.path, plan.target_name))
            })?;
            let column = m.column.clone();
            self.write_ops.push(match lookup_converter(env.converters, &m.definition)? {
                Some(converter) => WriteOp::Converted {
                    column,
                    converter,
                    getter,
                },
                None => WriteOp::Direct { column, getter },
            });
        }
        for container in &plan.containers {
            self.write_ops.push(WriteOp::Elements {
                property: container.property.clone(),
                size: container.accessor.size.clone(),
                get_element: container.accessor.get_element.clone(),
                columns: container
                    .elements
                    .iter()
                    .map(|e| (e.index, e.column.clone()))
                    .collect(),
            });
        }
        for c in &plan.constants {
            self.write_ops.push(WriteOp::Constant {
                column: c.column.clone(),
                value: c.definition.constant.clone().unwrap_or(FieldValue::Null),
            });
        }
        Ok(())
    }
}

impl<T: 'static> CompiledMapper<T> {
    pub fn target_name(&self) -> &'static str {
        self.target_name
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// All columns the mapper reads or writes, nested levels included
    pub fn columns(&self) -> &[ColumnKey] {
        &self.columns
    }

    /// Columns whose values identify a group at this level
    pub fn group_columns(&self) -> &[ColumnKey] {
        &self.group_columns
    }

    pub fn has_joins(&self) -> bool {
        !self.joins.is_empty()
    }

    /// Fresh grouping nodes for the join collections of this level
    pub fn join_nodes(&self) -> Vec<Box<dyn JoinNode<T>>> {
        self.joins.iter().map(|j| j.new_node()).collect()
    }

    /// Map one row to a new instance.
    ///
    /// Join collections receive this row only; use
    /// [`crate::join::GroupingMapper`] to group consecutive rows.
    pub fn map<S: GettableByIndex>(&self, source: &S) -> MapperResult<T> {
        let source: &dyn GettableByIndex = source;
        let mut target = self.map_dyn(source)?;
        for mut node in self.join_nodes() {
            node.on_row(&mut target, source, true)?;
            node.flush(&mut target);
        }
        Ok(target)
    }

    /// Populate an existing instance from one row
    pub fn map_to<S: GettableByIndex>(&self, target: &mut T, source: &S) -> MapperResult<()> {
        self.apply(target, source)
    }

    /// Instance for this level only: constructor, setters, elements and
    /// nested objects, without join collections.
    pub(crate) fn map_dyn(&self, source: &dyn GettableByIndex) -> MapperResult<T> {
        let mut target = self.instantiate(source)?;
        self.apply(&mut target, source)?;
        Ok(target)
    }

    /// Whether every column of this level and below is null in the row
    pub(crate) fn is_null_in(&self, source: &dyn GettableByIndex) -> bool {
        self.columns.iter().all(|c| source.get(c).is_null())
    }

    fn instantiate(&self, source: &dyn GettableByIndex) -> MapperResult<T> {
        match &self.instantiator {
            Instantiator::Default(create) => Ok(create()),
            Instantiator::Constructor(build) => {
                let mut args = ConstructorArgs::new(&self.formats);
                for op in &self.constructor_ops {
                    let raw = source.get(&op.column);
                    let converted = match &op.converter {
                        Some(converter) => converter.convert(raw, &self.formats),
                        None => Ok(raw),
                    };
                    let value = match converted.and_then(|v| op.value_type.normalize(v, &self.formats)) {
                        Ok(value) => value,
                        Err(e) => match self.on_field_error(e, &op.column)? {
                            FieldErrorAction::UseDefault => op.value_type.default_value(&self.formats),
                            _ => continue,
                        },
                    };
                    args.insert(op.param.clone(), value);
                }
                build(&mut args).map_err(|e| {
                    let column = args
                        .failed()
                        .and_then(|name| self.constructor_ops.iter().find(|op| op.param == name))
                        .map(|op| &op.column);
                    match column {
                        Some(column) if e.column.is_none() => MapperError::Conversion(e.with_column(column)),
                        _ => MapperError::from(e),
                    }
                })
            }
            Instantiator::None => Err(MapperError::AccessorResolution(format!(
                "{} mapper cannot create instances",
                self.target_name
            ))),
        }
    }

    fn apply(&self, target: &mut T, source: &dyn GettableByIndex) -> MapperResult<()> {
        for op in &self.field_ops {
            let (column, result, reset) = match op {
                FieldOp::Direct { column, setter, reset } => {
                    let value = source.get(column);
                    (column, setter(target, &value, &self.formats), reset)
                }
                FieldOp::Converted {
                    column,
                    converter,
                    setter,
                    reset,
                } => {
                    let result = converter
                        .convert(source.get(column), &self.formats)
                        .and_then(|value| setter(target, &value, &self.formats));
                    (column, result, reset)
                }
            };
            if let Err(e) = result {
                if self.on_field_error(e, column)? == FieldErrorAction::UseDefault {
                    if let Some(reset) = reset {
                        reset(target);
                    }
                }
            }
        }

        for op in &self.element_ops {
            for (index, column, converter) in &op.elements {
                let raw = source.get(column);
                let result = match converter {
                    Some(converter) => converter
                        .convert(raw, &self.formats)
                        .and_then(|value| (op.set_element)(target, *index, &value, &self.formats)),
                    None => (op.set_element)(target, *index, &raw, &self.formats),
                };
                if let Err(e) = result {
                    self.on_field_error(e, column)?;
                }
            }
        }

        for op in &self.object_ops {
            op.read(target, source)?;
        }
        Ok(())
    }

    /// Write an instance to a sink
    pub fn write<S: SettableByIndex>(&self, target: &T, sink: &mut S) -> MapperResult<()> {
        self.write_dyn(target, sink)
    }

    /// Write an instance into a positional row
    pub fn to_row(&self, target: &T) -> MapperResult<Vec<FieldValue>> {
        let mut row = Vec::with_capacity(self.columns.len());
        self.write_dyn(target, &mut row)?;
        Ok(row)
    }

    pub(crate) fn write_dyn(&self, target: &T, sink: &mut dyn SettableByIndex) -> MapperResult<()> {
        for op in &self.write_ops {
            match op {
                WriteOp::Direct { column, getter } => {
                    sink.set(column, getter(target, &self.formats))?;
                }
                WriteOp::Converted {
                    column,
                    converter,
                    getter,
                } => match converter.convert(getter(target, &self.formats), &self.formats) {
                    Ok(value) => sink.set(column, value)?,
                    Err(e) => {
                        if self.on_field_error(e, column)? == FieldErrorAction::UseDefault {
                            sink.set(column, FieldValue::Null)?;
                        }
                    }
                },
                WriteOp::Constant { column, value } => sink.set(column, value.clone())?,
                WriteOp::Elements {
                    property,
                    size,
                    get_element,
                    columns,
                } => {
                    let size = size(target);
                    for (index, column) in columns {
                        let value = if *index < size {
                            get_element(target, *index, &self.formats).unwrap_or(FieldValue::Null)
                        } else {
                            FieldValue::Null
                        };
                        sink.set(column, value)?;
                    }
                    let bound = columns.iter().filter(|(index, _)| *index < size).count();
                    match columns.last() {
                        Some((_, column)) if size > bound => {
                            let error = ConversionError::new(
                                &FieldValue::Int(size as i64),
                                ValueType::Int,
                                format!("{} has {} elements but only {} are bound to columns", property, size, bound),
                            );
                            self.on_field_error(error, column)?;
                        }
                        _ => {}
                    }
                }
            }
        }
        for op in &self.object_ops {
            op.write(target, sink)?;
        }
        Ok(())
    }

    /// Offer a conversion failure to the field error handler
    fn on_field_error(&self, error: ConversionError, column: &ColumnKey) -> MapperResult<FieldErrorAction> {
        let error = error.with_column(column);
        match self
            .field_handler
            .on_field_error(&error, column, self.target_name)
        {
            FieldErrorAction::Abort => Err(MapperError::Conversion(error)),
            action => Ok(action),
        }
    }
}
