//! Target type metadata.
//!
//! A [`ClassMeta`] is the settable/gettable surface of a target type,
//! registered once as a set of typed accessor closures. The resolver reads it
//! to build mapping plans; compiled mappers only keep the closures they need.
//!
//! # Example
//!
//! ```
//! use flatmapper::meta::ClassMeta;
//!
//! #[derive(Default)]
//! struct Person {
//!     id: i64,
//!     name: String,
//!     tags: Vec<String>,
//! }
//!
//! let meta = ClassMeta::<Person>::with_default("Person")
//!     .field("id", |p: &Person| &p.id, |p: &mut Person| &mut p.id)
//!     .field("name", |p: &Person| &p.name, |p: &mut Person| &mut p.name)
//!     .container("tags", |p: &Person| &p.tags, |p: &mut Person| &mut p.tags);
//!
//! assert_eq!(meta.properties().len(), 3);
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{ConversionError, MapperResult};
use crate::plan::{NestedAccess, NestedMappingPlan, NestedPlan};
use crate::resolver::{PropertyMappingResolver, ResolvedColumn};
use crate::value::{FieldValue, Formats, FromFieldValue, ToFieldValue, ValueType};

pub type SetterFn<T> =
    Arc<dyn Fn(&mut T, &FieldValue, &Formats) -> Result<(), ConversionError> + Send + Sync>;
pub type GetterFn<T> = Arc<dyn Fn(&T, &Formats) -> FieldValue + Send + Sync>;
pub type ResetFn<T> = Arc<dyn Fn(&mut T) + Send + Sync>;
pub type SizeFn<T> = Arc<dyn Fn(&T) -> usize + Send + Sync>;
pub type ElementGetterFn<T> = Arc<dyn Fn(&T, usize, &Formats) -> Option<FieldValue> + Send + Sync>;
pub type ElementSetterFn<T> =
    Arc<dyn Fn(&mut T, usize, &FieldValue, &Formats) -> Result<(), ConversionError> + Send + Sync>;
pub type ObjectGetterFn<T, P> = Arc<dyn for<'a> Fn(&'a T) -> Option<&'a P> + Send + Sync>;
pub type ObjectSetterFn<T, P> = Arc<dyn Fn(&mut T, P) + Send + Sync>;
pub type ConstructorFn<T> =
    Arc<dyn Fn(&mut ConstructorArgs<'_>) -> Result<T, ConversionError> + Send + Sync>;

/// Read/write access to a scalar property
pub struct ScalarAccessor<T> {
    pub value_type: ValueType,
    pub setter: Option<SetterFn<T>>,
    pub getter: Option<GetterFn<T>>,
    pub reset: Option<ResetFn<T>>,
}

impl<T> Clone for ScalarAccessor<T> {
    fn clone(&self) -> Self {
        Self {
            value_type: self.value_type,
            setter: self.setter.clone(),
            getter: self.getter.clone(),
            reset: self.reset.clone(),
        }
    }
}

/// Access to an ordered container of scalars
pub struct ContainerAccessor<T> {
    pub element_type: ValueType,
    pub size: SizeFn<T>,
    pub get_element: ElementGetterFn<T>,
    pub set_element: ElementSetterFn<T>,
}

impl<T> Clone for ContainerAccessor<T> {
    fn clone(&self) -> Self {
        Self {
            element_type: self.element_type,
            size: self.size.clone(),
            get_element: self.get_element.clone(),
            set_element: self.set_element.clone(),
        }
    }
}

/// A property whose value is itself a mapped type.
///
/// Object-safe so a `ClassMeta<T>` can hold nested properties of any type.
pub trait NestedProperty<T>: Send + Sync {
    fn type_name(&self) -> &'static str;

    /// Resolve the nested type against the columns carrying this property's
    /// prefix (already stripped from their names).
    fn resolve(
        &self,
        resolver: &PropertyMappingResolver<'_>,
        property: &str,
        columns: Vec<ResolvedColumn>,
    ) -> MapperResult<Arc<dyn NestedPlan<T>>>;

    /// One-to-many join collections are grouped across rows
    fn is_join(&self) -> bool;
}

struct NestedMeta<T, P> {
    meta: ClassMeta<P>,
    access: NestedAccess<T, P>,
}

impl<T: 'static, P: 'static> NestedProperty<T> for NestedMeta<T, P> {
    fn type_name(&self) -> &'static str {
        self.meta.name()
    }

    fn resolve(
        &self,
        resolver: &PropertyMappingResolver<'_>,
        property: &str,
        columns: Vec<ResolvedColumn>,
    ) -> MapperResult<Arc<dyn NestedPlan<T>>> {
        let plan = resolver.resolve_columns(&self.meta, columns)?;
        Ok(Arc::new(NestedMappingPlan {
            property: property.to_string(),
            plan,
            access: self.access.clone(),
        }))
    }

    fn is_join(&self) -> bool {
        matches!(self.access, NestedAccess::Join { .. })
    }
}

/// What kind of property this is and how to reach it
pub enum PropertyKind<T> {
    Scalar(ScalarAccessor<T>),
    Container(ContainerAccessor<T>),
    Nested(Arc<dyn NestedProperty<T>>),
}

impl<T> Clone for PropertyKind<T> {
    fn clone(&self) -> Self {
        match self {
            PropertyKind::Scalar(a) => PropertyKind::Scalar(a.clone()),
            PropertyKind::Container(a) => PropertyKind::Container(a.clone()),
            PropertyKind::Nested(n) => PropertyKind::Nested(n.clone()),
        }
    }
}

/// A named property of a target type
pub struct PropertyMeta<T> {
    pub name: String,
    pub kind: PropertyKind<T>,
}

impl<T> Clone for PropertyMeta<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            kind: self.kind.clone(),
        }
    }
}

impl<T> fmt::Debug for PropertyMeta<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &self.kind {
            PropertyKind::Scalar(a) => format!("scalar {}", a.value_type),
            PropertyKind::Container(a) => format!("container of {}", a.element_type),
            PropertyKind::Nested(n) if n.is_join() => format!("join of {}", n.type_name()),
            PropertyKind::Nested(n) => format!("object {}", n.type_name()),
        };
        write!(f, "{} ({})", self.name, kind)
    }
}

/// A named constructor or builder parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructorParam {
    pub name: String,
    pub value_type: ValueType,
}

/// How instances of the target are created
pub enum InstantiatorMeta<T> {
    /// No way to create instances; usable for write plans only
    None,
    Default(Arc<dyn Fn() -> T + Send + Sync>),
    /// Declared parameters are passed to the constructor, the remaining
    /// properties are set after construction.
    Constructor {
        params: Vec<ConstructorParam>,
        build: ConstructorFn<T>,
    },
    /// Every scalar value is staged by property name and handed to `build`.
    StagedBuilder {
        params: Vec<ConstructorParam>,
        build: ConstructorFn<T>,
    },
}

impl<T> Clone for InstantiatorMeta<T> {
    fn clone(&self) -> Self {
        match self {
            InstantiatorMeta::None => InstantiatorMeta::None,
            InstantiatorMeta::Default(f) => InstantiatorMeta::Default(f.clone()),
            InstantiatorMeta::Constructor { params, build } => InstantiatorMeta::Constructor {
                params: params.clone(),
                build: build.clone(),
            },
            InstantiatorMeta::StagedBuilder { params, build } => InstantiatorMeta::StagedBuilder {
                params: params.clone(),
                build: build.clone(),
            },
        }
    }
}

/// Values collected for a constructor or a staged builder, in column order.
pub struct ConstructorArgs<'a> {
    values: IndexMap<String, FieldValue>,
    formats: &'a Formats,
    failed: Option<String>,
}

impl<'a> ConstructorArgs<'a> {
    pub fn new(formats: &'a Formats) -> Self {
        Self {
            values: IndexMap::new(),
            formats,
            failed: None,
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: FieldValue) {
        self.values.insert(name.into(), value);
    }

    /// Take and convert an argument; a missing argument converts from `Null`.
    pub fn take<P: FromFieldValue>(&mut self, name: &str) -> Result<P, ConversionError> {
        let value = self.values.shift_remove(name).unwrap_or(FieldValue::Null);
        P::from_field_value(&value, self.formats).inspect_err(|_| self.failed = Some(name.to_string()))
    }

    /// Name of the last argument that failed to convert
    pub fn failed(&self) -> Option<&str> {
        self.failed.as_deref()
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|k| k.as_str())
    }
}

/// An ordered, index-addressable container
pub trait IndexedContainer: Send + Sync + 'static {
    type Element;

    fn size(&self) -> usize;

    fn element(&self, index: usize) -> Option<&Self::Element>;

    fn set_element(&mut self, index: usize, value: Self::Element) -> Result<(), String>;
}

/// Setting past the end grows the vector with default elements
impl<E: Default + Send + Sync + 'static> IndexedContainer for Vec<E> {
    type Element = E;

    fn size(&self) -> usize {
        self.len()
    }

    fn element(&self, index: usize) -> Option<&E> {
        self.get(index)
    }

    fn set_element(&mut self, index: usize, value: E) -> Result<(), String> {
        if index >= self.len() {
            self.resize_with(index + 1, E::default);
        }
        self[index] = value;
        Ok(())
    }
}

impl<E: Send + Sync + 'static, const N: usize> IndexedContainer for [E; N] {
    type Element = E;

    fn size(&self) -> usize {
        N
    }

    fn element(&self, index: usize) -> Option<&E> {
        self.get(index)
    }

    fn set_element(&mut self, index: usize, value: E) -> Result<(), String> {
        match self.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(format!("index {} out of bounds for array of {}", index, N)),
        }
    }
}

static NEXT_META_ID: AtomicU64 = AtomicU64::new(1);

fn next_meta_id() -> u64 {
    NEXT_META_ID.fetch_add(1, Ordering::Relaxed)
}

/// The registered surface of a target type.
///
/// Every builder step gives the meta a fresh registration id; clones keep it.
/// Mappers compiled from metas with different ids are never shared.
pub struct ClassMeta<T> {
    id: u64,
    name: &'static str,
    properties: Vec<PropertyMeta<T>>,
    instantiator: InstantiatorMeta<T>,
}

impl<T> Clone for ClassMeta<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            name: self.name,
            properties: self.properties.clone(),
            instantiator: self.instantiator.clone(),
        }
    }
}

impl<T> fmt::Debug for ClassMeta<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassMeta")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("properties", &self.properties)
            .finish()
    }
}

impl<T: Default + 'static> ClassMeta<T> {
    /// Metadata for a type built through `Default`
    pub fn with_default(name: &'static str) -> Self {
        Self::new(name).default_instantiator(T::default)
    }
}

impl<T: 'static> ClassMeta<T> {
    /// Metadata without an instantiator
    pub fn new(name: &'static str) -> Self {
        Self {
            id: next_meta_id(),
            name,
            properties: Vec::new(),
            instantiator: InstantiatorMeta::None,
        }
    }

    /// Registration id, part of the structural key of every plan built from it
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    fn renewed(mut self) -> Self {
        self.id = next_meta_id();
        self
    }

    pub fn properties(&self) -> &[PropertyMeta<T>] {
        &self.properties
    }

    pub fn instantiator(&self) -> &InstantiatorMeta<T> {
        &self.instantiator
    }

    pub fn default_instantiator(mut self, create: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.instantiator = InstantiatorMeta::Default(Arc::new(create));
        self.renewed()
    }

    /// Constructor injection for the named parameters
    pub fn constructor(
        mut self,
        params: &[(&str, ValueType)],
        build: impl Fn(&mut ConstructorArgs<'_>) -> Result<T, ConversionError> + Send + Sync + 'static,
    ) -> Self {
        self.instantiator = InstantiatorMeta::Constructor {
            params: to_params(params),
            build: Arc::new(build),
        };
        self.renewed()
    }

    /// Staged builder: all scalar values are collected, then `build` runs once
    pub fn staged_builder(
        mut self,
        params: &[(&str, ValueType)],
        build: impl Fn(&mut ConstructorArgs<'_>) -> Result<T, ConversionError> + Send + Sync + 'static,
    ) -> Self {
        self.instantiator = InstantiatorMeta::StagedBuilder {
            params: to_params(params),
            build: Arc::new(build),
        };
        self.renewed()
    }

    /// A read/write scalar field reached through a lens pair
    pub fn field<P>(
        self,
        name: &str,
        get: impl Fn(&T) -> &P + Send + Sync + 'static,
        get_mut: impl Fn(&mut T) -> &mut P + Send + Sync + 'static,
    ) -> Self
    where
        P: FromFieldValue + ToFieldValue + Default + 'static,
    {
        let get_mut = Arc::new(get_mut);
        let set_lens = get_mut.clone();
        let setter: SetterFn<T> = Arc::new(move |target: &mut T, value: &FieldValue, formats: &Formats| {
            *set_lens(target) = P::from_field_value(value, formats)?;
            Ok(())
        });
        let getter: GetterFn<T> =
            Arc::new(move |target: &T, formats: &Formats| get(target).to_field_value(formats));
        let reset: ResetFn<T> = Arc::new(move |target: &mut T| *get_mut(target) = P::default());
        self.property(
            name,
            ScalarAccessor {
                value_type: P::VALUE_TYPE,
                setter: Some(setter),
                getter: Some(getter),
                reset: Some(reset),
            },
        )
    }

    /// A property that can only be read; populated through a constructor
    pub fn read_only<P>(self, name: &str, get: impl Fn(&T) -> &P + Send + Sync + 'static) -> Self
    where
        P: FromFieldValue + ToFieldValue + 'static,
    {
        let getter: GetterFn<T> =
            Arc::new(move |target: &T, formats: &Formats| get(target).to_field_value(formats));
        self.property(
            name,
            ScalarAccessor {
                value_type: P::VALUE_TYPE,
                setter: None,
                getter: Some(getter),
                reset: None,
            },
        )
    }

    /// A scalar property from raw accessors
    pub fn property(mut self, name: &str, accessor: ScalarAccessor<T>) -> Self {
        self.properties.push(PropertyMeta {
            name: name.to_string(),
            kind: PropertyKind::Scalar(accessor),
        });
        self.renewed()
    }

    /// An indexed container bound element by element to columns
    pub fn container<C>(
        mut self,
        name: &str,
        get: impl Fn(&T) -> &C + Send + Sync + 'static,
        get_mut: impl Fn(&mut T) -> &mut C + Send + Sync + 'static,
    ) -> Self
    where
        C: IndexedContainer,
        C::Element: FromFieldValue + ToFieldValue,
    {
        let get = Arc::new(get);
        let size_lens = get.clone();
        let size: SizeFn<T> = Arc::new(move |target: &T| size_lens(target).size());
        let get_element: ElementGetterFn<T> =
            Arc::new(move |target: &T, index: usize, formats: &Formats| {
                get(target).element(index).map(|e| e.to_field_value(formats))
            });
        let set_element: ElementSetterFn<T> = Arc::new(
            move |target: &mut T, index: usize, value: &FieldValue, formats: &Formats| {
                let element = <C::Element as FromFieldValue>::from_field_value(value, formats)?;
                get_mut(target)
                    .set_element(index, element)
                    .map_err(|reason| {
                        ConversionError::new(value, <C::Element as FromFieldValue>::VALUE_TYPE, reason)
                    })
            },
        );
        self.properties.push(PropertyMeta {
            name: name.to_string(),
            kind: PropertyKind::Container(ContainerAccessor {
                element_type: <C::Element as FromFieldValue>::VALUE_TYPE,
                size,
                get_element,
                set_element,
            }),
        });
        self.renewed()
    }

    /// A nested object property, read and written through its own mapper
    pub fn object<P: 'static>(
        mut self,
        name: &str,
        meta: ClassMeta<P>,
        get: impl for<'a> Fn(&'a T) -> Option<&'a P> + Send + Sync + 'static,
        set: impl Fn(&mut T, P) + Send + Sync + 'static,
    ) -> Self {
        let nested = NestedMeta {
            meta,
            access: NestedAccess::Object {
                get: Arc::new(get),
                set: Arc::new(set),
            },
        };
        self.properties.push(PropertyMeta {
            name: name.to_string(),
            kind: PropertyKind::Nested(Arc::new(nested)),
        });
        self.renewed()
    }

    /// A one-to-many collection assembled from consecutive rows
    pub fn join<P: 'static>(
        mut self,
        name: &str,
        meta: ClassMeta<P>,
        get_mut: impl Fn(&mut T) -> &mut Vec<P> + Send + Sync + 'static,
    ) -> Self {
        let nested = NestedMeta {
            meta,
            access: NestedAccess::Join {
                push: Arc::new(move |target: &mut T, value: P| get_mut(target).push(value)),
            },
        };
        self.properties.push(PropertyMeta {
            name: name.to_string(),
            kind: PropertyKind::Nested(Arc::new(nested)),
        });
        self.renewed()
    }

    /// Constructor or builder parameter with the given name
    pub fn constructor_param(&self, name: &str, matches: impl Fn(&str, &str) -> bool) -> Option<&ConstructorParam> {
        match &self.instantiator {
            InstantiatorMeta::Constructor { params, .. }
            | InstantiatorMeta::StagedBuilder { params, .. } => {
                params.iter().find(|p| matches(&p.name, name))
            }
            _ => None,
        }
    }
}

fn to_params(params: &[(&str, ValueType)]) -> Vec<ConstructorParam> {
    params
        .iter()
        .map(|(name, value_type)| ConstructorParam {
            name: name.to_string(),
            value_type: *value_type,
        })
        .collect()
}
