use crate::document::Value;
use crate::document::bson::BsonError;
use crate::registry::field::{FieldKind, FieldType, ShapeRef};
use crate::registry::{BindContext, TypeRegistry};

/// A Rust type that maps to and from documents.
///
/// Implementors describe their fields once; the registry caches the result.
/// Every field type goes through [`FieldType`], so the leaf whitelist is
/// enforced at compile time: a shape is always encodable, and only binding
/// can fail with `BsonError::UnsupportedShape`.
///
/// ```
/// use docwire::registry::{Schema, Shape};
///
/// #[derive(Default)]
/// struct Person {
///     name: String,
///     age: Option<i32>,
/// }
///
/// impl Shape for Person {
///     fn describe(schema: &mut Schema<Self>) {
///         schema
///             .constructor(Person::default)
///             .field("Name", |p| &p.name, |p, v| p.name = v)
///             .field("Age", |p| &p.age, |p, v| p.age = v);
///     }
/// }
/// ```
pub trait Shape: Sized + Send + Sync + 'static {
    fn describe(schema: &mut Schema<Self>);
}

pub(crate) type Getter<T> =
    Box<dyn Fn(&T, &TypeRegistry) -> Result<Value, BsonError> + Send + Sync>;
pub(crate) type Setter<T> =
    Box<dyn Fn(&mut T, Value, &mut BindContext<'_>) -> Result<(), BsonError> + Send + Sync>;

pub(crate) struct FieldDescriptor<T> {
    pub(crate) name: String,
    pub(crate) kind: FieldKind,
    pub(crate) is_id: bool,
    pub(crate) getter: Option<Getter<T>>,
    pub(crate) setter: Option<Setter<T>>,
}

/// Field list of a shape, built by `Shape::describe`.
pub struct Schema<T> {
    pub(crate) name: String,
    pub(crate) constructor: Option<fn() -> T>,
    pub(crate) fields: Vec<FieldDescriptor<T>>,
}

impl<T: Shape> Schema<T> {
    pub(crate) fn new() -> Self {
        let full = std::any::type_name::<T>();
        let name = full.rsplit("::").next().unwrap_or(full);
        Schema {
            name: name.to_string(),
            constructor: None,
            fields: Vec::new(),
        }
    }

    /// Name used in errors and passed to the key alias resolver. Defaults to
    /// the bare type name.
    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.name = name.into();
        self
    }

    /// Builds the empty instance that decoding fills in. Shapes without one
    /// can be encoded but not decoded.
    pub fn constructor(&mut self, constructor: fn() -> T) -> &mut Self {
        self.constructor = Some(constructor);
        self
    }

    pub fn field<F, G, S>(&mut self, name: &str, get: G, set: S) -> &mut Self
    where
        F: FieldType,
        G: Fn(&T) -> &F + Send + Sync + 'static,
        S: Fn(&mut T, F) + Send + Sync + 'static,
    {
        self.push_leaf(name, false, get, Some(set))
    }

    /// Written on encode, never assigned on decode.
    pub fn read_only<F, G>(&mut self, name: &str, get: G) -> &mut Self
    where
        F: FieldType,
        G: Fn(&T) -> &F + Send + Sync + 'static,
    {
        self.push_leaf::<F, G, fn(&mut T, F)>(name, false, get, None)
    }

    /// The identifier field. Its wire key is always `_id`.
    pub fn id<F, G, S>(&mut self, name: &str, get: G, set: S) -> &mut Self
    where
        F: FieldType,
        G: Fn(&T) -> &F + Send + Sync + 'static,
        S: Fn(&mut T, F) + Send + Sync + 'static,
    {
        self.push_leaf(name, true, get, Some(set))
    }

    /// Optional nested shape, stored as an embedded document or null.
    pub fn embedded<U, G, S>(&mut self, name: &str, get: G, set: S) -> &mut Self
    where
        U: Shape,
        G: Fn(&T) -> &Option<U> + Send + Sync + 'static,
        S: Fn(&mut T, Option<U>) + Send + Sync + 'static,
    {
        let field = name.to_string();
        let getter: Getter<T> = Box::new(move |instance: &T, registry: &TypeRegistry| match get(instance) {
            Some(nested) => Ok(Value::Document(registry.fields_to_document(nested)?)),
            None => Ok(Value::Null),
        });
        let kind = FieldKind::Nullable(Box::new(FieldKind::Embedded(ShapeRef::of::<U>())));
        let expected = kind.clone();
        let setter: Setter<T> = Box::new(move |instance: &mut T, value: Value, ctx: &mut BindContext<'_>| match value {
            Value::Null | Value::Undefined => {
                set(instance, None);
                Ok(())
            }
            Value::Document(doc) => {
                let nested = ctx.bind_nested::<U>(doc, None)?;
                set(instance, Some(nested));
                Ok(())
            }
            other => Err(ctx.mismatch(&field, &expected, &other)),
        });
        self.push(name, kind, false, Some(getter), Some(setter))
    }

    /// List of nested shapes, stored as an array of embedded documents.
    pub fn embedded_list<U, G, S>(&mut self, name: &str, get: G, set: S) -> &mut Self
    where
        U: Shape,
        G: Fn(&T) -> &Vec<U> + Send + Sync + 'static,
        S: Fn(&mut T, Vec<U>) + Send + Sync + 'static,
    {
        let field = name.to_string();
        let getter: Getter<T> = Box::new(move |instance: &T, registry: &TypeRegistry| {
            let items = get(instance)
                .iter()
                .map(|nested| registry.fields_to_document(nested).map(Value::Document))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Array(items))
        });
        let kind = FieldKind::List(Box::new(FieldKind::Embedded(ShapeRef::of::<U>())));
        let expected = kind.clone();
        let setter: Setter<T> = Box::new(move |instance: &mut T, value: Value, ctx: &mut BindContext<'_>| {
            let items = match value {
                Value::Array(items) => items,
                Value::Null | Value::Undefined => Vec::new(),
                other => return Err(ctx.mismatch(&field, &expected, &other)),
            };
            let mut bound = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                match item {
                    Value::Document(doc) => bound.push(ctx.bind_nested::<U>(doc, Some(index))?),
                    other => return Err(ctx.mismatch(&field, &expected, &other)),
                }
            }
            set(instance, bound);
            Ok(())
        });
        self.push(name, kind, false, Some(getter), Some(setter))
    }

    fn push_leaf<F, G, S>(&mut self, name: &str, is_id: bool, get: G, set: Option<S>) -> &mut Self
    where
        F: FieldType,
        G: Fn(&T) -> &F + Send + Sync + 'static,
        S: Fn(&mut T, F) + Send + Sync + 'static,
    {
        let getter: Getter<T> = Box::new(move |instance: &T, _: &TypeRegistry| Ok(get(instance).to_value()));
        let setter = set.map(|set| {
            let field = name.to_string();
            let setter: Setter<T> = Box::new(move |instance: &mut T, value: Value, ctx: &mut BindContext<'_>| {
                match F::from_value(value) {
                    Ok(converted) => {
                        set(instance, converted);
                        Ok(())
                    }
                    Err(rejected) => Err(ctx.mismatch(&field, &F::kind(), &rejected)),
                }
            });
            setter
        });
        self.push(name, F::kind(), is_id, Some(getter), setter)
    }

    fn push(
        &mut self,
        name: &str,
        kind: FieldKind,
        is_id: bool,
        getter: Option<Getter<T>>,
        setter: Option<Setter<T>>,
    ) -> &mut Self {
        self.fields.push(FieldDescriptor {
            name: name.to_string(),
            kind,
            is_id,
            getter,
            setter,
        });
        self
    }
}
