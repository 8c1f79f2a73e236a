use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use ooze_ast::TypeId;
use ooze_rt::{NativeImpl, Value};

/// Marker for a parameter taken by value (the input arrives as a future).
pub struct ByValue<T>(PhantomData<T>);
/// Marker for a parameter taken by reference (the input arrives borrowed).
pub struct ByRef<T>(PhantomData<T>);

pub struct NativeSignature {
    /// Parameter type plus whether it is borrowed, in declaration order.
    pub params: Vec<(TypeId, bool)>,
    pub ret: TypeId,
}

/// A host callable that can be projected into the runtime's value-erased
/// calling convention. Implemented for closures of up to four parameters,
/// each taken either by value or by `&T`.
pub trait NativeCallable<Marker>: Send + Sync + 'static {
    fn signature(&self) -> NativeSignature;
    fn into_impl(self) -> NativeImpl;
}

macro_rules! arg_ty {
    (value $t:ident) => { $t };
    (borrow $t:ident) => { &$t };
}

macro_rules! marker_ty {
    (value $t:ident) => { ByValue<$t> };
    (borrow $t:ident) => { ByRef<$t> };
}

macro_rules! is_borrow {
    (value) => {
        false
    };
    (borrow) => {
        true
    };
}

macro_rules! extract {
    (value $t:ident, $vals:ident, $refs:ident) => {
        $vals
            .next()
            .expect("missing value argument")
            .downcast::<$t>()
            .expect("value argument has the wrong type")
    };
    (borrow $t:ident, $vals:ident, $refs:ident) => {
        $refs
            .next()
            .expect("missing borrowed argument")
            .downcast_ref::<$t>()
            .expect("borrowed argument has the wrong type")
    };
}

macro_rules! impl_native_callable {
    ($( $kind:tt $ty:ident ),*) => {
        impl<F, R $(, $ty)*> NativeCallable<( $( marker_ty!($kind $ty), )* R, )> for F
        where
            F: Fn( $( arg_ty!($kind $ty) ),* ) -> R + Send + Sync + 'static,
            R: Any + Send + Sync + Clone,
            $( $ty: Any + Send + Sync + Clone, )*
        {
            fn signature(&self) -> NativeSignature {
                NativeSignature {
                    params: vec![ $( (TypeId::of::<$ty>(), is_borrow!($kind)) ),* ],
                    ret: TypeId::of::<R>(),
                }
            }

            #[allow(unused_mut, unused_variables)]
            fn into_impl(self) -> NativeImpl {
                Arc::new(move |values: Vec<Value>, borrows: Vec<&Value>| {
                    let mut values = values.into_iter();
                    let mut borrows = borrows.into_iter();
                    let out = self( $( extract!($kind $ty, values, borrows) ),* );
                    if TypeId::of::<R>() == TypeId::of::<()>() {
                        Vec::new()
                    } else {
                        vec![Value::of(out)]
                    }
                })
            }
        }
    };
}

impl_native_callable!();
impl_native_callable!(value A);
impl_native_callable!(borrow A);
impl_native_callable!(value A, value B);
impl_native_callable!(value A, borrow B);
impl_native_callable!(borrow A, value B);
impl_native_callable!(borrow A, borrow B);
impl_native_callable!(value A, value B, value C);
impl_native_callable!(value A, value B, borrow C);
impl_native_callable!(value A, borrow B, value C);
impl_native_callable!(value A, borrow B, borrow C);
impl_native_callable!(borrow A, value B, value C);
impl_native_callable!(borrow A, value B, borrow C);
impl_native_callable!(borrow A, borrow B, value C);
impl_native_callable!(borrow A, borrow B, borrow C);
impl_native_callable!(value A, value B, value C, value D);
impl_native_callable!(value A, value B, value C, borrow D);
impl_native_callable!(value A, value B, borrow C, value D);
impl_native_callable!(value A, value B, borrow C, borrow D);
impl_native_callable!(value A, borrow B, value C, value D);
impl_native_callable!(value A, borrow B, value C, borrow D);
impl_native_callable!(value A, borrow B, borrow C, value D);
impl_native_callable!(value A, borrow B, borrow C, borrow D);
impl_native_callable!(borrow A, value B, value C, value D);
impl_native_callable!(borrow A, value B, value C, borrow D);
impl_native_callable!(borrow A, value B, borrow C, value D);
impl_native_callable!(borrow A, value B, borrow C, borrow D);
impl_native_callable!(borrow A, borrow B, value C, value D);
impl_native_callable!(borrow A, borrow B, value C, borrow D);
impl_native_callable!(borrow A, borrow B, borrow C, value D);
impl_native_callable!(borrow A, borrow B, borrow C, borrow D);

pub(crate) struct TypeDef {
    pub name: String,
    pub id: TypeId,
    pub copyable: bool,
}

pub(crate) struct FnDef {
    pub name: String,
    pub params: Vec<(TypeId, bool)>,
    pub ret: TypeId,
    pub f: NativeImpl,
}

/// Host registrations consumed by [`crate::Env::new`].
#[derive(Default)]
pub struct NativeRegistry {
    pub(crate) types: Vec<TypeDef>,
    pub(crate) fns: Vec<FnDef>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pass-by-copy host type under `name`, along with its
    /// `clone(&T) -> T` global.
    pub fn add_type<T: Any + Send + Sync + Clone>(&mut self, name: &str) -> &mut Self {
        self.add_type_impl::<T>(name, true)
    }

    /// Register a host type whose values pass by move.
    pub fn add_move_type<T: Any + Send + Sync + Clone>(&mut self, name: &str) -> &mut Self {
        self.add_type_impl::<T>(name, false)
    }

    fn add_type_impl<T: Any + Send + Sync + Clone>(&mut self, name: &str, copyable: bool) -> &mut Self {
        self.types.push(TypeDef {
            name: name.to_string(),
            id: TypeId::of::<T>(),
            copyable,
        });
        self.add_fn::<(ByRef<T>, T)>("clone", |x: &T| x.clone())
    }

    /// Register a native function global; overloads share a name.
    pub fn add_fn<M>(&mut self, name: &str, f: impl NativeCallable<M>) -> &mut Self {
        let signature = f.signature();
        self.fns.push(FnDef {
            name: name.to_string(),
            params: signature.params,
            ret: signature.ret,
            f: f.into_impl(),
        });
        self
    }

    /// Escape hatch for callables the adapter impls cannot express.
    pub fn add_fn_raw(
        &mut self,
        name: &str,
        params: Vec<(TypeId, bool)>,
        ret: TypeId,
        f: NativeImpl,
    ) -> &mut Self {
        self.fns.push(FnDef {
            name: name.to_string(),
            params,
            ret,
            f,
        });
        self
    }
}
