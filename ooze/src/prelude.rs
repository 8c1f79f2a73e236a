use crate::registry::{ByRef, NativeRegistry};

/// The reserved primitive types and their `clone` / `to_string` overloads.
pub fn primitive_registry() -> NativeRegistry {
    let mut registry = NativeRegistry::new();

    macro_rules! display_primitive {
        ($t:ty, $name:literal) => {
            registry.add_type::<$t>($name);
            registry.add_fn::<(ByRef<$t>, String)>("to_string", |x: &$t| x.to_string());
        };
    }

    display_primitive!(bool, "bool");
    display_primitive!(i8, "i8");
    display_primitive!(i16, "i16");
    display_primitive!(i32, "i32");
    display_primitive!(i64, "i64");
    display_primitive!(u8, "u8");
    display_primitive!(u16, "u16");
    display_primitive!(u32, "u32");
    display_primitive!(u64, "u64");
    display_primitive!(f32, "f32");
    display_primitive!(f64, "f64");

    // Strings and vectors pass by move; clone gives explicit duplication.
    registry.add_move_type::<String>("string");
    registry.add_fn::<(ByRef<String>, String)>("to_string", |x: &String| x.clone());

    registry.add_move_type::<Vec<String>>("string_vector");
    registry.add_fn::<(ByRef<Vec<String>>, String)>("to_string", |x: &Vec<String>| format!("{x:?}"));

    registry.add_move_type::<Vec<u8>>("byte_vector");
    registry.add_fn::<(ByRef<Vec<u8>>, String)>("to_string", |x: &Vec<u8>| format!("{x:?}"));

    registry
}
