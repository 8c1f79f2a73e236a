#![forbid(unsafe_code)]

mod error;
mod ident;
mod lower;
mod sema;
mod types;

pub use error::SemanticError;
pub use ident::{calculate_ident_graph, IdentGraph};
pub use lower::{borrows_of, create_graph, literal_value, pass_bys_of, LoweredGraph};
pub use sema::{
    can_unify, is_borrowed_use, program_roots, sema, type_name_resolution, unify, SemaData,
};
pub use types::{is_copyable_type, literal_type_id, pretty_print, term_count, NativeTypeInfo};
