pub mod object;
pub mod registry;
pub mod typedef;
pub mod value;

pub use object::*;
pub use registry::TypeRegistry;
pub use typedef::*;
pub use value::{ObjectRef, Value};
