pub mod enums;
pub mod actor;
pub mod application;
pub mod audit;
pub mod document;
pub mod module_field;

pub use actor::*;
pub use application::*;
pub use audit::*;
pub use document::*;
pub use module_field::*;
