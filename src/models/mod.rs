pub mod document;
pub mod enums;
pub mod lab;
pub mod record;

pub use document::*;
pub use enums::*;
pub use lab::*;
pub use record::*;
