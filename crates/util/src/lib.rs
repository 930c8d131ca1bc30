pub mod identifiers;
pub mod path_processing;
pub mod text_processing;

pub use identifiers::*;
pub use path_processing::*;
pub use text_processing::*;
