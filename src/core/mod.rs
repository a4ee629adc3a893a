pub mod part;
pub mod records;

pub use part::*;
pub use records::*;
