pub mod matcher;
pub mod ranked;

pub use matcher::*;
pub use ranked::*;
