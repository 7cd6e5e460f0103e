mod gate;
mod model;

pub use gate::{has_resume, is_truthy, lenient_bool};
pub use model::*;
