pub mod analyze;
pub mod check;
pub mod emob;
pub mod graph;
pub mod ts;
pub mod util;
