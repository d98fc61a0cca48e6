//! Path and attribute resolution.

pub mod path;
mod resolver;

pub use path::{AttrPath, Segment};
pub use resolver::{PathComponent, Resolver};
