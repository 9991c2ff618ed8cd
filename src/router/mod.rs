//! Lock-free routing core: immutable table snapshots, copy-on-write radix
//! trees, and pre-compiled middleware chains.

mod core;
mod group;
mod radix;
mod route;
mod table;

pub use self::core::{RouteError, Router};
pub use self::group::Group;
pub use self::route::{Route, RouteMetadata};
