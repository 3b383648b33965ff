//! Route protection
//!
//! Decides from registered path/method patterns whether a request must carry
//! a valid token at all.

pub mod pattern;
pub mod registry;

pub use pattern::RoutePattern;
pub use registry::{ProtectedRoutes, RouteRegistry};
