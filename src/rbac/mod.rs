//! Role-based access control.
//!
//! Users hold roles, roles hold permissions, and a configured route table
//! says which permissions each API route needs.

mod model;
mod repository;
mod resolver;
mod routes;
mod service;
mod sync;

pub use model::{Permission, Role};
pub use repository::{PermissionRepository, RoleRepository};
pub use resolver::{AccessDecision, DenyReason, PermissionResolver};
pub use routes::{RouteMatch, RouteTable};
pub use service::RbacService;
pub use sync::{sync_role_permissions, SyncReport};
