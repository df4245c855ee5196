/// Perimeter routing
///
/// Route table, access policy, service registry and the forwarder used
/// by the gateway binary.

mod policy;
mod proxy;
mod registry;
mod route;

pub use policy::{AccessDecision, AccessPolicy, AuthFailure};
pub use proxy::{Forwarder, SCOPE_HEADER, SUBJECT_HEADER};
pub use registry::{ServiceRegistry, StaticRegistry};
pub use route::{PathPattern, PublicRule, RouteEntry, RouteTable, RouteTarget};
