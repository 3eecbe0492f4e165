pub mod controller;
pub mod role_resolver;

pub use controller::{AuthController, AuthState, AuthStatus};
pub use role_resolver::{RoleError, RoleResolution, RoleResolver};
