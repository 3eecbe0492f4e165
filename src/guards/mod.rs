//! Route guards over the auth controller's state.

pub mod landing;
pub mod role_gate;
pub mod session_gate;

pub use landing::Landing;
pub use role_gate::{RoleGate, RoleGateState};
pub use session_gate::SessionGate;

/// Where unauthenticated visitors are sent.
pub const SIGN_IN_PATH: &str = "/login";
/// Where visitors without a suitable role are sent.
pub const NOT_AUTHORIZED_PATH: &str = "/not-authorized";
