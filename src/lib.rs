//! A CRM portal: session and role resolution in front of a chat between
//! admins and customer members.
//!
//! The [`auth::AuthController`] owns the process-wide auth state; the
//! [`guards`] read it to decide what a request may see.

pub mod config;
pub mod error;
pub mod state;
pub mod db;
pub mod routes;

pub mod models {
    pub mod role;
    pub mod session;
    pub mod user;
    pub mod conversation;
}

pub mod repositories {
    pub mod user;
    pub mod profile;
    pub mod conversation;
}

pub mod services {
    pub mod auth;
    pub mod session_store;
    pub mod notify;
    pub mod csrf;
}

pub mod remote;
pub mod auth;
pub mod guards;
pub mod chat;

pub mod handlers {
    pub mod auth;
    pub mod pages;
    pub mod chat;
}

pub mod middleware_layer {
    pub mod gates;
    pub mod csrf;
}

#[cfg(test)]
pub(crate) mod testing;
