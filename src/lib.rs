//! License key validation with single-address session binding.

pub mod config;
pub mod db;
pub mod error;
pub mod router;
pub mod state;

pub mod models {
    pub mod license;
    pub mod telegram;
}

pub mod repositories {
    pub mod license;
    pub mod memory;
}

pub mod services {
    pub mod admin;
    pub mod session;
    pub mod telegram;
}

pub mod handlers {
    pub mod license;
    pub mod webhook;
}

pub mod middleware_layer {
    pub mod client_ip;
    pub mod rate_limit;
}

pub mod validation {
    pub mod license;
}
