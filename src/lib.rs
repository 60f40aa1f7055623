/// Pipeline diagnostics go to `info` when the caller asked for `debug=1`.
macro_rules! diag {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            tracing::info!($($arg)+)
        } else {
            tracing::debug!($($arg)+)
        }
    };
}

pub mod auth;
pub mod config;
pub mod connectors;
pub mod error;
pub mod locator;
pub mod models;
pub mod normalize;
pub mod output;
pub mod server;
pub mod service;
