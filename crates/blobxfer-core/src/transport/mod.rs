//! Wire transports implementing `HttpSender`.

mod curl;

pub use self::curl::{CurlOptions, CurlSender};
