pub mod factory;
pub mod http;
pub mod traits;
pub mod types;

pub use factory::{ClientFactory, HttpClientFactory};
pub use http::HttpTransport;
pub use traits::RpcTransport;
pub use types::*;
