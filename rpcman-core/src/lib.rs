//! rpcman Core Library
//!
//! This library provides core functionality for the rpcman system including:
//! - Configuration management and validation
//! - Chain descriptor
//! - JSON-RPC transport clients and the client factory seam

pub mod client;
pub mod config;

// Re-export commonly used types
pub use client::{
    ClientError, ClientFactory, HttpClientFactory, HttpTransport, Purpose, RpcTransport,
};
pub use config::model::{ChainConfig, Config, EndpointConfig, GlobalSettings, NativeCurrency};
