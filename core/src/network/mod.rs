//! Backend I/O: transport seam, retrying gateway, typed endpoints

pub mod client;
pub mod dto;
pub mod gateway;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use client::TrustApiClient;
pub use gateway::{NetworkGateway, RetryConfig};
pub use transport::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport, TransportError};
