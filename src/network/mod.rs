pub mod api;
pub mod client;
pub mod supervisor;
pub mod transport;

#[cfg(test)]
mod testing;

pub use api::RestApi;
pub use client::{ClientServices, SessionClient};
pub use transport::WebSocketConnector;
