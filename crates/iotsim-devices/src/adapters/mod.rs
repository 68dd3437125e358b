//! Concrete outbound protocol adapters.

#[cfg(feature = "mqtt")]
pub mod mqtt;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "coap")]
pub mod coap;

pub mod proxy;
