//! TwiML-shaped response rendering and the telephony carrier collaborator
//! client (§4.10).

pub mod client;
pub mod response;

pub use client::{CallStatus, CarrierClient, CarrierClientConfig, HttpCarrierClient, TelephonyError};
pub use response::TelephonyResponse;
