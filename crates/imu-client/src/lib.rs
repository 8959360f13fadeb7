//! IMU Client (§4.2): TCP session manager for the sensor device.
//!
//! Owns a single TCP connection, decodes the framed binary protocol
//! (`imu-protocol`) off the wire, and publishes connect/disconnect/state/
//! sample events to the [`notification_hub::Hub`]. Re-arms the sensor by
//! sending `SET_IMU_STATE(ON)` whenever it reports `OFF`.

mod client;
mod error;

pub use client::ImuClient;
pub use error::ImuClientError;
