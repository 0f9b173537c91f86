//! Client for Novatek-Electro EM-series power meters (EM-125, EM-126T, EM-129 ...).
//!
//! The device speaks plain HTTP with JSON bodies. A session is opened with a salted SHA1
//! challenge, after which the seven electrical measurements can be polled below the session
//! prefix. See [`DeviceClient`].

pub mod api;
pub mod model;

pub use api::{DeviceClient, Error};
pub use model::{ClientState, DeviceInfo, DeviceModel, Measurements, Metric};
