//! Per-device control and resilient polling.

mod controller;
mod poller;

pub use controller::{DeviceController, SubscriptionId};
pub use poller::Poller;
