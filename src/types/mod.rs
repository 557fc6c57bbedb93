//! Data types for homemesh entities.

pub mod address;

pub use address::{ADDRESS_LEN, DeviceAddress};
