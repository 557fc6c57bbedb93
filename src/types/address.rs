//! Device address type.

/// Length of a device radio address in bytes.
pub const ADDRESS_LEN: usize = 8;

/// A 64-bit radio address identifying a mesh device.
///
/// Addresses are opaque to the controller: they are assigned by the radio
/// hardware and only used to route frames to and from a device.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceAddress([u8; ADDRESS_LEN]);

impl DeviceAddress {
    /// Creates a new address from bytes.
    ///
    /// # Panics
    ///
    /// Panics if the slice is not exactly 8 bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut addr = [0u8; ADDRESS_LEN];
        addr.copy_from_slice(bytes);
        Self(addr)
    }

    /// Tries to create an address from bytes.
    ///
    /// Returns `None` if the slice is not exactly 8 bytes.
    #[must_use]
    pub fn try_from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != ADDRESS_LEN {
            return None;
        }
        let mut addr = [0u8; ADDRESS_LEN];
        addr.copy_from_slice(bytes);
        Some(Self(addr))
    }

    /// Returns the address as a byte slice.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the address as a hex string.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses an address from a hex string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid hex or not 16 characters.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != ADDRESS_LEN {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        Ok(Self::from_bytes(&bytes))
    }
}

impl From<[u8; ADDRESS_LEN]> for DeviceAddress {
    fn from(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DeviceAddress({})", self.to_hex())
    }
}

impl std::fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}
