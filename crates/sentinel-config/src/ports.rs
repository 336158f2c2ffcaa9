//! Managed-port allocation.

use crate::error::ConfigError;

/// Hands out managed ports in declaration order, starting at `base + 1`.
///
/// Only process groups that ask for a managed port draw from the counter, so
/// an explicit port on another group never shifts the sequence.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    base: u16,
    next: u32,
}

impl PortAllocator {
    /// Seeds the counter from the configured base port.
    #[must_use]
    pub fn new(base: u16) -> Self {
        Self {
            base,
            next: u32::from(base) + 1,
        }
    }

    /// Assigns the next port to `group`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::PortsExhausted`] once the counter passes 65535.
    pub fn allocate(&mut self, group: &str) -> Result<u16, ConfigError> {
        let port = u16::try_from(self.next).map_err(|_| ConfigError::PortsExhausted {
            name: group.to_owned(),
            base: self.base,
        })?;
        self.next += 1;
        Ok(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_consecutive_ports_after_base() {
        let mut ports = PortAllocator::new(5000);
        assert_eq!(ports.allocate("a").expect("first port"), 5001);
        assert_eq!(ports.allocate("b").expect("second port"), 5002);
    }

    #[test]
    fn reports_exhaustion_past_last_port() {
        let mut ports = PortAllocator::new(65534);
        assert_eq!(ports.allocate("a").expect("last port"), 65535);
        let error = ports.allocate("b").expect_err("must be exhausted");
        assert!(matches!(error, ConfigError::PortsExhausted { base: 65534, .. }));
    }
}
