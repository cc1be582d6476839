//! Transport layer error types.

use reticulum_core::DestinationHash;

#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("no path to {0}")]
    NoPath(DestinationHash),

    #[error("path to {0} expired")]
    Expired(DestinationHash),

    #[error("path to {destination} was learned on interface {interface}, which is offline")]
    InterfaceOffline {
        destination: DestinationHash,
        interface: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_destination() {
        let d = DestinationHash::new([0xAB; 16]);
        assert!(PathError::NoPath(d).to_string().contains("abababab"));
        let e = PathError::InterfaceOffline {
            destination: d,
            interface: "auto0".into(),
        };
        assert!(e.to_string().contains("auto0"));
    }
}
