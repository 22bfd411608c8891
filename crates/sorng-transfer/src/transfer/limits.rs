//! Bandwidth cap registry.
//!
//! Stores per-session caps and one global cap per direction, and resolves the
//! effective cap for a transfer as the lower of the two. An absent cap counts
//! as unbounded. No I/O; the owner serialises access.

use crate::transfer::error::{TransferError, TransferResult};
use crate::transfer::types::{SpeedLimits, TransferDirection};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// The registry as shared between the service and running transfers.
pub type SharedLimits = Arc<Mutex<LimitRegistry>>;

/// Upload / download caps in bytes per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionCaps {
    pub upload: Option<u64>,
    pub download: Option<u64>,
}

impl DirectionCaps {
    pub fn get(&self, direction: TransferDirection) -> Option<u64> {
        match direction {
            TransferDirection::Upload => self.upload,
            TransferDirection::Download => self.download,
        }
    }

    fn set(&mut self, direction: TransferDirection, cap: Option<u64>) {
        match direction {
            TransferDirection::Upload => self.upload = cap,
            TransferDirection::Download => self.download = cap,
        }
    }

    fn is_empty(&self) -> bool {
        self.upload.is_none() && self.download.is_none()
    }
}

#[derive(Debug, Default)]
pub struct LimitRegistry {
    connections: HashMap<String, DirectionCaps>,
    global: DirectionCaps,
}

impl LimitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set or clear (`None`) the cap of one session.
    pub fn set_limit(
        &mut self,
        connection_id: &str,
        direction: TransferDirection,
        cap: Option<u64>,
    ) -> TransferResult<()> {
        validate(cap)?;
        let entry = self.connections.entry(connection_id.to_string()).or_default();
        entry.set(direction, cap);
        if entry.is_empty() {
            self.connections.remove(connection_id);
        }
        Ok(())
    }

    /// Set or clear (`None`) the global cap.
    pub fn set_global_limit(
        &mut self,
        direction: TransferDirection,
        cap: Option<u64>,
    ) -> TransferResult<()> {
        validate(cap)?;
        self.global.set(direction, cap);
        Ok(())
    }

    pub fn connection_limit(&self, connection_id: &str, direction: TransferDirection) -> Option<u64> {
        self.connections
            .get(connection_id)
            .and_then(|caps| caps.get(direction))
    }

    pub fn global_limit(&self, direction: TransferDirection) -> Option<u64> {
        self.global.get(direction)
    }

    /// `min(connection cap, global cap)`; `None` means unbounded.
    pub fn effective_limit(&self, connection_id: &str, direction: TransferDirection) -> Option<u64> {
        match (
            self.connection_limit(connection_id, direction),
            self.global_limit(direction),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Snapshot of the caps seen by one session.
    pub fn limits(&self, connection_id: &str) -> SpeedLimits {
        let own = self
            .connections
            .get(connection_id)
            .copied()
            .unwrap_or_default();
        SpeedLimits {
            upload: own.upload,
            download: own.download,
            global_upload: self.global.upload,
            global_download: self.global.download,
        }
    }

    /// Forget a session's caps (called on disconnect).
    pub fn remove_connection(&mut self, connection_id: &str) {
        self.connections.remove(connection_id);
    }
}

fn validate(cap: Option<u64>) -> TransferResult<()> {
    if cap == Some(0) {
        return Err(TransferError::invalid(
            "Speed limit must be greater than zero (use none to remove it)",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::error::TransferErrorKind;
    use TransferDirection::{Download, Upload};

    #[test]
    fn effective_is_min_of_both() {
        let caps = [None, Some(1), Some(500), Some(1_000_000)];
        for conn in caps {
            for global in caps {
                let mut reg = LimitRegistry::new();
                reg.set_limit("s", Upload, conn).unwrap();
                reg.set_global_limit(Upload, global).unwrap();
                let expected = match (conn, global) {
                    (Some(a), Some(b)) => Some(a.min(b)),
                    (a, b) => a.or(b),
                };
                assert_eq!(reg.effective_limit("s", Upload), expected, "{conn:?} {global:?}");
            }
        }
    }

    #[test]
    fn unbounded_when_nothing_set() {
        let reg = LimitRegistry::new();
        assert_eq!(reg.effective_limit("any", Download), None);
    }

    #[test]
    fn directions_are_independent() {
        let mut reg = LimitRegistry::new();
        reg.set_limit("s", Upload, Some(100)).unwrap();
        reg.set_global_limit(Download, Some(50)).unwrap();
        assert_eq!(reg.effective_limit("s", Upload), Some(100));
        assert_eq!(reg.effective_limit("s", Download), Some(50));
        assert_eq!(reg.effective_limit("other", Upload), None);
    }

    #[test]
    fn limits_round_trip() {
        let mut reg = LimitRegistry::new();
        reg.set_limit("s", Upload, Some(123_456)).unwrap();
        reg.set_limit("s", Download, Some(7)).unwrap();
        reg.set_global_limit(Upload, Some(99)).unwrap();
        assert_eq!(
            reg.limits("s"),
            SpeedLimits {
                upload: Some(123_456),
                download: Some(7),
                global_upload: Some(99),
                global_download: None,
            }
        );
    }

    #[test]
    fn remove_connection_evicts_only_that_session() {
        let mut reg = LimitRegistry::new();
        reg.set_limit("a", Upload, Some(10)).unwrap();
        reg.set_limit("b", Upload, Some(20)).unwrap();
        reg.set_global_limit(Upload, Some(15)).unwrap();
        reg.remove_connection("a");
        assert_eq!(reg.effective_limit("a", Upload), Some(15));
        assert_eq!(reg.effective_limit("b", Upload), Some(15));
        assert_eq!(reg.connection_limit("b", Upload), Some(20));
    }

    #[test]
    fn zero_cap_rejected_none_clears() {
        let mut reg = LimitRegistry::new();
        let err = reg.set_limit("s", Upload, Some(0)).unwrap_err();
        assert_eq!(err.kind, TransferErrorKind::InvalidArgument);
        reg.set_limit("s", Upload, Some(5)).unwrap();
        reg.set_limit("s", Upload, None).unwrap();
        assert_eq!(reg.limits("s"), SpeedLimits::default());
    }
}
