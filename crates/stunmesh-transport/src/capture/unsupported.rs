use std::time::Duration;

use super::{CaptureParams, Datagram, PacketCapture};
use crate::error::{TransportError, TransportResult};

/// Placeholder for platforms without a capture strategy.
pub struct UnsupportedCapture;

impl PacketCapture for UnsupportedCapture {
    fn open(_params: &CaptureParams) -> TransportResult<Self> {
        Err(TransportError::Unsupported)
    }

    fn next_datagram(&self, _timeout: Duration) -> TransportResult<Option<Datagram>> {
        Err(TransportError::Unsupported)
    }
}
