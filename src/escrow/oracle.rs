//! Oracle Gateway Integration
//!
//! The gateway is an external collaborator reached through two independent
//! entry points:
//!
//! - **submit**: `settle` calls [`OracleGateway::request_observation`] and gets
//!   back a handle. A positive handle is pending; a non-positive one is a
//!   synchronous rejection carrying a status code.
//! - **resolve**: at some later, externally controlled point the gateway's
//!   trusted identity calls the engine back with an [`OracleResponse`].
//!
//! Nothing connects the two except the engine's pending-request table.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::types::{Amount, DerivativeId, Height, PriceValue, RequestHandle};

/// Gateway status: fee attached to the request was too low.
pub const STATUS_INSUFFICIENT_FEE: i64 = -252;

/// Gateway status: gateway contract upgraded / no longer accepting requests.
pub const STATUS_GATEWAY_UPGRADED: i64 = -(1 << 60);

/// Engine status: the gateway issued a handle that is still pending for another
/// record. The submission is treated as rejected.
pub const STATUS_DUPLICATE_HANDLE: i64 = i64::MIN;

/// A paid request for the value observed at a height.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationRequest {
    pub derivative_id: DerivativeId,
    pub target_height: Height,
    pub fee_paid: Amount,
}

/// Outcome delivered by the gateway's callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OracleResponse {
    Observed(PriceValue),
    /// Gateway could not produce an observation. Status is gateway-defined.
    Failed { status: i64 },
}

impl OracleResponse {
    /// Build from the gateway's raw callback shape: a zero error code means the
    /// value is a valid observation.
    pub fn from_callback(error_code: i64, value: PriceValue) -> Self {
        if error_code == 0 {
            OracleResponse::Observed(value)
        } else {
            OracleResponse::Failed { status: error_code }
        }
    }
}

/// Submission side of the gateway.
pub trait OracleGateway: Send + Sync {
    /// Forward a paid request. Must not call back into the engine.
    fn request_observation(&self, request: &ObservationRequest) -> RequestHandle;
}

// =============================================================================
// Mock Gateway
// =============================================================================

/// Behavior of the mock gateway on the next submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MockGatewayMode {
    /// Issue increasing positive handles.
    Accept,
    /// Reject with [`STATUS_INSUFFICIENT_FEE`].
    FailNotEnoughFee,
    /// Reject with [`STATUS_GATEWAY_UPGRADED`].
    FailUpgraded,
}

impl Default for MockGatewayMode {
    fn default() -> Self {
        Self::Accept
    }
}

#[derive(Debug)]
struct MockGatewayInner {
    mode: MockGatewayMode,
    next_handle: i64,
    submitted: Vec<(RequestHandle, ObservationRequest)>,
}

/// In-process gateway used by the simulator and tests.
///
/// Records every submission so the caller can later deliver the callback as the
/// gateway identity.
#[derive(Debug)]
pub struct MockOracleGateway {
    inner: Mutex<MockGatewayInner>,
}

impl Default for MockOracleGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockOracleGateway {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MockGatewayInner {
                mode: MockGatewayMode::Accept,
                next_handle: 1,
                submitted: Vec::new(),
            }),
        }
    }

    pub fn set_mode(&self, mode: MockGatewayMode) {
        self.inner.lock().mode = mode;
    }

    pub fn mode(&self) -> MockGatewayMode {
        self.inner.lock().mode
    }

    /// Every submission, including rejected ones.
    pub fn submitted(&self) -> Vec<(RequestHandle, ObservationRequest)> {
        self.inner.lock().submitted.clone()
    }

    /// Handle of the most recent accepted submission.
    pub fn last_accepted(&self) -> Option<RequestHandle> {
        self.inner
            .lock()
            .submitted
            .iter()
            .rev()
            .map(|(handle, _)| *handle)
            .find(RequestHandle::is_accepted)
    }

    pub fn request_for(&self, handle: RequestHandle) -> Option<ObservationRequest> {
        self.inner
            .lock()
            .submitted
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, request)| request.clone())
    }
}

impl OracleGateway for MockOracleGateway {
    fn request_observation(&self, request: &ObservationRequest) -> RequestHandle {
        let mut inner = self.inner.lock();
        let handle = match inner.mode {
            MockGatewayMode::Accept => {
                let handle = RequestHandle(inner.next_handle);
                inner.next_handle += 1;
                handle
            }
            MockGatewayMode::FailNotEnoughFee => RequestHandle(STATUS_INSUFFICIENT_FEE),
            MockGatewayMode::FailUpgraded => RequestHandle(STATUS_GATEWAY_UPGRADED),
        };
        inner.submitted.push((handle, request.clone()));
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: DerivativeId) -> ObservationRequest {
        ObservationRequest {
            derivative_id: id,
            target_height: 100,
            fee_paid: 75,
        }
    }

    #[test]
    fn test_mock_issues_increasing_handles() {
        let gateway = MockOracleGateway::new();
        let a = gateway.request_observation(&request(0));
        let b = gateway.request_observation(&request(1));
        assert!(a.is_accepted() && b.is_accepted());
        assert!(b > a);
        assert_eq!(gateway.last_accepted(), Some(b));
        assert_eq!(gateway.request_for(a).unwrap().derivative_id, 0);
    }

    #[test]
    fn test_mock_rejection_modes() {
        let gateway = MockOracleGateway::new();
        gateway.set_mode(MockGatewayMode::FailNotEnoughFee);
        assert_eq!(
            gateway.request_observation(&request(0)),
            RequestHandle(STATUS_INSUFFICIENT_FEE)
        );

        gateway.set_mode(MockGatewayMode::FailUpgraded);
        let handle = gateway.request_observation(&request(1));
        assert_eq!(handle.rejection_status(), Some(-1_152_921_504_606_846_976));

        assert_eq!(gateway.last_accepted(), None);
        assert_eq!(gateway.submitted().len(), 2);
    }

    #[test]
    fn test_response_from_callback() {
        assert_eq!(OracleResponse::from_callback(0, 52), OracleResponse::Observed(52));
        assert_eq!(
            OracleResponse::from_callback(-1, 0),
            OracleResponse::Failed { status: -1 }
        );
    }
}
