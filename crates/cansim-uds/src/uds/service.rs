//! Node-side responder for fault code requests

use cansim_core::{DtcCode, Frame, NodeState};
use tracing::debug;

use super::{DiagnosticRequest, DiagnosticResponse, DiagnosticResult, ServiceId};

/// Answers ReadDTC/ClearDTC for one node's identifier pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiagnosticService {
    request_id: u32,
    response_id: u32,
}

/// Result of serving one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticOutcome {
    pub request: DiagnosticRequest,
    pub response: DiagnosticResponse,
    /// Ready-to-send response frame
    pub frame: Frame,
    /// Code removed by a ClearDTC request, if one was active
    pub cleared: Option<DtcCode>,
}

impl DiagnosticService {
    pub fn new(request_id: u32, response_id: u32) -> Self {
        Self {
            request_id,
            response_id,
        }
    }

    pub fn request_id(&self) -> u32 {
        self.request_id
    }

    pub fn response_id(&self) -> u32 {
        self.response_id
    }

    /// Whether a frame is a request for this node
    pub fn is_addressed_to(&self, frame: &Frame) -> bool {
        frame.id == self.request_id
    }

    /// Serve a request frame against the node's state
    ///
    /// ReadDTC reports the active fault (or a zeroed code); ClearDTC clears
    /// it unconditionally. Unsupported or malformed requests return an
    /// error and must be dropped without a response.
    pub fn handle(&self, frame: &Frame, state: &mut NodeState) -> DiagnosticResult<DiagnosticOutcome> {
        let request = DiagnosticRequest::from_frame(frame)?;

        let (response, cleared) = match request.service_id {
            ServiceId::ReadDtc => (
                DiagnosticResponse::read_dtc(request.sub_function, state.active_dtc()),
                None,
            ),
            ServiceId::ClearDtc => (
                DiagnosticResponse::clear_dtc(request.sub_function),
                state.clear_dtc(),
            ),
        };
        let response_frame = response.to_frame(self.response_id)?;

        debug!(
            request_id = format!("0x{:03X}", self.request_id),
            service = %request.service_id,
            response = %response_frame,
            "Diagnostic request served"
        );

        Ok(DiagnosticOutcome {
            request,
            response,
            frame: response_frame,
            cleared,
        })
    }
}
