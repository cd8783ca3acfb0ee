//! Diagnostic request and response frames

use cansim_core::{DtcCode, Frame, MAX_DLC};

use super::{DiagnosticError, DiagnosticResult, ServiceId, DTC_STATUS_NONE};

/// Largest data block after service id and sub-function
const MAX_DATA: usize = MAX_DLC as usize - 2;

/// Request sent by the tester: `[sid, sub_function, data...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRequest {
    pub service_id: ServiceId,
    pub sub_function: u8,
    pub data: Vec<u8>,
}

impl DiagnosticRequest {
    pub fn read_dtc(sub_function: u8) -> Self {
        Self {
            service_id: ServiceId::ReadDtc,
            sub_function,
            data: Vec::new(),
        }
    }

    pub fn clear_dtc(sub_function: u8) -> Self {
        Self {
            service_id: ServiceId::ClearDtc,
            sub_function,
            data: Vec::new(),
        }
    }

    /// Build the request frame addressed to `request_id`
    pub fn to_frame(&self, request_id: u32) -> DiagnosticResult<Frame> {
        if self.data.len() > MAX_DATA {
            return Err(DiagnosticError::MalformedRequest(format!(
                "{} data bytes, at most {} fit",
                self.data.len(),
                MAX_DATA
            )));
        }
        let mut bytes = Vec::with_capacity(2 + self.data.len());
        bytes.push(self.service_id.as_byte());
        bytes.push(self.sub_function);
        bytes.extend_from_slice(&self.data);
        Frame::new(request_id, &bytes)
            .map_err(|e| DiagnosticError::MalformedRequest(e.to_string()))
    }

    /// Parse a received request frame
    ///
    /// Frames shorter than two bytes are malformed; unknown service ids are
    /// `UnsupportedService`.
    pub fn from_frame(frame: &Frame) -> DiagnosticResult<Self> {
        let data = frame.data();
        if data.len() < 2 {
            return Err(DiagnosticError::MalformedRequest(format!(
                "request of {} bytes",
                data.len()
            )));
        }
        let service_id =
            ServiceId::from_byte(data[0]).ok_or(DiagnosticError::UnsupportedService(data[0]))?;
        Ok(Self {
            service_id,
            sub_function: data[1],
            data: data[2..].to_vec(),
        })
    }
}

/// Positive response sent by a node: `[sid + 0x40, sub_function, data...]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticResponse {
    pub service_id: ServiceId,
    pub sub_function: u8,
    pub data: Vec<u8>,
}

impl DiagnosticResponse {
    /// ReadDTC answer; `None` is sent as an all-zero code
    pub fn read_dtc(sub_function: u8, dtc: Option<DtcCode>) -> Self {
        let [hi, lo] = dtc.map(|code| code.to_bytes()).unwrap_or([0, 0]);
        Self {
            service_id: ServiceId::ReadDtc,
            sub_function,
            data: vec![hi, lo, DTC_STATUS_NONE],
        }
    }

    /// ClearDTC acknowledgement
    pub fn clear_dtc(sub_function: u8) -> Self {
        Self {
            service_id: ServiceId::ClearDtc,
            sub_function,
            data: Vec::new(),
        }
    }

    /// Fault code carried by a ReadDTC response
    ///
    /// `None` for a zeroed code or for other services.
    pub fn dtc(&self) -> Option<DtcCode> {
        match (self.service_id, self.data.as_slice()) {
            (ServiceId::ReadDtc, [hi, lo, ..]) => DtcCode::from_bytes(*hi, *lo),
            _ => None,
        }
    }

    /// Build the response frame sent on `response_id`
    pub fn to_frame(&self, response_id: u32) -> DiagnosticResult<Frame> {
        let mut bytes = Vec::with_capacity(2 + self.data.len());
        bytes.push(self.service_id.response_byte());
        bytes.push(self.sub_function);
        bytes.extend_from_slice(&self.data);
        Frame::new(response_id, &bytes)
            .map_err(|e| DiagnosticError::MalformedResponse(e.to_string()))
    }

    /// Parse a received response frame
    pub fn from_frame(frame: &Frame) -> DiagnosticResult<Self> {
        let data = frame.data();
        if data.len() < 2 {
            return Err(DiagnosticError::MalformedResponse(format!(
                "response of {} bytes",
                data.len()
            )));
        }
        let service_id = ServiceId::from_response_byte(data[0]).ok_or_else(|| {
            DiagnosticError::MalformedResponse(format!("unexpected response id 0x{:02X}", data[0]))
        })?;
        if service_id == ServiceId::ReadDtc && data.len() < 4 {
            return Err(DiagnosticError::MalformedResponse(format!(
                "ReadDTC response of {} bytes",
                data.len()
            )));
        }
        Ok(Self {
            service_id,
            sub_function: data[1],
            data: data[2..].to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn test_request_frame_layout() {
        let frame = DiagnosticRequest::read_dtc(0x02).to_frame(0x7E0).unwrap();
        assert_eq!(frame.id, 0x7E0);
        assert_eq!(frame.data(), &[0x19, 0x02]);

        let frame = DiagnosticRequest::clear_dtc(0xFF).to_frame(0x7E1).unwrap();
        assert_eq!(frame.data(), &[0x14, 0xFF]);
    }

    #[test]
    fn test_request_parse() {
        let frame = Frame::new(0x7E0, &[0x19, 0x02, 0xFF]).unwrap();
        let request = DiagnosticRequest::from_frame(&frame).unwrap();
        assert_eq!(request.service_id, ServiceId::ReadDtc);
        assert_eq!(request.sub_function, 0x02);
        assert_eq!(request.data, vec![0xFF]);
    }

    #[rstest]
    #[case::empty(&[], DiagnosticError::MalformedRequest("request of 0 bytes".to_string()))]
    #[case::no_sub_function(&[0x19], DiagnosticError::MalformedRequest("request of 1 bytes".to_string()))]
    #[case::read_data_by_id(&[0x22, 0xF1, 0x90], DiagnosticError::UnsupportedService(0x22))]
    #[case::tester_present(&[0x3E, 0x00], DiagnosticError::UnsupportedService(0x3E))]
    fn test_request_rejections(#[case] bytes: &[u8], #[case] expected: DiagnosticError) {
        let frame = Frame::new(0x7E0, bytes).unwrap();
        assert_eq!(DiagnosticRequest::from_frame(&frame), Err(expected));
    }

    #[test]
    fn test_oversized_request_not_framed() {
        let oversized = DiagnosticRequest {
            data: vec![0; 7],
            ..DiagnosticRequest::read_dtc(0x02)
        };
        assert!(oversized.to_frame(0x7E0).is_err());
    }

    #[test]
    fn test_read_dtc_response_with_fault() {
        let code: DtcCode = "P0217".parse().unwrap();
        let frame = DiagnosticResponse::read_dtc(0x02, Some(code))
            .to_frame(0x7E8)
            .unwrap();
        assert_eq!(frame.dlc, 5);
        assert_eq!(frame.data(), &[0x59, 0x02, 0x02, 0x17, 0x00]);

        let parsed = DiagnosticResponse::from_frame(&frame).unwrap();
        assert_eq!(parsed.dtc(), Some(code));
    }

    #[test]
    fn test_read_dtc_response_without_fault() {
        let frame = DiagnosticResponse::read_dtc(0x02, None)
            .to_frame(0x7E8)
            .unwrap();
        assert_eq!(frame.data(), &[0x59, 0x02, 0x00, 0x00, 0x00]);
        assert_eq!(DiagnosticResponse::from_frame(&frame).unwrap().dtc(), None);
    }

    #[test]
    fn test_clear_dtc_response() {
        let frame = DiagnosticResponse::clear_dtc(0xFF).to_frame(0x7EA).unwrap();
        assert_eq!(frame.dlc, 2);
        assert_eq!(frame.data(), &[0x54, 0xFF]);

        let parsed = DiagnosticResponse::from_frame(&frame).unwrap();
        assert_eq!(parsed.service_id, ServiceId::ClearDtc);
        assert_eq!(parsed.dtc(), None);
    }

    #[test]
    fn test_response_rejections() {
        let telemetry = Frame::new(0x7E8, &[0x0E, 0x25, 0x48]).unwrap();
        assert!(DiagnosticResponse::from_frame(&telemetry).is_err());

        let truncated = Frame::new(0x7E8, &[0x59, 0x02, 0x02]).unwrap();
        assert!(DiagnosticResponse::from_frame(&truncated).is_err());
    }
}
