//! Request/response wire records for the CPU <-> I/O worker transport
//! (spec §4.3).

use vm_core::error::{VmError, VmResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    PortRead { port: u16, size: u8 },
    PortWrite { port: u16, size: u8, value: u32 },
    MmioRead { paddr: u64, size: u8 },
    MmioWrite { paddr: u64, size: u8, value: u64 },
    SerialNotify { bytes: Vec<u8> },
}

impl RequestKind {
    fn tag(&self) -> u32 {
        match self {
            RequestKind::PortRead { .. } => 0,
            RequestKind::PortWrite { .. } => 1,
            RequestKind::MmioRead { .. } => 2,
            RequestKind::MmioWrite { .. } => 3,
            RequestKind::SerialNotify { .. } => 4,
        }
    }

    /// Write-posted requests never wait for a response (spec §4.3
    /// "Ordering" — the device model advertises this per-kind; here every
    /// `SerialNotify` is posted, and reads/writes always expect an ack so
    /// the caller can observe a stuck I/O worker).
    pub fn is_write_posted(&self) -> bool {
        matches!(self, RequestKind::SerialNotify { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub correlation_id: u64,
    pub kind: RequestKind,
}

impl Request {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.correlation_id.to_le_bytes());
        out.extend_from_slice(&self.kind.tag().to_le_bytes());
        match &self.kind {
            RequestKind::PortRead { port, size } => {
                out.extend_from_slice(&port.to_le_bytes());
                out.push(*size);
            }
            RequestKind::PortWrite { port, size, value } => {
                out.extend_from_slice(&port.to_le_bytes());
                out.push(*size);
                out.extend_from_slice(&value.to_le_bytes());
            }
            RequestKind::MmioRead { paddr, size } => {
                out.extend_from_slice(&paddr.to_le_bytes());
                out.push(*size);
            }
            RequestKind::MmioWrite { paddr, size, value } => {
                out.extend_from_slice(&paddr.to_le_bytes());
                out.push(*size);
                out.extend_from_slice(&value.to_le_bytes());
            }
            RequestKind::SerialNotify { bytes } => {
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(bytes);
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> VmResult<Self> {
        if bytes.len() < 12 {
            return Err(VmError::ProtocolViolation("request record too short".into()));
        }
        let correlation_id = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let tag = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
        let rest = &bytes[12..];
        let kind = match tag {
            0 => {
                require(rest.len() >= 3)?;
                RequestKind::PortRead { port: u16::from_le_bytes(rest[0..2].try_into().unwrap()), size: rest[2] }
            }
            1 => {
                require(rest.len() >= 7)?;
                RequestKind::PortWrite {
                    port: u16::from_le_bytes(rest[0..2].try_into().unwrap()),
                    size: rest[2],
                    value: u32::from_le_bytes(rest[3..7].try_into().unwrap()),
                }
            }
            2 => {
                require(rest.len() >= 9)?;
                RequestKind::MmioRead { paddr: u64::from_le_bytes(rest[0..8].try_into().unwrap()), size: rest[8] }
            }
            3 => {
                require(rest.len() >= 17)?;
                RequestKind::MmioWrite {
                    paddr: u64::from_le_bytes(rest[0..8].try_into().unwrap()),
                    size: rest[8],
                    value: u64::from_le_bytes(rest[9..17].try_into().unwrap()),
                }
            }
            4 => {
                require(rest.len() >= 4)?;
                let len = u32::from_le_bytes(rest[0..4].try_into().unwrap()) as usize;
                require(rest.len() >= 4 + len)?;
                RequestKind::SerialNotify { bytes: rest[4..4 + len].to_vec() }
            }
            other => return Err(VmError::ProtocolViolation(format!("unknown request tag {other}"))),
        };
        Ok(Self { correlation_id, kind })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    Value(u64),
    Ack,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub correlation_id: u64,
    pub kind: ResponseKind,
}

impl Response {
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.correlation_id.to_le_bytes());
        match &self.kind {
            ResponseKind::Value(v) => {
                out.push(0);
                out.extend_from_slice(&v.to_le_bytes());
            }
            ResponseKind::Ack => out.push(1),
            ResponseKind::Error(msg) => {
                out.push(2);
                let bytes = msg.as_bytes();
                out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(bytes);
            }
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> VmResult<Self> {
        if bytes.len() < 9 {
            return Err(VmError::ProtocolViolation("response record too short".into()));
        }
        let correlation_id = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
        let kind = match bytes[8] {
            0 => {
                require(bytes.len() >= 17)?;
                ResponseKind::Value(u64::from_le_bytes(bytes[9..17].try_into().unwrap()))
            }
            1 => ResponseKind::Ack,
            2 => {
                require(bytes.len() >= 13)?;
                let len = u32::from_le_bytes(bytes[9..13].try_into().unwrap()) as usize;
                require(bytes.len() >= 13 + len)?;
                ResponseKind::Error(String::from_utf8_lossy(&bytes[13..13 + len]).into_owned())
            }
            other => return Err(VmError::ProtocolViolation(format!("unknown response tag {other}"))),
        };
        Ok(Self { correlation_id, kind })
    }
}

fn require(cond: bool) -> VmResult<()> {
    if cond {
        Ok(())
    } else {
        Err(VmError::ProtocolViolation("truncated record".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_read_round_trips() {
        let req = Request { correlation_id: 42, kind: RequestKind::PortRead { port: 0x3F8, size: 1 } };
        assert_eq!(Request::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn serial_notify_round_trips() {
        let req = Request { correlation_id: 7, kind: RequestKind::SerialNotify { bytes: b"hi".to_vec() } };
        assert_eq!(Request::decode(&req.encode()).unwrap(), req);
    }

    #[test]
    fn response_value_and_error_round_trip() {
        let ok = Response { correlation_id: 1, kind: ResponseKind::Value(0xDEAD) };
        assert_eq!(Response::decode(&ok.encode()).unwrap(), ok);
        let err = Response { correlation_id: 2, kind: ResponseKind::Error("boom".into()) };
        assert_eq!(Response::decode(&err.encode()).unwrap(), err);
    }

    #[test]
    fn truncated_request_is_protocol_violation() {
        assert!(matches!(Request::decode(&[0; 4]), Err(VmError::ProtocolViolation(_))));
    }
}
