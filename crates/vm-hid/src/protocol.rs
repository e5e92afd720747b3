//! HID broker wire protocol messages (spec §6 "HID broker wire protocol").

use crate::collection::Collection;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidAttach {
    pub device_id: u64,
    pub vendor_id: u16,
    pub product_id: u16,
    pub product_name: Option<String>,
    pub guest_path: Option<String>,
    pub guest_port: Option<u32>,
    pub collections: Vec<Collection>,
    pub has_interrupt_out: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HidDetach {
    pub device_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidInputReport {
    pub device_id: u64,
    pub report_id: u8,
    pub data: Vec<u8>,
    pub ts_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    Output,
    Feature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidSendReport {
    pub device_id: u64,
    pub report_id: u8,
    pub report_type: ReportType,
    pub data: Vec<u8>,
}
