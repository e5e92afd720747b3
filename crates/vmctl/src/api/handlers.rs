//! Status, health, and debug-command HTTP handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use vm_cpu::Command as CpuCommand;
use vm_hid::collection::Collection;

use crate::coordinator::{Coordinator, GpuFrame, VmStatus};

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Liveness probe.
#[utoipa::path(get, path = "/health", tag = "health", responses((status = 200, body = HealthResponse)))]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

/// Worker readiness and counters snapshot.
#[utoipa::path(get, path = "/status", tag = "status", responses((status = 200, body = VmStatus)))]
pub async fn status(State(coordinator): State<Arc<Coordinator>>) -> Json<VmStatus> {
    Json(coordinator.status())
}

/// Wire shape for `POST /debug/command`, kept as a separate DTO from
/// [`vm_cpu::Command`] so the debug-CPU state machine's internal type never
/// has to carry `serde` — only this boundary does (SPEC_FULL §10.3).
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum DebugCommandRequest {
    Pause,
    Resume,
    Step,
    SetBreakpoint { rip: u64 },
    RemoveBreakpoint { rip: u64 },
    ClearBreakpoints,
    ReadMemory { paddr: u64, len: usize },
    RequestCpuState,
    RequestDeviceState,
    EnableTrace {
        filter: String,
        #[serde(default = "default_sample_rate")]
        sample_rate: u32,
        #[serde(default = "default_true")]
        include_instructions: bool,
        #[serde(default = "default_true")]
        include_port_io: bool,
    },
    DisableTrace,
}

fn default_sample_rate() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl From<DebugCommandRequest> for CpuCommand {
    fn from(req: DebugCommandRequest) -> Self {
        match req {
            DebugCommandRequest::Pause => CpuCommand::Pause,
            DebugCommandRequest::Resume => CpuCommand::Resume,
            DebugCommandRequest::Step => CpuCommand::Step,
            DebugCommandRequest::SetBreakpoint { rip } => CpuCommand::SetBreakpoint { rip },
            DebugCommandRequest::RemoveBreakpoint { rip } => CpuCommand::RemoveBreakpoint { rip },
            DebugCommandRequest::ClearBreakpoints => CpuCommand::ClearBreakpoints,
            DebugCommandRequest::ReadMemory { paddr, len } => CpuCommand::ReadMemory { paddr, len },
            DebugCommandRequest::RequestCpuState => CpuCommand::RequestCpuState,
            DebugCommandRequest::RequestDeviceState => CpuCommand::RequestDeviceState,
            DebugCommandRequest::EnableTrace { filter, sample_rate, include_instructions, include_port_io } => {
                CpuCommand::EnableTrace { filter, sample_rate, include_instructions, include_port_io }
            }
            DebugCommandRequest::DisableTrace => CpuCommand::DisableTrace,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SuccessResponse {
    pub accepted: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Wire shape for a report-descriptor collection, kept as a separate DTO
/// from [`vm_hid::collection::Collection`] for the same reason
/// [`DebugCommandRequest`] is split from [`vm_cpu::Command`] (SPEC_FULL
/// §10.3).
#[derive(Debug, Deserialize, ToSchema)]
pub struct CollectionDto {
    pub report_id: Option<u8>,
    pub is_range: bool,
    pub range_start: Option<u16>,
    pub range_end: Option<u16>,
    pub has_output_report: bool,
}

impl From<CollectionDto> for Collection {
    fn from(dto: CollectionDto) -> Self {
        Collection {
            report_id: dto.report_id,
            is_range: dto.is_range,
            range_start: dto.range_start,
            range_end: dto.range_end,
            has_output_report: dto.has_output_report,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct HidAttachRequest {
    pub device_id: u64,
    pub vendor_id: u16,
    pub product_id: u16,
    pub product_name: Option<String>,
    pub guest_path: Option<String>,
    pub guest_port: Option<u32>,
    pub collections: Vec<CollectionDto>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct HidDetachRequest {
    pub device_id: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct HidInputReportRequest {
    pub device_id: u64,
    pub report_id: u8,
    pub data: Vec<u8>,
    pub ts_ms: Option<u64>,
}

/// Attach a host HID device to the broker (spec §4.6 `hid.attach`).
#[utoipa::path(
    post,
    path = "/hid/attach",
    tag = "hid",
    request_body = HidAttachRequest,
    responses((status = 200, body = SuccessResponse), (status = 400, body = ErrorResponse))
)]
pub async fn hid_attach(
    State(coordinator): State<Arc<Coordinator>>,
    Json(request): Json<HidAttachRequest>,
) -> Result<Json<SuccessResponse>, (StatusCode, Json<ErrorResponse>)> {
    coordinator
        .hid_attach(
            request.device_id,
            request.vendor_id,
            request.product_id,
            request.product_name,
            request.guest_path,
            request.guest_port,
            request.collections.into_iter().map(Collection::from).collect(),
        )
        .map(|()| Json(SuccessResponse { accepted: true }))
        .map_err(|err| (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: err.to_string() })))
}

/// Detach a host HID device (spec §4.6 `hid.detach`, always succeeds).
#[utoipa::path(
    post,
    path = "/hid/detach",
    tag = "hid",
    request_body = HidDetachRequest,
    responses((status = 200, body = SuccessResponse))
)]
pub async fn hid_detach(State(coordinator): State<Arc<Coordinator>>, Json(request): Json<HidDetachRequest>) -> Json<SuccessResponse> {
    coordinator.hid_detach(request.device_id);
    Json(SuccessResponse { accepted: true })
}

/// Forward a host-captured input report into the broker (spec §4.6,
/// ring-preferred with bounded fallback).
#[utoipa::path(
    post,
    path = "/hid/input",
    tag = "hid",
    request_body = HidInputReportRequest,
    responses((status = 200, body = SuccessResponse))
)]
pub async fn hid_input(
    State(coordinator): State<Arc<Coordinator>>,
    Json(request): Json<HidInputReportRequest>,
) -> Json<SuccessResponse> {
    coordinator.hid_submit_input_report(request.device_id, request.report_id, request.data, request.ts_ms);
    Json(SuccessResponse { accepted: true })
}

/// The most recently composited GPU frame, or 0x0 if the worker hasn't
/// produced one yet (spec §4.4.4).
#[utoipa::path(get, path = "/gpu/screenshot", tag = "gpu", responses((status = 200, body = GpuFrame)))]
pub async fn gpu_screenshot(State(coordinator): State<Arc<Coordinator>>) -> Json<GpuFrame> {
    Json(coordinator.gpu_latest_frame().unwrap_or(GpuFrame { width: 0, height: 0, pixels: Vec::new() }))
}

/// Forward a debug-CPU command to the CPU worker's command channel. The
/// command is applied on the worker's next tick; this handler only reports
/// whether it was enqueued (spec §4.5, SPEC_FULL §10.6).
#[utoipa::path(
    post,
    path = "/debug/command",
    tag = "debug",
    request_body = DebugCommandRequest,
    responses((status = 200, body = SuccessResponse), (status = 503, body = ErrorResponse))
)]
pub async fn debug_command(
    State(coordinator): State<Arc<Coordinator>>,
    Json(request): Json<DebugCommandRequest>,
) -> Result<Json<SuccessResponse>, (StatusCode, Json<ErrorResponse>)> {
    coordinator
        .submit_debug_command(request.into())
        .map(|()| Json(SuccessResponse { accepted: true }))
        .map_err(|_| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse { error: "cpu worker command channel closed".to_string() }),
            )
        })
}
