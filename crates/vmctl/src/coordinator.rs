//! Coordinator: builds the init bundle, spawns one OS thread per
//! [`WorkerRole`], and owns the cross-cutting state the status/event
//! surface in `api/` reads from (spec §2 "init bundle" / "ready word";
//! SPEC_FULL §10.1, §11).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::broadcast;
use utoipa::ToSchema;

use vm_core::init::{Readiness, ReadyWord, WorkerRole};
use vm_core::memory::GuestAddressSpace;
use vm_core::ring::RingBuffer;
use vm_cpu::{Command as CpuCommand, CpuRunState, CpuStepper, CpuWorker, Event as CpuEvent, PauseReason, StepOutcome};
use vm_gpu::framebuffer::{FrameState, FramebufferHeader};
use vm_gpu::mmio::INT_FENCE;
use vm_gpu::submission::{RingEntry, SubmissionDescriptor, SubmissionRing};
use vm_gpu::{CursorDescriptor, GpuWorker, PresentOutcome, ScanoutDescriptor, ScreenshotRequest, ScreenshotService};
use vm_hid::broker::HostDevice;
use vm_hid::collection::Collection;
use vm_hid::protocol::{HidInputReport, ReportType};
use vm_hid::HidBroker;
use vm_io::{DeviceModel, IoClient, IoServer};

use crate::config::VmConfig;

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const WORKER_TICK_INTERVAL: Duration = Duration::from_millis(4);
const RING_CAPACITY: usize = 1 << 16;

/// Wire shape for the `/events` WebSocket surface (SPEC_FULL §10.6).
/// Distinct from the per-crate `Event`/`VmError` types: this is what an
/// operator client actually sees, independent of how each worker models
/// its own state internally.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum VmEvent {
    LogLine { level: String, source: String, msg: String, ts_ms: i64 },
    CpuPaused { reason: String },
    CpuBreakpointHit { rip: u64 },
    CpuSerialOutput { data: Vec<u8> },
    GpuVblank { seq: u64 },
    GpuFenceRetired { count: usize },
    HidAttached { device_id: u64, vendor_id: u16, product_id: u16 },
    HidDetached { device_id: u64 },
    Backpressure { dropped_count: u64 },
}

/// A stub stepper: concrete instruction semantics are out of scope (spec §1
/// Non-goals). It advances `rip` by one per step so the state machine and
/// batching logic above it stay exercised end to end.
struct NullStepper {
    rip: u64,
}

impl CpuStepper for NullStepper {
    fn step(&mut self) -> StepOutcome {
        self.rip = self.rip.wrapping_add(1);
        StepOutcome { rip: self.rip, serial_byte: None, trace_record: None }
    }
}

/// Acknowledges every request and drops it: concrete device behavior (PIC,
/// UART, disk controller) is out of scope (spec §1 Non-goals). Keeps the
/// I/O transport's request/response contract exercised.
struct NullDeviceModel;

impl DeviceModel for NullDeviceModel {
    fn port_read(&mut self, _port: u16, _size: u8) -> u32 {
        0
    }
    fn port_write(&mut self, _port: u16, _size: u8, _value: u32) {}
    fn mmio_read(&mut self, _paddr: u64, _size: u8) -> u64 {
        0
    }
    fn mmio_write(&mut self, _paddr: u64, _size: u8, _value: u64) {}
    fn serial_notify(&mut self, _bytes: &[u8]) {}
}

/// Drops every Output/Feature report drained off the HID output ring:
/// there is no real host device behind this coordinator to deliver them to
/// (spec §1 Non-goals). Keeps `HidBroker::drain_output_reports`'s path
/// exercised end to end.
struct NullHostDevice;

impl HostDevice for NullHostDevice {
    fn send_report(&mut self, _device_id: u64, _report_id: u8, _report_type: ReportType, _data: &[u8]) {}
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VmStatus {
    pub cpu_ready: &'static str,
    pub io_ready: &'static str,
    pub gpu_ready: &'static str,
    pub cpu_run_state: &'static str,
    pub vblank_seq: u64,
    pub gpu_pending_submissions: usize,
    pub gpu_interrupt_status: u32,
    pub trace_dropped: u64,
    pub request_ring_dropped: u64,
    pub response_ring_dropped: u64,
    pub hid_fallback_dropped: u64,
    pub hid_output_stuck: bool,
}

/// Wire shape for `GET /gpu/screenshot`: the most recent composited frame
/// the GPU worker captured, plain `Serialize` (unlike [`vm_gpu::ScreenshotResponse`])
/// so `api/handlers.rs` can return it directly (SPEC_FULL §10.6).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GpuFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

fn readiness_label(r: Readiness) -> &'static str {
    match r {
        Readiness::NotReady => "not_ready",
        Readiness::Ready => "ready",
        Readiness::Failed => "failed",
    }
}

fn run_state_label(s: CpuRunState) -> &'static str {
    match s {
        CpuRunState::Running => "running",
        CpuRunState::Paused => "paused",
    }
}

/// Everything the coordinator owns: shared memory, the per-worker ready
/// words, the three worker threads, and the handles the HTTP/WS surface
/// needs to read status or push a debug command.
pub struct Coordinator {
    pub memory: Arc<GuestAddressSpace>,
    pub io_client: Arc<IoClient>,
    pub hid: Arc<Mutex<HidBroker>>,
    pub gpu: Arc<GpuWorker>,
    pub gpu_submission_ring: Arc<SubmissionRing>,
    pub events: broadcast::Sender<VmEvent>,
    cpu_ready: Arc<ReadyWord>,
    io_ready: Arc<ReadyWord>,
    gpu_ready: Arc<ReadyWord>,
    cpu_commands: mpsc::Sender<CpuCommand>,
    cpu_run_state: Arc<Mutex<CpuRunState>>,
    cpu_trace_dropped: Arc<Mutex<u64>>,
    gpu_vblank_seq: Arc<Mutex<u64>>,
    gpu_latest_frame: Arc<Mutex<Option<GpuFrame>>>,
    hid_output_stuck: Arc<AtomicBool>,
    request_ring: Arc<RingBuffer>,
    response_ring: Arc<RingBuffer>,
    shutdown: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl Coordinator {
    /// Build the init bundle (shared memory, rings, role tags) and spawn
    /// one thread per worker role, each flipping its ready word once it has
    /// mapped its handles (spec §2).
    pub fn start(config: &VmConfig) -> Self {
        let memory = Arc::new(GuestAddressSpace::new(config.guest_ram_bytes).with_vram(config.vram_base, config.vram_bytes));
        let request_ring = Arc::new(RingBuffer::new(RING_CAPACITY));
        let response_ring = Arc::new(RingBuffer::new(RING_CAPACITY));
        let hid_input_ring = Arc::new(RingBuffer::new(RING_CAPACITY));
        let hid_output_ring = Arc::new(RingBuffer::new(RING_CAPACITY));

        let io_client = Arc::new(IoClient::new(request_ring.clone(), response_ring.clone()));
        let hid = Arc::new(Mutex::new(HidBroker::new()));
        hid.lock().expect("hid broker mutex poisoned").attach_rings(hid_input_ring, hid_output_ring.clone());

        let gpu = Arc::new(GpuWorker::new(config.gpu_refresh_hz));
        let gpu_scanout = Arc::new(ScanoutDescriptor::new());
        let gpu_cursor = Arc::new(CursorDescriptor::new());
        let gpu_framebuffer = Arc::new(FramebufferHeader::new(0, 0, 0, 0, 8));
        let gpu_frame_state = Arc::new(FrameState::default());
        let gpu_submission_ring = Arc::new(SubmissionRing::new(config.gpu_max_pending_submissions.max(1)));

        let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let cpu_ready = Arc::new(ReadyWord::new());
        let io_ready = Arc::new(ReadyWord::new());
        let gpu_ready = Arc::new(ReadyWord::new());

        let cpu_run_state = Arc::new(Mutex::new(CpuRunState::Paused));
        let cpu_trace_dropped = Arc::new(Mutex::new(0u64));
        let gpu_vblank_seq = Arc::new(Mutex::new(0u64));
        let gpu_latest_frame = Arc::new(Mutex::new(None));
        let hid_output_stuck = Arc::new(AtomicBool::new(false));

        let shutdown = Arc::new(AtomicBool::new(false));
        let (cpu_tx, cpu_rx) = mpsc::channel::<CpuCommand>();

        let mut threads = Vec::new();

        threads.push(
            std::thread::Builder::new()
                .name(WorkerRole::Cpu.thread_name().to_string())
                .spawn({
                    let memory = memory.clone();
                    let ready = cpu_ready.clone();
                    let run_state = cpu_run_state.clone();
                    let trace_dropped = cpu_trace_dropped.clone();
                    let events = events_tx.clone();
                    let shutdown = shutdown.clone();
                    let trace_capacity = config.trace_buffer_capacity;
                    move || cpu_worker_loop(memory, ready, cpu_rx, run_state, trace_dropped, events, shutdown, trace_capacity)
                })
                .expect("failed to spawn cpu worker thread"),
        );

        threads.push(
            std::thread::Builder::new()
                .name(WorkerRole::Io.thread_name().to_string())
                .spawn({
                    let ready = io_ready.clone();
                    let request_ring = request_ring.clone();
                    let response_ring = response_ring.clone();
                    let hid = hid.clone();
                    let events = events_tx.clone();
                    let shutdown = shutdown.clone();
                    let hid_output_stuck = hid_output_stuck.clone();
                    let stuck_deadline_ticks = config.hid_stuck_call_deadline_ticks;
                    move || {
                        io_worker_loop(
                            ready,
                            request_ring,
                            response_ring,
                            hid,
                            events,
                            shutdown,
                            hid_output_stuck,
                            stuck_deadline_ticks,
                        )
                    }
                })
                .expect("failed to spawn io worker thread"),
        );

        threads.push(
            std::thread::Builder::new()
                .name(WorkerRole::Gpu.thread_name().to_string())
                .spawn({
                    let ready = gpu_ready.clone();
                    let memory = memory.clone();
                    let gpu = gpu.clone();
                    let scanout = gpu_scanout.clone();
                    let cursor = gpu_cursor.clone();
                    let framebuffer = gpu_framebuffer.clone();
                    let frame_state = gpu_frame_state.clone();
                    let submission_ring = gpu_submission_ring.clone();
                    let latest_frame = gpu_latest_frame.clone();
                    let vblank_seq = gpu_vblank_seq.clone();
                    let events = events_tx.clone();
                    let shutdown = shutdown.clone();
                    let max_pending_submissions = config.gpu_max_pending_submissions;
                    let seqlock_retry_bound = config.seqlock_retry_bound;
                    move || {
                        gpu_worker_loop(
                            ready,
                            memory,
                            gpu,
                            scanout,
                            cursor,
                            framebuffer,
                            frame_state,
                            submission_ring,
                            latest_frame,
                            vblank_seq,
                            events,
                            shutdown,
                            max_pending_submissions,
                            seqlock_retry_bound,
                        )
                    }
                })
                .expect("failed to spawn gpu worker thread"),
        );

        Self {
            memory,
            io_client,
            hid,
            gpu,
            gpu_submission_ring,
            events: events_tx,
            cpu_ready,
            io_ready,
            gpu_ready,
            cpu_commands: cpu_tx,
            cpu_run_state,
            cpu_trace_dropped,
            gpu_vblank_seq,
            gpu_latest_frame,
            hid_output_stuck,
            request_ring,
            response_ring,
            shutdown,
            threads,
        }
    }

    pub fn submit_debug_command(&self, cmd: CpuCommand) -> Result<(), mpsc::SendError<CpuCommand>> {
        self.cpu_commands.send(cmd)
    }

    /// Attach a host HID device to the broker (SPEC_FULL §10.6 HID control
    /// surface, spec §4.6 `hid.attach`).
    #[allow(clippy::too_many_arguments)]
    pub fn hid_attach(
        &self,
        device_id: u64,
        vendor_id: u16,
        product_id: u16,
        product_name: Option<String>,
        guest_path: Option<String>,
        guest_port: Option<u32>,
        collections: Vec<Collection>,
    ) -> vm_core::error::VmResult<()> {
        self.hid
            .lock()
            .expect("hid broker mutex poisoned")
            .attach_device(device_id, vendor_id, product_id, product_name, guest_path, guest_port, collections)?;
        let _ = self.events.send(VmEvent::HidAttached { device_id, vendor_id, product_id });
        Ok(())
    }

    pub fn hid_detach(&self, device_id: u64) {
        self.hid.lock().expect("hid broker mutex poisoned").detach_device(device_id);
        let _ = self.events.send(VmEvent::HidDetached { device_id });
    }

    pub fn hid_submit_input_report(&self, device_id: u64, report_id: u8, data: Vec<u8>, ts_ms: Option<u64>) {
        self.hid
            .lock()
            .expect("hid broker mutex poisoned")
            .forward_input_report(HidInputReport { device_id, report_id, data, ts_ms });
    }

    /// The most recent frame the GPU worker composited via
    /// `ScreenshotService::handle`, if any tick has produced one yet.
    pub fn gpu_latest_frame(&self) -> Option<GpuFrame> {
        self.gpu_latest_frame.lock().expect("gpu latest frame mutex poisoned").clone()
    }

    pub fn status(&self) -> VmStatus {
        VmStatus {
            cpu_ready: readiness_label(self.cpu_ready.get()),
            io_ready: readiness_label(self.io_ready.get()),
            gpu_ready: readiness_label(self.gpu_ready.get()),
            cpu_run_state: run_state_label(*self.cpu_run_state.lock().expect("cpu run state mutex poisoned")),
            vblank_seq: *self.gpu_vblank_seq.lock().expect("vblank seq mutex poisoned"),
            gpu_pending_submissions: self.gpu.pending_count(),
            gpu_interrupt_status: self.gpu.mmio.interrupt_status(),
            trace_dropped: *self.cpu_trace_dropped.lock().expect("trace dropped mutex poisoned"),
            request_ring_dropped: self.request_ring.dropped(),
            response_ring_dropped: self.response_ring.dropped(),
            hid_fallback_dropped: self.hid.lock().expect("hid broker mutex poisoned").dropped_fallback_count(),
            hid_output_stuck: self.hid_output_stuck.load(Ordering::Acquire),
        }
    }

    pub fn shutdown(self) {
        self.shutdown.store(true, Ordering::Release);
        for handle in self.threads {
            let _ = handle.join();
        }
    }
}

fn cpu_worker_loop(
    memory: Arc<GuestAddressSpace>,
    ready: Arc<ReadyWord>,
    commands: mpsc::Receiver<CpuCommand>,
    run_state: Arc<Mutex<CpuRunState>>,
    trace_dropped: Arc<Mutex<u64>>,
    events: broadcast::Sender<VmEvent>,
    shutdown: Arc<AtomicBool>,
    trace_capacity: usize,
) {
    let mut worker = CpuWorker::new(NullStepper { rip: 0 }, trace_capacity);
    worker.finish_init();
    ready.mark_ready();

    let start = Instant::now();
    while !shutdown.load(Ordering::Acquire) {
        let mut pending = Vec::new();
        while let Ok(cmd) = commands.try_recv() {
            pending.push(cmd);
        }

        let produced = worker.tick(start.elapsed(), pending, &memory);
        for event in produced {
            if let Some(wire) = translate_cpu_event(event) {
                let _ = events.send(wire);
            }
        }

        *run_state.lock().expect("cpu run state mutex poisoned") = worker.run_state();
        *trace_dropped.lock().expect("trace dropped mutex poisoned") = worker.trace_dropped();

        std::thread::sleep(WORKER_TICK_INTERVAL);
    }
}

fn translate_cpu_event(event: CpuEvent) -> Option<VmEvent> {
    match event {
        CpuEvent::Paused { reason } => Some(VmEvent::CpuPaused {
            reason: match reason {
                PauseReason::Init => "init",
                PauseReason::Explicit => "explicit",
                PauseReason::SingleStep => "single_step",
            }
            .to_string(),
        }),
        CpuEvent::BreakpointHit { rip } => Some(VmEvent::CpuBreakpointHit { rip }),
        CpuEvent::SerialOutput { bytes } => Some(VmEvent::CpuSerialOutput { data: bytes }),
        // CpuState/DeviceState/MemoryData/TraceChunk answer a specific
        // request rather than broadcasting to every subscriber; the debug
        // command endpoint surfaces them directly (api/routes.rs).
        CpuEvent::CpuState(_) | CpuEvent::DeviceState { .. } | CpuEvent::MemoryData { .. } | CpuEvent::TraceChunk { .. } => None,
    }
}

/// Drains the request/response transport and, folded into the same tick
/// since there is no dedicated HID worker role (spec §1 Non-goals), the HID
/// output-report ring. `hid_output_stuck` flags once `deadline_ticks`
/// consecutive ticks pass with at least one device attached but nothing
/// delivered, mirroring `vm_io::PendingCalls`' tick-counted stuck detection
/// (spec §4.3, §4.6) without requiring wall-clock time.
#[allow(clippy::too_many_arguments)]
fn io_worker_loop(
    ready: Arc<ReadyWord>,
    request_ring: Arc<RingBuffer>,
    response_ring: Arc<RingBuffer>,
    hid: Arc<Mutex<HidBroker>>,
    events: broadcast::Sender<VmEvent>,
    shutdown: Arc<AtomicBool>,
    hid_output_stuck: Arc<AtomicBool>,
    deadline_ticks: u64,
) {
    let server = IoServer::new(request_ring, response_ring);
    let mut model = NullDeviceModel;
    let mut host = NullHostDevice;
    ready.mark_ready();

    let mut idle_ticks: u64 = 0;
    while !shutdown.load(Ordering::Acquire) {
        let _ = server.tick(&mut model);

        let mut broker = hid.lock().expect("hid broker mutex poisoned");
        let any_attached = broker.attached_count() > 0;
        let delivered = broker.drain_output_reports(&mut host);
        drop(broker);

        if delivered > 0 {
            idle_ticks = 0;
        } else if any_attached {
            idle_ticks += 1;
        }
        hid_output_stuck.store(idle_ticks > deadline_ticks, Ordering::Release);

        std::thread::sleep(WORKER_TICK_INTERVAL);
    }
}

/// Samples the scanout/cursor seqlock mailboxes and composites a frame via
/// [`ScreenshotService`] every tick, drains the submission doorbell ring
/// (retiring each tracked fence immediately since no real command processor
/// backs this worker, spec §1 Non-goals), and advances vblank (spec §4.4).
#[allow(clippy::too_many_arguments)]
fn gpu_worker_loop(
    ready: Arc<ReadyWord>,
    memory: Arc<GuestAddressSpace>,
    worker: Arc<GpuWorker>,
    scanout: Arc<ScanoutDescriptor>,
    cursor: Arc<CursorDescriptor>,
    framebuffer: Arc<FramebufferHeader>,
    frame_state: Arc<FrameState>,
    submission_ring: Arc<SubmissionRing>,
    latest_frame: Arc<Mutex<Option<GpuFrame>>>,
    vblank_seq: Arc<Mutex<u64>>,
    events: broadcast::Sender<VmEvent>,
    shutdown: Arc<AtomicBool>,
    max_pending_submissions: usize,
    seqlock_retry_bound: u32,
) {
    ready.mark_ready();

    let start = Instant::now();
    let mut next_request_id: u64 = 0;
    while !shutdown.load(Ordering::Acquire) {
        while let Ok(Some(RingEntry::Submit { fence, desc_size, desc_gpa, .. })) = submission_ring.pop() {
            let dma_buffer_gpa = memory
                .read_span(desc_gpa, desc_size as usize)
                .ok()
                .and_then(|bytes| SubmissionDescriptor::decode(&bytes).ok())
                .map(|desc| desc.dma_buffer_gpa)
                .unwrap_or(0);
            if worker.track_submission(fence, dma_buffer_gpa, desc_gpa, max_pending_submissions).is_ok() {
                let retired = worker.retire_submissions(fence);
                if !retired.is_empty() {
                    let _ = events.send(VmEvent::GpuFenceRetired { count: retired.len() });
                }
            }
        }
        if worker.mmio.interrupt_status() & INT_FENCE != 0 {
            worker.mmio.ack_interrupt(INT_FENCE);
        }

        let seq = worker.tick_vblank(start.elapsed().as_nanos() as u64);
        *vblank_seq.lock().expect("vblank seq mutex poisoned") = seq;
        let _ = events.send(VmEvent::GpuVblank { seq });

        next_request_id += 1;
        let request = ScreenshotRequest { request_id: next_request_id, include_cursor: true };
        let outcome = ScreenshotService::handle(request, &memory, &scanout, &cursor, seqlock_retry_bound, None);
        match outcome {
            Ok(resp) => {
                worker.present(PresentOutcome::Presented, &framebuffer, &frame_state);
                *latest_frame.lock().expect("gpu latest frame mutex poisoned") =
                    Some(GpuFrame { width: resp.width, height: resp.height, pixels: resp.pixels });
            }
            Err(_) => worker.present(PresentOutcome::Dropped, &framebuffer, &frame_state),
        }

        std::thread::sleep(worker.vblank.period());
    }
}
