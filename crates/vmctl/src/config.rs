//! Coordinator configuration: hardcoded defaults overlaid with `VMCTL_*`
//! environment variables (SPEC_FULL §10.4).
//!
//! This is the ambient process/config layer the coordinator binary needs to
//! start; it is not the guest-facing configuration the emulator core
//! deliberately leaves out of scope.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct VmConfig {
    pub guest_ram_bytes: usize,
    pub vram_base: u64,
    pub vram_bytes: usize,
    pub status_bind_addr: String,
    pub trace_buffer_capacity: usize,
    pub seqlock_retry_bound: u32,
    pub gpu_refresh_hz: f64,
    pub gpu_max_pending_submissions: usize,
    pub hid_stuck_call_deadline_ticks: u64,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            guest_ram_bytes: 256 * 1024 * 1024,
            vram_base: 0xE000_0000,
            vram_bytes: 16 * 1024 * 1024,
            status_bind_addr: "127.0.0.1:8872".to_string(),
            trace_buffer_capacity: 4096,
            seqlock_retry_bound: 8,
            gpu_refresh_hz: 60.0,
            gpu_max_pending_submissions: 64,
            hid_stuck_call_deadline_ticks: 1000,
        }
    }
}

impl VmConfig {
    /// Overlay environment variables onto the defaults. Each var is parsed
    /// independently; a missing or unparseable var leaves the default in
    /// place rather than failing startup.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(s) = std::env::var("VMCTL_GUEST_RAM_BYTES") {
            if let Ok(val) = s.parse() {
                config.guest_ram_bytes = val;
            }
        }
        if let Ok(s) = std::env::var("VMCTL_VRAM_BASE") {
            if let Ok(val) = parse_hex_or_dec(&s) {
                config.vram_base = val;
            }
        }
        if let Ok(s) = std::env::var("VMCTL_VRAM_BYTES") {
            if let Ok(val) = s.parse() {
                config.vram_bytes = val;
            }
        }
        if let Ok(s) = std::env::var("VMCTL_STATUS_BIND") {
            config.status_bind_addr = s;
        }
        if let Ok(s) = std::env::var("VMCTL_TRACE_BUFFER_CAPACITY") {
            if let Ok(val) = s.parse() {
                config.trace_buffer_capacity = val;
            }
        }
        if let Ok(s) = std::env::var("VMCTL_SEQLOCK_RETRY_BOUND") {
            if let Ok(val) = s.parse() {
                config.seqlock_retry_bound = val;
            }
        }
        if let Ok(s) = std::env::var("VMCTL_GPU_REFRESH_HZ") {
            if let Ok(val) = s.parse() {
                config.gpu_refresh_hz = val;
            }
        }
        if let Ok(s) = std::env::var("VMCTL_GPU_MAX_PENDING_SUBMISSIONS") {
            if let Ok(val) = s.parse() {
                config.gpu_max_pending_submissions = val;
            }
        }
        if let Ok(s) = std::env::var("VMCTL_HID_STUCK_CALL_DEADLINE_TICKS") {
            if let Ok(val) = s.parse() {
                config.hid_stuck_call_deadline_ticks = val;
            }
        }

        config
    }
}

fn parse_hex_or_dec(s: &str) -> Result<u64, std::num::ParseIntError> {
    match s.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_self_consistent() {
        let config = VmConfig::default();
        assert!(config.vram_bytes > 0);
        assert!(config.gpu_refresh_hz > 0.0);
    }

    #[test]
    fn hex_vram_base_parses() {
        assert_eq!(parse_hex_or_dec("0xE0000000").unwrap(), 0xE000_0000);
        assert_eq!(parse_hex_or_dec("100").unwrap(), 100);
    }
}
