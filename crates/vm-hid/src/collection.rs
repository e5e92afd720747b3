//! HID report-descriptor collection tree validation (spec §4.6).

use vm_core::error::{VmError, VmResult};

/// One collection node from a device's report descriptor, reduced to the
/// fields the broker actually needs to validate and dispatch on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub report_id: Option<u8>,
    pub is_range: bool,
    pub range_start: Option<u16>,
    pub range_end: Option<u16>,
    pub has_output_report: bool,
}

/// Reject mixed report IDs (some collections numbered, others not) and
/// out-of-order range bounds (spec §4.6 "validate the device's
/// report-descriptor collection tree").
pub fn validate_collections(collections: &[Collection]) -> VmResult<()> {
    let numbered = collections.iter().filter(|c| c.report_id.is_some()).count();
    if numbered != 0 && numbered != collections.len() {
        return Err(VmError::ProtocolViolation(
            "hid: mixed report IDs across collections".into(),
        ));
    }
    for c in collections {
        if c.is_range {
            match (c.range_start, c.range_end) {
                (Some(start), Some(end)) if end < start => {
                    return Err(VmError::ProtocolViolation(format!(
                        "hid: out-of-order range bounds [{start}, {end}]"
                    )));
                }
                (None, _) | (_, None) => {
                    return Err(VmError::ProtocolViolation("hid: range collection missing bounds".into()));
                }
                _ => {}
            }
        }
    }
    Ok(())
}

/// True iff any collection carries an output report (spec §4.6
/// `has_interrupt_out`).
pub fn has_interrupt_out(collections: &[Collection]) -> bool {
    collections.iter().any(|c| c.has_output_report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(id: u8, output: bool) -> Collection {
        Collection { report_id: Some(id), is_range: false, range_start: None, range_end: None, has_output_report: output }
    }

    #[test]
    fn uniform_numbered_collections_are_valid() {
        let collections = vec![numbered(1, false), numbered(2, true)];
        assert!(validate_collections(&collections).is_ok());
        assert!(has_interrupt_out(&collections));
    }

    #[test]
    fn mixed_numbered_and_unnumbered_is_rejected() {
        let mut unnumbered = numbered(1, false);
        unnumbered.report_id = None;
        let collections = vec![numbered(1, false), unnumbered];
        assert!(matches!(validate_collections(&collections), Err(VmError::ProtocolViolation(_))));
    }

    #[test]
    fn out_of_order_range_bounds_rejected() {
        let collections = vec![Collection {
            report_id: None,
            is_range: true,
            range_start: Some(10),
            range_end: Some(5),
            has_output_report: false,
        }];
        assert!(matches!(validate_collections(&collections), Err(VmError::ProtocolViolation(_))));
    }

    #[test]
    fn no_collections_have_no_interrupt_out() {
        assert!(!has_interrupt_out(&[]));
    }
}
