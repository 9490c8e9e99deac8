//! The VBlank event ledger.
//!
//! The readable VBlank flag (PPUSTATUS bit 7) and the NMI line into the
//! CPU are distinct signals that games race against each other: a $2002
//! read can land on the exact master cycle the flag sets, and a PPUCTRL
//! write can re-arm NMI mid-VBlank. A single boolean cannot represent
//! those orderings, so the ledger stores *timestamps of events* and
//! answers the two questions that matter, "does a read see the flag?"
//! and "should the NMI line be high?", as pure predicates over them.
//!
//! This structure is the load-bearing arbitration point of the whole
//! core; every field is a master-cycle count.

/// Timestamped VBlank/NMI event record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VblankLedger {
    /// Master cycle of the last VBlank set (scanline 241 dot 1).
    last_set_cycle: Option<u64>,
    /// Master cycle of the last flag clear ($2002 read or 261.1).
    last_clear_cycle: Option<u64>,
    /// Master cycle of the last $2002 read alone.
    last_status_read_cycle: Option<u64>,
    /// Master cycle of the last PPUCTRL write.
    last_ctrl_toggle_cycle: Option<u64>,
    /// Master cycle when the CPU last acknowledged an NMI.
    last_cpu_ack_cycle: Option<u64>,
    /// VBlank span is open (between 241.1 and 261.1).
    span_active: bool,
    /// An NMI edge fired and the CPU has not consumed it yet.
    nmi_edge_pending: bool,
    /// A $2002 read landed on 241 dot 0: suppress the set at this cycle.
    prevent_set_cycle: Option<u64>,
}

impl VblankLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear everything (reset).
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    // =====================================================================
    // Event recorders
    // =====================================================================

    /// VBlank sets at scanline 241 dot 1.
    ///
    /// The NMI edge arms only on the 0-to-1 transition of
    /// (span-active AND nmi-enabled).
    pub fn record_vblank_set(&mut self, cycle: u64, nmi_enabled: bool) {
        if nmi_enabled && !self.span_active {
            self.nmi_edge_pending = true;
        }
        self.span_active = true;
        self.last_set_cycle = Some(cycle);
    }

    /// VBlank span ends at scanline 261 dot 1. The pending NMI edge, if
    /// any, survives: only the CPU consumes it.
    pub fn record_vblank_span_end(&mut self, cycle: u64) {
        self.span_active = false;
        self.last_clear_cycle = Some(cycle);
    }

    /// The CPU read $2002. Clears the *readable* flag (via the clear
    /// timestamp) but neither the span nor the pending edge.
    pub fn record_status_read(&mut self, cycle: u64) {
        self.last_status_read_cycle = Some(cycle);
        self.last_clear_cycle = Some(cycle);
    }

    /// The CPU wrote PPUCTRL. Enabling NMI mid-span arms a fresh edge:
    /// the re-trigger games use for split NMI handlers.
    pub fn record_ctrl_toggle(&mut self, cycle: u64, old_enable: bool, new_enable: bool) {
        self.last_ctrl_toggle_cycle = Some(cycle);
        if !old_enable && new_enable && self.span_active {
            self.nmi_edge_pending = true;
        }
    }

    /// The CPU began servicing the NMI: consume the edge.
    pub fn acknowledge_cpu(&mut self, cycle: u64) {
        self.nmi_edge_pending = false;
        self.last_cpu_ack_cycle = Some(cycle);
    }

    /// A $2002 read landed one dot before the set point (241 dot 0):
    /// hardware never raises the flag that frame. `cycle` is the master
    /// cycle the set would occur on.
    pub fn arm_set_prevention(&mut self, cycle: u64) {
        self.prevent_set_cycle = Some(cycle);
    }

    /// True when the set scheduled for `cycle` was suppressed by a read
    /// on the preceding dot.
    #[must_use]
    pub fn is_set_prevented(&self, cycle: u64) -> bool {
        self.prevent_set_cycle == Some(cycle)
    }

    // =====================================================================
    // Predicates
    // =====================================================================

    /// Would a $2002 read on `_current_cycle` see bit 7 set?
    #[must_use]
    pub fn is_readable_flag_set(&self, _current_cycle: u64) -> bool {
        if !self.span_active {
            return false;
        }
        // The same-cycle race: a read on the exact set cycle preserves
        // the flag (and suppresses NMI elsewhere).
        if self.last_status_read_cycle.is_some()
            && self.last_status_read_cycle == self.last_set_cycle
        {
            return true;
        }
        match (self.last_clear_cycle, self.last_set_cycle) {
            (Some(clear), Some(set)) if clear > set => false,
            _ => true,
        }
    }

    /// Should the NMI line into the CPU be high on this cycle?
    #[must_use]
    pub fn should_assert_nmi_line(&self, _cycle: u64, nmi_enabled: bool) -> bool {
        nmi_enabled
            && self.nmi_edge_pending
            && !(self.last_status_read_cycle.is_some()
                && self.last_status_read_cycle == self.last_set_cycle)
    }

    /// VBlank span currently open.
    #[must_use]
    pub fn span_active(&self) -> bool {
        self.span_active
    }

    /// An unconsumed NMI edge exists.
    #[must_use]
    pub fn nmi_edge_pending(&self) -> bool {
        self.nmi_edge_pending
    }

    // =====================================================================
    // Snapshot support
    // =====================================================================

    /// Append raw state (snapshots).
    pub fn save_state(&self, out: &mut Vec<u8>) {
        fn put(out: &mut Vec<u8>, value: Option<u64>) {
            match value {
                Some(v) => {
                    out.push(1);
                    out.extend_from_slice(&v.to_le_bytes());
                }
                None => {
                    out.push(0);
                    out.extend_from_slice(&0u64.to_le_bytes());
                }
            }
        }
        put(out, self.last_set_cycle);
        put(out, self.last_clear_cycle);
        put(out, self.last_status_read_cycle);
        put(out, self.last_ctrl_toggle_cycle);
        put(out, self.last_cpu_ack_cycle);
        out.push(u8::from(self.span_active));
        out.push(u8::from(self.nmi_edge_pending));
        put(out, self.prevent_set_cycle);
    }

    /// Restore raw state.
    pub fn load_state(&mut self, data: &[u8], pos: &mut usize) -> Option<()> {
        fn take_opt(data: &[u8], pos: &mut usize) -> Option<Option<u64>> {
            let tag = *data.get(*pos)?;
            *pos += 1;
            let bytes: [u8; 8] = data.get(*pos..*pos + 8)?.try_into().ok()?;
            *pos += 8;
            Some((tag != 0).then_some(u64::from_le_bytes(bytes)))
        }
        self.last_set_cycle = take_opt(data, pos)?;
        self.last_clear_cycle = take_opt(data, pos)?;
        self.last_status_read_cycle = take_opt(data, pos)?;
        self.last_ctrl_toggle_cycle = take_opt(data, pos)?;
        self.last_cpu_ack_cycle = take_opt(data, pos)?;
        self.span_active = *data.get(*pos)? != 0;
        *pos += 1;
        self.nmi_edge_pending = *data.get(*pos)? != 0;
        *pos += 1;
        self.prevent_set_cycle = take_opt(data, pos)?;
        Some(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_read_clears() {
        let mut ledger = VblankLedger::new();
        ledger.record_vblank_set(1000, false);
        assert!(ledger.is_readable_flag_set(1001));

        ledger.record_status_read(1050);
        assert!(!ledger.is_readable_flag_set(1051));
        // Span is still open even though the readable flag is gone.
        assert!(ledger.span_active());
    }

    #[test]
    fn test_span_end_clears_flag() {
        let mut ledger = VblankLedger::new();
        ledger.record_vblank_set(1000, false);
        ledger.record_vblank_span_end(5000);
        assert!(!ledger.is_readable_flag_set(5001));
    }

    #[test]
    fn test_nmi_edge_on_set_with_enable() {
        let mut ledger = VblankLedger::new();
        ledger.record_vblank_set(1000, true);
        assert!(ledger.nmi_edge_pending());
        assert!(ledger.should_assert_nmi_line(1001, true));
        // Disabling NMI drops the line without consuming the edge.
        assert!(!ledger.should_assert_nmi_line(1001, false));
    }

    #[test]
    fn test_no_edge_without_enable() {
        let mut ledger = VblankLedger::new();
        ledger.record_vblank_set(1000, false);
        assert!(!ledger.nmi_edge_pending());
    }

    #[test]
    fn test_ctrl_toggle_arms_edge_mid_span() {
        let mut ledger = VblankLedger::new();
        ledger.record_vblank_set(1000, false);
        assert!(!ledger.nmi_edge_pending());

        ledger.record_ctrl_toggle(2000, false, true);
        assert!(ledger.nmi_edge_pending());
        assert!(ledger.should_assert_nmi_line(2001, true));
    }

    #[test]
    fn test_ctrl_toggle_outside_span_does_not_arm() {
        let mut ledger = VblankLedger::new();
        ledger.record_ctrl_toggle(100, false, true);
        assert!(!ledger.nmi_edge_pending());
    }

    #[test]
    fn test_ack_consumes_edge() {
        let mut ledger = VblankLedger::new();
        ledger.record_vblank_set(1000, true);
        ledger.acknowledge_cpu(1010);
        assert!(!ledger.nmi_edge_pending());
        assert!(!ledger.should_assert_nmi_line(1011, true));
    }

    #[test]
    fn test_status_read_does_not_consume_edge() {
        let mut ledger = VblankLedger::new();
        ledger.record_vblank_set(1000, true);
        ledger.record_status_read(1020);
        // The edge survives a read; only the readable flag is gone.
        assert!(ledger.nmi_edge_pending());
        assert!(ledger.should_assert_nmi_line(1021, true));
    }

    #[test]
    fn test_same_cycle_race_preserves_flag_and_suppresses_nmi() {
        let mut ledger = VblankLedger::new();
        // Sub-cycle order: CPU read happens first, then the set records
        // with the same timestamp.
        ledger.record_status_read(3000);
        ledger.record_vblank_set(3000, true);

        // The flag stays readable (the race preserves it).
        assert!(ledger.is_readable_flag_set(3001));
        // The NMI is suppressed for this span.
        assert!(!ledger.should_assert_nmi_line(3001, true));
    }

    #[test]
    fn test_race_window_prevention() {
        let mut ledger = VblankLedger::new();
        ledger.arm_set_prevention(3000);
        assert!(ledger.is_set_prevented(3000));
        assert!(!ledger.is_set_prevented(3001));
    }

    #[test]
    fn test_re_set_arms_new_edge_next_frame() {
        let mut ledger = VblankLedger::new();
        ledger.record_vblank_set(1000, true);
        ledger.acknowledge_cpu(1010);
        ledger.record_vblank_span_end(5000);

        ledger.record_vblank_set(90_000, true);
        assert!(ledger.nmi_edge_pending());
    }

    #[test]
    fn test_save_restore_round_trip() {
        let mut ledger = VblankLedger::new();
        ledger.record_vblank_set(1234, true);
        ledger.record_status_read(5678);
        ledger.arm_set_prevention(9999);

        let mut saved = Vec::new();
        ledger.save_state(&mut saved);
        let mut restored = VblankLedger::new();
        let mut pos = 0;
        restored.load_state(&saved, &mut pos).unwrap();
        assert_eq!(pos, saved.len());
        assert_eq!(ledger, restored);
    }
}
