//! Control Block configuration and per-CB session state (spec §3).
//!
//! `SessionState` is modeled as a tagged variant rather than one wide record
//! bundling GSE-only and SMV-only fields together — the source's
//! `GooseSvData` aggregate did the latter; this is the re-architecture the
//! design notes call for.

use std::collections::HashSet;

/// Which wire profile a control block speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlBlockKind {
    /// Routable GOOSE.
    Gse,
    /// Routable Sampled Values.
    Smv,
}

/// A Control Block loaded from a Substation Exchange Description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlBlock {
    pub host_ied: String,
    pub kind: ControlBlockKind,
    pub multicast_ip: String,
    pub app_id: u16,
    /// Informational only in the core; not used by the wire codec.
    pub vlan_id: Option<u16>,
    /// Fully qualified after loading: `<ldInst>/<lnClass>.<cbName>`.
    pub cb_name: String,
    /// Fully qualified after loading. Unused when `kind == Smv`.
    pub dat_set_name: Option<String>,
    pub dat_set_members: Vec<String>,
    pub subscribers: HashSet<String>,
}

impl ControlBlock {
    pub fn is_subscriber(&self, ied_name: &str) -> bool {
        self.subscribers.contains(ied_name)
    }

    pub fn fresh_session_state(&self) -> SessionState {
        SessionState {
            spdu_num: 0,
            kind: match self.kind {
                ControlBlockKind::Gse => KindState::Gse(GseState::default()),
                ControlBlockKind::Smv => KindState::Smv(SmvState::default()),
            },
        }
    }
}

/// Mutable per-CB, per-direction session state (spec §3). Lifecycle is
/// bound to the process: there is no persistence across restarts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub spdu_num: u32,
    pub kind: KindState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindState {
    Gse(GseState),
    Smv(SmvState),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GseState {
    pub st_num: u32,
    pub sq_num: u32,
    pub last_all_data: Vec<u8>,
    pub num_dat_set_entries: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmvState {
    pub smp_cnt: u16,
    pub last_seq_of_data: Vec<u8>,
}

impl SessionState {
    pub fn as_gse(&self) -> Option<&GseState> {
        match &self.kind {
            KindState::Gse(s) => Some(s),
            KindState::Smv(_) => None,
        }
    }

    pub fn as_gse_mut(&mut self) -> Option<&mut GseState> {
        match &mut self.kind {
            KindState::Gse(s) => Some(s),
            KindState::Smv(_) => None,
        }
    }

    pub fn as_smv(&self) -> Option<&SmvState> {
        match &self.kind {
            KindState::Smv(s) => Some(s),
            KindState::Gse(_) => None,
        }
    }

    pub fn as_smv_mut(&mut self) -> Option<&mut SmvState> {
        match &mut self.kind {
            KindState::Smv(s) => Some(s),
            KindState::Gse(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_gse_cb() -> ControlBlock {
        ControlBlock {
            host_ied: "IED1".into(),
            kind: ControlBlockKind::Gse,
            multicast_ip: "224.0.0.10".into(),
            app_id: 0x1001,
            vlan_id: None,
            cb_name: "LD0/LLN0.gcb01".into(),
            dat_set_name: Some("LD0/LLN0.ds01".into()),
            dat_set_members: vec!["IED1.LLN0.Pos.stVal".into()],
            subscribers: HashSet::from(["IED2".into()]),
        }
    }

    #[test]
    fn fresh_session_state_is_all_zero_for_gse() {
        let cb = sample_gse_cb();
        let state = cb.fresh_session_state();
        assert_eq!(state.spdu_num, 0);
        let gse = state.as_gse().unwrap();
        assert_eq!(gse.st_num, 0);
        assert_eq!(gse.sq_num, 0);
        assert!(gse.last_all_data.is_empty());
    }

    #[test]
    fn is_subscriber_checks_membership() {
        let cb = sample_gse_cb();
        assert!(cb.is_subscriber("IED2"));
        assert!(!cb.is_subscriber("IED3"));
    }
}
