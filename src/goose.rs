//! GOOSE PDU codec and per-CB state machine (C5, spec §4.5.1, §4.5.3).

use crate::control_block::{ControlBlock, GseState};
use crate::error::DecodeError;
use crate::tlv::{read_tlv_header, read_uint_be, tlv_walk, write_uint_be_min_len};

const OUTER_TAG: [u8; 2] = [0x61, 0x81];

const TAG_GOCB_REF: u8 = 0x80;
const TAG_TIME_ALLOWED_TO_LIVE: u8 = 0x81;
const TAG_DAT_SET: u8 = 0x82;
const TAG_GO_ID: u8 = 0x83;
const TAG_T: u8 = 0x84;
const TAG_ST_NUM: u8 = 0x85;
const TAG_SQ_NUM: u8 = 0x86;
const TAG_TEST: u8 = 0x87;
const TAG_CONF_REV: u8 = 0x88;
const TAG_NDS_COM: u8 = 0x89;
const TAG_NUM_DAT_SET_ENTRIES: u8 = 0x8A;
const TAG_ALL_DATA: u8 = 0xAB;

/// Fixed `confRev` value in this profile (spec §4.5.1 table).
pub const CONF_REV: u32 = 1;

/// A fully decoded GOOSE PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoosePdu {
    pub gocb_ref: String,
    pub time_allowed_to_live: u32,
    pub dat_set: String,
    pub go_id: String,
    pub t: [u8; 8],
    pub st_num: u32,
    pub sq_num: u32,
    pub test: bool,
    pub conf_rev: u32,
    pub nds_com: bool,
    pub num_dat_set_entries: u8,
    /// Raw bytes of the `numDatSetEntries` opaque TLV entries, concatenated.
    /// Contents are not interpreted by this profile.
    pub all_data: Vec<u8>,
}

/// Returns the `timeAllowedToLive` value (milliseconds) for a given `sqNum`,
/// per the spec §4.5.1 back-off schedule.
pub fn time_allowed_to_live_for_sq_num(sq_num: u32) -> u32 {
    match sq_num {
        0..=5 => 20,
        6 => 32,
        7 => 64,
        8 => 128,
        9 => 256,
        10 => 512,
        11 => 1024,
        12 => 2048,
        _ => 4000,
    }
}

fn push_tlv(buf: &mut Vec<u8>, tag: u8, value: &[u8]) {
    assert!(value.len() <= u8::MAX as usize, "single-byte BER length only");
    buf.push(tag);
    buf.push(value.len() as u8);
    buf.extend_from_slice(value);
}

/// Input the caller (sender loop / data source) supplies for one encode
/// cycle: the freshly sampled dataset, already TLV-encoded, opaque to this
/// codec.
pub struct GooseEncodeInput<'a> {
    pub all_data: &'a [u8],
    pub num_dat_set_entries: u8,
    pub timestamp: [u8; 8],
}

/// Encodes one GOOSE PDU, applying the spec §4.5.1 stNum/sqNum encode rule,
/// and returns the new state to store for this CB.
pub fn encode_goose_pdu(
    cb: &ControlBlock,
    state: &GseState,
    input: GooseEncodeInput,
) -> (Vec<u8>, GseState) {
    // A CB's very first transmission has no prior allData to compare against;
    // treat it as establishing the baseline rather than a change, so stNum
    // starts at its initial value and only the next genuine change bumps it.
    let established = !state.last_all_data.is_empty();
    let changed = established && input.all_data != state.last_all_data.as_slice();
    let (st_num, sq_num) = if changed {
        (state.st_num + 1, 0)
    } else {
        let sq_num = if state.sq_num == u32::MAX {
            1
        } else {
            state.sq_num + 1
        };
        (state.st_num, sq_num)
    };
    let time_allowed_to_live = time_allowed_to_live_for_sq_num(sq_num);

    let dat_set_name = cb.dat_set_name.as_deref().unwrap_or_default();

    let mut fields = Vec::new();
    push_tlv(&mut fields, TAG_GOCB_REF, cb.cb_name.as_bytes());
    push_tlv(
        &mut fields,
        TAG_TIME_ALLOWED_TO_LIVE,
        &write_uint_be_min_len(time_allowed_to_live),
    );
    push_tlv(&mut fields, TAG_DAT_SET, dat_set_name.as_bytes());
    push_tlv(&mut fields, TAG_GO_ID, cb.cb_name.as_bytes());
    push_tlv(&mut fields, TAG_T, &input.timestamp);
    push_tlv(&mut fields, TAG_ST_NUM, &write_uint_be_min_len(st_num));
    push_tlv(&mut fields, TAG_SQ_NUM, &write_uint_be_min_len(sq_num));
    push_tlv(&mut fields, TAG_TEST, &[0x00]);
    push_tlv(&mut fields, TAG_CONF_REV, &write_uint_be_min_len(CONF_REV));
    push_tlv(&mut fields, TAG_NDS_COM, &[0x00]);
    push_tlv(&mut fields, TAG_NUM_DAT_SET_ENTRIES, &[input.num_dat_set_entries]);
    push_tlv(&mut fields, TAG_ALL_DATA, input.all_data);

    let mut pdu = Vec::with_capacity(fields.len() + 3);
    pdu.extend_from_slice(&OUTER_TAG);
    pdu.push(fields.len() as u8);
    pdu.extend_from_slice(&fields);

    let new_state = GseState {
        st_num,
        sq_num,
        last_all_data: input.all_data.to_vec(),
        num_dat_set_entries: input.num_dat_set_entries,
    };

    (pdu, new_state)
}

/// Parses the fixed-order GOOSE PDU TLV fields. Performs only structural
/// validation (tag order, lengths, fixed-value fields); CB-identity and
/// freshness checks are [`validate_and_update`]'s job.
pub fn parse_goose_pdu(pdu: &[u8]) -> Result<GoosePdu, DecodeError> {
    if pdu.len() < 3 || pdu[0..2] != OUTER_TAG {
        return Err(DecodeError::malformed("missing GOOSE outer tag 0x61 0x81"));
    }
    let declared_len = pdu[2] as usize;
    if declared_len != pdu.len() - 3 {
        return Err(DecodeError::malformed("GOOSE outer length does not match PDU size"));
    }

    let mut pos = 3usize;

    macro_rules! next_field {
        ($expected_tag:expr) => {{
            let entry = read_tlv_header(pdu, pos)?;
            if entry.tag != $expected_tag {
                return Err(DecodeError::malformed(format!(
                    "expected tag {:#04x} at {pos}, found {:#04x}",
                    $expected_tag, entry.tag
                )));
            }
            let value = entry.value(pdu)?.to_vec();
            pos = entry.end();
            value
        }};
    }

    fn to_ascii(bytes: Vec<u8>) -> Result<String, DecodeError> {
        String::from_utf8(bytes).map_err(|_| DecodeError::malformed("field is not ASCII/UTF-8"))
    }

    let gocb_ref = to_ascii(next_field!(TAG_GOCB_REF))?;
    let time_allowed_to_live = read_min_len_uint(&next_field!(TAG_TIME_ALLOWED_TO_LIVE))?;
    let dat_set = to_ascii(next_field!(TAG_DAT_SET))?;
    let go_id = to_ascii(next_field!(TAG_GO_ID))?;

    let t_bytes = next_field!(TAG_T);
    if t_bytes.len() != 8 {
        return Err(DecodeError::malformed("t field must be 8 bytes"));
    }
    let mut t = [0u8; 8];
    t.copy_from_slice(&t_bytes);

    let st_num = read_min_len_uint(&next_field!(TAG_ST_NUM))?;
    let sq_num = read_min_len_uint(&next_field!(TAG_SQ_NUM))?;

    let test_bytes = next_field!(TAG_TEST);
    if test_bytes != [0x00] {
        return Err(DecodeError::malformed("test must be boolean false"));
    }

    let conf_rev = read_min_len_uint(&next_field!(TAG_CONF_REV))?;
    if conf_rev != CONF_REV {
        return Err(DecodeError::malformed("confRev must be 1 in this profile"));
    }

    let nds_com_bytes = next_field!(TAG_NDS_COM);
    if nds_com_bytes != [0x00] {
        return Err(DecodeError::malformed("ndsCom must be boolean false"));
    }

    let num_entries_bytes = next_field!(TAG_NUM_DAT_SET_ENTRIES);
    if num_entries_bytes.len() != 1 {
        return Err(DecodeError::malformed("numDatSetEntries must be a single byte"));
    }
    let num_dat_set_entries = num_entries_bytes[0];

    let container = read_tlv_header(pdu, pos)?;
    if container.tag != TAG_ALL_DATA {
        return Err(DecodeError::malformed("expected allData tag 0xAB"));
    }
    let data_start = container.value_offset;
    let data_end = container.end();
    let mut entry_count = 0u32;
    tlv_walk(pdu, data_start, data_end, |_| {
        entry_count += 1;
        Ok(())
    })?;
    if entry_count != num_dat_set_entries as u32 {
        return Err(DecodeError::malformed(
            "allData entry count does not match numDatSetEntries",
        ));
    }
    let all_data = pdu[data_start..data_end].to_vec();
    pos = data_end;

    if pos != pdu.len() {
        return Err(DecodeError::malformed("trailing bytes after allData"));
    }

    Ok(GoosePdu {
        gocb_ref,
        time_allowed_to_live,
        dat_set,
        go_id,
        t,
        st_num,
        sq_num,
        test: false,
        conf_rev,
        nds_com: false,
        num_dat_set_entries,
        all_data,
    })
}

fn read_min_len_uint(bytes: &[u8]) -> Result<u32, DecodeError> {
    if bytes.is_empty() || bytes.len() > 4 {
        return Err(DecodeError::malformed("invalid minimal-length integer"));
    }
    read_uint_be(bytes, 0, bytes.len())
}

/// Checks CB-identity (`Mismatch`) and freshness (`OutOfOrder`/`Duplicate`/
/// `Malformed`) rules from spec §4.5.1, and atomically updates `state` on
/// success.
pub fn validate_and_update(
    cb: &ControlBlock,
    state: &mut GseState,
    pdu: &GoosePdu,
) -> Result<(), DecodeError> {
    if pdu.gocb_ref != cb.cb_name {
        return Err(DecodeError::mismatch("gocbRef"));
    }
    if let Some(dat_set_name) = &cb.dat_set_name {
        if &pdu.dat_set != dat_set_name {
            return Err(DecodeError::mismatch("datSet"));
        }
    }
    // goID is checked against cbName rather than a distinct configured
    // field, retained for bit-compatibility with the source profile.
    if pdu.go_id != cb.cb_name {
        return Err(DecodeError::mismatch("goID"));
    }

    if pdu.st_num < state.st_num {
        return Err(DecodeError::OutOfOrder);
    }

    if pdu.st_num == state.st_num {
        if pdu.sq_num <= state.sq_num && state.sq_num != u32::MAX {
            return Err(DecodeError::Duplicate);
        }
    } else {
        if pdu.sq_num != 0 {
            return Err(DecodeError::malformed("stNum advanced but sqNum is not 0"));
        }
        if pdu.st_num == state.st_num + 1 && pdu.all_data == state.last_all_data {
            return Err(DecodeError::malformed("stNum bumped with unchanged allData"));
        }
    }

    state.st_num = pdu.st_num;
    state.sq_num = pdu.sq_num;
    state.last_all_data = pdu.all_data.clone();
    state.num_dat_set_entries = pdu.num_dat_set_entries;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_block::{ControlBlock, ControlBlockKind};
    use std::collections::HashSet;

    fn sample_cb() -> ControlBlock {
        ControlBlock {
            host_ied: "IED1".into(),
            kind: ControlBlockKind::Gse,
            multicast_ip: "224.0.0.10".into(),
            app_id: 0x1001,
            vlan_id: None,
            cb_name: "LD0/LLN0.gcb01".into(),
            dat_set_name: Some("LD0/LLN0.ds01".into()),
            dat_set_members: vec!["x".into()],
            subscribers: HashSet::from(["IED2".into()]),
        }
    }

    fn encode_decode(
        cb: &ControlBlock,
        state: &GseState,
        all_data: &[u8],
        entries: u8,
    ) -> (GoosePdu, GseState) {
        let (bytes, new_state) = encode_goose_pdu(
            cb,
            state,
            GooseEncodeInput {
                all_data,
                num_dat_set_entries: entries,
                timestamp: [0; 8],
            },
        );
        let parsed = parse_goose_pdu(&bytes).unwrap();
        (parsed, new_state)
    }

    #[test]
    fn time_allowed_to_live_schedule_matches_spec_table() {
        let expected = [
            (0, 20),
            (5, 20),
            (6, 32),
            (7, 64),
            (8, 128),
            (9, 256),
            (10, 512),
            (11, 1024),
            (12, 2048),
            (13, 4000),
            (100, 4000),
        ];
        for (n, v) in expected {
            assert_eq!(time_allowed_to_live_for_sq_num(n), v);
        }
    }

    #[test]
    fn scenario_a_fresh_change_resets_sq_num_and_bumps_st_num() {
        let cb = sample_cb();
        let state = GseState::default();
        let payload1 = [0x83, 0x01, 0x01];
        let (_pdu1, state1) = encode_decode(&cb, &state, &payload1, 1);

        let payload2 = [0x83, 0x01, 0x00];
        let (pdu2, _state2) = encode_decode(&cb, &state1, &payload2, 1);

        assert_eq!(pdu2.st_num, 1);
        assert_eq!(pdu2.sq_num, 0);
        assert_eq!(pdu2.time_allowed_to_live, 20);
    }

    #[test]
    fn scenario_b_retransmission_back_off_matches_schedule() {
        let cb = sample_cb();
        let mut state = GseState {
            st_num: 5,
            sq_num: 0,
            last_all_data: vec![0xAA],
            num_dat_set_entries: 1,
        };
        let mut observed = Vec::new();
        for _ in 0..14 {
            let (pdu, new_state) = encode_decode(&cb, &state, &[0xAA], 1);
            observed.push(pdu.time_allowed_to_live);
            state = new_state;
        }
        assert_eq!(
            observed,
            vec![20, 20, 20, 20, 20, 20, 32, 64, 128, 256, 512, 1024, 2048, 4000]
        );
    }

    #[test]
    fn scenario_d_state_bumped_without_change_is_rejected() {
        let cb = sample_cb();
        let mut state = GseState::default();
        let (bytes1, s1) = encode_goose_pdu(
            &cb,
            &state,
            GooseEncodeInput {
                all_data: &[0x01],
                num_dat_set_entries: 1,
                timestamp: [0; 8],
            },
        );
        let pdu1 = parse_goose_pdu(&bytes1).unwrap();
        validate_and_update(&cb, &mut state, &pdu1).unwrap();
        assert_eq!(state, s1);

        // Second frame: same data, but stNum manually bumped without change.
        let mut forged = pdu1.clone();
        forged.st_num = state.st_num + 1;
        forged.sq_num = 0;
        assert_eq!(
            validate_and_update(&cb, &mut state, &forged),
            Err(DecodeError::malformed("stNum bumped with unchanged allData"))
        );
    }

    #[test]
    fn duplicate_sq_num_is_rejected() {
        let cb = sample_cb();
        let mut state = GseState {
            st_num: 3,
            sq_num: 5,
            last_all_data: vec![0x01],
            num_dat_set_entries: 1,
        };
        let (bytes, _) = encode_goose_pdu(
            &cb,
            &state,
            GooseEncodeInput {
                all_data: &[0x01],
                num_dat_set_entries: 1,
                timestamp: [0; 8],
            },
        );
        let mut pdu = parse_goose_pdu(&bytes).unwrap();
        pdu.sq_num = 5; // same as before, not advanced
        assert_eq!(validate_and_update(&cb, &mut state, &pdu), Err(DecodeError::Duplicate));
    }

    #[test]
    fn mismatched_gocb_ref_is_rejected() {
        let cb = sample_cb();
        let mut state = GseState::default();
        let (bytes, _) = encode_goose_pdu(
            &cb,
            &state,
            GooseEncodeInput {
                all_data: &[0x01],
                num_dat_set_entries: 1,
                timestamp: [0; 8],
            },
        );
        let mut pdu = parse_goose_pdu(&bytes).unwrap();
        pdu.gocb_ref = "other".into();
        assert_eq!(
            validate_and_update(&cb, &mut state, &pdu),
            Err(DecodeError::mismatch("gocbRef"))
        );
    }
}
