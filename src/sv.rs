//! Sampled Values (SV/SMV) PDU codec and per-CB state (C5, spec §4.5.2).

use crate::control_block::{ControlBlock, SmvState};
use crate::error::DecodeError;
use crate::float32::{decode_float32_be, encode_float32_be};
use crate::tlv::read_tlv_header;

const OUTER_TAG: [u8; 2] = [0x60, 0x80];

const TAG_NO_ASDU: u8 = 0x80;
const TAG_SEQ_OF_ASDU: u8 = 0xA2;
const TAG_ASDU: u8 = 0x30;
const TAG_SV_ID: u8 = 0x80;
const TAG_SMP_CNT: u8 = 0x82;
const TAG_CONF_REV: u8 = 0x83;
const TAG_SMP_SYNCH: u8 = 0x85;
const TAG_SAMPLE_DATA: u8 = 0x87;
const TAG_TIMESTAMP: u8 = 0x89;

/// Sample count wraps at this modulus (spec §3, §4.5.2).
pub const SMP_CNT_MODULUS: u16 = 4000;
const CONF_REV: u32 = 1;
const SMP_SYNCH: u8 = 0x02;

/// A fully decoded SV ASDU with its 16-scalar sample set.
#[derive(Debug, Clone, PartialEq)]
pub struct SvAsdu {
    pub sv_id: String,
    pub smp_cnt: u16,
    pub conf_rev: u32,
    pub smp_synch: u8,
    pub samples: [f32; 16],
    pub timestamp: [u8; 8],
}

fn push_tlv(buf: &mut Vec<u8>, tag: u8, value: &[u8]) {
    assert!(value.len() <= u8::MAX as usize, "single-byte BER length only");
    buf.push(tag);
    buf.push(value.len() as u8);
    buf.extend_from_slice(value);
}

/// Encodes one SV PDU (exactly one ASDU, per this profile's `noASDU = 1`).
pub fn encode_sv_pdu(cb: &ControlBlock, smp_cnt: u16, samples: &[f32; 16], timestamp: [u8; 8]) -> Vec<u8> {
    let mut sample_bytes = Vec::with_capacity(64);
    for s in samples {
        sample_bytes.extend_from_slice(&encode_float32_be(*s));
    }

    let mut asdu_fields = Vec::new();
    push_tlv(&mut asdu_fields, TAG_SV_ID, cb.cb_name.as_bytes());
    push_tlv(&mut asdu_fields, TAG_SMP_CNT, &smp_cnt.to_be_bytes());
    push_tlv(&mut asdu_fields, TAG_CONF_REV, &CONF_REV.to_be_bytes());
    push_tlv(&mut asdu_fields, TAG_SMP_SYNCH, &[SMP_SYNCH]);
    push_tlv(&mut asdu_fields, TAG_SAMPLE_DATA, &sample_bytes);
    push_tlv(&mut asdu_fields, TAG_TIMESTAMP, &timestamp);

    let mut asdu = Vec::with_capacity(asdu_fields.len() + 2);
    asdu.push(TAG_ASDU);
    asdu.push(asdu_fields.len() as u8);
    asdu.extend_from_slice(&asdu_fields);

    let mut seq_fields = Vec::new();
    push_tlv(&mut seq_fields, TAG_NO_ASDU, &[0x01]);

    let mut pdu_fields = Vec::new();
    pdu_fields.extend_from_slice(&seq_fields);
    pdu_fields.push(TAG_SEQ_OF_ASDU);
    pdu_fields.push(asdu.len() as u8);
    pdu_fields.extend_from_slice(&asdu);

    let mut pdu = Vec::with_capacity(pdu_fields.len() + 3);
    pdu.extend_from_slice(&OUTER_TAG);
    pdu.push(pdu_fields.len() as u8);
    pdu.extend_from_slice(&pdu_fields);
    pdu
}

/// Parses the fixed SV PDU/ASDU structure. Any field beyond the ones listed
/// in spec §4.5.2 is treated as `Malformed` — optional ASDU fields (`datSet`,
/// `refrTm`, `smpRate`, `smpMod`) are out of scope for this profile.
pub fn parse_sv_pdu(pdu: &[u8]) -> Result<SvAsdu, DecodeError> {
    if pdu.len() < 3 || pdu[0..2] != OUTER_TAG {
        return Err(DecodeError::malformed("missing SV outer tag 0x60 0x80"));
    }
    let declared_len = pdu[2] as usize;
    if declared_len != pdu.len() - 3 {
        return Err(DecodeError::malformed("SV outer length does not match PDU size"));
    }

    let mut pos = 3usize;
    let no_asdu_entry = read_tlv_header(pdu, pos)?;
    if no_asdu_entry.tag != TAG_NO_ASDU {
        return Err(DecodeError::malformed("expected noASDU tag 0x80"));
    }
    let no_asdu = no_asdu_entry.value(pdu)?;
    if no_asdu != [0x01] {
        return Err(DecodeError::malformed("noASDU must be exactly 1 in this profile"));
    }
    pos = no_asdu_entry.end();

    let seq_entry = read_tlv_header(pdu, pos)?;
    if seq_entry.tag != TAG_SEQ_OF_ASDU {
        return Err(DecodeError::malformed("expected Sequence-of-ASDU tag 0xA2"));
    }
    let seq_start = seq_entry.value_offset;
    let seq_end = seq_entry.end();
    if seq_end != pdu.len() {
        return Err(DecodeError::malformed("Sequence-of-ASDU does not span to end of PDU"));
    }

    let asdu_entry = read_tlv_header(pdu, seq_start)?;
    if asdu_entry.tag != TAG_ASDU {
        return Err(DecodeError::malformed("expected ASDU container tag 0x30"));
    }
    if asdu_entry.end() != seq_end {
        return Err(DecodeError::malformed("ASDU container does not fill Sequence-of-ASDU"));
    }

    let mut p = asdu_entry.value_offset;
    let end = asdu_entry.end();

    macro_rules! next_field {
        ($expected_tag:expr) => {{
            let entry = read_tlv_header(pdu, p)?;
            if entry.tag != $expected_tag {
                return Err(DecodeError::malformed(format!(
                    "expected ASDU tag {:#04x} at {p}, found {:#04x}",
                    $expected_tag, entry.tag
                )));
            }
            let value = entry.value(pdu)?.to_vec();
            p = entry.end();
            value
        }};
    }

    let sv_id_bytes = next_field!(TAG_SV_ID);
    let sv_id =
        String::from_utf8(sv_id_bytes).map_err(|_| DecodeError::malformed("svID is not ASCII/UTF-8"))?;

    let smp_cnt_bytes = next_field!(TAG_SMP_CNT);
    if smp_cnt_bytes.len() != 2 {
        return Err(DecodeError::malformed("smpCnt must be 2 bytes"));
    }
    let smp_cnt = u16::from_be_bytes([smp_cnt_bytes[0], smp_cnt_bytes[1]]);

    let conf_rev_bytes = next_field!(TAG_CONF_REV);
    if conf_rev_bytes.len() != 4 {
        return Err(DecodeError::malformed("confRev must be 4 bytes"));
    }
    let conf_rev = u32::from_be_bytes([
        conf_rev_bytes[0],
        conf_rev_bytes[1],
        conf_rev_bytes[2],
        conf_rev_bytes[3],
    ]);
    if conf_rev != CONF_REV {
        return Err(DecodeError::malformed("confRev must be 1 in this profile"));
    }

    let smp_synch_bytes = next_field!(TAG_SMP_SYNCH);
    if smp_synch_bytes != [SMP_SYNCH] {
        return Err(DecodeError::malformed("smpSynch must be 0x02 in this profile"));
    }
    let smp_synch = smp_synch_bytes[0];

    let sample_bytes = next_field!(TAG_SAMPLE_DATA);
    if sample_bytes.len() != 64 {
        return Err(DecodeError::malformed("sample data must be exactly 64 bytes"));
    }
    let mut samples = [0f32; 16];
    for (i, chunk) in sample_bytes.chunks_exact(4).enumerate() {
        samples[i] = decode_float32_be([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }

    let timestamp_bytes = next_field!(TAG_TIMESTAMP);
    if timestamp_bytes.len() != 8 {
        return Err(DecodeError::malformed("timestamp must be 8 bytes"));
    }
    let mut timestamp = [0u8; 8];
    timestamp.copy_from_slice(&timestamp_bytes);

    if p != end {
        return Err(DecodeError::malformed(
            "unexpected trailing ASDU fields; optional fields are out of scope for this profile",
        ));
    }

    Ok(SvAsdu {
        sv_id,
        smp_cnt,
        conf_rev,
        smp_synch,
        samples,
        timestamp,
    })
}

/// Encode-side `smpCnt` advance rule (spec §4.5.2): increments by one,
/// wrapping to 0 at the modulus.
pub fn next_smp_cnt(prev: u16) -> u16 {
    if prev == SMP_CNT_MODULUS - 1 {
        0
    } else {
        prev + 1
    }
}

/// Decode-side freshness check: accept if strictly greater, or if `prev`
/// was at the last value before the modulus (the one permitted wrap).
pub fn smp_cnt_is_fresh(prev: u16, candidate: u16) -> bool {
    if prev == SMP_CNT_MODULUS - 1 {
        true
    } else {
        candidate > prev
    }
}

/// Checks CB identity and `smpCnt` freshness, and updates `state` on success.
pub fn validate_and_update(
    cb: &ControlBlock,
    state: &mut SmvState,
    asdu: &SvAsdu,
) -> Result<(), DecodeError> {
    if asdu.sv_id != cb.cb_name {
        return Err(DecodeError::mismatch("svID"));
    }
    if !smp_cnt_is_fresh(state.smp_cnt, asdu.smp_cnt) {
        return Err(DecodeError::Duplicate);
    }
    state.smp_cnt = asdu.smp_cnt;
    state.last_seq_of_data = asdu
        .samples
        .iter()
        .flat_map(|s| encode_float32_be(*s))
        .collect();
    Ok(())
}
