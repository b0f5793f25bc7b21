//! Session-layer framer (C4, spec §4.4): builds and parses the outermost
//! application profile around a GOOSE or SV PDU.
//!
//! Fixed byte layout (offsets as in spec §4.4):
//!
//! ```text
//! 0      LI                0x01
//! 1      TI                0x40
//! 2      SI                0xA1 (GSE) / 0xA2 (SMV)
//! 3      common-header LI  buf[5] + 2
//! 4      PI                0x80
//! 5      inner LI          0x16
//! 6..9   SPDU length (BE)  bytes from offset 9 to last
//! 10..13 SPDU number (BE)
//! 14..15 version           0x00 0x01
//! 16..27 security info     zero-filled
//! 28..31 payload length (BE), includes itself
//! 32     payload type      0x81 (GSE) / 0x82 (SMV)
//! 33     simulation        0x00
//! 34..35 appID (BE)
//! 36..37 APDU length (BE)  size of the PDU that follows
//! 38..   PDU
//! sigIdx signature tag     0x85
//! sigIdx+1 signature length 0
//! ```

use crate::control_block::ControlBlockKind;
use crate::error::DecodeError;

const LI: u8 = 0x01;
const TI: u8 = 0x40;
const PI: u8 = 0x80;
const INNER_LI: u8 = 0x16;
const SI_GSE: u8 = 0xA1;
const SI_SMV: u8 = 0xA2;
const PAYLOAD_TYPE_GSE: u8 = 0x81;
const PAYLOAD_TYPE_SMV: u8 = 0x82;
const SIGNATURE_TAG: u8 = 0x85;

fn si_for(kind: ControlBlockKind) -> u8 {
    match kind {
        ControlBlockKind::Gse => SI_GSE,
        ControlBlockKind::Smv => SI_SMV,
    }
}

fn payload_type_for(kind: ControlBlockKind) -> u8 {
    match kind {
        ControlBlockKind::Gse => PAYLOAD_TYPE_GSE,
        ControlBlockKind::Smv => PAYLOAD_TYPE_SMV,
    }
}

fn kind_for_payload_type(byte: u8) -> Result<ControlBlockKind, DecodeError> {
    match byte {
        PAYLOAD_TYPE_GSE => Ok(ControlBlockKind::Gse),
        PAYLOAD_TYPE_SMV => Ok(ControlBlockKind::Smv),
        other => Err(DecodeError::malformed(format!(
            "unknown payload type byte {other:#04x}"
        ))),
    }
}

/// Result of a successful session-layer decode: the caller gets the AppID,
/// the wire kind, the raw PDU slice (ready for §4.5 decoding), and the SPDU
/// number carried by the frame.
pub struct SessionFrame<'a> {
    pub appid: u16,
    pub kind: ControlBlockKind,
    pub pdu: &'a [u8],
    pub spdu_num: u32,
}

/// Builds a full session-layer datagram wrapping `pdu`, with every length
/// field back-patched and the security/signature blocks zeroed.
pub fn encode_session_pdu(kind: ControlBlockKind, appid: u16, pdu: &[u8], spdu_num: u32) -> Vec<u8> {
    let apdu_length = pdu.len() as u16;
    // payload = type(1) + simulation(1) + appid(2) + apdu_length(2) + pdu
    let payload_length: u32 = (1 + 1 + 2 + 2 + pdu.len() + 4) as u32; // +4 for the length field itself
    let spdu_length_field_start = 9usize;

    let mut buf = Vec::with_capacity(40 + pdu.len());
    buf.push(LI);
    buf.push(TI);
    buf.push(si_for(kind));
    buf.push(0); // common-header LI placeholder, set below to buf[5]+2
    buf.push(PI);
    buf.push(INNER_LI);
    buf[3] = buf[5] + 2;

    buf.extend_from_slice(&[0u8; 4]); // SPDU length placeholder
    buf.extend_from_slice(&spdu_num.to_be_bytes());
    buf.extend_from_slice(&[0x00, 0x01]); // version
    buf.extend_from_slice(&[0u8; 12]); // security info, zeroed

    buf.extend_from_slice(&payload_length.to_be_bytes());
    buf.push(payload_type_for(kind));
    buf.push(0x00); // simulation
    buf.extend_from_slice(&appid.to_be_bytes());
    buf.extend_from_slice(&apdu_length.to_be_bytes());
    buf.extend_from_slice(pdu);

    buf.push(SIGNATURE_TAG);
    buf.push(0x00); // signature length

    let spdu_length = (buf.len() - spdu_length_field_start) as u32;
    buf[6..10].copy_from_slice(&spdu_length.to_be_bytes());

    buf
}

/// Parses a session-layer datagram, validating every structural invariant
/// from spec §4.4. Returns the enclosed PDU slice on success.
pub fn decode_session_pdu(buf: &[u8]) -> Result<SessionFrame<'_>, DecodeError> {
    if buf.len() < 40 {
        return Err(DecodeError::malformed("datagram shorter than minimum session frame"));
    }
    if buf[0] != LI {
        return Err(DecodeError::malformed(format!("bad LI {:#04x}", buf[0])));
    }
    if buf[1] != TI {
        return Err(DecodeError::malformed(format!("bad TI {:#04x}", buf[1])));
    }
    let kind = match buf[2] {
        SI_GSE => ControlBlockKind::Gse,
        SI_SMV => ControlBlockKind::Smv,
        other => return Err(DecodeError::malformed(format!("bad SI {other:#04x}"))),
    };
    if buf[4] != PI {
        return Err(DecodeError::malformed(format!("bad PI {:#04x}", buf[4])));
    }
    if buf[5] != INNER_LI {
        return Err(DecodeError::malformed(format!("bad inner LI {:#04x}", buf[5])));
    }
    if buf[3] != buf[5] + 2 {
        return Err(DecodeError::malformed("common-header LI does not equal inner LI + 2"));
    }

    let spdu_length = u32::from_be_bytes([buf[6], buf[7], buf[8], buf[9]]) as usize;
    if spdu_length != buf.len() - 9 {
        return Err(DecodeError::malformed("SPDU length does not match datagram size"));
    }

    let spdu_num = u32::from_be_bytes([buf[10], buf[11], buf[12], buf[13]]);

    if buf[14..16] != [0x00, 0x01] {
        return Err(DecodeError::malformed("unsupported session version"));
    }

    let payload_length = u32::from_be_bytes([buf[28], buf[29], buf[30], buf[31]]) as usize;
    let sig_idx = 28usize
        .checked_add(payload_length)
        .ok_or_else(|| DecodeError::malformed("payload length overflow"))?;
    if sig_idx + 2 > buf.len() {
        return Err(DecodeError::malformed("payload length runs past datagram"));
    }

    let payload_type = buf[32];
    let decoded_kind = kind_for_payload_type(payload_type)?;
    if decoded_kind != kind {
        return Err(DecodeError::malformed("payload type does not match SI"));
    }

    let simulation = buf[33];
    if simulation != 0x00 {
        return Err(DecodeError::malformed("simulation bit set; not supported in this profile"));
    }

    let appid = u16::from_be_bytes([buf[34], buf[35]]);
    let apdu_length = u16::from_be_bytes([buf[36], buf[37]]) as usize;

    let pdu_start = 38usize;
    let pdu_end = pdu_start + apdu_length;
    if pdu_end != sig_idx {
        return Err(DecodeError::malformed("APDU length does not match payload boundary"));
    }
    if pdu_end > buf.len() {
        return Err(DecodeError::malformed("APDU length runs past datagram"));
    }

    if buf[sig_idx] != SIGNATURE_TAG {
        return Err(DecodeError::malformed("missing signature tag"));
    }
    let sig_len = buf[sig_idx + 1] as usize;
    if sig_idx + 2 + sig_len != buf.len() {
        return Err(DecodeError::malformed("signature length does not match datagram size"));
    }

    Ok(SessionFrame {
        appid,
        kind,
        pdu: &buf[pdu_start..pdu_end],
        spdu_num,
    })
}

/// Implements the spec §3/§4.5.1 SPDU-number monotonicity rule: accept if
/// strictly greater, or if `prev == u32::MAX` and `candidate == 0` (the one
/// permitted rollover).
pub fn spdu_num_is_fresh(prev: u32, candidate: u32) -> bool {
    if prev == u32::MAX {
        candidate == 0
    } else {
        candidate > prev
    }
}
