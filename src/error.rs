use thiserror::Error;

/// Per-datagram decode failures (spec §7). Never propagates into control
/// block state — a rejected datagram simply leaves the previous state in
/// place.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("malformed: {0}")]
    Malformed(String),

    #[error("out of order")]
    OutOfOrder,

    #[error("duplicate")]
    Duplicate,

    #[error("mismatch: {0}")]
    Mismatch(String),
}

impl DecodeError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        DecodeError::Malformed(msg.into())
    }

    pub fn mismatch(field: impl Into<String>) -> Self {
        DecodeError::Mismatch(field.into())
    }
}

/// Failures while loading a Substation Exchange Description. All variants
/// are `ConfigFatal` per spec §7 — the caller logs and exits.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read SED file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse SED XML: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("SED root element must be SCL, found {0}")]
    NotScl(String),

    #[error("missing required attribute `{attr}` on <{element}>")]
    MissingAttribute { element: String, attr: String },

    #[error("control block `{cb_name}` references dataset `{dat_set}` with no matching DataSet element")]
    MismatchedDataSet { cb_name: String, dat_set: String },

    #[error("control block for host IED `{host_ied}` was never qualified by a matching LN0 control element")]
    UnqualifiedControlBlock { host_ied: String },
}

/// Socket setup/operation failures. All variants are `TransportFatal` per
/// spec §7 at startup; per-send failures surfaced through this type at
/// runtime are logged and may terminate the owning loop.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to bind UDP socket to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to join multicast group {group} on interface {iface}: {source}")]
    JoinMulticast {
        group: String,
        iface: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to set socket option {opt}: {source}")]
    SetSockOpt {
        opt: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("send to {addr} failed: {source}")]
    Send {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("recv failed: {source}")]
    Recv {
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_display_carries_reason() {
        let e = DecodeError::malformed("short buffer");
        assert_eq!(e.to_string(), "malformed: short buffer");
    }

    #[test]
    fn mismatch_helper_wraps_field_name() {
        let e = DecodeError::mismatch("gocbRef");
        assert!(matches!(e, DecodeError::Mismatch(ref s) if s == "gocbRef"));
    }
}
