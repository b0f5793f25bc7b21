//! Routable GOOSE / Routable Sampled Values (IEC 61850-90-5) endpoint over
//! UDP multicast.
//!
//! Core wire codec and state machine: [`tlv`], [`float32`], [`sed`],
//! [`session`], [`goose`], [`sv`], [`timestamp`], [`control_block`].
//! Ambient boundary adapters: [`transport`], [`datasource`], [`error`].

pub mod control_block;
pub mod datasource;
pub mod error;
pub mod float32;
pub mod goose;
pub mod sed;
pub mod session;
pub mod sv;
pub mod timestamp;
pub mod tlv;
pub mod transport;
