//! Receiver: loads a SED, keeps the Control Blocks subscribed to by the
//! named IED, joins every one of their multicast groups, and validates
//! incoming datagrams (spec §6).

use std::collections::HashMap;
use std::net::Ipv4Addr;

use clap::Parser;
use tracing::{debug, error, info, trace, warn};

use rgoose::control_block::{ControlBlock, ControlBlockKind, SessionState};
use rgoose::error::DecodeError;
use rgoose::goose::parse_goose_pdu;
use rgoose::sed::load_sed;
use rgoose::session::{decode_session_pdu, spdu_num_is_fresh};
use rgoose::sv::parse_sv_pdu;
use rgoose::transport::MulticastReceiver;

#[derive(Parser)]
#[command(name = "rgoose-recv")]
struct Args {
    sed_file: String,
    interface: String,
    ied_name: String,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let control_blocks = match load_sed(&args.sed_file) {
        Ok(cbs) => cbs,
        Err(e) => {
            error!(error = %e, "failed to load SED");
            std::process::exit(1);
        }
    };

    let subscribed: Vec<ControlBlock> = control_blocks
        .into_iter()
        .filter(|cb| cb.is_subscriber(&args.ied_name))
        .collect();
    if subscribed.is_empty() {
        error!(ied = %args.ied_name, "no subscriptions for this IED");
        std::process::exit(1);
    }

    let interface: Ipv4Addr = match args.interface.parse() {
        Ok(ip) => ip,
        Err(_) => {
            error!(interface = %args.interface, "interface must be an IPv4 address of the local adapter");
            std::process::exit(1);
        }
    };

    let groups: Vec<Ipv4Addr> = subscribed
        .iter()
        .filter_map(|cb| cb.multicast_ip.parse().ok())
        .collect();

    let receiver = match MulticastReceiver::new(interface, &groups) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "failed to set up multicast receiver");
            std::process::exit(1);
        }
    };
    let socket = match receiver.into_tokio() {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to hand socket to async runtime");
            std::process::exit(1);
        }
    };

    let by_appid: HashMap<u16, &ControlBlock> =
        subscribed.iter().map(|cb| (cb.app_id, cb)).collect();
    let mut states: HashMap<u16, SessionState> =
        subscribed.iter().map(|cb| (cb.app_id, cb.fresh_session_state())).collect();

    info!(count = subscribed.len(), "listening for subscribed control blocks");
    let mut buf = [0u8; 2048];
    loop {
        let (n, _src) = match socket.recv_from(&mut buf).await {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "recv failed");
                continue;
            }
        };
        let datagram = &buf[..n];

        let frame = match decode_session_pdu(datagram) {
            Ok(f) => f,
            Err(e) => {
                log_rejection(None, &e);
                continue;
            }
        };

        let Some(cb) = by_appid.get(&frame.appid) else {
            trace!(appid = frame.appid, "datagram for unsubscribed appID");
            continue;
        };
        let state = states.get_mut(&frame.appid).expect("state initialized above");

        if !spdu_num_is_fresh(state.spdu_num, frame.spdu_num) {
            log_rejection(Some(&cb.cb_name), &DecodeError::OutOfOrder);
            continue;
        }

        let accepted = match frame.kind {
            ControlBlockKind::Gse => parse_goose_pdu(frame.pdu).and_then(|pdu| {
                let gse_state = state.as_gse_mut().expect("GSE control block has GSE state");
                rgoose::goose::validate_and_update(cb, gse_state, &pdu)
            }),
            ControlBlockKind::Smv => parse_sv_pdu(frame.pdu).and_then(|asdu| {
                let smv_state = state.as_smv_mut().expect("SMV control block has SMV state");
                rgoose::sv::validate_and_update(cb, smv_state, &asdu)
            }),
        };

        match accepted {
            Ok(()) => {
                state.spdu_num = frame.spdu_num;
                debug!(cb = %cb.cb_name, "accepted datagram");
            }
            Err(e) => log_rejection(Some(&cb.cb_name), &e),
        }
    }
}

fn log_rejection(cb_name: Option<&str>, err: &DecodeError) {
    // OutOfOrder is intentionally not logged at default verbosity (spec §7:
    // "Drop silently (not logged)").
    let cb_name = cb_name.unwrap_or("?");
    match err {
        DecodeError::OutOfOrder => trace!(cb = cb_name, "dropped: out of order"),
        other => warn!(cb = cb_name, error = %other, "dropped datagram"),
    }
}
