//! Sender: loads a SED, ticks every Control Block owned by the named IED
//! once per second, and publishes it to its multicast group (spec §6).

use std::collections::HashMap;
use std::net::Ipv4Addr;

use clap::Parser;
use tracing::{error, info};

use rgoose::control_block::{ControlBlock, ControlBlockKind, SessionState};
use rgoose::datasource::{GooseDataSource, GooseFileSource, SvDataSource, SvFileSource};
use rgoose::goose::{encode_goose_pdu, GooseEncodeInput};
use rgoose::sed::load_sed;
use rgoose::session::encode_session_pdu;
use rgoose::sv::encode_sv_pdu;
use rgoose::timestamp::encode_utc_time_now;
use rgoose::transport::MulticastSender;

#[derive(Parser)]
#[command(name = "rgoose-send")]
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

    let owned: Vec<ControlBlock> = control_blocks
        .into_iter()
        .filter(|cb| cb.host_ied == args.ied_name)
        .collect();
    if owned.is_empty() {
        error!(ied = %args.ied_name, "no control blocks owned by this IED");
        std::process::exit(1);
    }

    let interface: Ipv4Addr = match args.interface.parse() {
        Ok(ip) => ip,
        Err(_) => {
            error!(interface = %args.interface, "interface must be an IPv4 address of the local adapter");
            std::process::exit(1);
        }
    };

    let sender = MulticastSender::new(interface);
    let mut states: HashMap<String, SessionState> =
        owned.iter().map(|cb| (cb.cb_name.clone(), cb.fresh_session_state())).collect();
    let mut goose_source = GooseFileSource::load("GOOSEdata.txt").ok();
    let mut sv_source = SvFileSource::load("SVdata.txt").ok();

    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(1));
    let mut cycle: u64 = 0;
    loop {
        ticker.tick().await;
        for cb in &owned {
            let state = states.get_mut(&cb.cb_name).expect("state initialized above");
            let group: Ipv4Addr = match cb.multicast_ip.parse() {
                Ok(ip) => ip,
                Err(_) => {
                    error!(group = %cb.multicast_ip, "invalid multicast address");
                    continue;
                }
            };

            let datagram = match cb.kind {
                ControlBlockKind::Gse => {
                    let gse_state = state.as_gse_mut().expect("GSE control block has GSE state");
                    let closed = goose_source
                        .as_mut()
                        .map(|s| s.next_value(cycle))
                        .unwrap_or(false);
                    let all_data = [0x83, 0x01, if closed { 0x01 } else { 0x00 }];
                    let (pdu, new_state) = encode_goose_pdu(
                        cb,
                        gse_state,
                        GooseEncodeInput {
                            all_data: &all_data,
                            num_dat_set_entries: 1,
                            timestamp: encode_utc_time_now(),
                        },
                    );
                    *gse_state = new_state;
                    state.spdu_num = state.spdu_num.wrapping_add(1);
                    encode_session_pdu(ControlBlockKind::Gse, cb.app_id, &pdu, state.spdu_num)
                }
                ControlBlockKind::Smv => {
                    let smv_state = state.as_smv_mut().expect("SMV control block has SMV state");
                    let samples = sv_source
                        .as_mut()
                        .map(|s| s.next_samples(cycle))
                        .unwrap_or([0.0; 16]);
                    smv_state.smp_cnt = rgoose::sv::next_smp_cnt(smv_state.smp_cnt);
                    let pdu = encode_sv_pdu(cb, smv_state.smp_cnt, &samples, encode_utc_time_now());
                    state.spdu_num = state.spdu_num.wrapping_add(1);
                    encode_session_pdu(ControlBlockKind::Smv, cb.app_id, &pdu, state.spdu_num)
                }
            };

            if let Err(e) = sender.send(group, &datagram) {
                error!(cb = %cb.cb_name, error = %e, "send failed");
            } else {
                info!(cb = %cb.cb_name, bytes = datagram.len(), "sent");
            }
        }
        cycle = cycle.wrapping_add(1);
    }
}
