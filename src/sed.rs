//! Substation Exchange Description (SED/SCL) loader (C3, spec §4.3).
//!
//! Two passes over the document, both read-only over the tree:
//! 1. Walk `Communication/SubNetwork/ConnectedAP/{GSE,SMV}` and record one
//!    partially-qualified control block per element.
//! 2. For each unique `(hostIED, ldInst)`, walk the matching
//!    `IED/AccessPoint/.../LDevice/LN0` once, qualify every control block it
//!    owns, and record its dataset members and subscribers.
//!
//! The source loader resolved qualification by mutating a working copy of
//! the `(IED, LDevice)` map and popping matched entries while iterating it.
//! This reimplementation instead builds an index once and writes each
//! control block's qualified fields exactly once, producing an immutable
//! result list with no mutate-while-iterate step.

use std::collections::{HashMap, HashSet};

use roxmltree::Node;

use crate::control_block::{ControlBlock, ControlBlockKind};
use crate::error::ConfigError;

struct PartialControlBlock {
    host_ied: String,
    kind: ControlBlockKind,
    multicast_ip: String,
    app_id: u16,
    vlan_id: Option<u16>,
    ld_inst: String,
    raw_cb_name: String,
    cb_name: String,
    dat_set_name: Option<String>,
    dat_set_members: Vec<String>,
    subscribers: HashSet<String>,
    qualified: bool,
}

fn required_attr<'a>(node: Node<'a, 'a>, attr: &str) -> Result<&'a str, ConfigError> {
    node.attribute(attr).ok_or_else(|| ConfigError::MissingAttribute {
        element: node.tag_name().name().to_string(),
        attr: attr.to_string(),
    })
}

fn children_named<'a, 'input>(
    node: Node<'a, 'input>,
    name: &'a str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children().filter(move |n| n.has_tag_name(name))
}

/// Parses a SED XML file into the ordered list of Control Blocks it
/// describes. Any structural problem is `ConfigFatal` (spec §7).
pub fn load_sed(path: &str) -> Result<Vec<ControlBlock>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_string(),
        source,
    })?;
    let doc = roxmltree::Document::parse(&text)?;
    let root = doc.root_element();
    if root.tag_name().name() != "SCL" {
        return Err(ConfigError::NotScl(root.tag_name().name().to_string()));
    }

    let mut partials = collect_connected_ap_entries(root)?;
    qualify_control_blocks(root, &mut partials)?;

    let mut result = Vec::with_capacity(partials.len());
    for p in partials {
        if !p.qualified {
            return Err(ConfigError::UnqualifiedControlBlock { host_ied: p.host_ied });
        }
        result.push(ControlBlock {
            host_ied: p.host_ied,
            kind: p.kind,
            multicast_ip: p.multicast_ip,
            app_id: p.app_id,
            vlan_id: p.vlan_id,
            cb_name: p.cb_name,
            dat_set_name: p.dat_set_name,
            dat_set_members: p.dat_set_members,
            subscribers: p.subscribers,
        });
    }
    Ok(result)
}

fn collect_connected_ap_entries(root: Node) -> Result<Vec<PartialControlBlock>, ConfigError> {
    let mut partials = Vec::new();

    let Some(communication) = children_named(root, "Communication").next() else {
        return Ok(partials);
    };
    for sub_network in children_named(communication, "SubNetwork") {
        for connected_ap in children_named(sub_network, "ConnectedAP") {
            let ied_name = required_attr(connected_ap, "iedName")?.to_string();
            for gse_or_smv in connected_ap
                .children()
                .filter(|n| n.has_tag_name("GSE") || n.has_tag_name("SMV"))
            {
                let kind = if gse_or_smv.has_tag_name("GSE") {
                    ControlBlockKind::Gse
                } else {
                    ControlBlockKind::Smv
                };
                let ld_inst = required_attr(gse_or_smv, "ldInst")?.to_string();
                let raw_cb_name = required_attr(gse_or_smv, "cbName")?.to_string();

                let mut multicast_ip = None;
                let mut app_id = None;
                let mut vlan_id = None;
                if let Some(address) = children_named(gse_or_smv, "Address").next() {
                    for p in children_named(address, "P") {
                        let text = p.text().unwrap_or("").trim();
                        match p.attribute("type") {
                            Some("IP") => multicast_ip = Some(text.to_string()),
                            Some("APPID") => {
                                app_id = u16::from_str_radix(text.trim_start_matches("0x"), 16).ok()
                            }
                            Some("VLAN-ID") => vlan_id = text.parse().ok(),
                            _ => {}
                        }
                    }
                }
                let multicast_ip = multicast_ip.ok_or_else(|| ConfigError::MissingAttribute {
                    element: "Address/P[@type=IP]".to_string(),
                    attr: "text".to_string(),
                })?;
                let app_id = app_id.ok_or_else(|| ConfigError::MissingAttribute {
                    element: "Address/P[@type=APPID]".to_string(),
                    attr: "text".to_string(),
                })?;

                partials.push(PartialControlBlock {
                    host_ied: ied_name.clone(),
                    kind,
                    multicast_ip,
                    app_id,
                    vlan_id,
                    ld_inst,
                    raw_cb_name,
                    cb_name: String::new(),
                    dat_set_name: None,
                    dat_set_members: Vec::new(),
                    subscribers: HashSet::new(),
                    qualified: false,
                });
            }
        }
    }
    Ok(partials)
}

fn find_ied<'a>(root: Node<'a, 'a>, ied_name: &str) -> Option<Node<'a, 'a>> {
    children_named(root, "IED").find(|n| n.attribute("name") == Some(ied_name))
}

fn find_ldevice<'a>(ied: Node<'a, 'a>, ld_inst: &str) -> Option<Node<'a, 'a>> {
    ied.descendants()
        .find(|n| n.has_tag_name("LDevice") && n.attribute("inst") == Some(ld_inst))
}

fn qualify_control_blocks(
    root: Node,
    partials: &mut [PartialControlBlock],
) -> Result<(), ConfigError> {
    let mut by_key: HashMap<(String, String), Vec<usize>> = HashMap::new();
    for (i, p) in partials.iter().enumerate() {
        by_key
            .entry((p.host_ied.clone(), p.ld_inst.clone()))
            .or_default()
            .push(i);
    }

    for ((ied_name, ld_inst), idxs) in &by_key {
        let Some(ied) = find_ied(root, ied_name) else {
            continue;
        };
        let Some(ldevice) = find_ldevice(ied, ld_inst) else {
            continue;
        };
        let Some(ln0) = ldevice.descendants().find(|n| n.has_tag_name("LN0")) else {
            continue;
        };
        let ln_class = ln0.attribute("lnClass").unwrap_or("LLN0");
        let prefix = format!("{ld_inst}/{ln_class}.");

        for ctrl in ln0
            .children()
            .filter(|n| n.has_tag_name("GSEControl") || n.has_tag_name("SampledValueControl"))
        {
            let name = required_attr(ctrl, "Name")?;
            let dat_set = required_attr(ctrl, "datSet")?;

            let Some(&idx) = idxs.iter().find(|&&idx| partials[idx].raw_cb_name == name) else {
                continue;
            };

            let dataset = children_named(ln0, "DataSet")
                .find(|n| n.attribute("name") == Some(dat_set))
                .ok_or_else(|| ConfigError::MismatchedDataSet {
                    cb_name: name.to_string(),
                    dat_set: dat_set.to_string(),
                })?;

            let mut members = Vec::new();
            for fcda in children_named(dataset, "FCDA") {
                let ln_class = required_attr(fcda, "lnClass")?;
                let do_name = required_attr(fcda, "doName")?;
                let da_name = required_attr(fcda, "daName")?;
                members.push(format!("{ied_name}.{ln_class}.{do_name}.{da_name}"));
            }
            if members.is_empty() {
                return Err(ConfigError::MismatchedDataSet {
                    cb_name: name.to_string(),
                    dat_set: dat_set.to_string(),
                });
            }

            let mut subscribers = HashSet::new();
            for iedname in children_named(ctrl, "IEDName") {
                if let Some(text) = iedname.text() {
                    subscribers.insert(text.trim().to_string());
                }
            }

            let p = &mut partials[idx];
            p.cb_name = format!("{prefix}{}", p.raw_cb_name);
            p.dat_set_name = Some(format!("{prefix}{dat_set}"));
            p.dat_set_members = members;
            p.subscribers = subscribers;
            p.qualified = true;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const FIXTURE: &str = r#"<?xml version="1.0"?>
<SCL>
  <Communication>
    <SubNetwork name="StationBus">
      <ConnectedAP iedName="IED1" apName="P1">
        <GSE ldInst="LD0" cbName="gcb01">
          <Address>
            <P type="IP">224.0.0.10</P>
            <P type="APPID">0x1001</P>
            <P type="VLAN-ID">0</P>
          </Address>
        </GSE>
      </ConnectedAP>
    </SubNetwork>
  </Communication>
  <IED name="IED1">
    <AccessPoint name="P1">
      <LDevice inst="LD0">
        <LN0 lnClass="LLN0">
          <DataSet name="ds01">
            <FCDA ldInst="LD0" lnClass="LLN0" doName="Pos" daName="stVal"/>
            <FCDA ldInst="LD0" lnClass="LLN0" doName="Pos" daName="q"/>
            <FCDA ldInst="LD0" lnClass="LLN0" doName="Pos" daName="t"/>
          </DataSet>
          <GSEControl name="gcb01" datSet="ds01">
            <IEDName>IED2</IEDName>
            <IEDName>IED3</IEDName>
          </GSEControl>
        </LN0>
      </LDevice>
    </AccessPoint>
  </IED>
</SCL>
"#;

    fn write_fixture() -> String {
        let mut path = std::env::temp_dir();
        path.push(format!("rgoose_sed_test_{:?}.xml", std::thread::current().id()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(FIXTURE.as_bytes()).unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn scenario_f_sed_round_trip_yields_qualified_cb() {
        let path = write_fixture();
        let cbs = load_sed(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(cbs.len(), 1);
        let cb = &cbs[0];
        assert_eq!(cb.cb_name, "LD0/LLN0.gcb01");
        assert_eq!(cb.dat_set_name.as_deref(), Some("LD0/LLN0.ds01"));
        assert_eq!(cb.dat_set_members.len(), 3);
        assert_eq!(cb.subscribers.len(), 2);
        assert!(cb.is_subscriber("IED2"));
        assert!(cb.is_subscriber("IED3"));
        assert_eq!(cb.multicast_ip, "224.0.0.10");
        assert_eq!(cb.app_id, 0x1001);
    }

    #[test]
    fn rejects_non_scl_root() {
        let mut path = std::env::temp_dir();
        path.push("rgoose_sed_bad_root.xml");
        std::fs::write(&path, "<NotSCL/>").unwrap();
        let result = load_sed(path.to_str().unwrap());
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(ConfigError::NotScl(_))));
    }
}
