//! Text rendering of component trees, property listings and scan results.

use std::fmt::Write;

use crate::backend::{AttributeInfo, ScannedDevice};
use crate::gateway::PropertyListing;
use crate::resolve::TreeEntry;
use crate::value::Value;

/// One line per component, children indented with ` ↳` per level.
pub fn render_tree(entries: &[TreeEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        let indent = if entry.depth == 0 {
            String::new()
        } else {
            format!("{} ", " ↳".repeat(entry.depth))
        };
        let _ = writeln!(
            out,
            "{}{}\trole:{}",
            indent,
            entry.component.name(),
            entry.component.role()
        );
    }
    out
}

pub fn render_properties(listing: &PropertyListing) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Component '{}':", listing.name);
    let _ = writeln!(out, "\trole: {}", listing.role);
    let affects: Vec<String> = listing.affects.iter().map(|n| format!("'{}'", n)).collect();
    let _ = writeln!(out, "\taffects: {}", affects.join(", "));

    for (name, value) in &listing.ro_attributes {
        let _ = writeln!(out, "\t{} (RO Attribute)\t value: {}", name, value);
    }
    for attr in &listing.attributes {
        let _ = writeln!(
            out,
            "\t{} ({}Vigilant Attribute)\t value: {}{}",
            attr.name,
            if attr.info.readonly { "RO " } else { "" },
            attr.value,
            describe_info(&attr.info)
        );
    }
    for name in &listing.data_flows {
        let _ = writeln!(out, "\t{} (Data-flow)", name);
    }
    out
}

fn describe_info(info: &AttributeInfo) -> String {
    let mut out = String::new();
    if let Some(unit) = &info.unit {
        let _ = write!(out, " (unit: {})", unit);
    }
    if let Some((min, max)) = &info.range {
        let _ = write!(out, " (range: {} -> {})", min, max);
    }
    if let Some(choices) = &info.choices {
        let choices: Vec<String> = choices.iter().map(Value::to_string).collect();
        let _ = write!(out, " (choices: {})", choices.join(", "));
    }
    out
}

/// `driver: 'name' init={arg: value}` per device.
pub fn render_scan(devices: &[ScannedDevice]) -> String {
    let mut out = String::new();
    for device in devices {
        let init = Value::mapping(
            device
                .init
                .iter()
                .map(|(k, v)| (Value::String(k.clone()), v.clone())),
        );
        let _ = writeln!(out, "{}: '{}' init={}", device.driver, device.name, init);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::simulated::SimBackend;
    use crate::backend::Backend;
    use crate::gateway::AttributeEntry;
    use crate::resolve::walk_tree;

    #[tokio::test]
    async fn test_render_tree() {
        let backend = SimBackend::demo();
        let scope = backend.microscope().await.unwrap();
        let text = render_tree(&walk_tree(&scope).await.unwrap());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "SimScope\trole:optical");
        assert_eq!(lines[1], " ↳ Camera\trole:ccd");
        assert_eq!(lines[4], " ↳ ↳ Stage Controller\trole:controller");
    }

    #[test]
    fn test_render_properties() {
        let listing = PropertyListing {
            name: "Camera".into(),
            role: "ccd".into(),
            affects: vec!["Light".into()],
            ro_attributes: vec![("pixelSize".into(), Value::tuple([Value::Float(1e-5), Value::Float(1e-5)]))],
            attributes: vec![AttributeEntry {
                name: "exposureTime".into(),
                value: Value::Float(0.1),
                info: AttributeInfo {
                    readonly: false,
                    unit: Some("s".into()),
                    range: Some((Value::Float(0.001), Value::Float(10.0))),
                    choices: None,
                },
            }],
            data_flows: vec!["data".into()],
        };
        let text = render_properties(&listing);
        assert!(text.starts_with("Component 'Camera':\n\trole: ccd\n\taffects: 'Light'\n"));
        assert!(text.contains("\tpixelSize (RO Attribute)\t value: (1e-5, 1e-5)\n"));
        assert!(text.contains(
            "\texposureTime (Vigilant Attribute)\t value: 0.1 (unit: s) (range: 0.001 -> 10.0)\n"
        ));
        assert!(text.ends_with("\tdata (Data-flow)\n"));
    }

    #[test]
    fn test_render_scan() {
        let devices = vec![ScannedDevice {
            driver: "simcam.SimCam".into(),
            name: "Simulated Camera".into(),
            init: vec![("device".into(), Value::Int(0))],
        }];
        assert_eq!(
            render_scan(&devices),
            "simcam.SimCam: 'Simulated Camera' init={device: 0}\n"
        );
    }
}
