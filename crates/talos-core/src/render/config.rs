use std::fmt::Write;

use super::filters::{indent, json_encode};
use crate::context::RenderContext;

const ARCHES: &[&str] = &["aarch64", "amd64", "armv7"];
const DEFAULT_INGRESS_PORT: u16 = 8099;

pub(super) fn render(ctx: &RenderContext) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "name: {}", json_encode(&ctx.name));
    let _ = writeln!(out, "version: {}", json_encode(&ctx.version));
    let _ = writeln!(out, "slug: {}", json_encode(&ctx.slug));
    let _ = writeln!(out, "description: {}", json_encode(&ctx.description));
    if let Some(url) = &ctx.url {
        let _ = writeln!(out, "url: {}", json_encode(url));
    }
    out.push_str("arch:\n");
    for arch in ARCHES {
        let _ = writeln!(out, "  - {arch}");
    }
    out.push_str("init: false\nstartup: application\nboot: auto\n");
    let _ = writeln!(
        out,
        "homeassistant: {}",
        json_encode(&ctx.homeassistant_min)
    );

    if ctx.ingress {
        out.push_str("ingress: true\n");
        let _ = writeln!(
            out,
            "ingress_port: {}",
            ctx.primary_port.unwrap_or(DEFAULT_INGRESS_PORT)
        );
        if let Some(entry) = &ctx.ingress_entry {
            let _ = writeln!(out, "ingress_entry: {}", json_encode(entry));
        }
    }
    if let Some(icon) = &ctx.panel_icon {
        let _ = writeln!(out, "panel_icon: {}", json_encode(icon));
    }
    if let Some(title) = &ctx.panel_title {
        let _ = writeln!(out, "panel_title: {}", json_encode(title));
    }

    for (flag, enabled) in [
        ("homeassistant_api", ctx.homeassistant_api),
        ("auth_api", ctx.auth_api),
        ("host_network", ctx.host_network),
        ("usb", ctx.usb),
        ("audio", ctx.audio),
        ("gpio", ctx.gpio),
    ] {
        if enabled {
            let _ = writeln!(out, "{flag}: true");
        }
    }

    yaml_field(&mut out, "map", &ctx.yaml.map);
    yaml_field(&mut out, "ports", &ctx.yaml.ports);
    yaml_field(&mut out, "ports_description", &ctx.yaml.ports_description);
    yaml_field(&mut out, "environment", &ctx.yaml.environment);
    yaml_field(&mut out, "options", &ctx.yaml.options);
    yaml_field(&mut out, "schema", &ctx.yaml.schema);
    out
}

fn yaml_field(out: &mut String, key: &str, blob: &str) {
    if blob == "{}" || blob == "[]" {
        let _ = writeln!(out, "{key}: {blob}");
    } else {
        let _ = writeln!(out, "{key}:\n{}", indent(blob, 2));
    }
}
