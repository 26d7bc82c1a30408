//! The install/rebuild/start script executed on the supervisor host.

use std::fmt::Write;

use serde_json::json;

use crate::context::{DEPLOY_PATHS, RenderContext};
use crate::render::filters::shell_quote;

/// Inputs the remote script depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptParams {
    pub slug: String,
    pub ingress: bool,
    pub primary_port: Option<u16>,
    pub host_network: bool,
}

impl ScriptParams {
    pub fn from_context(ctx: &RenderContext) -> Self {
        Self {
            slug: ctx.slug.clone(),
            ingress: ctx.ingress,
            primary_port: ctx.primary_port,
            host_network: ctx.host_network,
        }
    }

    pub fn addon_id(&self) -> String {
        format!("local_{}", self.slug)
    }

    pub fn remote_tarball(&self) -> String {
        remote_tarball_path(&self.slug)
    }

    /// Options posted to the supervisor after install.
    ///
    /// `network` only appears when there is a port to map and the add-on
    /// is not on the host network.
    pub fn options_document(&self) -> serde_json::Value {
        let mut doc = json!({
            "watchdog": true,
            "ingress_panel": self.ingress,
        });
        if let Some(port) = self.primary_port.filter(|_| !self.host_network) {
            let mut network = serde_json::Map::new();
            network.insert(format!("{port}/tcp"), json!(port));
            doc["network"] = serde_json::Value::Object(network);
        }
        doc
    }
}

/// `/root/<slug>.tar.gz`
pub fn remote_tarball_path(slug: &str) -> String {
    format!("{}/{slug}.tar.gz", DEPLOY_PATHS.remote_home)
}

/// Render the remote script. Pure: identical params give identical text.
pub fn remote_script(params: &ScriptParams) -> String {
    let mut s = String::new();
    s.push_str("#!/usr/bin/env bash\nset -euo pipefail\n\n");
    let _ = writeln!(s, "SLUG={}", shell_quote(&params.slug));
    let _ = writeln!(s, "ADDON_ID={}", shell_quote(&params.addon_id()));
    let _ = writeln!(s, "TARBALL={}", shell_quote(&params.remote_tarball()));
    let _ = writeln!(s, "ADDONS_DIR={}", shell_quote(DEPLOY_PATHS.remote_addons));
    let _ = writeln!(
        s,
        "OPTIONS_JSON={}",
        shell_quote(&params.options_document().to_string())
    );

    s.push_str(
        r#"
addon_info() {
  ha addons info "$ADDON_ID" --raw-json 2>/dev/null || true
}

addon_state() {
  addon_info | jq -r '.data.state // "unknown"' 2>/dev/null || echo unknown
}

INSTALLED=0
if addon_info | jq -e '.result == "ok"' >/dev/null 2>&1; then
  INSTALLED=1
fi

if [ "$INSTALLED" -eq 1 ] && [ "$(addon_state)" = "started" ]; then
  echo "Stopping $ADDON_ID"
  ha addons stop "$ADDON_ID"
else
  echo "$ADDON_ID is not running, skipping stop"
fi

echo "Replacing $ADDONS_DIR/$SLUG"
rm -rf "${ADDONS_DIR:?}/$SLUG"
mkdir -p "$ADDONS_DIR"
tar -xzf "$TARBALL" -C "$ADDONS_DIR"
rm -f "$TARBALL"

ha addons reload
sleep 2

if [ "$INSTALLED" -eq 1 ]; then
  if ! ha addons rebuild "$ADDON_ID"; then
    echo "Rebuild failed, installing $ADDON_ID"
    ha addons install "$ADDON_ID"
  fi
else
  ha addons install "$ADDON_ID"
fi

if [ -n "${SUPERVISOR_TOKEN:-}" ]; then
  echo "Applying options to $ADDON_ID"
  curl -fsS -X POST \
    -H "Authorization: Bearer $SUPERVISOR_TOKEN" \
    -H "Content-Type: application/json" \
    -d "$OPTIONS_JSON" \
    "http://supervisor/addons/$ADDON_ID/options" >/dev/null \
    || echo "Warning: failed to apply options to $ADDON_ID" >&2
fi

ha addons start "$ADDON_ID"
sleep 3

STATE="$(addon_state)"
if [ "$STATE" != "started" ]; then
  echo "$ADDON_ID is $STATE after start" >&2
  exit 1
fi
echo "$ADDON_ID started"
"#,
    );
    s
}
