use std::fmt::Write;

use super::filters::shell_quote;
use super::python_module;
use crate::context::RenderContext;
use crate::manifest::EnvSpec;

const READ_OPTION_FN: &str = r#"read_option() {
  local key="$1" fallback="$2" value=""
  if [ -f "$OPTIONS_FILE" ]; then
    value="$(jq -r --arg k "$key" '.[$k] // empty' "$OPTIONS_FILE")"
  fi
  if [ -n "$value" ]; then
    printf '%s' "$value"
  else
    printf '%s' "$fallback"
  fi
}
"#;

pub(super) fn render(ctx: &RenderContext) -> String {
    let mut out = String::from("#!/usr/bin/env bash\nset -euo pipefail\n\n");
    let _ = writeln!(
        out,
        "OPTIONS_FILE={}\n",
        shell_quote(ctx.container_paths.ha_options)
    );
    out.push_str(READ_OPTION_FN);
    out.push('\n');

    for spec in &ctx.run_env {
        match spec {
            EnvSpec::Static { name, value } => {
                let _ = writeln!(out, "export {name}={}", shell_quote(value));
            }
            EnvSpec::FromOption {
                name,
                option,
                default,
                optional: false,
            } => {
                let _ = writeln!(
                    out,
                    "export {name}=\"$(read_option {} {})\"",
                    shell_quote(option),
                    shell_quote(default)
                );
            }
            EnvSpec::FromOption {
                name,
                option,
                default,
                optional: true,
            } => {
                let _ = writeln!(
                    out,
                    "value=\"$(read_option {} {})\"\nif [ -n \"$value\" ]; then export {name}=\"$value\"; fi",
                    shell_quote(option),
                    shell_quote(default)
                );
            }
        }
    }
    if !ctx.run_env.is_empty() {
        out.push('\n');
    }

    let _ = writeln!(out, "cd {}", shell_quote(&ctx.container_workdir));
    if ctx.python {
        let _ = writeln!(
            out,
            "exec {}/bin/python -m {}",
            ctx.container_paths.venv,
            shell_quote(&python_module(ctx))
        );
    } else {
        out.push_str("exec npm start\n");
    }
    out
}
