use std::fmt::Write;

use serde_yaml::Value;

use crate::context::RenderContext;
use crate::manifest::scalar_to_string;

pub(super) fn render_readme(ctx: &RenderContext) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", ctx.name);
    if !ctx.description.is_empty() {
        let _ = writeln!(out, "{}\n", ctx.description);
    }
    let _ = writeln!(out, "Version: `{}`\n", ctx.version);
    if let Some(url) = &ctx.url {
        let _ = writeln!(out, "Project: {url}\n");
    }
    let _ = writeln!(
        out,
        "Installed on the supervisor as `{}`. See DOCS.md for configuration.",
        ctx.addon_id()
    );
    out
}

pub(super) fn render_docs(ctx: &RenderContext) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# {}\n", ctx.name);
    if !ctx.description.is_empty() {
        let _ = writeln!(out, "{}\n", ctx.description);
    }

    for (key, body) in &ctx.docs {
        let title = match key {
            Value::String(s) => title_case(s),
            other => scalar_to_string(other),
        };
        let _ = writeln!(out, "## {title}\n");
        let _ = writeln!(out, "{}\n", scalar_to_string(body).trim_end());
    }

    out.push_str("## Configuration\n\n");
    if ctx.yaml.options == "{}" {
        out.push_str("This add-on has no options.\n");
    } else {
        let _ = writeln!(out, "```yaml\n{}\n```", ctx.yaml.options);
    }

    if !ctx.ports.is_empty() {
        out.push_str("\n## Network\n\n");
        for port in &ctx.ports {
            let _ = writeln!(out, "- `{port}/tcp`");
        }
    }
    out
}

pub(super) fn render_apparmor(ctx: &RenderContext) -> String {
    let mut out = String::from("#include <tunables/global>\n\n");
    let _ = writeln!(
        out,
        "profile {} flags=(attach_disconnected,mediate_deleted) {{",
        ctx.slug
    );
    out.push_str(concat!(
        "  #include <abstractions/base>\n\n",
        "  capability,\n",
        "  file,\n",
        "  network,\n",
        "  signal (send) set=(kill,term,int,hup,cont),\n\n",
        "  /init ix,\n",
        "  /bin/** ix,\n",
        "  /usr/bin/** ix,\n",
        "  /usr/local/bin/** ix,\n",
        "  /run.sh ix,\n",
    ));
    if ctx.python {
        let _ = writeln!(out, "  {}/** mrix,", ctx.container_paths.venv);
    }
    let _ = writeln!(out, "  {}/** rw,", ctx.container_workdir);
    let _ = writeln!(out, "  {}/** rw,", ctx.container_paths.ha_data);
    let _ = writeln!(out, "  {}/** rw,", ctx.container_paths.tmp_overlay);
    out.push_str("  /tmp/** rw,\n}\n");
    out
}

pub(super) fn render_translations(ctx: &RenderContext) -> String {
    if ctx.yaml.translations == "{}" {
        "configuration: {}\n".to_string()
    } else {
        format!("{}\n", ctx.yaml.translations)
    }
}

fn title_case(key: &str) -> String {
    key.split(['_', '-'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::title_case;

    #[test]
    fn title_case_splits_separators() {
        assert_eq!(title_case("getting_started"), "Getting Started");
        assert_eq!(title_case("api-usage"), "Api Usage");
    }
}
