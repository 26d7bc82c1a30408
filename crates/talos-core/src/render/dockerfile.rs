use std::fmt::Write;

use super::filters::shell_quote;
use crate::context::RenderContext;

pub(super) fn render(ctx: &RenderContext) -> String {
    let mut out = String::new();
    let workdir = &ctx.container_workdir;
    let needs_git = ctx.git_clone.is_some();

    if ctx.python {
        let _ = writeln!(out, "FROM python:{}-slim\n", ctx.runtime.python_version);
        let mut packages = vec!["bash", "jq"];
        if needs_git {
            packages.push("git");
        }
        let _ = writeln!(
            out,
            "RUN apt-get update \\\n    && apt-get install -y --no-install-recommends {} \\\n    && rm -rf /var/lib/apt/lists/*\n",
            packages.join(" ")
        );
        let venv = ctx.container_paths.venv;
        let _ = writeln!(
            out,
            "ENV VIRTUAL_ENV={venv} \\\n    PATH=\"{venv}/bin:$PATH\" \\\n    PYTHONUNBUFFERED=1"
        );
        let _ = writeln!(out, "RUN python -m venv {venv}\n");
    } else {
        let _ = writeln!(out, "FROM node:{}-alpine\n", ctx.runtime.node_version);
        let mut packages = vec!["bash", "jq"];
        if needs_git {
            packages.push("git");
        }
        let _ = writeln!(out, "RUN apk add --no-cache {}\n", packages.join(" "));
        out.push_str("ENV NODE_ENV=production\n");
    }

    let _ = writeln!(
        out,
        "LABEL io.hass.name={} io.hass.version={} io.hass.type=\"addon\"\n",
        shell_quote(&ctx.name),
        shell_quote(&ctx.version)
    );
    let _ = writeln!(out, "WORKDIR {workdir}\n");

    if let Some(clone) = &ctx.git_clone {
        let dest = clone
            .dest()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{workdir}/upstream"));
        let branch = clone
            .reference()
            .map(|r| format!(" --branch {}", shell_quote(r)))
            .unwrap_or_default();
        let _ = writeln!(
            out,
            "RUN git clone --depth 1{branch} {} {}\n",
            shell_quote(clone.url()),
            shell_quote(&dest)
        );
    }

    let _ = writeln!(out, "COPY app/ {workdir}/");
    if ctx.python {
        out.push_str(
            "RUN if [ -f pyproject.toml ]; then pip install --no-cache-dir .; \\\n    elif [ -f requirements.txt ]; then pip install --no-cache-dir -r requirements.txt; fi\n\n",
        );
    } else if ctx.npm_build {
        out.push_str("RUN npm ci && npm run build && npm prune --omit=dev\n\n");
    } else {
        out.push_str("RUN if [ -f package.json ]; then npm ci --omit=dev; fi\n\n");
    }

    out.push_str("COPY run.sh /run.sh\nRUN chmod 0755 /run.sh\n\n");
    if let Some(port) = ctx.primary_port {
        let _ = writeln!(out, "EXPOSE {port}\n");
    }
    out.push_str("CMD [\"/run.sh\"]\n");
    out
}
