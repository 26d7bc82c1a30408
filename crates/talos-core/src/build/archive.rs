//! Deterministic `.tar.gz` creation.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use anyhow::Context;
use flate2::Compression;
use flate2::GzBuilder;
use tar::Builder as TarBuilder;
use walkdir::WalkDir;

/// Archive `src_dir` so that its contents sit under `root_name/`.
///
/// Members are sorted by path and carry zeroed mtime/uid/gid; the gzip
/// header has no timestamp. Any existing archive at `out_path` is replaced.
pub fn create_tar_gz(src_dir: &Path, root_name: &str, out_path: &Path) -> anyhow::Result<()> {
    let tmp_path = out_path.with_extension("gz.partial");
    let out = File::create(&tmp_path)
        .with_context(|| format!("Failed to create {}", tmp_path.display()))?;
    let encoder = GzBuilder::new().mtime(0).write(out, Compression::default());
    let mut builder = TarBuilder::new(encoder);

    let mut entries: Vec<PathBuf> = Vec::new();
    for ent in WalkDir::new(src_dir).follow_links(false) {
        let ent = ent.with_context(|| format!("Failed to walk {}", src_dir.display()))?;
        entries.push(ent.path().to_path_buf());
    }
    entries.sort_by(|a, b| {
        let ra = a.strip_prefix(src_dir).unwrap_or(a).to_string_lossy();
        let rb = b.strip_prefix(src_dir).unwrap_or(b).to_string_lossy();
        ra.cmp(&rb)
    });

    for p in entries {
        let rel = p.strip_prefix(src_dir).unwrap_or(&p).to_string_lossy();
        let name = if rel.is_empty() {
            root_name.to_string()
        } else {
            format!("{root_name}/{}", rel.replace('\\', "/"))
        };

        let md = fs::symlink_metadata(&p)
            .with_context(|| format!("Failed to stat {}", p.display()))?;
        let mut header = tar::Header::new_gnu();
        header.set_mtime(0);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mode(mode_of(&md));

        if md.is_dir() {
            header.set_entry_type(tar::EntryType::Directory);
            header.set_size(0);
            header.set_cksum();
            builder.append_data(&mut header, &name, std::io::empty())?;
        } else if md.is_file() {
            let mut f = File::open(&p).with_context(|| format!("Failed to open {}", p.display()))?;
            header.set_entry_type(tar::EntryType::Regular);
            header.set_size(md.len());
            header.set_cksum();
            builder.append_data(&mut header, &name, &mut f)?;
        } else {
            anyhow::bail!("Unsupported entry in artifact: {}", p.display());
        }
    }

    let encoder = builder
        .into_inner()
        .context("Failed to finalize tar builder")?;
    encoder.finish().context("Failed to finish gzip stream")?;

    fs::rename(&tmp_path, out_path)
        .with_context(|| format!("Failed to move archive into {}", out_path.display()))?;
    Ok(())
}

#[cfg(unix)]
fn mode_of(md: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    md.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(md: &fs::Metadata) -> u32 {
    if md.is_dir() { 0o755 } else { 0o644 }
}
