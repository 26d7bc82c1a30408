//! Declared-port inventory and cleanup.
//!
//! Reads `ports` straight from every `<dir>/addon.yaml` (no slug required)
//! and can terminate whatever is listening on them.

pub mod process;

use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;

use anyhow::Context;
use serde_yaml::Value;
use tracing::{debug, info};

use crate::manifest::{MANIFEST_FILE, ManifestError, parse_port_key};

pub use process::{KillOutcome, Signal, send_signal};

/// Ports one add-on directory declares, ascending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddonPorts {
    pub dir: String,
    pub ports: Vec<u16>,
}

/// Scan `<repo>/*/addon.yaml` for port numbers, sorted by directory.
pub fn collect_ports(repo_root: &Path) -> Result<Vec<AddonPorts>, ManifestError> {
    let entries = std::fs::read_dir(repo_root).map_err(|source| ManifestError::Read {
        path: repo_root.to_path_buf(),
        source,
    })?;
    let mut dirs: Vec<_> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.join(MANIFEST_FILE).is_file())
        .collect();
    dirs.sort();

    let mut out = Vec::new();
    for dir in dirs {
        let path = dir.join(MANIFEST_FILE);
        let raw = std::fs::read_to_string(&path).map_err(|source| ManifestError::Read {
            path: path.clone(),
            source,
        })?;
        let doc: Value = serde_yaml::from_str(&raw).map_err(|source| ManifestError::Parse {
            path: path.clone(),
            source,
        })?;

        let ports: BTreeSet<u16> = match doc.get("ports") {
            Some(Value::Mapping(map)) => map.keys().filter_map(parse_port_key).collect(),
            _ => BTreeSet::new(),
        };
        out.push(AddonPorts {
            dir: dir
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            ports: ports.into_iter().collect(),
        });
    }
    Ok(out)
}

/// One line per add-on: `- <dir>: [8080, 8081]`.
pub fn format_port_list(entries: &[AddonPorts]) -> String {
    entries
        .iter()
        .map(|e| {
            let ports: Vec<String> = e.ports.iter().map(u16::to_string).collect();
            format!("- {}: [{}]", e.dir, ports.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KillRecord {
    pub port: u16,
    pub pid: u32,
    pub outcome: KillOutcome,
}

#[derive(Debug, Default)]
pub struct KillReport {
    pub signal: Option<Signal>,
    pub records: Vec<KillRecord>,
    /// Ports that had no listeners.
    pub idle_ports: Vec<u16>,
}

impl KillReport {
    pub fn killed(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome == KillOutcome::Killed)
            .count()
    }
}

/// Signal every TCP/UDP listener on each unique port in `entries`.
///
/// Ports nobody listens on are a no-op; the current process is never
/// signalled.
pub fn kill_ports(entries: &[AddonPorts], force: bool) -> anyhow::Result<KillReport> {
    which::which("lsof").context("lsof is required to find listening processes")?;

    let signal = if force { Signal::Kill } else { Signal::Term };
    let unique: BTreeSet<u16> = entries.iter().flat_map(|e| e.ports.iter().copied()).collect();
    let own_pid = std::process::id();

    let mut report = KillReport {
        signal: Some(signal),
        ..KillReport::default()
    };
    for port in unique {
        let pids = listeners(port)?;
        if pids.is_empty() {
            debug!(port, "No listeners");
            report.idle_ports.push(port);
            continue;
        }
        for pid in pids.into_iter().filter(|pid| *pid != own_pid) {
            let outcome = send_signal(pid, signal);
            info!(port, pid, %signal, %outcome, "Signalled listener");
            report.records.push(KillRecord { port, pid, outcome });
        }
    }
    Ok(report)
}

/// PIDs listening on `port` over TCP or bound to it over UDP.
pub fn listeners(port: u16) -> anyhow::Result<BTreeSet<u32>> {
    let tcp = format!("-iTCP:{port}");
    let udp = format!("-iUDP:{port}");
    let mut pids = lsof(&["-nP", "-t", &tcp, "-sTCP:LISTEN"])?;
    pids.extend(lsof(&["-nP", "-t", &udp])?);
    Ok(pids)
}

fn lsof(args: &[&str]) -> anyhow::Result<BTreeSet<u32>> {
    let output = Command::new("lsof")
        .args(args)
        .output()
        .context("Failed to run lsof")?;
    // lsof exits 1 when nothing matches
    Ok(parse_pids(&String::from_utf8_lossy(&output.stdout)))
}

fn parse_pids(stdout: &str) -> BTreeSet<u32> {
    stdout
        .lines()
        .filter_map(|l| l.trim().parse::<u32>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn collects_all_port_key_forms() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("svc");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(MANIFEST_FILE),
            "ports:\n  \"9000/udp\": 9000\n  8080: 8080\n  \"5005\": null\n",
        )
        .unwrap();
        let empty = tmp.path().join("plain");
        std::fs::create_dir_all(&empty).unwrap();
        std::fs::write(empty.join(MANIFEST_FILE), "name: plain\n").unwrap();

        let ports = collect_ports(tmp.path()).unwrap();
        assert_eq!(
            ports,
            vec![
                AddonPorts {
                    dir: "plain".to_string(),
                    ports: vec![]
                },
                AddonPorts {
                    dir: "svc".to_string(),
                    ports: vec![5005, 8080, 9000]
                },
            ]
        );
        assert_eq!(format_port_list(&ports), "- plain: []\n- svc: [5005, 8080, 9000]");
    }

    #[test]
    fn parse_pids_ignores_noise() {
        let pids = parse_pids("123\n\n456\nwarning\n123\n");
        assert_eq!(pids.into_iter().collect::<Vec<_>>(), vec![123, 456]);
    }

    #[test]
    fn idle_port_is_left_alone() {
        if which::which("lsof").is_err() {
            return;
        }
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let entries = vec![
            AddonPorts {
                dir: "a".to_string(),
                ports: vec![port],
            },
            AddonPorts {
                dir: "b".to_string(),
                ports: vec![port],
            },
        ];

        let report = kill_ports(&entries, false).unwrap();
        assert_eq!(report.signal, Some(Signal::Term));
        assert!(report.records.is_empty());
        assert_eq!(report.idle_ports, vec![port]);
        assert_eq!(report.killed(), 0);
    }
}
