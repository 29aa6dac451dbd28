use std::collections::HashMap;

use serde::Serialize;
use serde_json::json;
use sysinfo::{ProcessesToUpdate, System};
use tracing::info;

use super::{Collector, payload};
use crate::{Category, Payload, error::CollectionError, util::round2};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildProcess {
    pub name: String,
    pub pid: u32,
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub duration_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedBuild {
    pub name: String,
    pub pid: u32,
    pub duration_seconds: u64,
}

/// Remembers build processes between ticks to notice when they finish
#[derive(Debug, Default)]
pub struct BuildTracker {
    running: HashMap<u32, (String, u64)>,
}

impl BuildTracker {
    /// Update with the processes seen this tick; returns builds that
    /// disappeared since the last one.
    pub fn observe(&mut self, current: &[BuildProcess]) -> Vec<CompletedBuild> {
        for process in current {
            if !self.running.contains_key(&process.pid) {
                info!("build process started: {} (pid {})", process.name, process.pid);
            }
        }

        let mut completed: Vec<CompletedBuild> = self
            .running
            .iter()
            .filter(|(pid, _)| !current.iter().any(|p| p.pid == **pid))
            .map(|(pid, (name, duration))| CompletedBuild {
                name: name.clone(),
                pid: *pid,
                duration_seconds: *duration,
            })
            .collect();
        completed.sort_by_key(|b| b.pid);

        for build in &completed {
            info!(
                "build process completed: {} (pid {}) after {:.1} minutes",
                build.name,
                build.pid,
                build.duration_seconds as f64 / 60.0
            );
        }

        self.running = current
            .iter()
            .map(|p| (p.pid, (p.name.clone(), p.duration_seconds)))
            .collect();

        completed
    }

    pub fn running(&self) -> usize {
        self.running.len()
    }
}

/// Build tool processes, matched by keyword against the process name
pub struct BuildCollector {
    sys: System,
    keywords: Vec<String>,
    tracker: BuildTracker,
}

impl BuildCollector {
    pub fn new(keywords: Vec<String>) -> Self {
        Self {
            sys: System::new(),
            keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
            tracker: BuildTracker::default(),
        }
    }

    fn matches(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.keywords.iter().any(|k| name.contains(k.as_str()))
    }
}

impl Collector for BuildCollector {
    fn category(&self) -> Category {
        Category::Build
    }

    fn collect(&mut self) -> Result<Payload, CollectionError> {
        self.sys.refresh_memory();
        self.sys.refresh_processes(ProcessesToUpdate::All, true);
        let total_memory = self.sys.total_memory().max(1) as f64;

        let mut processes: Vec<BuildProcess> = self
            .sys
            .processes()
            .iter()
            .filter_map(|(pid, process)| {
                let name = process.name().to_string_lossy().into_owned();
                self.matches(&name).then(|| BuildProcess {
                    name,
                    pid: pid.as_u32(),
                    cpu_percent: round2(process.cpu_usage() as f64),
                    memory_percent: round2(process.memory() as f64 / total_memory * 100.0),
                    duration_seconds: process.run_time(),
                })
            })
            .collect();
        processes.sort_by_key(|p| p.pid);

        let completed = self.tracker.observe(&processes);
        Ok(build_payload(&processes, &completed))
    }
}

pub(crate) fn build_payload(processes: &[BuildProcess], completed: &[CompletedBuild]) -> Payload {
    let mut fields = payload([
        ("active_build_count", json!(processes.len())),
        ("processes", json!(processes)),
        ("completed_builds", json!(completed)),
    ]);

    if let Some(longest) = completed.iter().map(|b| b.duration_seconds).max() {
        fields.insert(
            "completed_build_max_minutes".to_string(),
            json!(round2(longest as f64 / 60.0)),
        );
    }
    fields
}
