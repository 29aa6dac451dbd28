use std::time::Duration;

use serde_json::{Value, json};
use sysinfo::{Components, ProcessesToUpdate, System};
use tracing::debug;

use super::{Collector, payload, run_tool};
use crate::{
    Category, Payload,
    error::CollectionError,
    util::{bytes_to_mb, round2},
};

const GPU_QUERY: [&str; 2] = [
    "--query-gpu=utilization.gpu,memory.used,memory.total,temperature.gpu",
    "--format=csv,noheader,nounits",
];

const CPU_SENSOR_HINTS: [&str; 5] = ["cpu", "core", "package", "tctl", "tdie"];

/// Editor processes plus optional GPU and temperature readings
///
/// A missing GPU tool or temperature sensor is reported as `null`.
pub struct PerformanceCollector {
    sys: System,
    editor_keywords: Vec<String>,
    tool_timeout: Duration,
}

impl PerformanceCollector {
    pub fn new(editor_keywords: Vec<String>, tool_timeout: Duration) -> Self {
        Self {
            sys: System::new(),
            editor_keywords: editor_keywords
                .into_iter()
                .map(|k| k.to_lowercase())
                .collect(),
            tool_timeout,
        }
    }

    fn editor_processes(&mut self) -> Vec<Value> {
        self.sys.refresh_processes(ProcessesToUpdate::All, true);
        let mut processes: Vec<_> = self
            .sys
            .processes()
            .iter()
            .filter(|(_, process)| {
                let name = process.name().to_string_lossy().to_lowercase();
                self.editor_keywords.iter().any(|k| name.contains(k.as_str()))
            })
            .map(|(pid, process)| {
                (
                    pid.as_u32(),
                    json!({
                        "pid": pid.as_u32(),
                        "name": process.name().to_string_lossy(),
                        "cpu_percent": round2(process.cpu_usage() as f64),
                        "memory_mb": bytes_to_mb(process.memory()),
                    }),
                )
            })
            .collect();
        processes.sort_by_key(|(pid, _)| *pid);
        processes.into_iter().map(|(_, v)| v).collect()
    }

    fn gpu_info(&self) -> Value {
        match run_tool("nvidia-smi", &GPU_QUERY, self.tool_timeout) {
            Ok(Some(output)) => parse_gpu_line(&output).unwrap_or(Value::Null),
            Ok(None) => Value::Null,
            Err(e) => {
                debug!("gpu query failed: {e}");
                Value::Null
            }
        }
    }
}

impl Collector for PerformanceCollector {
    fn category(&self) -> Category {
        Category::Performance
    }

    fn collect(&mut self) -> Result<Payload, CollectionError> {
        Ok(payload([
            ("process_list", Value::Array(self.editor_processes())),
            ("gpu_info", self.gpu_info()),
            ("temperature_info", temperature_info()),
        ]))
    }
}

/// Parse the first line of the nvidia-smi CSV query.
pub(crate) fn parse_gpu_line(output: &str) -> Option<Value> {
    let line = output.lines().find(|l| !l.trim().is_empty())?;
    let values: Vec<f64> = line
        .split(',')
        .map(|v| v.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;

    match values.as_slice() {
        [utilization, used, total, temperature] => Some(json!({
            "utilization_percent": utilization,
            "memory_used_mb": used,
            "memory_total_mb": total,
            "temperature_celsius": temperature,
        })),
        _ => None,
    }
}

fn temperature_info() -> Value {
    let components = Components::new_with_refreshed_list();
    let sensor = components
        .iter()
        .filter(|c| c.temperature().is_some())
        .find(|c| {
            let label = c.label().to_lowercase();
            CPU_SENSOR_HINTS.iter().any(|hint| label.contains(hint))
        });

    match sensor {
        Some(sensor) => json!({
            "cpu_temperature": sensor.temperature(),
            "cpu_temp_high": sensor.max(),
            "cpu_temp_critical": sensor.critical(),
        }),
        None => Value::Null,
    }
}
