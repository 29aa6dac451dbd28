use serde_json::json;
use sysinfo::{Disks, Networks, System};

use super::{Collector, payload};
use crate::{
    Category, Payload,
    error::CollectionError,
    util::{bytes_to_gb, round2},
};

/// CPU, load, memory, disk and network totals of the host
///
/// The `System` is kept between calls so CPU usage covers the time since
/// the previous tick.
pub struct SystemCollector {
    sys: System,
}

impl SystemCollector {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        Self { sys }
    }
}

impl Default for SystemCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for SystemCollector {
    fn category(&self) -> Category {
        Category::System
    }

    fn collect(&mut self) -> Result<Payload, CollectionError> {
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();

        let total_memory = self.sys.total_memory();
        if total_memory == 0 {
            return Err(CollectionError::Unavailable(
                "memory information not available".to_string(),
            ));
        }
        let used_memory = self.sys.used_memory();
        let load = System::load_average();

        let mut fields = payload([
            ("cpu_percent", json!(round2(self.sys.global_cpu_usage() as f64))),
            ("load_avg_1m", json!(round2(load.one))),
            ("load_avg_5m", json!(round2(load.five))),
            ("load_avg_15m", json!(round2(load.fifteen))),
            (
                "memory_percent",
                json!(round2(used_memory as f64 / total_memory as f64 * 100.0)),
            ),
            ("memory_used_gb", json!(bytes_to_gb(used_memory))),
            ("memory_total_gb", json!(bytes_to_gb(total_memory))),
            (
                "memory_available_gb",
                json!(bytes_to_gb(self.sys.available_memory())),
            ),
        ]);

        let disks = Disks::new_with_refreshed_list();
        let root = disks
            .iter()
            .find(|d| d.mount_point() == std::path::Path::new("/"))
            .or_else(|| disks.iter().max_by_key(|d| d.total_space()));
        if let Some(disk) = root.filter(|d| d.total_space() > 0) {
            let total = disk.total_space();
            let free = disk.available_space();
            let used = total.saturating_sub(free);
            fields.extend(payload([
                (
                    "disk_percent",
                    json!(round2(used as f64 / total as f64 * 100.0)),
                ),
                ("disk_used_gb", json!(bytes_to_gb(used))),
                ("disk_free_gb", json!(bytes_to_gb(free))),
                ("disk_total_gb", json!(bytes_to_gb(total))),
            ]));
        }

        let networks = Networks::new_with_refreshed_list();
        let (mut sent, mut recv, mut packets_sent, mut packets_recv) = (0u64, 0u64, 0u64, 0u64);
        for (_, data) in networks.iter() {
            sent += data.total_transmitted();
            recv += data.total_received();
            packets_sent += data.total_packets_transmitted();
            packets_recv += data.total_packets_received();
        }
        fields.extend(payload([
            ("net_bytes_sent", json!(sent)),
            ("net_bytes_recv", json!(recv)),
            ("net_packets_sent", json!(packets_sent)),
            ("net_packets_recv", json!(packets_recv)),
        ]));

        Ok(fields)
    }
}
