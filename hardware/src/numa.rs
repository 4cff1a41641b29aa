// SPDX-License-Identifier: Apache-2.0
// Copyright Open Network Fabric Authors

//! NUMA topology as exposed under `devices/system/node`.

use std::path::Path;

use sysfs::{list_dir, read_attribute};
use tracing::debug;

use crate::HardwareError;

/// A NUMA node and the logical CPUs attached to it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NumaNode {
    /// Node number.
    pub id: u32,
    /// Logical CPU ids in ascending order.
    pub cpus: Vec<u32>,
}

/// Parse a kernel cpu list such as `0-3,8,10-11`.
///
/// # Errors
///
/// Returns [`HardwareError::UnexpectedAttribute`] for anything which is not a comma separated
/// list of ids and inclusive ranges.
pub fn parse_cpu_list(list: &str) -> Result<Vec<u32>, HardwareError> {
    let invalid = || HardwareError::UnexpectedAttribute {
        attribute: "cpulist".to_string(),
        value: list.to_string(),
    };
    let mut cpus = vec![];
    for chunk in list.trim().split(',').filter(|chunk| !chunk.is_empty()) {
        match chunk.split_once('-') {
            Some((start, end)) => {
                let start: u32 = start.trim().parse().map_err(|_| invalid())?;
                let end: u32 = end.trim().parse().map_err(|_| invalid())?;
                if end < start {
                    return Err(invalid());
                }
                cpus.extend(start..=end);
            }
            None => cpus.push(chunk.trim().parse().map_err(|_| invalid())?),
        }
    }
    Ok(cpus)
}

/// Read every NUMA node under `node_dir` (normally `<sysfs>/devices/system/node`), ordered by
/// node id.
///
/// Hosts without NUMA support have no such directory and yield an empty list.
///
/// # Errors
///
/// Propagates sysfs access errors and malformed cpu lists.
pub fn scan_numa_nodes(node_dir: impl AsRef<Path>) -> Result<Vec<NumaNode>, HardwareError> {
    let node_dir = node_dir.as_ref();
    let mut nodes = vec![];
    for name in list_dir(node_dir)? {
        let Some(id) = name.strip_prefix("node").and_then(|id| id.parse().ok()) else {
            continue;
        };
        let cpus = match read_attribute(node_dir.join(&name), "cpulist")? {
            Some(list) => parse_cpu_list(&list)?,
            None => vec![],
        };
        debug!("numa node {id} has cpus {cpus:?}");
        nodes.push(NumaNode { id, cpus });
    }
    nodes.sort_by_key(|node| node.id);
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cpu_lists() {
        assert_eq!(parse_cpu_list("0-3,8,10-11").unwrap(), vec![0, 1, 2, 3, 8, 10, 11]);
        assert_eq!(parse_cpu_list("5\n").unwrap(), vec![5]);
        assert_eq!(parse_cpu_list("").unwrap(), Vec::<u32>::new());
        assert!(parse_cpu_list("3-1").is_err());
        assert!(parse_cpu_list("a-b").is_err());
    }

    #[test]
    fn scan_orders_nodes_numerically() {
        let dir = tempfile::tempdir().unwrap();
        for (node, cpus) in [("node10", "4-5"), ("node0", "0-1"), ("node1", "2,3")] {
            let path = dir.path().join(node);
            std::fs::create_dir(&path).unwrap();
            std::fs::write(path.join("cpulist"), cpus).unwrap();
        }
        std::fs::write(dir.path().join("online"), "0-1,10").unwrap();
        let nodes = scan_numa_nodes(dir.path()).unwrap();
        assert_eq!(
            nodes,
            vec![
                NumaNode { id: 0, cpus: vec![0, 1] },
                NumaNode { id: 1, cpus: vec![2, 3] },
                NumaNode { id: 10, cpus: vec![4, 5] },
            ]
        );
    }

    #[test]
    fn missing_node_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(scan_numa_nodes(dir.path().join("node")).unwrap().is_empty());
    }
}
