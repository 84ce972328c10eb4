/// Node-group manager: bookkeeping for upstream node URLs grouped by
/// `Group`, with simple round-robin routing and up/down status. Separate
/// from the synchronizer engine's core loop; exists because the
/// management RPC surface (`rpc.rs`) needs something to serve.
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Core,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeInfo {
    pub url: String,
    pub status: NodeStatus,
}

struct NodeEntry {
    url: String,
    up: bool,
}

struct Manager {
    nodes: Vec<NodeEntry>,
    cursor: AtomicUsize,
}

impl Manager {
    fn new(urls: Vec<String>) -> Self {
        Self {
            nodes: urls
                .into_iter()
                .map(|url| NodeEntry { url, up: true })
                .collect(),
            cursor: AtomicUsize::new(0),
        }
    }

    fn list(&self) -> Vec<NodeInfo> {
        self.nodes
            .iter()
            .map(|n| NodeInfo {
                url: n.url.clone(),
                status: if n.up { NodeStatus::Up } else { NodeStatus::Down },
            })
            .collect()
    }

    fn status(&self, url: &str) -> Option<NodeInfo> {
        self.nodes.iter().find(|n| n.url == url).map(|n| NodeInfo {
            url: n.url.clone(),
            status: if n.up { NodeStatus::Up } else { NodeStatus::Down },
        })
    }

    fn add(&mut self, url: String) {
        if !self.nodes.iter().any(|n| n.url == url) {
            self.nodes.push(NodeEntry { url, up: true });
        }
    }

    fn remove(&mut self, url: &str) {
        self.nodes.retain(|n| n.url != url);
    }

    fn set_status(&mut self, url: &str, up: bool) {
        if let Some(n) = self.nodes.iter_mut().find(|n| n.url == url) {
            n.up = up;
        }
    }

    /// Round-robins across the known URLs, preferring nodes currently
    /// marked up; falls back to any node if every node in the group is
    /// down. Mirrors `Manager.Route`.
    fn route(&self) -> Option<String> {
        if self.nodes.is_empty() {
            return None;
        }
        let up_nodes: Vec<&NodeEntry> = self.nodes.iter().filter(|n| n.up).collect();
        if !up_nodes.is_empty() {
            let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % up_nodes.len();
            return Some(up_nodes[idx].url.clone());
        }
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % self.nodes.len();
        Some(self.nodes[idx].url.clone())
    }
}

/// Owns one `Manager` per `Group`. Shared across the RPC handlers via
/// `Arc<NodeGroupRegistry>`.
pub struct NodeGroupRegistry {
    managers: RwLock<HashMap<Group, Manager>>,
}

impl NodeGroupRegistry {
    pub fn new(seed: HashMap<Group, Vec<String>>) -> Self {
        let managers = seed
            .into_iter()
            .map(|(group, urls)| (group, Manager::new(urls)))
            .collect();
        Self {
            managers: RwLock::new(managers),
        }
    }

    pub fn list(&self, group: Group) -> Vec<NodeInfo> {
        self.managers
            .read()
            .unwrap()
            .get(&group)
            .map(Manager::list)
            .unwrap_or_default()
    }

    pub fn list_all(&self) -> HashMap<Group, Vec<NodeInfo>> {
        self.managers
            .read()
            .unwrap()
            .iter()
            .map(|(group, manager)| (*group, manager.list()))
            .collect()
    }

    pub fn add(&self, group: Group, url: String) {
        self.managers
            .write()
            .unwrap()
            .entry(group)
            .or_insert_with(|| Manager::new(Vec::new()))
            .add(url);
    }

    pub fn remove(&self, group: Group, url: &str) {
        if let Some(manager) = self.managers.write().unwrap().get_mut(&group) {
            manager.remove(url);
        }
    }

    pub fn route(&self, group: Group) -> Option<String> {
        self.managers.read().unwrap().get(&group)?.route()
    }

    /// Status of one node if `url` is given, otherwise every node in the
    /// group. Returns `None` if the group itself is unknown.
    pub fn status(&self, group: Group, url: Option<&str>) -> Option<Vec<NodeInfo>> {
        let managers = self.managers.read().unwrap();
        let manager = managers.get(&group)?;
        match url {
            Some(url) => Some(manager.status(url).into_iter().collect()),
            None => Some(manager.list()),
        }
    }

    pub fn mark_down(&self, group: Group, url: &str) {
        if let Some(manager) = self.managers.write().unwrap().get_mut(&group) {
            manager.set_status(url, false);
        }
    }

    pub fn mark_up(&self, group: Group, url: &str) {
        if let Some(manager) = self.managers.write().unwrap().get_mut(&group) {
            manager.set_status(url, true);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> NodeGroupRegistry {
        let mut seed = HashMap::new();
        seed.insert(
            Group::Core,
            vec!["http://a".to_string(), "http://b".to_string()],
        );
        NodeGroupRegistry::new(seed)
    }

    #[test]
    fn route_round_robins_across_urls() {
        let reg = registry();
        let first = reg.route(Group::Core).unwrap();
        let second = reg.route(Group::Core).unwrap();
        assert_ne!(first, second);
        let third = reg.route(Group::Core).unwrap();
        assert_eq!(first, third);
    }

    #[test]
    fn add_and_remove_mutate_list() {
        let reg = registry();
        reg.add(Group::Core, "http://c".to_string());
        assert_eq!(reg.list(Group::Core).len(), 3);

        reg.remove(Group::Core, "http://c");
        assert_eq!(reg.list(Group::Core).len(), 2);
    }

    #[test]
    fn route_on_empty_group_returns_none() {
        let reg = NodeGroupRegistry::new(HashMap::new());
        assert_eq!(reg.route(Group::Core), None);
    }

    #[test]
    fn mark_down_is_reflected_in_status_and_skipped_by_route() {
        let reg = registry();
        reg.mark_down(Group::Core, "http://a");

        let status = reg.status(Group::Core, Some("http://a")).unwrap();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].status, NodeStatus::Down);

        // route() should only ever hand out the remaining up node.
        assert_eq!(reg.route(Group::Core).unwrap(), "http://b");
        assert_eq!(reg.route(Group::Core).unwrap(), "http://b");

        reg.mark_up(Group::Core, "http://a");
        let status = reg.status(Group::Core, None).unwrap();
        assert!(status.iter().all(|n| n.status == NodeStatus::Up));
    }

    #[test]
    fn status_on_unknown_group_is_none() {
        let reg = NodeGroupRegistry::new(HashMap::new());
        assert_eq!(reg.status(Group::Core, None), None);
    }
}
