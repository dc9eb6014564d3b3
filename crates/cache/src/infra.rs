//! INFRA partition: networks, nodes and named keys.

use chainload_types::{ContractType, NamedKey, Network, Node};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::{keys, Cache, CacheError, StorePartition};

const P: StorePartition = StorePartition::Infra;

impl Cache {
    pub fn set_network(&self, network: &Network) -> Result<(), CacheError> {
        self.put(P, keys::network(&network.name), network)
    }

    pub fn get_network(&self, name: &str) -> Result<Network, CacheError> {
        self.fetch(P, &keys::network(name))
    }

    pub fn get_networks(&self) -> Result<Vec<Network>, CacheError> {
        self.fetch_many(P, &keys::networks())
    }

    pub fn set_node(&self, node: &Node) -> Result<(), CacheError> {
        self.put(P, keys::node(&node.network, node.index), node)
    }

    pub fn get_node(&self, network: &str, index: u32) -> Result<Node, CacheError> {
        self.fetch(P, &keys::node(network, index))
    }

    /// Every node of a network, ordered by index.
    pub fn get_nodes(&self, network: &str) -> Result<Vec<Node>, CacheError> {
        let mut nodes: Vec<Node> = self.fetch_many(P, &keys::nodes(network))?;
        nodes.sort_by_key(|n| n.index);
        Ok(nodes)
    }

    /// Nodes able to take deploys, ordered by index.
    pub fn get_nodes_operational(&self, network: &str) -> Result<Vec<Node>, CacheError> {
        Ok(self
            .get_nodes(network)?
            .into_iter()
            .filter(Node::is_operational)
            .collect())
    }

    /// A uniformly random operational node, or `None` if there is none.
    pub fn get_node_by_network<R: Rng + ?Sized>(
        &self,
        network: &str,
        rng: &mut R,
    ) -> Result<Option<Node>, CacheError> {
        Ok(self.get_nodes_operational(network)?.choose(rng).cloned())
    }

    /// The operational node with index `node_index`.
    ///
    /// Index 0, and any index with no operational node behind it, fall back to
    /// a random operational node. `None` only when the operational set is empty.
    pub fn get_node_by_network_nodeset<R: Rng + ?Sized>(
        &self,
        network: &str,
        node_index: u32,
        rng: &mut R,
    ) -> Result<Option<Node>, CacheError> {
        let nodeset = self.get_nodes_operational(network)?;
        if node_index != 0 {
            if let Some(node) = nodeset.iter().find(|n| n.index == node_index) {
                return Ok(Some(node.clone()));
            }
            tracing::warn!(
                network,
                node_index,
                operational = nodeset.len(),
                "Requested node not in operational set, selecting at random"
            );
        }
        Ok(nodeset.choose(rng).cloned())
    }

    pub fn set_named_key(&self, named_key: &NamedKey) -> Result<(), CacheError> {
        let key = keys::named_key(
            &named_key.network,
            named_key.account_index,
            named_key.contract_type,
            &named_key.name,
        );
        self.put(P, key, named_key)
    }

    pub fn get_named_key(
        &self,
        network: &str,
        account_index: u32,
        contract_type: ContractType,
        name: &str,
    ) -> Result<NamedKey, CacheError> {
        self.fetch(P, &keys::named_key(network, account_index, contract_type, name))
    }

    pub fn get_named_keys(
        &self,
        network: &str,
        account_index: u32,
    ) -> Result<Vec<NamedKey>, CacheError> {
        self.fetch_many(P, &keys::named_keys(network, account_index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainload_types::factory::{create_named_key, create_network, create_node};
    use chainload_types::{NodeStatus, NodeType};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn cache_with_nodes(statuses: &[NodeStatus]) -> Cache {
        let cache = Cache::in_memory();
        cache.set_network(&create_network("lrt1", None).unwrap()).unwrap();
        for (i, status) in statuses.iter().enumerate() {
            let node = create_node(
                "lrt1",
                i as u32 + 1,
                "localhost",
                7777,
                9999,
                *status,
                NodeType::Full,
                1,
            )
            .unwrap();
            cache.set_node(&node).unwrap();
        }
        cache
    }

    #[test]
    fn test_network_round_trip() {
        let cache = Cache::in_memory();
        let net = create_network("dev2", None).unwrap();
        cache.set_network(&net).unwrap();
        assert_eq!(cache.get_network("dev2").unwrap(), net);
        assert_eq!(cache.get_networks().unwrap(), vec![net]);
        assert!(matches!(
            cache.get_network("dev3"),
            Err(CacheError::NotFound(_))
        ));
    }

    #[test]
    fn test_operational_nodes_are_filtered_and_ordered() {
        let cache = cache_with_nodes(&[
            NodeStatus::Healthy,
            NodeStatus::Down,
            NodeStatus::Distressed,
        ]);
        let ops = cache.get_nodes_operational("lrt1").unwrap();
        assert_eq!(ops.iter().map(|n| n.index).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_node_selection_by_index() {
        let cache = cache_with_nodes(&[NodeStatus::Healthy; 3]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let node = cache
            .get_node_by_network_nodeset("lrt1", 2, &mut rng)
            .unwrap()
            .unwrap();
        assert_eq!(node.index, 2);
    }

    #[test]
    fn test_out_of_range_index_falls_back_to_operational_member() {
        let cache = cache_with_nodes(&[NodeStatus::Healthy, NodeStatus::Down, NodeStatus::Healthy]);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        for requested in [0, 2, 4, 99] {
            for _ in 0..20 {
                let node = cache
                    .get_node_by_network_nodeset("lrt1", requested, &mut rng)
                    .unwrap()
                    .unwrap();
                assert!(node.is_operational());
                assert!(node.index == 1 || node.index == 3);
            }
        }
    }

    #[test]
    fn test_empty_nodeset_yields_none() {
        let cache = cache_with_nodes(&[NodeStatus::Down]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(cache
            .get_node_by_network_nodeset("lrt1", 1, &mut rng)
            .unwrap()
            .is_none());
        assert!(cache.get_node_by_network("lrt1", &mut rng).unwrap().is_none());
    }

    #[test]
    fn test_named_keys() {
        let cache = Cache::in_memory();
        let nk = create_named_key("lrt1", 2, ContractType::CounterDefine, "counter", "hash-1");
        cache.set_named_key(&nk).unwrap();
        assert_eq!(
            cache
                .get_named_key("lrt1", 2, ContractType::CounterDefine, "counter")
                .unwrap(),
            nk
        );
        assert_eq!(cache.get_named_keys("lrt1", 2).unwrap().len(), 1);
        assert!(cache.get_named_keys("lrt1", 3).unwrap().is_empty());
    }
}
