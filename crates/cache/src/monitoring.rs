//! MONITORING partition: first-seen node event records.

use chainload_types::NodeEventInfo;

use crate::{keys, Cache, CacheError, StorePartition};

const P: StorePartition = StorePartition::Monitoring;

impl Cache {
    /// Record `info` as the first sighting of an event about `subject`.
    ///
    /// Returns `false` if another stream already recorded the same event type
    /// for the same subject; the stored record is left untouched.
    pub fn set_node_event_once(
        &self,
        info: &NodeEventInfo,
        subject: &str,
    ) -> Result<bool, CacheError> {
        self.put_if_absent(
            P,
            keys::node_event(&info.network, &info.event_type, subject),
            info,
        )
    }

    /// Drop the claim taken by [`Cache::set_node_event_once`] so another
    /// stream can record the event again. Returns whether a claim existed.
    pub fn release_node_event(&self, info: &NodeEventInfo, subject: &str) -> Result<bool, CacheError> {
        self.store().delete_one(
            P,
            &keys::node_event(&info.network, &info.event_type, subject),
        )
    }

    /// Drop the finalization claims of the deploys in `hashes`. Returns how
    /// many claims existed.
    ///
    /// Streams reporting an already finalized deploy stop before claiming,
    /// so claims of finalized deploys are never consulted again.
    pub fn prune_deploy_claims<'a>(
        &self,
        network: &str,
        hashes: impl IntoIterator<Item = &'a str>,
    ) -> Result<usize, CacheError> {
        let mut pruned = 0;
        for hash in hashes {
            let key = keys::node_event(network, keys::DEPLOY_FINALIZED, hash);
            pruned += usize::from(self.store().delete_one(P, &key)?);
        }
        Ok(pruned)
    }

    /// Recorded events of a network, optionally of one type.
    pub fn get_node_events(
        &self,
        network: &str,
        event_type: Option<&str>,
    ) -> Result<Vec<NodeEventInfo>, CacheError> {
        self.fetch_many(P, &keys::node_events(network, event_type))
    }
}
