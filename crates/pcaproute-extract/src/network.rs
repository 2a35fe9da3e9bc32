//! Route aggregation: collapse live hosts into /24 blocks.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;

use pcaproute_core::NetworkBlock;

#[derive(Debug, Default)]
pub struct NetworkAggregator {
    blocks: BTreeSet<NetworkBlock>,
}

impl NetworkAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the block covering `address`. Returns `true` if it was new.
    pub fn insert(&mut self, address: Ipv4Addr) -> bool {
        self.blocks.insert(NetworkBlock::containing(address))
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Blocks in ascending network order.
    pub fn into_blocks(self) -> Vec<NetworkBlock> {
        self.blocks.into_iter().collect()
    }
}

impl Extend<Ipv4Addr> for NetworkAggregator {
    fn extend<T: IntoIterator<Item = Ipv4Addr>>(&mut self, iter: T) {
        for address in iter {
            self.insert(address);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_host_twice_is_one_block() {
        let mut agg = NetworkAggregator::new();
        assert!(agg.insert(Ipv4Addr::new(10, 0, 0, 5)));
        assert!(!agg.insert(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(agg.len(), 1);
    }

    #[test]
    fn test_hosts_share_a_block() {
        let mut agg = NetworkAggregator::new();
        agg.extend([
            Ipv4Addr::new(172, 217, 160, 14),
            Ipv4Addr::new(10, 0, 0, 5),
            Ipv4Addr::new(172, 217, 160, 200),
            Ipv4Addr::new(10, 0, 1, 5),
        ]);

        let blocks: Vec<String> = agg.into_blocks().iter().map(ToString::to_string).collect();
        assert_eq!(
            blocks,
            vec!["10.0.0.0/24", "10.0.1.0/24", "172.217.160.0/24"]
        );
    }

    #[test]
    fn test_empty_aggregate() {
        let agg = NetworkAggregator::new();
        assert!(agg.is_empty());
        assert!(agg.into_blocks().is_empty());
    }
}
