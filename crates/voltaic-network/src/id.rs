use serde::{Deserialize, Serialize};
use slotmap::new_key_type;

new_key_type! {
    /// Identifies an energy network in the registry.
    ///
    /// Ids are never reused for a different network while the old one is
    /// reachable: a merge keeps one id and retires the others, a split
    /// retires the original and allocates fresh ids for every part.
    pub struct NetworkId;
}

/// Whether a network is ticked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NetworkState {
    /// Ticked normally.
    #[default]
    Active,
    /// Membership tracked, not ticked. At least one member lies in an
    /// inactive region.
    Inactive,
}

impl NetworkState {
    pub fn is_active(self) -> bool {
        self == NetworkState::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn network_ids_are_distinct_and_ordered() {
        let mut sm: SlotMap<NetworkId, ()> = SlotMap::with_key();
        let a = sm.insert(());
        let b = sm.insert(());
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn removed_id_is_not_revived() {
        let mut sm: SlotMap<NetworkId, ()> = SlotMap::with_key();
        let a = sm.insert(());
        sm.remove(a);
        let b = sm.insert(());
        assert_ne!(a, b);
        assert!(!sm.contains_key(a));
    }

    #[test]
    fn default_state_is_active() {
        assert!(NetworkState::default().is_active());
        assert!(!NetworkState::Inactive.is_active());
    }
}
