//! Repository of logical networks and their child entities.
//!
//! The compiler reads networks through [`NetworkRepository`] only. Every
//! mutation is validated before anything is written, so a rejected change
//! leaves the repository exactly as it was.

use indexmap::IndexMap;
use thiserror::Error;

use crate::model::{AddressReservation, LogicalNetwork, NetworkRole, PortForward};

/// Errors returned by repository mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("VLAN ID already in use: {parent}.{vlan_id} belongs to network '{existing}'")]
    VlanInUse {
        parent: String,
        vlan_id: u16,
        existing: String,
    },
    #[error("VLAN ID {0} is outside 1..=4095")]
    InvalidVlanId(u16),
    #[error("id must not be empty")]
    EmptyId,
    #[error("id '{0}' is already used by another entity")]
    DuplicateId(String),
    #[error("entity '{0}' not found")]
    NotFound(String),
    #[error("network '{0}' is not internet-typed; port forwards need an internet network")]
    NotInternet(String),
    #[error("{0} requires a parent network")]
    MissingParent(&'static str),
    #[error("networks are top-level entities and take no parent")]
    UnexpectedParent,
}

/// Kinds of entity held by a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Network,
    PortForward,
    Reservation,
}

/// New entity handed to [`NetworkRepository::create`].
#[derive(Debug, Clone)]
pub enum Descriptor {
    Network(LogicalNetwork),
    PortForward(PortForward),
    Reservation(AddressReservation),
}

/// Borrowed view of a stored entity.
#[derive(Debug, Clone, Copy)]
pub enum Entity<'a> {
    Network(&'a LogicalNetwork),
    PortForward {
        parent: &'a str,
        forward: &'a PortForward,
    },
    Reservation {
        parent: &'a str,
        reservation: &'a AddressReservation,
    },
}

/// Host-side storage of networks, port forwards and reservations.
pub trait NetworkRepository {
    /// Ids of every entity of `kind`, networks in insertion order.
    fn list(&self, kind: EntityKind) -> Vec<String>;

    fn get(&self, id: &str) -> Option<Entity<'_>>;

    /// Validate and insert an entity; returns its id.
    fn create(&mut self, parent: Option<&str>, descriptor: Descriptor) -> Result<String, StoreError>;

    /// Replace a network's settings, keeping its position.
    fn update_network(&mut self, network: LogicalNetwork) -> Result<(), StoreError>;

    /// Remove an entity; removing a network removes its children too.
    fn remove(&mut self, id: &str) -> Result<(), StoreError>;

    fn network(&self, id: &str) -> Option<&LogicalNetwork> {
        match self.get(id) {
            Some(Entity::Network(network)) => Some(network),
            _ => None,
        }
    }

    /// Every network, in iteration order.
    fn networks(&self) -> Vec<&LogicalNetwork> {
        self.list(EntityKind::Network)
            .iter()
            .filter_map(|id| self.network(id))
            .collect()
    }
}

/// Check a network against the networks already stored.
///
/// `replacing` names the network being re-saved so it does not collide with
/// its own previous version.
pub fn validate_network<'a>(
    existing: impl IntoIterator<Item = &'a LogicalNetwork>,
    candidate: &LogicalNetwork,
    replacing: Option<&str>,
) -> Result<(), StoreError> {
    if candidate.id.trim().is_empty() {
        return Err(StoreError::EmptyId);
    }
    if let Some(vlan_id) = candidate.vlan_id {
        if !(1..=4095).contains(&vlan_id) {
            return Err(StoreError::InvalidVlanId(vlan_id));
        }
    }
    let Some((parent, vlan_id)) = candidate.vlan_key() else {
        return Ok(());
    };
    for other in existing {
        if Some(other.id.as_str()) == replacing {
            continue;
        }
        if other.vlan_key() == Some((parent, vlan_id)) {
            return Err(StoreError::VlanInUse {
                parent: parent.to_string(),
                vlan_id,
                existing: other.id.clone(),
            });
        }
    }
    Ok(())
}

/// In-memory repository preserving insertion order.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    networks: IndexMap<String, LogicalNetwork>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store by creating every network in order, children included.
    pub fn from_networks(
        networks: impl IntoIterator<Item = LogicalNetwork>,
    ) -> Result<Self, StoreError> {
        let mut store = Self::new();
        for network in networks {
            store.create(None, Descriptor::Network(network))?;
        }
        Ok(store)
    }

    /// Stored networks in order, for saving.
    pub fn into_networks(self) -> Vec<LogicalNetwork> {
        self.networks.into_values().collect()
    }

    fn id_in_use(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    fn create_network(&mut self, network: LogicalNetwork) -> Result<String, StoreError> {
        validate_network(self.networks.values(), &network, None)?;
        let mut ids = vec![network.id.as_str()];
        ids.extend(network.port_forwards.iter().map(|f| f.id.as_str()));
        ids.extend(network.dhcp_server.reservations.iter().map(|r| r.id.as_str()));
        check_new_ids(&ids, |id| self.id_in_use(id))?;
        if !network.port_forwards.is_empty() && network.role != NetworkRole::Internet {
            return Err(StoreError::NotInternet(network.id.clone()));
        }
        let id = network.id.clone();
        self.networks.insert(id.clone(), network);
        Ok(id)
    }

    fn parent_mut(&mut self, parent: Option<&str>, kind: &'static str) -> Result<&mut LogicalNetwork, StoreError> {
        let parent = parent.ok_or(StoreError::MissingParent(kind))?;
        self.networks
            .get_mut(parent)
            .ok_or_else(|| StoreError::NotFound(parent.to_string()))
    }
}

fn check_new_ids(ids: &[&str], in_use: impl Fn(&str) -> bool) -> Result<(), StoreError> {
    for (idx, id) in ids.iter().enumerate() {
        if id.trim().is_empty() {
            return Err(StoreError::EmptyId);
        }
        if in_use(id) || ids[..idx].contains(id) {
            return Err(StoreError::DuplicateId((*id).to_string()));
        }
    }
    Ok(())
}

impl NetworkRepository for MemoryStore {
    fn list(&self, kind: EntityKind) -> Vec<String> {
        match kind {
            EntityKind::Network => self.networks.keys().cloned().collect(),
            EntityKind::PortForward => self
                .networks
                .values()
                .flat_map(|n| n.port_forwards.iter().map(|f| f.id.clone()))
                .collect(),
            EntityKind::Reservation => self
                .networks
                .values()
                .flat_map(|n| n.dhcp_server.reservations.iter().map(|r| r.id.clone()))
                .collect(),
        }
    }

    fn get(&self, id: &str) -> Option<Entity<'_>> {
        if let Some(network) = self.networks.get(id) {
            return Some(Entity::Network(network));
        }
        for network in self.networks.values() {
            if let Some(forward) = network.port_forwards.iter().find(|f| f.id == id) {
                return Some(Entity::PortForward {
                    parent: &network.id,
                    forward,
                });
            }
            if let Some(reservation) = network.dhcp_server.reservations.iter().find(|r| r.id == id) {
                return Some(Entity::Reservation {
                    parent: &network.id,
                    reservation,
                });
            }
        }
        None
    }

    fn create(&mut self, parent: Option<&str>, descriptor: Descriptor) -> Result<String, StoreError> {
        match descriptor {
            Descriptor::Network(network) => {
                if parent.is_some() {
                    return Err(StoreError::UnexpectedParent);
                }
                self.create_network(network)
            }
            Descriptor::PortForward(forward) => {
                check_new_ids(&[forward.id.as_str()], |id| self.id_in_use(id))?;
                let network = self.parent_mut(parent, "port forward")?;
                if network.role != NetworkRole::Internet {
                    return Err(StoreError::NotInternet(network.id.clone()));
                }
                let id = forward.id.clone();
                network.port_forwards.push(forward);
                Ok(id)
            }
            Descriptor::Reservation(reservation) => {
                check_new_ids(&[reservation.id.as_str()], |id| self.id_in_use(id))?;
                let network = self.parent_mut(parent, "reservation")?;
                let id = reservation.id.clone();
                network.dhcp_server.reservations.push(reservation);
                Ok(id)
            }
        }
    }

    fn update_network(&mut self, network: LogicalNetwork) -> Result<(), StoreError> {
        if !self.networks.contains_key(&network.id) {
            return Err(StoreError::NotFound(network.id));
        }
        validate_network(self.networks.values(), &network, Some(&network.id))?;
        if !network.port_forwards.is_empty() && network.role != NetworkRole::Internet {
            return Err(StoreError::NotInternet(network.id));
        }
        let mut ids: Vec<&str> = network.port_forwards.iter().map(|f| f.id.as_str()).collect();
        ids.extend(network.dhcp_server.reservations.iter().map(|r| r.id.as_str()));
        let own = &network.id;
        check_new_ids(&ids, |id| match self.get(id) {
            None => false,
            Some(Entity::Network(_)) => true,
            Some(Entity::PortForward { parent, .. } | Entity::Reservation { parent, .. }) => parent != own,
        })?;
        if let Some(slot) = self.networks.get_mut(&network.id) {
            *slot = network;
        }
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<(), StoreError> {
        if self.networks.shift_remove(id).is_some() {
            return Ok(());
        }
        for network in self.networks.values_mut() {
            let forwards = network.port_forwards.len();
            network.port_forwards.retain(|f| f.id != id);
            let reservations = network.dhcp_server.reservations.len();
            network.dhcp_server.reservations.retain(|r| r.id != id);
            if forwards != network.port_forwards.len()
                || reservations != network.dhcp_server.reservations.len()
            {
                return Ok(());
            }
        }
        Err(StoreError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{Descriptor, Entity, EntityKind, MemoryStore, NetworkRepository, StoreError};
    use crate::model::{
        AddressConfig, AddressReservation, ForwardProtocol, LogicalNetwork, NetworkRole,
        PortForward,
    };

    fn net(id: &str, parent: &str, vlan: u16) -> LogicalNetwork {
        let mut network = LogicalNetwork::new(id);
        network.parent = Some(parent.to_string());
        network.vlan_id = Some(vlan);
        network
    }

    fn forward(id: &str) -> PortForward {
        PortForward {
            id: id.to_string(),
            protocol: ForwardProtocol::Tcp,
            src_port: "8080".to_string(),
            dst_ip: "192.168.10.5".to_string(),
            dst_port: Some("80".to_string()),
            proxy: None,
        }
    }

    fn home() -> MemoryStore {
        let mut wan = net("wan", "eth0", 1);
        wan.role = NetworkRole::Internet;
        let mut lan = net("lan", "eth0", 10);
        lan.address = AddressConfig::Manual {
            addresses: vec!["192.168.10.1/24".to_string()],
        };
        MemoryStore::from_networks([wan, lan]).expect("store")
    }

    #[test]
    fn duplicate_vlan_is_rejected_without_mutation() {
        let mut store = home();
        let before = store.clone().into_networks();
        let err = store
            .create(None, Descriptor::Network(net("guest", "eth0", 10)))
            .expect_err("collision");
        assert!(err.to_string().starts_with("VLAN ID already in use"));
        assert_eq!(store.into_networks(), before);
    }

    #[test]
    fn same_tag_on_other_parent_is_fine() {
        let mut store = home();
        store
            .create(None, Descriptor::Network(net("guest", "eth1", 10)))
            .expect("different parent");
        assert_eq!(store.list(EntityKind::Network), vec!["wan", "lan", "guest"]);
    }

    #[test]
    fn resaving_a_network_does_not_collide_with_itself() {
        let mut store = home();
        let mut lan = store.network("lan").expect("lan").clone();
        lan.name = Some("Home LAN".to_string());
        store.update_network(lan).expect("resave");
        let mut moved = store.network("lan").expect("lan").clone();
        moved.vlan_id = Some(1);
        assert!(matches!(
            store.update_network(moved),
            Err(StoreError::VlanInUse { .. })
        ));
        assert_eq!(store.network("lan").and_then(|n| n.vlan_id), Some(10));
    }

    #[test]
    fn vlan_range_is_enforced() {
        let mut store = MemoryStore::new();
        assert_eq!(
            store.create(None, Descriptor::Network(net("x", "eth0", 4096))),
            Err(StoreError::InvalidVlanId(4096))
        );
        assert_eq!(
            store.create(None, Descriptor::Network(net("x", "eth0", 0))),
            Err(StoreError::InvalidVlanId(0))
        );
    }

    #[test]
    fn port_forwards_need_an_internet_parent() {
        let mut store = home();
        assert_eq!(
            store.create(Some("lan"), Descriptor::PortForward(forward("web"))),
            Err(StoreError::NotInternet("lan".to_string()))
        );
        store
            .create(Some("wan"), Descriptor::PortForward(forward("web")))
            .expect("forward");
        assert!(matches!(
            store.get("web"),
            Some(Entity::PortForward { parent: "wan", .. })
        ));
        assert_eq!(
            store.create(Some("wan"), Descriptor::PortForward(forward("web"))),
            Err(StoreError::DuplicateId("web".to_string()))
        );
    }

    #[test]
    fn children_are_removed_independently() {
        let mut store = home();
        store
            .create(
                Some("lan"),
                Descriptor::Reservation(AddressReservation {
                    id: "printer".to_string(),
                    name: "printer".to_string(),
                    mac: "aa:bb:cc:dd:ee:ff".to_string(),
                    ip: "192.168.10.20".to_string(),
                    hostname: None,
                }),
            )
            .expect("reservation");
        assert_eq!(store.list(EntityKind::Reservation), vec!["printer"]);
        store.remove("printer").expect("remove child");
        assert!(store.network("lan").is_some());
        assert!(store.list(EntityKind::Reservation).is_empty());
        assert_eq!(store.remove("printer"), Err(StoreError::NotFound("printer".to_string())));
    }
}
