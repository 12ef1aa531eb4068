use std::path::Path;

use anyhow::{bail, Context, Result};
use vlanctl::model::{
    AddressConfig, AddressReservation, DhcpRange, ForwardProtocol, GatewayMode, LogicalNetwork,
    NetworkRole, PortForward, ProxyRoute,
};
use vlanctl::report::render_network_list;
use vlanctl::settings::{load_network_file, NetworkFile};
use vlanctl::store::{Descriptor, Entity, NetworkRepository};

use crate::cli::{
    ForwardAddArgs, ForwardCommand, NetworkAddArgs, NetworkCommand, ProtocolArg, RemoveArgs,
    ReservationAddArgs, ReservationCommand, RoleArg,
};

pub fn run_network(cmd: NetworkCommand) -> Result<()> {
    match cmd {
        NetworkCommand::List(args) => {
            let file = load_network_file(&args.file)?;
            println!("{}", render_network_list(&file.store));
            Ok(())
        }
        NetworkCommand::Add(args) => {
            let network = network_from_args(&args)?;
            create(&args.file, None, Descriptor::Network(network))
        }
        NetworkCommand::Remove(args) => remove(args, EntityLabel::Network),
    }
}

pub fn run_forward(cmd: ForwardCommand) -> Result<()> {
    match cmd {
        ForwardCommand::Add(args) => {
            let forward = forward_from_args(&args)?;
            create(&args.file, Some(&args.network), Descriptor::PortForward(forward))
        }
        ForwardCommand::Remove(args) => remove(args, EntityLabel::PortForward),
    }
}

pub fn run_reservation(cmd: ReservationCommand) -> Result<()> {
    match cmd {
        ReservationCommand::Add(args) => {
            let reservation = reservation_from_args(&args);
            create(&args.file, Some(&args.network), Descriptor::Reservation(reservation))
        }
        ReservationCommand::Remove(args) => remove(args, EntityLabel::Reservation),
    }
}

#[derive(Clone, Copy)]
enum EntityLabel {
    Network,
    PortForward,
    Reservation,
}

impl EntityLabel {
    fn name(self) -> &'static str {
        match self {
            EntityLabel::Network => "network",
            EntityLabel::PortForward => "port forward",
            EntityLabel::Reservation => "reservation",
        }
    }

    fn matches(self, entity: &Entity<'_>) -> bool {
        matches!(
            (self, entity),
            (EntityLabel::Network, Entity::Network(_))
                | (EntityLabel::PortForward, Entity::PortForward { .. })
                | (EntityLabel::Reservation, Entity::Reservation { .. })
        )
    }
}

fn load_or_empty(path: &Path) -> Result<NetworkFile> {
    if path.exists() {
        return Ok(load_network_file(path)?);
    }
    tracing::info!(path = %path.display(), "network file does not exist; starting empty");
    Ok(NetworkFile::default())
}

fn create(path: &Path, parent: Option<&str>, descriptor: Descriptor) -> Result<()> {
    let mut file = load_or_empty(path)?;
    let id = file.store.create(parent, descriptor)?;
    file.save(path)?;
    println!("added {id}");
    Ok(())
}

fn remove(args: RemoveArgs, label: EntityLabel) -> Result<()> {
    let mut file = load_network_file(&args.file)?;
    match file.store.get(&args.id) {
        Some(entity) if label.matches(&entity) => {}
        Some(_) => bail!("'{}' is not a {}", args.id, label.name()),
        None => bail!("{} '{}' not found", label.name(), args.id),
    }
    file.store.remove(&args.id)?;
    file.save(&args.file)?;
    println!("removed {}", args.id);
    Ok(())
}

fn network_from_args(args: &NetworkAddArgs) -> Result<LogicalNetwork> {
    let mut network = LogicalNetwork::new(args.id.clone());
    network.name = args.name.clone();
    network.parent = args.parent.clone();
    network.vlan_id = args.vlan_id;
    network.role = match args.role {
        RoleArg::Network => NetworkRole::Network,
        RoleArg::Bridge => NetworkRole::Bridge,
        RoleArg::Internet => NetworkRole::Internet,
    };
    if !args.addresses.is_empty() {
        network.address = AddressConfig::Manual {
            addresses: args.addresses.clone(),
        };
    }
    network.gateway = match (&args.via, &args.gateway4, &args.gateway6) {
        (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
            bail!("--via cannot be combined with --gateway4 or --gateway6")
        }
        (Some(via), None, None) => GatewayMode::ViaNetwork {
            network: via.clone(),
        },
        (None, None, None) => GatewayMode::Disabled,
        (None, ipv4, ipv6) => GatewayMode::Manual {
            ipv4: ipv4.clone(),
            ipv6: ipv6.clone(),
        },
    };
    network.dhcp_server.enabled = args.dhcp_server;
    for range in &args.ranges {
        let (start, end) = range
            .split_once('-')
            .with_context(|| format!("invalid DHCP range '{range}', expected start-end"))?;
        network.dhcp_server.ranges.push(DhcpRange {
            start: start.trim().to_string(),
            end: end.trim().to_string(),
        });
    }
    Ok(network)
}

fn forward_from_args(args: &ForwardAddArgs) -> Result<PortForward> {
    let protocol = match args.protocol {
        ProtocolArg::Tcp => ForwardProtocol::Tcp,
        ProtocolArg::Udp => ForwardProtocol::Udp,
        ProtocolArg::TcpUdp => ForwardProtocol::TcpUdp,
        ProtocolArg::Https => ForwardProtocol::Https,
    };
    let proxy = match (&args.origin, &args.domain) {
        (Some(origin), Some(domain)) => Some(ProxyRoute {
            origin: origin.clone(),
            domain: domain.clone(),
            dns_challenge: None,
            rule_block: None,
        }),
        (None, None) => None,
        _ => bail!("--origin and --domain must be given together"),
    };
    if proxy.is_some() && protocol != ForwardProtocol::Https {
        bail!("--origin and --domain only apply to https forwards");
    }
    Ok(PortForward {
        id: args.id.clone(),
        protocol,
        src_port: args.src_port.clone(),
        dst_ip: args.dst_ip.clone(),
        dst_port: args.dst_port.clone(),
        proxy,
    })
}

fn reservation_from_args(args: &ReservationAddArgs) -> AddressReservation {
    AddressReservation {
        id: args.id.clone(),
        name: args.name.clone(),
        mac: args.mac.clone(),
        ip: args.ip.clone(),
        hostname: args.hostname.clone(),
    }
}
