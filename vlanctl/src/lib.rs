//! Host network-configuration reconciler for VLAN-based routers.
//!
//! A set of logical networks (VLANs with address modes, gateway roles, port
//! forwards and DHCP service) is compiled into three artifacts: a netplan
//! document with per-interface routing tables and policy rules, an nftables
//! rule file, and a DHCP hook script that keeps leased gateways in the
//! custom tables. The apply step writes them and drives the external tools.
//!
//! # Architecture
//!
//! ## Intent
//!
//! - [`model`]: Logical networks, port forwards and reservations
//! - [`store`]: Repository trait with uniqueness-checked mutations
//! - [`settings`]: TOML network file with host settings
//!
//! ## Compilation
//!
//! - [`compile`]: Orchestrates one pass into a [`compile::CompiledPlan`]
//! - [`tables`]: Routing-table ids per interface
//! - [`routes`]: Per-network stanza, routes and policy rules
//! - [`firewall`]: Masquerade, forward and DNAT rules
//! - [`dhcp_hook`]: Runtime scripts for DHCP-learned gateways
//! - [`dhcp_server`]: dnsmasq configuration
//! - [`reverse_proxy`]: Caddyfile for `https` forwards
//! - [`findings`]: Warnings tied to the entity that caused them
//!
//! ## Activation
//!
//! - [`apply`]: Writes artifacts and runs external commands
//! - [`apply_queue`]: Coalescing trigger so passes never overlap
//!
//! ## Reporting
//!
//! - [`report`]: Terminal and JSON summaries
//! - [`interfaces`]: Parent-interface choices from host interface names
//!
//! # Examples
//!
//! ```ignore
//! use vlanctl::compile::compile;
//! use vlanctl::settings::load_network_file;
//!
//! let file = load_network_file("networks.toml".as_ref())?;
//! let plan = compile(&file.store, &file.settings);
//! println!("{}", plan.netplan.to_yaml()?);
//! ```

pub mod apply;
pub mod apply_queue;
pub mod compile;
pub mod dhcp_hook;
pub mod dhcp_server;
pub mod findings;
pub mod firewall;
pub mod interfaces;
pub mod model;
pub mod report;
pub mod reverse_proxy;
pub mod routes;
pub mod settings;
pub mod store;
pub mod tables;
