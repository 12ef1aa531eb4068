//! nftables rule sets kept in a dedicated table per family.
//!
//! A [`RuleSet`] is an insertion-ordered, duplicate-free sequence of
//! statements. Emitting the same rule twice keeps the first position, so a
//! generator can call its helpers freely and still render a stable file.

use std::fmt::{self, Display, Formatter};

use indexmap::IndexSet;
use serde::Serialize;

use crate::cidr::AddressFamily;

/// nftables address family of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleFamily {
    Ip,
    Ip6,
}

impl RuleFamily {
    pub const ALL: [RuleFamily; 2] = [RuleFamily::Ip, RuleFamily::Ip6];

    /// Keyword used in address matches (`ip daddr`, `ip6 daddr`).
    pub fn match_keyword(self) -> &'static str {
        match self {
            RuleFamily::Ip => "ip",
            RuleFamily::Ip6 => "ip6",
        }
    }

    /// Format `address:port` the way `dnat to` expects for this family.
    pub fn dnat_target(self, address: &str, port: Option<&str>) -> String {
        match (self, port) {
            (_, None) => address.to_string(),
            (RuleFamily::Ip, Some(port)) => format!("{address}:{port}"),
            (RuleFamily::Ip6, Some(port)) => format!("[{address}]:{port}"),
        }
    }
}

impl From<AddressFamily> for RuleFamily {
    fn from(family: AddressFamily) -> Self {
        match family {
            AddressFamily::V4 => RuleFamily::Ip,
            AddressFamily::V6 => RuleFamily::Ip6,
        }
    }
}

impl Display for RuleFamily {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.match_keyword())
    }
}

/// Base chains managed inside each table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Prerouting,
    Postrouting,
    Forward,
}

impl Chain {
    pub const ALL: [Chain; 3] = [Chain::Prerouting, Chain::Postrouting, Chain::Forward];

    fn hook_spec(self) -> &'static str {
        match self {
            Chain::Prerouting => "type nat hook prerouting priority dstnat; policy accept;",
            Chain::Postrouting => "type nat hook postrouting priority srcnat; policy accept;",
            Chain::Forward => "type filter hook forward priority filter; policy accept;",
        }
    }
}

impl Display for Chain {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Chain::Prerouting => "prerouting",
            Chain::Postrouting => "postrouting",
            Chain::Forward => "forward",
        };
        f.write_str(name)
    }
}

/// A single rule: family, chain and the rule expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NftRule {
    pub family: RuleFamily,
    pub chain: Chain,
    pub expr: String,
}

impl NftRule {
    pub fn new(family: RuleFamily, chain: Chain, expr: impl Into<String>) -> Self {
        Self {
            family,
            chain,
            expr: expr.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Statement {
    Flush(RuleFamily),
    Rule(NftRule),
}

/// Ordered, duplicate-free nftables statements for one managed table name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    table: String,
    statements: IndexSet<Statement>,
}

impl RuleSet {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            statements: IndexSet::new(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Declare and flush the managed table of every family.
    pub fn flush(&mut self) {
        for family in RuleFamily::ALL {
            self.statements.insert(Statement::Flush(family));
        }
    }

    /// Add a rule; returns `false` when an identical rule already exists.
    pub fn add(&mut self, rule: NftRule) -> bool {
        self.statements.insert(Statement::Rule(rule))
    }

    /// Rules in insertion order, without the flush block.
    pub fn rules(&self) -> impl Iterator<Item = &NftRule> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Rule(rule) => Some(rule),
            Statement::Flush(_) => None,
        })
    }

    pub fn len(&self) -> usize {
        self.rules().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Render the statements as an `nft -f` script.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for statement in &self.statements {
            match statement {
                Statement::Flush(family) => self.render_flush(&mut out, *family),
                Statement::Rule(rule) => {
                    out.push_str(&self.render_rule(rule));
                    out.push('\n');
                }
            }
        }
        out
    }

    /// One `add rule` line.
    pub fn render_rule(&self, rule: &NftRule) -> String {
        format!(
            "add rule {} {} {} {}",
            rule.family, self.table, rule.chain, rule.expr
        )
    }

    fn render_flush(&self, out: &mut String, family: RuleFamily) {
        out.push_str(&format!("table {family} {} {{\n", self.table));
        for chain in Chain::ALL {
            out.push_str(&format!("\tchain {chain} {{\n\t\t{}\n\t}}\n", chain.hook_spec()));
        }
        out.push_str("}\n");
        out.push_str(&format!("flush table {family} {}\n", self.table));
    }
}
