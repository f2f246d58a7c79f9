//! CIDR - IPv4 block parsing and the /24 subnet layout
//!
//! Subnets are carved out of the VPC block as fixed `/24`s whose third octet is
//! picked from a per-kind base (see [`CidrLayout`]). Only the first two octets of
//! the parent block take part in the derivation.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::topology::{PlanError, SubnetKind};

/// An IPv4 CIDR block (e.g., 10.0.0.0/16)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Ipv4Cidr(Ipv4Net);

impl Ipv4Cidr {
    /// Longest parent prefix that still has room for the derived /24s
    pub const MAX_PARENT_PREFIX: u8 = 16;

    pub fn new(address: Ipv4Addr, prefix: u8) -> Result<Self, PlanError> {
        Ipv4Net::new(address, prefix).map(Self).map_err(|_| {
            PlanError::invalid_cidr(
                format!("{}/{}", address, prefix),
                "prefix length must be between 0 and 32",
            )
        })
    }

    /// Parse a block in `x.x.x.x/n` form
    pub fn parse(s: &str) -> Result<Self, PlanError> {
        let (address, prefix) = s
            .split_once('/')
            .ok_or_else(|| PlanError::invalid_cidr(s, "expected format x.x.x.x/n"))?;

        let address: Ipv4Addr = address
            .parse()
            .map_err(|_| PlanError::invalid_cidr(s, "invalid IPv4 address"))?;

        let prefix: u8 = prefix
            .parse()
            .map_err(|_| PlanError::invalid_cidr(s, "invalid prefix length"))?;

        Self::new(address, prefix).map_err(|_| {
            PlanError::invalid_cidr(s, "prefix length must be between 0 and 32")
        })
    }

    pub fn address(&self) -> Ipv4Addr {
        self.0.addr()
    }

    pub fn prefix(&self) -> u8 {
        self.0.prefix_len()
    }

    /// Whether every derived /24 lies inside this block
    pub fn has_room_for_subnets(&self) -> bool {
        self.prefix() <= Self::MAX_PARENT_PREFIX
    }

    /// The first two octets, which anchor every derived subnet
    pub fn leading_octets(&self) -> (u8, u8) {
        let [a, b, _, _] = self.0.addr().octets();
        (a, b)
    }

    /// The `/24` sharing this block's first two octets with the given third octet
    pub fn subnet_24(&self, third_octet: u8) -> Ipv4Cidr {
        let (a, b) = self.leading_octets();
        Ipv4Cidr(Ipv4Net::new_assert(Ipv4Addr::new(a, b, third_octet, 0), 24))
    }

    /// Returns true if the two blocks share at least one address
    pub fn overlaps(&self, other: &Ipv4Cidr) -> bool {
        self.0.contains(&other.0.network()) || other.0.contains(&self.0.network())
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address(), self.prefix())
    }
}

impl FromStr for Ipv4Cidr {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Ipv4Cidr> for String {
    fn from(cidr: Ipv4Cidr) -> Self {
        cidr.to_string()
    }
}

impl TryFrom<String> for Ipv4Cidr {
    type Error = PlanError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

/// Third-octet reservation for derived subnets
///
/// Public subnet `i` gets `a.b.(public_base + i).0/24` and private subnet `i`
/// gets `a.b.(private_base + i).0/24`. With the default bases (0 and 100) up to
/// 100 public and 156 private subnets fit without collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CidrLayout {
    pub public_base: u8,
    pub private_base: u8,
}

impl CidrLayout {
    pub const DEFAULT_PUBLIC_BASE: u8 = 0;
    pub const DEFAULT_PRIVATE_BASE: u8 = 100;

    pub fn new(public_base: u8, private_base: u8) -> Self {
        Self {
            public_base,
            private_base,
        }
    }

    fn base(&self, kind: SubnetKind) -> u8 {
        match kind {
            SubnetKind::Public => self.public_base,
            SubnetKind::Private => self.private_base,
        }
    }

    /// Third octet for subnet `index` of the given kind, if it fits in a byte
    pub fn third_octet(&self, kind: SubnetKind, index: usize) -> Option<u8> {
        u8::try_from(usize::from(self.base(kind)) + index).ok()
    }

    /// Check that `count` subnets of each kind fit without overflow or overlap
    pub fn check(&self, public_count: usize, private_count: usize) -> Result<(), PlanError> {
        for (kind, count) in [
            (SubnetKind::Public, public_count),
            (SubnetKind::Private, private_count),
        ] {
            if count > 0 && self.third_octet(kind, count - 1).is_none() {
                return Err(PlanError::LayoutOverflow {
                    kind,
                    base: self.base(kind),
                    count,
                });
            }
        }

        if public_count == 0 || private_count == 0 {
            return Ok(());
        }

        let public = usize::from(self.public_base)..usize::from(self.public_base) + public_count;
        let private =
            usize::from(self.private_base)..usize::from(self.private_base) + private_count;
        if public.start < private.end && private.start < public.end {
            return Err(PlanError::LayoutOverlap {
                public_base: self.public_base,
                public_count,
                private_base: self.private_base,
                private_count,
            });
        }

        Ok(())
    }
}

impl Default for CidrLayout {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PUBLIC_BASE, Self::DEFAULT_PRIVATE_BASE)
    }
}
