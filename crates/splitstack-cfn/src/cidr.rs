//! IPv4 CIDR blocks and sequential subnet carving.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use splitstack_common::error::{Result, StackError};

/// An IPv4 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CidrBlock {
    network: u32,
    prefix: u8,
}

impl CidrBlock {
    /// Creates a block, rejecting host bits set below the prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix exceeds 32 or the address is not the
    /// network address of the block.
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self> {
        if prefix > 32 {
            return Err(cidr_err(format!("prefix /{prefix} is larger than /32")));
        }
        let network = u32::from(addr);
        if network & !mask(prefix) != 0 {
            return Err(cidr_err(format!("{addr}/{prefix} has host bits set")));
        }
        Ok(Self { network, prefix })
    }

    /// Network address.
    #[must_use]
    pub fn address(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.network)
    }

    /// Number of addresses in the block.
    #[must_use]
    pub fn size(&self) -> u64 {
        1_u64 << (32 - u32::from(self.prefix))
    }

    /// Returns a carver that hands out consecutive sub-blocks.
    #[must_use]
    pub const fn carver(&self) -> SubnetCarver {
        SubnetCarver {
            parent: *self,
            offset: 0,
        }
    }
}

impl FromStr for CidrBlock {
    type Err = StackError;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, prefix) = s
            .split_once('/')
            .ok_or_else(|| cidr_err(format!("\"{s}\" is not in a.b.c.d/n form")))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| cidr_err(format!("\"{addr}\" is not an IPv4 address")))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| cidr_err(format!("\"{prefix}\" is not a prefix length")))?;
        Self::new(addr, prefix)
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address(), self.prefix)
    }
}

/// Allocates non-overlapping subnets from a parent block, in order.
#[derive(Debug, Clone)]
pub struct SubnetCarver {
    parent: CidrBlock,
    offset: u64,
}

impl SubnetCarver {
    /// Allocates the next block with the given mask.
    ///
    /// The offset is first aligned to the requested block size.
    ///
    /// # Errors
    ///
    /// Returns an error if the mask is shorter than the parent's or the
    /// parent block is exhausted.
    pub fn next_block(&mut self, mask: u8) -> Result<CidrBlock> {
        if mask < self.parent.prefix || mask > 32 {
            return Err(cidr_err(format!(
                "cannot carve a /{mask} out of {}",
                self.parent
            )));
        }
        let size = 1_u64 << (32 - u32::from(mask));
        let aligned = self.offset.div_ceil(size) * size;
        if aligned + size > self.parent.size() {
            return Err(cidr_err(format!(
                "{} has no room left for another /{mask}",
                self.parent
            )));
        }
        self.offset = aligned + size;
        let network = u32::try_from(u64::from(self.parent.network) + aligned)
            .map_err(|_| cidr_err("subnet address overflow".into()))?;
        CidrBlock::new(Ipv4Addr::from(network), mask)
    }
}

const fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - prefix as u32)
    }
}

const fn cidr_err(message: String) -> StackError {
    StackError::Config { message }
}
