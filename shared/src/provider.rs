//! Provider identifiers
//!
//! Every upstream system the platform talks to is identified by a
//! [`ProviderKind`]. Checkout platforms own the commercial side of an order;
//! fulfillment providers own the shipping side. [`DataSource`] records which
//! upstream created a ledger row.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which side of an order a provider supplies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderSide {
    /// Checkout platform: customer, payment and commercial data
    Checkout,
    /// Fulfillment/carrier: tracking and delivery status
    Fulfillment,
}

/// A configured upstream integration kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Shopify,
    Cartpanda,
    Digistore24,
    Elogy,
    Fhb,
}

impl ProviderKind {
    /// All known provider kinds, in registry order.
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::Shopify,
        ProviderKind::Cartpanda,
        ProviderKind::Digistore24,
        ProviderKind::Elogy,
        ProviderKind::Fhb,
    ];

    pub fn side(&self) -> ProviderSide {
        match self {
            ProviderKind::Shopify | ProviderKind::Cartpanda | ProviderKind::Digistore24 => {
                ProviderSide::Checkout
            }
            ProviderKind::Elogy | ProviderKind::Fhb => ProviderSide::Fulfillment,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Shopify => "shopify",
            ProviderKind::Cartpanda => "cartpanda",
            ProviderKind::Digistore24 => "digistore24",
            ProviderKind::Elogy => "elogy",
            ProviderKind::Fhb => "fhb",
        }
    }

    /// The data source recorded on rows created by this provider.
    pub fn data_source(&self) -> DataSource {
        match self {
            ProviderKind::Shopify => DataSource::Shopify,
            ProviderKind::Cartpanda => DataSource::Cartpanda,
            ProviderKind::Digistore24 => DataSource::Digistore24,
            ProviderKind::Elogy | ProviderKind::Fhb => DataSource::FulfillmentOnly,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "shopify" => Ok(ProviderKind::Shopify),
            "cartpanda" => Ok(ProviderKind::Cartpanda),
            "digistore24" => Ok(ProviderKind::Digistore24),
            "elogy" => Ok(ProviderKind::Elogy),
            "fhb" => Ok(ProviderKind::Fhb),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}

/// Error for unrecognized provider names in routes/config.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown provider: {0}")]
pub struct UnknownProvider(pub String);

/// Which upstream a ledger row originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Shopify,
    Cartpanda,
    Digistore24,
    Manual,
    /// Created by a fulfillment provider before any checkout order matched it
    FulfillmentOnly,
}

impl DataSource {
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "shopify" => Some(DataSource::Shopify),
            "cartpanda" => Some(DataSource::Cartpanda),
            "digistore24" => Some(DataSource::Digistore24),
            "manual" => Some(DataSource::Manual),
            "fulfillment-only" => Some(DataSource::FulfillmentOnly),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Shopify => "shopify",
            DataSource::Cartpanda => "cartpanda",
            DataSource::Digistore24 => "digistore24",
            DataSource::Manual => "manual",
            DataSource::FulfillmentOnly => "fulfillment-only",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_sides() {
        assert_eq!(ProviderKind::Shopify.side(), ProviderSide::Checkout);
        assert_eq!(ProviderKind::Elogy.side(), ProviderSide::Fulfillment);
        assert_eq!(ProviderKind::Fhb.data_source(), DataSource::FulfillmentOnly);
    }
}
