use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::client::ClientError;

/// Represents the marketplaces the classification service has models for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Marketplace {
    /// Wildberries catalogue
    ///
    /// This is the marketplace the service falls back to when none is given.
    #[default]
    Wildberries,
    /// Ozon catalogue
    Ozon,
    /// Yandex Market catalogue
    YandexMarket,
}

impl Marketplace {
    /// Every known marketplace, in the order they are offered to users
    pub const ALL: [Marketplace; 3] = [
        Marketplace::Wildberries,
        Marketplace::Ozon,
        Marketplace::YandexMarket,
    ];

    /// Identifier used on the wire (query strings, form fields and JSON bodies)
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wildberries => "wildberries",
            Self::Ozon => "ozon",
            Self::YandexMarket => "yandex_market",
        }
    }

    /// Human readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Wildberries => "Wildberries",
            Self::Ozon => "Ozon",
            Self::YandexMarket => "Yandex Market",
        }
    }
}

impl fmt::Display for Marketplace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Marketplace {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Marketplace::ALL
            .into_iter()
            .find(|m| m.as_str() == normalized)
            .ok_or_else(|| ClientError::UnknownMarketplace(s.to_string()))
    }
}
