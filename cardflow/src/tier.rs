//! Membership tiers and their card quotas

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Membership level read from the user profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipTier {
    Regular,
    Silver,
    Gold,
    Platinum,
    Vip,
}

impl Default for MembershipTier {
    fn default() -> Self {
        MembershipTier::Regular
    }
}

impl MembershipTier {
    pub const ALL: [MembershipTier; 5] = [
        MembershipTier::Regular,
        MembershipTier::Silver,
        MembershipTier::Gold,
        MembershipTier::Platinum,
        MembershipTier::Vip,
    ];

    /// Maximum number of cards a member of this tier may hold
    pub fn max_cards(&self) -> usize {
        match self {
            MembershipTier::Regular => 3,
            MembershipTier::Silver => 5,
            MembershipTier::Gold => 8,
            MembershipTier::Platinum => 15,
            MembershipTier::Vip => 20,
        }
    }

    pub fn can_issue(&self, current_count: usize) -> bool {
        current_count < self.max_cards()
    }

    /// Fail with a quota error when another card would exceed the tier limit
    pub fn check_quota(&self, current_count: usize) -> Result<()> {
        if self.can_issue(current_count) {
            Ok(())
        } else {
            Err(Error::QuotaExceeded { tier: *self, max: self.max_cards() })
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipTier::Regular => "regular",
            MembershipTier::Silver => "silver",
            MembershipTier::Gold => "gold",
            MembershipTier::Platinum => "platinum",
            MembershipTier::Vip => "vip",
        }
    }
}

impl fmt::Display for MembershipTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MembershipTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "regular" => Ok(MembershipTier::Regular),
            "silver" => Ok(MembershipTier::Silver),
            "gold" => Ok(MembershipTier::Gold),
            "platinum" => Ok(MembershipTier::Platinum),
            "vip" => Ok(MembershipTier::Vip),
            other => Err(Error::InvalidInput(format!("unknown membership tier '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_boundary_is_strict() {
        for tier in MembershipTier::ALL {
            let max = tier.max_cards();
            assert!(tier.check_quota(max - 1).is_ok());
            assert_eq!(
                tier.check_quota(max),
                Err(Error::QuotaExceeded { tier, max })
            );
        }
    }

    #[test]
    fn quota_message_names_tier_and_limit() {
        let err = MembershipTier::Gold.check_quota(8).unwrap_err();
        assert_eq!(err.to_string(), "Card limit reached: gold membership allows up to 8 cards");
    }
}
