// src/nat/situation.rs
//! NAT feature algebra (RFC 4787 mapping and filtering behavior) and the
//! four-axis NAT situation formed by a source and a target NAT.

use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

/// Discrete value of one NAT behavior axis.
///
/// The same value set describes both the mapping and the filtering axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NatFeatureRealization {
    /// Behavior could not be determined
    Unknown,

    /// No NAT on this axis (public address, no filter)
    NotRealized,

    /// Same mapping / filter for every remote endpoint
    EndpointIndependent,

    /// Depends on the remote IP
    AddressDependent,

    /// Depends on the remote IP and port
    AddressAndPortDependent,

    /// New mapping / filter per connection
    ConnectionDependent,
}

impl NatFeatureRealization {
    /// All six members in declaration order
    pub const ALL: [NatFeatureRealization; 6] = [
        Self::Unknown,
        Self::NotRealized,
        Self::EndpointIndependent,
        Self::AddressDependent,
        Self::AddressAndPortDependent,
        Self::ConnectionDependent,
    ];

    /// Canonical resource name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::NotRealized => "NOT_REALIZED",
            Self::EndpointIndependent => "ENDPOINT_INDEPENDENT",
            Self::AddressDependent => "ADDRESS_DEPENDENT",
            Self::AddressAndPortDependent => "ADDRESS_AND_PORT_DEPENDENT",
            Self::ConnectionDependent => "CONNECTION_DEPENDENT",
        }
    }
}

impl fmt::Display for NatFeatureRealization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a name matches no feature realization
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownFeature(pub String);

impl FromStr for NatFeatureRealization {
    type Err = UnknownFeature;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|feature| feature.as_str() == s)
            .ok_or_else(|| UnknownFeature(s.to_string()))
    }
}

/// Classified scenario between a source NAT and a target NAT.
///
/// Immutable; equal iff all four axes match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NatSituation {
    source_mapping: NatFeatureRealization,
    source_filtering: NatFeatureRealization,
    target_mapping: NatFeatureRealization,
    target_filtering: NatFeatureRealization,
}

impl NatSituation {
    /// Number of distinct situations (6^4)
    pub const COUNT: usize = 1296;

    /// Situation from its four features
    pub fn new(
        source_mapping: NatFeatureRealization,
        source_filtering: NatFeatureRealization,
        target_mapping: NatFeatureRealization,
        target_filtering: NatFeatureRealization,
    ) -> Self {
        Self {
            source_mapping,
            source_filtering,
            target_mapping,
            target_filtering,
        }
    }

    /// Mapping behaviour of the source's NAT
    pub fn source_mapping(&self) -> NatFeatureRealization {
        self.source_mapping
    }

    /// Filtering behaviour of the source's NAT
    pub fn source_filtering(&self) -> NatFeatureRealization {
        self.source_filtering
    }

    /// Mapping behaviour of the target's NAT
    pub fn target_mapping(&self) -> NatFeatureRealization {
        self.target_mapping
    }

    /// Filtering behaviour of the target's NAT
    pub fn target_filtering(&self) -> NatFeatureRealization {
        self.target_filtering
    }

    /// Every situation, lexicographic in axis order
    pub fn all() -> impl Iterator<Item = NatSituation> {
        let all = NatFeatureRealization::ALL;
        all.into_iter().flat_map(move |sm| {
            all.into_iter().flat_map(move |sf| {
                all.into_iter().flat_map(move |tm| {
                    all.into_iter().map(move |tf| NatSituation::new(sm, sf, tm, tf))
                })
            })
        })
    }
}

impl fmt::Display for NatSituation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {}",
            self.source_mapping, self.source_filtering, self.target_mapping, self.target_filtering
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use NatFeatureRealization::*;

    #[test]
    fn test_feature_names_round_trip() {
        for feature in NatFeatureRealization::ALL {
            assert_eq!(feature.as_str().parse::<NatFeatureRealization>(), Ok(feature));
        }
        assert!("FULL_CONE".parse::<NatFeatureRealization>().is_err());
        assert!("endpoint_independent".parse::<NatFeatureRealization>().is_err());
    }

    #[test]
    fn test_situation_value_equality() {
        let a = NatSituation::new(EndpointIndependent, EndpointIndependent, ConnectionDependent, ConnectionDependent);
        let b = NatSituation::new(EndpointIndependent, EndpointIndependent, ConnectionDependent, ConnectionDependent);
        assert_eq!(a, a);
        assert_eq!(a, b);

        let changed = [
            NatSituation::new(Unknown, EndpointIndependent, ConnectionDependent, ConnectionDependent),
            NatSituation::new(EndpointIndependent, Unknown, ConnectionDependent, ConnectionDependent),
            NatSituation::new(EndpointIndependent, EndpointIndependent, Unknown, ConnectionDependent),
            NatSituation::new(EndpointIndependent, EndpointIndependent, ConnectionDependent, Unknown),
        ];
        for other in changed {
            assert_ne!(a, other);
        }
    }

    #[test]
    fn test_all_situations_distinct() {
        let all: Vec<_> = NatSituation::all().collect();
        assert_eq!(all.len(), NatSituation::COUNT);

        let distinct: HashSet<_> = all.iter().copied().collect();
        assert_eq!(distinct.len(), NatSituation::COUNT);

        // Deterministic order
        assert_eq!(all, NatSituation::all().collect::<Vec<_>>());
        assert_eq!(all[0], NatSituation::new(Unknown, Unknown, Unknown, Unknown));
        assert_eq!(
            all[NatSituation::COUNT - 1],
            NatSituation::new(ConnectionDependent, ConnectionDependent, ConnectionDependent, ConnectionDependent)
        );
    }

    #[test]
    fn test_serde_names() {
        let situation = NatSituation::new(NotRealized, AddressDependent, AddressAndPortDependent, EndpointIndependent);
        let json = serde_json::to_string(&situation).unwrap();
        assert!(json.contains("\"ADDRESS_AND_PORT_DEPENDENT\""));
        let back: NatSituation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, situation);
    }
}
