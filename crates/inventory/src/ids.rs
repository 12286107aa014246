//! Typed identifiers for inventory records and documents.

use serde::{Deserialize, Serialize};

use stockwise_core::AggregateId;

macro_rules! inventory_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub AggregateId);

        impl $name {
            pub fn new(id: AggregateId) -> Self {
                Self(id)
            }

            pub fn generate() -> Self {
                Self(AggregateId::new())
            }

            pub fn aggregate_id(&self) -> AggregateId {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl core::str::FromStr for $name {
            type Err = stockwise_core::DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.parse()?))
            }
        }
    };
}

inventory_id!(
    /// Cost layer identifier.
    CostLayerId
);
inventory_id!(
    /// Cost consumption row identifier.
    ConsumptionId
);
inventory_id!(LandedCostId);
inventory_id!(MovementId);
inventory_id!(
    /// Stock reservation document identifier.
    ReservationId
);
inventory_id!(
    /// Stock adjustment document identifier.
    AdjustmentId
);
inventory_id!(
    /// Stock transfer document identifier.
    TransferId
);
