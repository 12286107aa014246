//! Inventory costing and stock bookkeeping (pure domain).
//!
//! No IO, no persistence, no HTTP. The infra layer composes these types inside
//! transactions; every function here either returns a decision or mutates an
//! in-memory value after validating the whole change up front.

pub mod adjustment;
pub mod cost_layer;
pub mod ids;
pub mod landed_cost;
pub mod movement;
pub mod policy;
pub mod reservation;
pub mod stock;
pub mod transfer;

pub use adjustment::{
    AdjustmentCommand, AdjustmentEvent, AdjustmentLine, AdjustmentStatus, AdjustmentType,
    CreateAdjustment, StockAdjustment,
};
pub use cost_layer::{
    CostConsumption, CostLayer, ConsumptionPlan, IntegrityIssue, LayerDraw, LayerType, NewCostLayer,
    ValuationMethod, apply_plan, check_layer_integrity, plan_consumption,
};
pub use ids::{
    AdjustmentId, ConsumptionId, CostLayerId, LandedCostId, MovementId, ReservationId, TransferId,
};
pub use landed_cost::{AllocationMethod, LandedCost, LandedCostAllocation, allocate_landed_cost};
pub use movement::{MovementType, StockMovement};
pub use policy::ApprovalPolicy;
pub use reservation::{
    CreateReservation, ReservationCommand, ReservationEvent, ReservationLine, ReservationStatus,
    StockReservation,
};
pub use stock::{StockItem, StockKey};
pub use transfer::{
    CreateTransfer, ReceiptLine, Shipment, StockTransfer, TransferCommand, TransferEvent,
    TransferLine, TransferStatus,
};
