//! Domain types for revertlab.

pub mod bar;
pub mod event;
pub mod fill;
pub mod ids;
pub mod order;
pub mod position;
pub mod trade;

pub use bar::Bar;
pub use event::{OrderEvent, OrderUpdate};
pub use fill::Fill;
pub use ids::{IdGen, OrderId};
pub use order::{
    Order, OrderAuditEntry, OrderRequest, OrderRole, OrderSide, OrderStatus, OrderType,
};
pub use position::{Position, QTY_EPSILON};
pub use trade::TradeRecord;
