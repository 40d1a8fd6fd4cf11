//! Domain types shared by every stage of the evaluation cycle.

pub mod account;
pub mod bar;
pub mod order;

pub use account::{AccountSnapshot, PositionSnapshot, Quote};
pub use bar::{Bar, Timeframe};
pub use order::{
    Bracket, OrderId, OrderKind, OrderQuantity, OrderRequest, OrderResult, OrderSide, OrderStatus,
    TimeInForce,
};

/// Symbol type alias
pub type Symbol = String;
