pub mod money;
pub mod order;

pub use money::{line_total, order_total, round2, to_minor_units};
pub use order::{OrderStatus, TransitionOutcome};
