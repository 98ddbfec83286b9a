//! Aggregates module
pub mod order;
pub mod payment;
pub mod progress;
pub mod refund;

pub use order::{Order, OrderDraft, OrderError, OrderRefundStatus, OrderStatus, PaymentMethod, RefundImage};
pub use payment::{Payment, PaymentError, PaymentStatus};
pub use progress::{ProgressError, ProgressTracker, Stage, StageStatus, StageType};
pub use refund::{Refund, RefundError, RefundOutcome, RefundStatus};
