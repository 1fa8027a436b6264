//! # checkout-core
//!
//! Domain model and storage for hosted checkout pages.
//!
//! ## Records
//!
//! ```text
//! User ──owns──▶ Page ──collects──▶ Submission
//!   │              │                    ▲
//!   │              └──sold via──▶ Payment (one per processor session)
//!   └─────────────── receives funds ────┘ linked 1:1 after completion
//! ```
//!
//! Plan tiers bound how many pages a user may own; the limits are static
//! policy in [`plan`], never stored per user.

pub mod error;
pub mod model;
pub mod pages;
pub mod plan;
pub mod slug;
pub mod store;

pub use error::{CoreError, Result};
pub use model::{
    FieldType, FormField, Layout, OrderBump, Page, PageId, Payment, PaymentId, PaymentStatus,
    Product, Submission, SubmissionId, SubmissionPaymentStatus, User, UserId, WebhookLog,
    WebhookOutcome,
};
pub use plan::{Plan, PlanLimit, Resource};
pub use store::{
    MemoryStore, PageStore, PaymentStore, Store, SubmissionStore, UserStore, WebhookLogStore,
};
