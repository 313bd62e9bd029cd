//! DevMart - Digital Products Marketplace
//!
//! Marketplace backend for downloadable developer products.
//!
//! ## Features
//! - Product catalog with categories, search, and recommendations
//! - Shopping cart, wishlist, and reviews
//! - Razorpay-style payment flow: intent creation, signed verification,
//!   webhook reconciliation with exactly-once order completion
//! - JWT cookie auth with admin back-office
//! - Deals, testimonials, announcements, newsletter

pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod events;
pub mod gateway;
pub mod models;
pub mod routes;
pub mod state;
pub mod storage;

pub use config::AppConfig;
pub use error::{ApiError, Result};
pub use state::AppState;
