//! Business logic. Handlers stay thin and call into these services through [`crate::AppState`].

use serde::{Deserialize, Serialize};

pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod orders;
pub mod payments;
pub mod pricing;

/// Page metadata returned with every list endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub current: u64,
    pub pages: u64,
    pub total: u64,
    pub limit: u64,
}

impl Pagination {
    pub fn new(current: u64, limit: u64, total: u64) -> Self {
        let pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            current,
            pages,
            total,
            limit,
        }
    }
}
