//! Allocator capability threaded through generation
//!
//! Generation charges every heap allocation a value makes against an
//! [`Allocator`], and disposal releases it again. The accounting is what lets
//! a run enforce a memory budget and verify that each value is disposed
//! exactly once.

use thiserror::Error;

/// Refusal to hand out more memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("allocator refused {requested} bytes with {in_use} bytes already in use")]
pub struct AllocError {
    pub requested: usize,
    pub in_use: usize,
}

pub trait Allocator {
    /// Charge `bytes` against the allocator
    fn allocate(&mut self, bytes: usize) -> Result<(), AllocError>;

    /// Return `bytes` previously charged
    fn release(&mut self, bytes: usize);

    /// Bytes currently charged and not yet released
    fn in_use(&self) -> usize;
}

/// Unlimited allocator that only keeps the running total
#[derive(Debug, Default, Clone)]
pub struct SystemAllocator {
    in_use: usize,
}

impl SystemAllocator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Allocator for SystemAllocator {
    fn allocate(&mut self, bytes: usize) -> Result<(), AllocError> {
        self.in_use = self.in_use.saturating_add(bytes);
        Ok(())
    }

    fn release(&mut self, bytes: usize) {
        self.in_use = self.in_use.saturating_sub(bytes);
    }

    fn in_use(&self) -> usize {
        self.in_use
    }
}

/// Allocator with a hard byte limit
#[derive(Debug, Clone)]
pub struct BudgetAllocator {
    limit: usize,
    in_use: usize,
    peak: usize,
}

impl BudgetAllocator {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            in_use: 0,
            peak: 0,
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Highest number of bytes charged at once
    pub fn peak(&self) -> usize {
        self.peak
    }
}

impl Allocator for BudgetAllocator {
    fn allocate(&mut self, bytes: usize) -> Result<(), AllocError> {
        match self.in_use.checked_add(bytes) {
            Some(total) if total <= self.limit => {
                self.in_use = total;
                self.peak = self.peak.max(total);
                Ok(())
            }
            _ => Err(AllocError {
                requested: bytes,
                in_use: self.in_use,
            }),
        }
    }

    fn release(&mut self, bytes: usize) {
        debug_assert!(bytes <= self.in_use, "released more than was allocated");
        self.in_use = self.in_use.saturating_sub(bytes);
    }

    fn in_use(&self) -> usize {
        self.in_use
    }
}
