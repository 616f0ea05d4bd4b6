//! Order and application lifecycles. Status values are stored as text and
//! parsed back into these enums before any decision is made on them.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    InProgress,
    Review,
    Completed,
    Closed,
    Archived,
}

#[derive(Debug, Error)]
pub enum TransitionError {
    #[error("order status {0:?} cannot move to {1:?}")]
    Illegal(OrderStatus, OrderStatus),
    #[error("unknown order status {0:?} in store")]
    Corrupt(String),
}

impl From<TransitionError> for AppError {
    fn from(value: TransitionError) -> Self {
        match value {
            TransitionError::Illegal(_, _) => {
                AppError::conflict("حالة الطلب الحالية لا تسمح بهذا الإجراء")
            }
            TransitionError::Corrupt(raw) => AppError::internal(format!("bad status: {raw}")),
        }
    }
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::InProgress => "IN_PROGRESS",
            OrderStatus::Review => "REVIEW",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Closed => "CLOSED",
            OrderStatus::Archived => "ARCHIVED",
        }
    }

    /// Forward lifecycle plus the revision loop out of REVIEW.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (InProgress, Review)
                | (Review, InProgress)
                | (Review, Completed)
                | (Completed, Closed)
                | (Completed, Archived)
                | (Closed, Archived)
        )
    }

    pub fn check_transition(&self, next: OrderStatus) -> Result<(), TransitionError> {
        if self.can_transition_to(next) {
            Ok(())
        } else {
            Err(TransitionError::Illegal(*self, next))
        }
    }

    /// Parse a stored status column. An unknown value means a corrupt row,
    /// not client input, so it maps to a 500 rather than a 400.
    pub fn from_stored(raw: &str) -> Result<Self, TransitionError> {
        raw.parse()
            .map_err(|_| TransitionError::Corrupt(raw.to_string()))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "PENDING" => Ok(OrderStatus::Pending),
            "IN_PROGRESS" => Ok(OrderStatus::InProgress),
            "REVIEW" => Ok(OrderStatus::Review),
            "COMPLETED" => Ok(OrderStatus::Completed),
            "CLOSED" => Ok(OrderStatus::Closed),
            "ARCHIVED" => Ok(OrderStatus::Archived),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Approved => "approved",
            ApplicationStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ApplicationStatus {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(ApplicationStatus::Pending),
            "approved" => Ok(ApplicationStatus::Approved),
            "rejected" => Ok(ApplicationStatus::Rejected),
            _ => Err(()),
        }
    }
}
