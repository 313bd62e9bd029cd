//! Order status vocabulary and transition rules.
//!
//! Status strings are part of the wire contract (`pending`, `completed`,
//! `failed`) and are stored verbatim.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderStatus {
    Pending,
    Completed,
    Failed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal states never change again, in either direction.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_become(&self, next: OrderStatus) -> bool {
        matches!(self, Self::Pending) && next != Self::Pending
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a guarded status transition (compare-and-swap on `pending`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The row moved out of `pending`; side effects belong to this caller.
    Applied,
    AlreadyCompleted,
    AlreadyFailed,
}

impl TransitionOutcome {
    pub fn applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for s in [OrderStatus::Pending, OrderStatus::Completed, OrderStatus::Failed] {
            assert_eq!(OrderStatus::parse(s.as_str()), Some(s));
        }
        assert_eq!(OrderStatus::parse("refunded"), None);
    }

    #[test]
    fn test_transitions_are_monotonic() {
        assert!(OrderStatus::Pending.can_become(OrderStatus::Completed));
        assert!(OrderStatus::Pending.can_become(OrderStatus::Failed));
        assert!(!OrderStatus::Completed.can_become(OrderStatus::Failed));
        assert!(!OrderStatus::Failed.can_become(OrderStatus::Completed));
        assert!(OrderStatus::Completed.is_terminal());
        assert!(OrderStatus::Failed.is_terminal());
        assert!(!OrderStatus::Pending.is_terminal());
    }
}
