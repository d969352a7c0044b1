/// Lifecycle state of a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ManagerState {
    #[default]
    Uninitialized,
    Initializing,
    Available,
    Failed,
}

impl ManagerState {
    /// Returns `true` once initialization has resolved (either way).
    #[inline]
    pub fn is_resolved(self) -> bool {
        matches!(self, ManagerState::Available | ManagerState::Failed)
    }

    /// Service status reported to applications.
    pub fn service_status(self) -> ServiceStatus {
        match self {
            ManagerState::Uninitialized | ManagerState::Initializing => ServiceStatus::Unavailable,
            ManagerState::Available => ServiceStatus::Available,
            ManagerState::Failed => ServiceStatus::Failed,
        }
    }
}

/// Availability of a manager's service, as seen by applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceStatus {
    #[default]
    Unavailable,
    Available,
    Failed,
}

impl ServiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceStatus::Unavailable => "unavailable",
            ServiceStatus::Available => "available",
            ServiceStatus::Failed => "failed",
        }
    }
}
