use jamal_core::{CoreError, RideId, RideStatus};
use jamal_core::destination::DestinationId;
use jamal_store::StoreError;
use jamal_sync::SyncError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Session(#[from] SyncError),

    #[error("no driver is online right now")]
    NoDriversOnline,

    #[error("destination {0} is not available")]
    DestinationUnavailable(DestinationId),

    #[error("ride {id} is {status}, not in progress")]
    RideNotInProgress { id: RideId, status: RideStatus },

    #[error("ride {0} was taken by another driver")]
    RideTaken(RideId),

    #[error("ride {id} is {status}; only finished rides can be rated")]
    RideNotFinished { id: RideId, status: RideStatus },

    #[error("ride {0} was already rated")]
    AlreadyRated(RideId),

    #[error("every 4-digit driver code is taken")]
    NoFreeDriverCode,

    #[error("ride {0} has no driver assigned")]
    NoDriverAssigned(RideId),

    #[error("no active driver with code {0:?}")]
    UnknownDriverCode(String),

    #[error("invalid month {0:?}; expected YYYY-MM")]
    InvalidMonth(String),

    #[error("incorrect admin password")]
    InvalidPassword,

    #[error("admin session missing or expired; run `jamal admin login`")]
    NotAuthenticated,
}

impl DispatchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, DispatchError::Store(e) if e.is_not_found())
    }
}
