pub mod destination;
pub mod driver;
pub mod error;
pub mod fare;
pub mod format;
pub mod geo;
pub mod matching;
pub mod notification;
pub mod payment;
pub mod ride;
pub mod schema;

pub use destination::{Destination, DestinationPatch, NewDestination};
pub use driver::{Driver, DriverId, DriverPatch, DriverStatus, NewDriver};
pub use error::CoreError;
pub use fare::{FareBreakdown, FareSchedule};
pub use geo::Coordinates;
pub use matching::RankedRequest;
pub use notification::{Notification, Rating};
pub use payment::{NewPayment, Payment, PaymentPatch, PaymentStatus};
pub use ride::{
    ClientInfo, DriverSnapshot, NewRideRequest, RideId, RidePatch, RideRequest, RideStatus,
};
