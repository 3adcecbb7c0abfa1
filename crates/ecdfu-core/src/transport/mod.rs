//! Transport layer module.

pub mod hid;
pub mod mock;
pub mod nusb;
pub mod observable;
pub mod traits;

pub use hid::NusbHidTransport;
pub use mock::{MockFeatureTransport, MockTransport};
pub use nusb::NusbTransport;
pub use observable::ObservableTransport;
pub use traits::{BulkTransport, FeatureReportTransport, Timeouts, TransportError};
