//! Domain layer for the design-automation pipeline: models, the error
//! taxonomy, qualified-name matching, the poll schedule and the activity
//! parameter contract. No I/O lives here.

pub mod contract;
pub mod error;
pub mod model;
pub mod naming;
pub mod poll;

pub use contract::*;
pub use error::*;
pub use model::*;
pub use naming::*;
pub use poll::*;
