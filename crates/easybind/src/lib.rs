#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
// Don't care enough to fix
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::wildcard_imports)]

pub mod error;
pub mod named_conf;
pub mod registry;
pub mod settings;
pub mod store;

pub use self::error::{Error, ErrorKind};
pub use self::registry::{ManagedZone, ZoneRegistry};
pub use self::settings::Settings;
