pub mod active_set;
pub mod controller;
pub mod device;
pub mod notification;
pub mod output;
pub mod read_config;
pub mod signalk;
pub mod sound_policy;
pub mod startup;
pub mod util;

#[cfg(feature = "systemd")]
mod systemd;

#[cfg(not(feature = "systemd"))]
mod no_systemd;

pub mod daemon {
    #[cfg(feature = "systemd")]
    pub use crate::systemd::{add_args, exiting, ready, start};
    #[cfg(not(feature = "systemd"))]
    pub use crate::no_systemd::{add_args, exiting, ready, start};
}
