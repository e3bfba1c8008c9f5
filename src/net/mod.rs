pub mod host;
pub mod inspect;
pub mod spoof;
pub mod utils;
