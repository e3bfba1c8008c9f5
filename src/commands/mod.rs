pub mod arp;
pub mod serve;
