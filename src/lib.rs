#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![no_std]

pub use dt_cfg as cfg;
pub use dt_os as os;

pub use dt_os::{Status, SyncError, SyncResult};
