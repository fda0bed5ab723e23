#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![doc = include_str!("../README.md")]

extern crate alloc;

pub mod ack;
pub mod channel;
pub mod endpoint;
pub mod frag;
pub mod packet;
pub mod rtt;
pub mod seq;
pub mod seq_buf;

#[cfg(feature = "condition")]
pub mod condition;

pub use octs;
