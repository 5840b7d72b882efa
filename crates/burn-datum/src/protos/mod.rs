#![allow(missing_docs)]

include!(concat!(env!("OUT_DIR"), "/datum-protos/mod.rs"));
