#![deny(rust_2018_idioms)]

extern crate self as libbit;

#[cfg(test)]
extern crate quickcheck;

#[cfg(test)]
#[macro_use(quickcheck)]
extern crate quickcheck_macros;

#[macro_use]
extern crate bitflags;

#[macro_use]
extern crate bit_derive;

#[macro_use]
extern crate anyhow;

#[cfg(test)]
#[macro_use]
pub mod test_utils;

#[macro_use]
extern crate log;

#[macro_use]
mod macros;

pub mod config;
pub mod error;
pub mod fsmonitor;
pub mod hash;
pub mod index;
pub mod path;
pub mod repo;
pub mod serialize;

mod interner;
mod io;
mod lockfile;
mod time;
mod tls;
