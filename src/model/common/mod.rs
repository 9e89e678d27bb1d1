//! Types shared between the API and DB representations.

pub mod ballot;
