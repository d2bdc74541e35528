//! # Batch RPC Test Suite
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/      # Client ↔ broker ↔ worker flows
//!     ├── round_trip.rs # Successful calls, concurrency, isolation
//!     ├── failures.rs   # Deadlines, dropped requests, broker loss
//!     └── session.rs    # Reply queue lifecycle, redelivery
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p rpc-tests
//! cargo test -p rpc-tests integration::failures::
//!
//! # Benchmarks
//! cargo bench -p rpc-tests
//! ```

#![allow(dead_code)]

pub mod integration;
