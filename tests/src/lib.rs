//! # Resource Gateway Test Suite
//!
//! Cross-crate flows that exercise the gateway the way a deployment wires
//! it: `GatewayBuilder` with real processors, the in-memory pubsub
//! transport and the full middleware stack.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── fixtures.rs        # Todo model, processors and test doubles
//!     ├── rest_flow.rs       # CRUD over HTTP through rate limit and auth
//!     ├── push_flow.rs       # dispatcher → sessions → pubsub → delivery
//!     └── fault_isolation.rs # panics and read-only mode
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p gateway-tests
//! cargo test -p gateway-tests integration::push_flow
//! ```

pub mod integration;
