//! Saga tests against in-memory fakes.
//!
//! Everything here is hermetic; the PostgreSQL-backed paths are covered
//! by the ignored integration tests in `keepsake-db`.

mod support;

mod locks_tests;
