//! Integration tests for the PostgreSQL layer.
//!
//! All tests here require a running database and are `#[ignore]`d;
//! run them with `cargo test -p keepsake-db -- --ignored`.
