//! End-to-end tests for the SSO coordinator live in `tests/`.

#![forbid(unsafe_code)]
