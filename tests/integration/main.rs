//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a subsystem against
//! mock port implementations. All tests run on the host (x86_64) with
//! no real hardware required.

mod boot_sequence_tests;
mod mock_env;
mod resolver_tests;
mod update_cycle_tests;
