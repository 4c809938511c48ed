#![allow(unused_imports, dead_code)]

pub use rapid_batch_test_utils::{builders, fakes, init_tracing};

use rapid_batch::units::SimulationUnit;

/// Unit in the default test chain: basin 74, GLDAS/VIC/3H.
pub fn unit(year_month: &str) -> SimulationUnit {
    SimulationUnit::new("74", "GLDAS", "VIC", "3H", year_month.parse().unwrap())
}

pub fn unit_in(basin: &str, year_month: &str) -> SimulationUnit {
    SimulationUnit::new(basin, "GLDAS", "VIC", "3H", year_month.parse().unwrap())
}
