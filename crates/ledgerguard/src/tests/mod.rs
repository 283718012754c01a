//! Test suites exercising the components together.

mod lock_behaviour;
mod pipeline_behaviour;
mod support;
mod unit;
