//! Scenario tests for the whole prediction pipeline, and the fakes they share
//! with the module unit tests.

pub(crate) mod support;
