//! Unit tests - Cross-module tests of single components through the public API

mod adapter_robustness_tests;
mod type_registry_tests;
