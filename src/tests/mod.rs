mod common;
mod monitoring_tests;
