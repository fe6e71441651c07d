//! Test suites for the Lodger request kernel.

mod support;
