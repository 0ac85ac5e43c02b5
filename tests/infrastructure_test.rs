//! Test to verify test infrastructure works correctly

mod common;

use common::builders::BindingBuilder;
use regbind::Direction;
use std::time::Duration;

#[test]
fn test_infrastructure_setup() {
    let binding = BindingBuilder::new("AIN3").format("%.2f").build();

    assert_eq!(binding.binding_class, "AIN3");
    assert_eq!(binding.template, "ain3-display");
    assert_eq!(binding.selector(), "#ain3-display");
    assert_eq!(binding.direction, Direction::Read);
}

#[test]
fn test_float_comparison() {
    common::assert_float_eq(1.0, 1.0000001, 0.001);
}

#[test]
#[should_panic]
fn test_float_comparison_fails() {
    common::assert_float_eq(1.0, 2.0, 0.001);
}

#[test]
fn test_wait_for() {
    let mut polls = 0;
    assert!(common::wait_for(Duration::from_millis(200), || {
        polls += 1;
        polls >= 3
    }));
    assert!(!common::wait_for(Duration::from_millis(20), || false));
}
