//! Priority type tests for tern-core

use tern_core::{priority, KernelError, Priority, PrioritySet};

#[test]
fn test_priority_bounds() {
    assert_eq!(Priority::new(31).unwrap(), Priority::MAX);
    assert_eq!(Priority::new(0).unwrap(), Priority::MIN);
    assert_eq!(Priority::new(200), Err(KernelError::InvalidPriority));
}

#[test]
fn test_priority_macro() {
    let p = priority!(7);
    assert_eq!(p.raw(), 7);
    assert_eq!(p.index(), 7);
}

#[test]
fn test_highest_tracks_clears() {
    let mut set = PrioritySet::new();
    for level in [2u8, 9, 30] {
        set.set(Priority::new_unchecked(level));
    }

    assert_eq!(set.highest().unwrap().raw(), 30);
    set.clear(Priority::new_unchecked(30));
    assert_eq!(set.highest().unwrap().raw(), 9);
    set.clear(Priority::new_unchecked(9));
    assert_eq!(set.highest().unwrap().raw(), 2);
}
