//! Integration tests for the functional-unit pool.

use mips_simulator::core::alu::{Alu, AluCollection, AluType};

fn pool() -> AluCollection {
    AluCollection::new(vec![
        Alu::new(AluType::Integer, 1),
        Alu::new(AluType::Integer, 1),
        Alu::new(AluType::FloatAddition, 4),
        Alu::new(AluType::FloatDivision, 23),
    ])
}

/// Tests that a request leases the lowest matching index.
#[test]
fn test_request_lowest_index() {
    let mut alus = pool();
    let (index, alu) = alus.request(AluType::Integer).unwrap();
    assert_eq!(index, 0);
    assert_eq!(alu.kind, AluType::Integer);

    let (index, _) = alus.request(AluType::Integer).unwrap();
    assert_eq!(index, 1);
}

/// Tests that no index is leased twice before release.
#[test]
fn test_exclusive_lease() {
    let mut alus = pool();
    let (first, _) = alus.request(AluType::Integer).unwrap();
    let (second, _) = alus.request(AluType::Integer).unwrap();
    assert_ne!(first, second);

    // Both integer units are out; a third request must stall.
    assert!(alus.request(AluType::Integer).is_none());
    assert_eq!(alus.available(), 2);

    alus.release(first);
    let (again, _) = alus.request(AluType::Integer).unwrap();
    assert_eq!(again, first);
}

/// Tests that requests match on unit kind.
#[test]
fn test_request_matches_kind() {
    let mut alus = pool();
    let (index, alu) = alus.request(AluType::FloatAddition).unwrap();
    assert_eq!(index, 2);
    assert_eq!(alu.cycles_required, 4);

    assert!(alus.request(AluType::FloatMultiplication).is_none());
}

/// Tests that the total unit count is conserved across lease cycles.
#[test]
fn test_count_conserved() {
    let mut alus = pool();
    assert_eq!(alus.len(), 4);
    assert_eq!(alus.available(), 4);

    let (a, _) = alus.request(AluType::Integer).unwrap();
    let (b, _) = alus.request(AluType::FloatDivision).unwrap();
    assert_eq!(alus.available(), 2);

    alus.release(b);
    alus.release(a);
    assert_eq!(alus.available(), 4);
    assert_eq!(alus.len(), 4);
}

/// Tests that reset restores every unit.
#[test]
fn test_reset_restores_all() {
    let mut alus = pool();
    let _ = alus.request(AluType::Integer).unwrap();
    let _ = alus.request(AluType::FloatAddition).unwrap();

    alus.reset();
    assert_eq!(alus.available(), 4);
    assert!(alus.request(AluType::FloatAddition).is_some());
}
