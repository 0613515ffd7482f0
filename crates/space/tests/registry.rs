use space::{Dtype, RawSpace, Scalar, Space, SpaceError, SpaceKind, SpaceRegistry, SpaceType};

fn ramp_like() -> SpaceRegistry {
    SpaceRegistry::new([
        Space::boxed("uint8_obs", SpaceKind::Observation, &[1, 2, 3], Scalar::U8(0), Scalar::U8(128)).unwrap(),
        Space::discrete("action", SpaceKind::Action, &[1], Scalar::U8(0), Scalar::U8(32)).unwrap(),
        Space::boxed("int32_obs", SpaceKind::Observation, &[4, 5, 6], Scalar::I32(-100), Scalar::I32(100)).unwrap(),
        Space::boxed("float32_obs", SpaceKind::Observation, &[7, 8, 9], Scalar::F32(-1000.0), Scalar::F32(1000.0)).unwrap(),
    ])
    .unwrap()
}

#[test]
fn discovery_count_matches_fill() -> anyhow::Result<()> {
    let registry = ramp_like();
    for kind in SpaceKind::ALL {
        let count = registry.count(kind);
        let mut out = vec![RawSpace::default(); count];
        assert_eq!(registry.fill(kind, &mut out)?, count);
        // stable across calls
        assert_eq!(registry.count(kind), count);
    }
    Ok(())
}

#[test]
fn order_is_declaration_order() -> anyhow::Result<()> {
    let registry = ramp_like();
    let mut out = vec![RawSpace::default(); 3];
    registry.fill(SpaceKind::Observation, &mut out)?;
    let names: Vec<_> = out.iter().map(|r| r.name().unwrap().to_owned()).collect();
    assert_eq!(names, ["uint8_obs", "int32_obs", "float32_obs"]);
    Ok(())
}

#[test]
fn fill_round_trips_through_raw() -> anyhow::Result<()> {
    let registry = ramp_like();
    let mut out = vec![RawSpace::default(); 3];
    registry.fill(SpaceKind::Observation, &mut out)?;
    for (raw, space) in out.iter().zip(registry.spaces(SpaceKind::Observation)) {
        assert_eq!(&raw.decode()?, space);
    }
    Ok(())
}

#[test]
fn short_buffer_is_not_written() {
    let registry = ramp_like();
    let sentinel = RawSpace::default();
    let mut out = vec![sentinel; 2];
    let err = registry.fill(SpaceKind::Observation, &mut out).unwrap_err();
    assert_eq!(err, SpaceError::BufferTooSmall { capacity: 2, count: 3 });
    assert!(out.iter().all(|r| *r == sentinel));
}

#[test]
fn larger_buffer_keeps_tail() -> anyhow::Result<()> {
    let registry = ramp_like();
    let mut out = vec![RawSpace::default(); 4];
    assert_eq!(registry.fill(SpaceKind::Action, &mut out)?, 1);
    let action = out[0].decode()?;
    assert_eq!(action.space_type(), SpaceType::Discrete);
    assert_eq!(action.dtype(), Dtype::Uint8);
    assert_eq!(action.high(), Scalar::U8(32));
    assert!(out[1..].iter().all(|r| *r == RawSpace::default()));
    Ok(())
}

#[test]
fn empty_kind_counts_zero() {
    let registry = ramp_like();
    assert_eq!(registry.count(SpaceKind::Render), 0);
    assert_eq!(registry.fill(SpaceKind::Render, &mut []), Ok(0));
}

#[test]
fn duplicate_names_within_kind_rejected() {
    let a = Space::boxed("x", SpaceKind::Observation, &[1], Scalar::U8(0), Scalar::U8(1)).unwrap();
    let err = SpaceRegistry::new([a.clone(), a]).unwrap_err();
    assert!(matches!(err, SpaceError::DuplicateName { kind: SpaceKind::Observation, .. }));
}

#[test]
fn same_name_in_different_kinds_is_fine() {
    let obs = Space::boxed("x", SpaceKind::Observation, &[1], Scalar::U8(0), Scalar::U8(1)).unwrap();
    let info = Space::boxed("x", SpaceKind::Info, &[1], Scalar::U8(0), Scalar::U8(1)).unwrap();
    let registry = SpaceRegistry::new([obs, info]).unwrap();
    assert_eq!(registry.find(SpaceKind::Info, "x").map(|(i, _)| i), Some(0));
    assert_eq!(registry.byte_lens(SpaceKind::Observation), vec![1]);
}
