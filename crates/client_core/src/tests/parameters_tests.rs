use super::*;

const PROBES: [i64; 12] = [
    i64::MIN,
    -1_000,
    -1,
    0,
    1,
    9,
    10,
    11,
    99,
    100,
    101,
    i64::MAX,
];

#[test]
fn stored_values_always_fall_inside_declared_range() {
    let mut store = ParameterStore::new();
    for field in ParameterField::ALL {
        for value in PROBES {
            let stored = store.set(field, value);
            assert!(
                field.range().contains(&stored),
                "{field} stored {stored} for input {value}"
            );
            assert_eq!(store.get(field), stored);
        }
    }
}

#[test]
fn in_range_values_are_stored_verbatim() {
    let mut store = ParameterStore::new();
    assert_eq!(store.set(ParameterField::BrightenFactor, 73), 73);
    assert_eq!(store.set(ParameterField::BorderCleanupPixels, 7), 7);
    assert_eq!(store.set(ParameterField::BorderCleanupPixels, 42), 10);
    assert_eq!(store.set(ParameterField::HighCutoffPercent, -5), 0);
}

#[test]
fn reset_restores_documented_defaults() {
    let mut store = ParameterStore::new();
    for field in ParameterField::ALL {
        store.set(field, 1);
    }
    store.reset();

    let snapshot = store.snapshot();
    assert_eq!(snapshot.brighten_factor(), 50);
    assert_eq!(snapshot.darken_factor(), 50);
    assert_eq!(snapshot.low_cutoff_percent(), 30);
    assert_eq!(snapshot.high_cutoff_percent(), 20);
    assert_eq!(snapshot.border_cleanup_pixels(), 2);
    assert_eq!(snapshot, GenerationParameters::default());
}

#[test]
fn snapshot_is_detached_from_later_edits() {
    let mut store = ParameterStore::new();
    let before = store.snapshot();
    store.set(ParameterField::DarkenFactor, 90);

    assert_eq!(before.darken_factor(), 50);
    assert_eq!(store.snapshot().darken_factor(), 90);
}

#[test]
fn entries_cover_every_wire_field_in_order() {
    let names: Vec<&str> = GenerationParameters::default()
        .entries()
        .iter()
        .map(|(field, _)| field.wire_name())
        .collect();
    assert_eq!(
        names,
        vec![
            "brighten_factor",
            "darken_factor",
            "low_cutoff_percent",
            "high_cutoff_percent",
            "border_cleanup_pixels",
        ]
    );
}

#[test]
fn parses_wire_names_and_short_aliases() {
    assert_eq!(
        "border-cleanup".parse::<ParameterField>(),
        Ok(ParameterField::BorderCleanupPixels)
    );
    assert_eq!(
        "LOW_CUTOFF_PERCENT".parse::<ParameterField>(),
        Ok(ParameterField::LowCutoffPercent)
    );
    assert!("saturation".parse::<ParameterField>().is_err());
}
