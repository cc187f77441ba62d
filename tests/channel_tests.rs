use std::collections::HashMap;

use xdfio::{Channel, FieldValue, XdfError};

fn ref_channel() -> Channel {
    Channel::new("EEG C3", -261.9, 261.9, "uV")
}

fn ref_map() -> HashMap<&'static str, FieldValue> {
    HashMap::from([
        ("name", FieldValue::from("EEG C3")),
        ("physical_min", FieldValue::from(-261.9)),
        ("physical_max", FieldValue::from(261.9)),
        ("unit", FieldValue::from("uV")),
    ])
}

#[test]
fn equals_plain_mapping_both_ways() {
    let ch = ref_channel();
    let map = ref_map();
    assert_eq!(ch, map);
    assert_eq!(map, ch);
}

#[test]
fn differs_from_mapping_with_changed_value() {
    let ch = ref_channel();
    let mut map = ref_map();
    map.insert("unit", FieldValue::from("mV"));
    assert_ne!(ch, map);
}

#[test]
fn differs_from_mapping_with_extra_key() {
    let ch = ref_channel();
    let mut map = ref_map();
    map.insert("prefilter", FieldValue::from("HP:0.1Hz"));
    assert_ne!(ch, map);
}

#[test]
fn update_existing_field() {
    let mut ch = ref_channel();
    ch.set("name", "EEG C4".into()).unwrap();
    assert_eq!(ch.name, "EEG C4");
    assert_eq!(ch.get("name"), Some(FieldValue::from("EEG C4")));

    ch.set("physical_max", 300.0.into()).unwrap();
    assert_eq!(ch.physical_max, 300.0);
}

#[test]
fn adding_a_key_is_rejected() {
    let mut ch = ref_channel();
    let err = ch.set("transducer", "AgAgCl".into()).unwrap_err();
    assert!(matches!(err, XdfError::FixedSchema(name) if name == "transducer"));
    // the descriptor is unchanged
    assert_eq!(ch, ref_map());
}

#[test]
fn wrong_value_kind_is_rejected() {
    let mut ch = ref_channel();
    assert!(matches!(
        ch.set("physical_min", "low".into()),
        Err(XdfError::FieldType { field: "physical_min" })
    ));
    assert!(matches!(
        ch.set("unit", 42.0.into()),
        Err(XdfError::FieldType { field: "unit" })
    ));
}

#[test]
fn unknown_field_lookup_returns_none() {
    let ch = ref_channel();
    assert_eq!(ch.get("gain"), None);
}

#[test]
fn fields_iterate_in_schema_order() {
    let ch = ref_channel();
    let names: Vec<&str> = ch.fields().map(|(name, _)| name).collect();
    assert_eq!(names, Channel::FIELDS);
}

#[test]
fn clones_compare_equal() {
    let ch = ref_channel();
    let mut copy = ch.clone();
    assert_eq!(ch, copy);

    copy.set("name", "EMG".into()).unwrap();
    assert_ne!(ch, copy);
}
