//! Protocol settings behavior.

use neo3_config::{NetworkType, ProtocolSettings};

#[test]
fn network_type_serializes_by_name() {
    assert_eq!(
        serde_json::to_string(&NetworkType::MainNet).unwrap(),
        "\"MainNet\""
    );
    let back: NetworkType = serde_json::from_str("\"TestNet\"").unwrap();
    assert_eq!(back, NetworkType::TestNet);
}

#[test]
fn settings_round_trip_through_serde() {
    let settings = ProtocolSettings::default_private();
    let json = serde_json::to_string(&settings).unwrap();
    let back: ProtocolSettings = serde_json::from_str(&json).unwrap();
    assert_eq!(back, settings);
}

#[test]
fn presets_pick_consistent_committees() {
    for settings in [
        ProtocolSettings::default_private(),
        ProtocolSettings::mainnet(),
        ProtocolSettings::testnet(),
    ] {
        assert!(settings.validators_count <= settings.standby_committee.len());
        assert!(settings.quorum_count() > 2 * settings.byzantine_fault_count());
    }
}
