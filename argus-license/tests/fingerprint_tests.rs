use argus_license::{DeviceFingerprint, FingerprintProvider, FixedFingerprint, SystemInfo};

#[test]
fn fingerprint_is_stable() {
    let fp1 = DeviceFingerprint::generate();
    let fp2 = DeviceFingerprint::generate();
    assert_eq!(fp1.id(), fp2.id());
}

#[test]
fn fingerprint_is_a_sha256_hex_digest() {
    let fp = DeviceFingerprint::generate();
    assert_eq!(fp.id().len(), 64);
    assert!(fp.id().chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn provider_returns_the_generated_id() {
    let fp = DeviceFingerprint::generate();
    assert_eq!(fp.fingerprint(), fp.id());
}

#[test]
fn fixed_fingerprint_for_tests() {
    let fp = FixedFingerprint("fp-fixed".into());
    assert_eq!(fp.fingerprint(), "fp-fixed");
}

#[test]
fn fingerprint_serde_roundtrip() {
    let fp = DeviceFingerprint::generate();
    let json = serde_json::to_string(&fp).unwrap();
    let parsed: DeviceFingerprint = serde_json::from_str(&json).unwrap();
    assert_eq!(fp, parsed);
}

#[test]
fn system_info_collection() {
    let info = SystemInfo::collect();
    assert!(!info.os_name.is_empty());
    assert!(!info.arch.is_empty());
    assert!(!info.hostname.is_empty());
    assert!(info.cpu_count >= 1);
}
