#![cfg(feature = "serde")]

use dfwer_kernel::{step_down, CdfFamily, Combination, KernelConfig, StepDownCritical};

#[test]
fn config_skips_cancellation_token() {
    let cfg = KernelConfig::independence().with_chunk_budget(1024);
    let json = serde_json::to_string(&cfg).unwrap();
    assert!(!json.contains("cancellation"));

    let back: KernelConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(back.combination, Combination::Independence);
    assert_eq!(back.chunk_budget, 1024);
    assert!(back.cancellation.is_none());
}

#[test]
fn config_fills_missing_fields_with_defaults() {
    let cfg: KernelConfig = serde_json::from_str(r#"{"combination":"Independence"}"#).unwrap();
    assert_eq!(cfg.combination, Combination::Independence);
    assert_eq!(cfg.chunk_budget, KernelConfig::default().chunk_budget);
}

#[test]
fn step_down_result_serializes() {
    let family = CdfFamily::new(vec![
        vec![0.01, 0.02, 0.1, 1.0],
        vec![0.005, 0.04, 0.3, 1.0],
    ])
    .unwrap();
    let grid = family.support();
    let res = step_down::critical(&family, &grid, &[0.01, 0.04], 0.05, None, &KernelConfig::default())
        .unwrap();
    let json = serde_json::to_string(&res).unwrap();
    let back: StepDownCritical = serde_json::from_str(&json).unwrap();
    assert_eq!(back, res);
}
