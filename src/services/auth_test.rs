use super::*;
use crate::frame::ErrorCode;

#[test]
fn open_gate_accepts_anything() {
    let gate = PasswordGate::new(None);
    assert!(gate.is_open());
    assert_eq!(gate.verify(""), Ok(()));
    assert_eq!(gate.verify("whatever"), Ok(()));
}

#[test]
fn closed_gate_accepts_exact_password() {
    let gate = PasswordGate::new(Some("chowka-bara"));
    assert!(!gate.is_open());
    assert_eq!(gate.verify("chowka-bara"), Ok(()));
}

#[test]
fn closed_gate_rejects_wrong_password() {
    let gate = PasswordGate::new(Some("chowka-bara"));
    assert_eq!(gate.verify("chowka"), Err(AuthError::Rejected));
    assert_eq!(gate.verify(""), Err(AuthError::Rejected));
    assert_eq!(gate.verify("Chowka-Bara"), Err(AuthError::Rejected));
}

#[test]
fn error_codes_are_stable() {
    assert_eq!(AuthError::Rejected.error_code(), "E_AUTH_REJECTED");
    assert_eq!(AuthError::Required.error_code(), "E_AUTH_REQUIRED");
}
