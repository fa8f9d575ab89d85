use super::*;

#[test]
fn http_status_mapping() {
    assert_eq!(AppError::authentication("bad_token", "nope").http_status(), 401);
    assert_eq!(AppError::authorization("insufficient_permission", "no").http_status(), 403);
    assert_eq!(AppError::validation("invalid_slot", "oops").http_status(), 400);
    assert_eq!(AppError::conflict("session_full", "full").http_status(), 409);
    assert_eq!(AppError::not_found("session_not_found", "missing").http_status(), 404);
    assert_eq!(AppError::internal("store_unavailable", "down").http_status(), 500);
}

#[test]
fn internal_detail_is_not_public() {
    let e = AppError::internal("store_io", "disk /var/lib/courtbook is full");
    assert_eq!(e.public_message(), "internal error");
    assert!(!e.is_recoverable());

    let c = AppError::conflict("duplicate", "user already attends this session");
    assert_eq!(c.public_message(), "user already attends this session");
    assert!(c.is_recoverable());
}

#[test]
fn store_errors_fail_closed_as_internal() {
    let e: AppError = StoreError::Unavailable.into();
    assert_eq!(e.code_str(), "store_unavailable");
    assert_eq!(e.http_status(), 500);
}

#[test]
fn display_includes_code() {
    let e = AppError::not_found("attendance_not_found", "no reservation");
    assert_eq!(e.to_string(), "attendance_not_found: no reservation");
}
