use super::*;

#[test]
fn request_and_server_errors_are_retryable() {
    assert!(LlmError::ApiRequest("timeout".into()).retryable());
    assert!(LlmError::ApiResponse { status: 429, body: String::new() }.retryable());
    assert!(LlmError::ApiResponse { status: 503, body: String::new() }.retryable());
}

#[test]
fn client_errors_are_not_retryable() {
    assert!(!LlmError::ApiResponse { status: 400, body: String::new() }.retryable());
    assert!(!LlmError::ApiResponse { status: 401, body: String::new() }.retryable());
    assert!(!LlmError::MissingApiKey { var: "X".into() }.retryable());
    assert!(!LlmError::ApiParse("bad json".into()).retryable());
}

#[test]
fn message_constructors_set_roles() {
    assert_eq!(ChatMessage::user("hi").role, "user");
    assert_eq!(ChatMessage::assistant("hello").role, "assistant");
}

#[test]
fn error_display_includes_context() {
    let err = LlmError::MissingApiKey { var: "ANTHROPIC_API_KEY".into() };
    assert!(err.to_string().contains("ANTHROPIC_API_KEY"));

    let err = LlmError::ApiResponse { status: 500, body: "oops".into() };
    assert!(err.to_string().contains("500"));
}
