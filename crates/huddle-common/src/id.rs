/// Generate a fresh session-scoped identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Short hex id for correlating log lines of one run.
pub fn new_correlation_id() -> String {
    let uuid = uuid::Uuid::new_v4();
    uuid.as_simple().to_string().chars().take(8).collect()
}
