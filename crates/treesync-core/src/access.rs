/// Bearer-token membership check against a credential store.
///
/// The accepted token doubles as the device identity for the session lock.
pub trait AccessControl: Send + Sync {
    fn has_access(&self, token: &str) -> bool;
}
